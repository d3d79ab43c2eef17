//! 连接生命周期管理器 - 统一管理单个逻辑连接的完整生命周期
//! Connection Lifecycle Manager - owns the lifecycle of a single logical connection
//!
//! The manager connects lazily on the first [`ConnectionManager::get_connection`]
//! call, wraps the driver's connect in a [`RetryExecutor`], and lets every
//! concurrent caller share one in-flight attempt. Liveness events from the
//! driver connection flip the state back to `Disconnected` so the next call
//! starts a fresh connect-and-retry cycle.
//!
//! 管理器在第一次调用 [`ConnectionManager::get_connection`] 时才惰性连接，
//! 用 [`RetryExecutor`] 包装驱动的连接操作，并让所有并发调用者共享同一个进行中的尝试。
//! 驱动连接发出的存活事件会把状态切回 `Disconnected`，使下一次调用开始新的连接与重试周期。

pub mod listeners;
pub mod state;


use crate::{
    config::Config,
    driver::{Driver, DriverConnection, LivenessEvent, driver_error},
    error::{Error, Result},
    logger::{Logger, NoopLogger},
    retry::RetryExecutor,
};
use futures::future::{BoxFuture, FutureExt, Shared};
use listeners::{Listener, ListenerError, ListenerRegistry, in_notification, notify_all};
use parking_lot::Mutex;
use state::ConnectionState;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, trace, warn};

/// The cached outcome of the current connection attempt.
/// 当前连接尝试的缓存结果。
type PendingAttempt<C> = Shared<BoxFuture<'static, Result<Arc<C>>>>;

/// Cause reported when a fresh connection dies while its liveness callbacks
/// are being installed.
#[derive(Debug, thiserror::Error)]
#[error("connection reported {0:?} before it was established")]
struct LostOnArrival(LivenessEvent);

/// State guarded by the manager lock. Never held across an `.await` or while
/// listeners run.
struct Inner<C> {
    state: ConnectionState,
    connection: Option<Arc<C>>,
    pending: Option<PendingAttempt<C>>,
    /// Bumped for every new attempt. Liveness callbacks carry the value of
    /// the attempt that produced their connection.
    generation: u64,
    /// First liveness event seen for the current generation while still
    /// `Connecting`.
    lost_on_arrival: Option<LivenessEvent>,
    listeners: ListenerRegistry,
}

struct ManagerCore<D: Driver> {
    driver: D,
    target: String,
    options: D::Options,
    executor: RetryExecutor,
    inner: Mutex<Inner<D::Connection>>,
}

/// Manages a single logical connection to a remote service.
///
/// Cloning is cheap and every clone refers to the same connection.
///
/// 管理到远端服务的单个逻辑连接。
///
/// 克隆开销很小，所有克隆都指向同一个连接。
pub struct ConnectionManager<D: Driver> {
    core: Arc<ManagerCore<D>>,
}

impl<D: Driver> Clone for ConnectionManager<D> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<D: Driver> std::fmt::Debug for ConnectionManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.core.inner.lock();
        f.debug_struct("ConnectionManager")
            .field("target", &self.core.target)
            .field("state", &inner.state)
            .field("generation", &inner.generation)
            .field("attempt_in_flight", &inner.pending.is_some())
            .field("listeners", &inner.listeners)
            .field("executor", &self.core.executor)
            .finish()
    }
}

impl<D: Driver> ConnectionManager<D> {
    /// Validates `config` and builds a manager. No connection is attempted.
    ///
    /// 校验 `config` 并构建管理器。不会发起任何连接。
    pub fn new(driver: D, config: Config<D::Options>) -> Result<Self> {
        config.validate()?;

        let logger: Arc<dyn Logger> = config.logger.unwrap_or_else(|| Arc::new(NoopLogger));
        let executor = RetryExecutor::new(config.retry.policy()).with_logger(logger);
        debug!(
            endpoint = %config.connection_target,
            max_attempts = executor.policy().max_attempts(),
            "Connection manager created"
        );

        Ok(Self {
            core: Arc::new(ManagerCore {
                driver,
                target: config.connection_target,
                options: config.driver_options,
                executor,
                inner: Mutex::new(Inner {
                    state: ConnectionState::Disconnected,
                    connection: None,
                    pending: None,
                    generation: 0,
                    lost_on_arrival: None,
                    listeners: ListenerRegistry::new(),
                }),
            }),
        })
    }

    /// Returns the live connection, connecting first if necessary.
    ///
    /// Callers that arrive while an attempt is in flight share that attempt:
    /// the driver is invoked at most once per attempt, and every waiter sees
    /// the same outcome. A failed attempt is not cached, so the next call
    /// starts over. Starting an attempt from inside a connection listener is
    /// refused with [`Error::ReentrantMutation`].
    ///
    /// 返回存活的连接，必要时先进行连接。
    ///
    /// 在尝试进行中到达的调用者共享该尝试：每次尝试最多调用驱动一次，
    /// 所有等待者看到相同的结果。失败的尝试不会被缓存，下一次调用会重新开始。
    /// 在连接监听器内部发起新尝试会被拒绝。
    pub async fn get_connection(&self) -> Result<Arc<D::Connection>> {
        let attempt = {
            let mut inner = self.core.inner.lock();
            match inner.state {
                ConnectionState::Connected => {
                    return inner.connection.clone().ok_or(Error::InvariantViolation(
                        "connected without a stored connection",
                    ));
                }
                ConnectionState::Connecting => match &inner.pending {
                    Some(pending) => {
                        trace!(generation = inner.generation, "Joining in-flight attempt");
                        pending.clone()
                    }
                    None => {
                        return Err(Error::InvariantViolation(
                            "connecting without an in-flight attempt",
                        ));
                    }
                },
                ConnectionState::Disconnected => {
                    if in_notification() {
                        return Err(Error::ReentrantMutation("starting a connection attempt"));
                    }
                    self.core.start_attempt(&mut inner)
                }
            }
        };
        attempt.await
    }

    /// `true` only while the state is `Connected`.
    /// 仅当状态为 `Connected` 时为 `true`。
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.core.inner.lock().state
    }

    /// Registers a listener for every future state transition. It is not
    /// invoked at registration time.
    ///
    /// 为之后的每次状态转换注册监听器。注册时不会调用它。
    pub fn on_connection_changed<F>(&self, listener: F)
    where
        F: Fn() -> std::result::Result<(), ListenerError> + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        self.core.inner.lock().listeners.register(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.core.inner.lock().listeners.len()
    }

    pub fn target(&self) -> &str {
        &self.core.target
    }

    /// Closes the current connection from the caller's side.
    ///
    /// Does nothing unless connected; an in-flight attempt is left to finish.
    /// Listeners are notified before the driver connection is released. A
    /// listener may not call this.
    ///
    /// 从调用方关闭当前连接。
    ///
    /// 仅在已连接时生效；进行中的尝试会继续完成。监听器会在驱动连接释放之前收到通知。
    /// 监听器内部不可调用。
    pub async fn close(&self) -> Result<()> {
        if in_notification() {
            return Err(Error::ReentrantMutation("close"));
        }
        let (connection, listeners) = {
            let mut inner = self.core.inner.lock();
            if inner.state != ConnectionState::Connected {
                return Ok(());
            }
            let connection = inner
                .connection
                .take()
                .ok_or(Error::InvariantViolation("connected without a stored connection"))?;
            inner.state = ConnectionState::Disconnected;
            inner.pending = None;
            (connection, inner.listeners.snapshot())
        };

        info!(endpoint = %self.core.target, "Connection closed by caller");
        let notified = notify_all(&listeners);
        connection.close().await;
        notified.map_err(Error::from)
    }
}

impl<D: Driver> ManagerCore<D> {
    /// Moves to `Connecting` and spawns a new attempt. Must be called with the
    /// lock held and the state `Disconnected`.
    fn start_attempt(
        self: &Arc<Self>,
        inner: &mut Inner<D::Connection>,
    ) -> PendingAttempt<D::Connection> {
        inner.state = ConnectionState::Connecting;
        inner.generation += 1;
        inner.lost_on_arrival = None;
        let generation = inner.generation;
        debug!(endpoint = %self.target, generation, "Starting connection attempt");

        // The attempt runs on its own task so it completes even if every
        // waiter goes away.
        let core = Arc::clone(self);
        let handle = tokio::spawn(async move { core.run_attempt(generation).await });

        let weak: Weak<Self> = Arc::downgrade(self);
        let pending = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    error!(generation, error = %join_err, "Connection attempt task aborted");
                    if let Some(core) = weak.upgrade() {
                        core.abandon_attempt(generation);
                    }
                    Err(Error::InvariantViolation("connection attempt task aborted"))
                }
            }
        }
        .boxed()
        .shared();

        inner.pending = Some(pending.clone());
        pending
    }

    async fn run_attempt(self: &Arc<Self>, generation: u64) -> Result<Arc<D::Connection>> {
        let core: &Self = self;
        let outcome = core
            .executor
            .execute(|| core.driver.connect(&core.target, &core.options))
            .await;

        match outcome {
            Ok(connection) => self.commit_connected(generation, connection),
            Err(source) => {
                self.abandon_attempt(generation);
                Err(Error::RetriesExhausted {
                    attempts: core.executor.policy().total_invocations(),
                    source,
                })
            }
        }
    }

    /// Installs liveness callbacks while still `Connecting`, then commits
    /// `Connected` and notifies. A connection that reports itself dead before
    /// the commit is dropped and no transition is announced.
    ///
    /// 在仍处于 `Connecting` 时安装存活回调，然后提交 `Connected` 并通知。
    /// 在提交前已报告失效的连接会被丢弃，且不会通知任何状态转换。
    fn commit_connected(
        self: &Arc<Self>,
        generation: u64,
        connection: Arc<D::Connection>,
    ) -> Result<Arc<D::Connection>> {
        // Outside the lock: a driver may fire a callback from inside
        // `subscribe` if the connection is already dead.
        self.subscribe_liveness(&connection, generation);

        let listeners = {
            let mut inner = self.inner.lock();
            if inner.generation != generation || inner.state != ConnectionState::Connecting {
                return Err(Error::InvariantViolation(
                    "attempt completed after being superseded",
                ));
            }
            if let Some(event) = inner.lost_on_arrival.take() {
                inner.state = ConnectionState::Disconnected;
                inner.pending = None;
                drop(inner);
                warn!(
                    endpoint = %self.target,
                    ?event,
                    generation,
                    "Connection lost before it was established"
                );
                return Err(Error::Connect(driver_error(LostOnArrival(event))));
            }
            inner.state = ConnectionState::Connected;
            inner.connection = Some(Arc::clone(&connection));
            inner.pending = None;
            inner.listeners.snapshot()
        };
        info!(endpoint = %self.target, generation, "Connection established");

        notify_all(&listeners)?;
        Ok(connection)
    }

    fn abandon_attempt(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation == generation && inner.state == ConnectionState::Connecting {
            inner.state = ConnectionState::Disconnected;
            inner.pending = None;
        }
    }

    fn subscribe_liveness(self: &Arc<Self>, connection: &D::Connection, generation: u64) {
        for event in LivenessEvent::ALL {
            let core = Arc::downgrade(self);
            connection.subscribe(
                event,
                Arc::new(move || {
                    let Some(core) = core.upgrade() else {
                        return;
                    };
                    if let Err(err) = core.handle_disconnect(generation, event) {
                        error!(?event, error = %err, "Disconnect notification failed");
                    }
                }),
            );
        }
    }

    /// Driver-triggered transition to `Disconnected`. Events for a superseded
    /// connection, or repeats for the current one, are ignored. An event that
    /// arrives before the commit is recorded so the commit can refuse it.
    ///
    /// 由驱动触发的向 `Disconnected` 的转换。已被取代的连接的事件或当前连接的重复事件会被忽略。
    /// 在提交之前到达的事件会被记录，以便提交时拒绝该连接。
    fn handle_disconnect(&self, generation: u64, event: LivenessEvent) -> Result<()> {
        let listeners = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                trace!(?event, generation, "Ignoring stale liveness event");
                return Ok(());
            }
            match inner.state {
                ConnectionState::Connected => {}
                ConnectionState::Connecting => {
                    trace!(?event, generation, "Liveness event before commit");
                    inner.lost_on_arrival.get_or_insert(event);
                    return Ok(());
                }
                ConnectionState::Disconnected => {
                    trace!(?event, generation, "Ignoring repeated liveness event");
                    return Ok(());
                }
            }
            inner.state = ConnectionState::Disconnected;
            inner.connection = None;
            inner.pending = None;
            inner.listeners.snapshot()
        };
        info!(endpoint = %self.target, ?event, generation, "Connection lost");

        notify_all(&listeners).map_err(Error::from)
    }
}
