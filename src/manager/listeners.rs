//! Connection-change listeners and failure aggregation.
//!
//! Every registered listener runs exactly once per transition, in
//! registration order. A listener that returns an error or panics does not
//! stop the pass; its failure is collected and reported afterwards as one
//! [`AggregateFailure`].
//!
//! 连接变化监听器与失败聚合。
//!
//! 每次状态转换时，每个已注册的监听器都按注册顺序恰好运行一次。
//! 返回错误或发生 panic 的监听器不会中断本轮通知；其失败会被收集，
//! 并在之后作为一个 [`AggregateFailure`] 报告。

use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use thiserror::Error;
use tracing::{trace, warn};

/// The error a listener may return.
/// 监听器可以返回的错误。
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// A no-argument callback invoked on every connection state transition.
/// 每次连接状态转换时调用的无参回调。
pub type Listener = Arc<dyn Fn() -> std::result::Result<(), ListenerError> + Send + Sync>;

/// The message carried by every [`AggregateFailure`].
pub const AGGREGATE_FAILURE_MESSAGE: &str = "one or more connection listeners failed";

/// All listener failures from a single notification pass.
///
/// Never constructed for zero failures.
///
/// 单轮通知中所有监听器的失败。
///
/// 零个失败时绝不会构造。
#[derive(Debug, Clone, Error)]
#[error("{message} ({} failed)", .causes.len())]
pub struct AggregateFailure {
    message: &'static str,
    causes: Vec<Arc<dyn std::error::Error + Send + Sync>>,
}

impl AggregateFailure {
    fn from_causes(causes: Vec<Arc<dyn std::error::Error + Send + Sync>>) -> Option<Self> {
        if causes.is_empty() {
            return None;
        }
        Some(Self {
            message: AGGREGATE_FAILURE_MESSAGE,
            causes,
        })
    }

    pub fn message(&self) -> &str {
        self.message
    }

    /// The collected errors, in the order the failing listeners ran.
    /// 收集到的错误，按失败监听器的运行顺序排列。
    pub fn causes(&self) -> &[Arc<dyn std::error::Error + Send + Sync>] {
        &self.causes
    }
}

/// Stand-in cause for a listener that panicked instead of returning.
#[derive(Debug, Error)]
#[error("listener panicked: {0}")]
struct ListenerPanic(String);

impl ListenerPanic {
    fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self(message)
    }
}

/// The ordered set of registered listeners.
///
/// 已注册监听器的有序集合。
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<Listener>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners_count", &self.listeners.len())
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener. The same closure may be registered more than once.
    /// 追加一个监听器。同一个闭包可以注册多次。
    pub fn register(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// A copy of the current listener list, so a pass can run without
    /// holding whatever lock guards the registry.
    ///
    /// 当前监听器列表的副本，以便通知时无需持有保护注册表的锁。
    pub fn snapshot(&self) -> Vec<Listener> {
        self.listeners.clone()
    }

    pub fn notify(&self) -> std::result::Result<(), AggregateFailure> {
        notify_all(&self.listeners)
    }
}

thread_local!(static NOTIFY_DEPTH: Cell<u32> = const { Cell::new(0) });

/// Marks the current thread as running listeners until dropped.
struct NotifyScope;

impl NotifyScope {
    fn enter() -> Self {
        NOTIFY_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for NotifyScope {
    fn drop(&mut self) {
        NOTIFY_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// `true` while the current thread is inside a listener pass.
///
/// Listeners are synchronous, so a call made from inside one always runs on
/// the thread that is notifying.
///
/// 当前线程正处于监听器通知过程中时为 `true`。
pub fn in_notification() -> bool {
    NOTIFY_DEPTH.with(|depth| depth.get() > 0)
}

/// Runs every listener once, in order, and aggregates the failures.
///
/// 按顺序运行每个监听器一次，并聚合失败。
pub fn notify_all(listeners: &[Listener]) -> std::result::Result<(), AggregateFailure> {
    let _scope = NotifyScope::enter();
    let mut causes: Vec<Arc<dyn std::error::Error + Send + Sync>> = Vec::new();

    for (index, listener) in listeners.iter().enumerate() {
        match catch_unwind(AssertUnwindSafe(|| listener())) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(index, error = %err, "Connection listener failed");
                causes.push(Arc::from(err));
            }
            Err(payload) => {
                let panic = ListenerPanic::from_payload(payload);
                warn!(index, error = %panic, "Connection listener panicked");
                causes.push(Arc::new(panic));
            }
        }
    }

    trace!(
        listeners = listeners.len(),
        failed = causes.len(),
        "Listener pass complete"
    );

    match AggregateFailure::from_causes(causes) {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}
