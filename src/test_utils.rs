//! Common testing infrastructure: a scripted in-memory driver and a
//! counting logger.

use crate::{
    driver::{Driver, DriverConnection, DriverError, EventCallback, LivenessEvent, driver_error},
    logger::Logger,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    sync::{
        Arc, Once,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};
use thiserror::Error;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "lifeline=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

// --- Mock Driver Infrastructure ---

#[derive(Debug, Error)]
#[error("{0}")]
pub struct MockError(pub String);

/// A connection whose liveness events are fired by the test.
pub struct MockConnection {
    pub id: u32,
    callbacks: Mutex<Vec<(LivenessEvent, EventCallback)>>,
    closed: AtomicBool,
    /// Fired from inside `subscribe`, as a transport that is already gone would.
    dead_on_arrival: Option<LivenessEvent>,
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl MockConnection {
    fn new(id: u32, dead_on_arrival: Option<LivenessEvent>) -> Self {
        Self {
            id,
            callbacks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            dead_on_arrival,
        }
    }

    /// Fires `event`, running every callback subscribed to it.
    pub fn emit(&self, event: LivenessEvent) {
        // Collect first so callbacks run without the lock held.
        let callbacks: Vec<EventCallback> = self
            .callbacks
            .lock()
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback();
        }
    }

    pub fn subscriptions(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriverConnection for MockConnection {
    fn subscribe(&self, event: LivenessEvent, callback: EventCallback) {
        self.callbacks.lock().push((event, callback.clone()));
        if self.dead_on_arrival == Some(event) {
            callback();
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // A real transport reports its own close as well.
        self.emit(LivenessEvent::Closed);
    }
}

#[derive(Default)]
struct MockDriverState {
    calls: AtomicU32,
    /// Remaining scripted failures. `u32::MAX` fails forever.
    failures: Mutex<u32>,
    connect_delay: Mutex<Duration>,
    dead_on_arrival: Mutex<Option<LivenessEvent>>,
    connections: Mutex<Vec<Arc<MockConnection>>>,
    seen: Mutex<Vec<(String, String)>>,
}

/// A driver that fails a scripted number of times before succeeding.
/// Clones share state, so a test can keep one while the manager owns another.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<MockDriverState>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `failures` connect calls.
    pub fn failing(failures: u32) -> Self {
        let driver = Self::new();
        driver.set_failures(failures);
        driver
    }

    pub fn always_failing() -> Self {
        Self::failing(u32::MAX)
    }

    /// Every connect call suspends for `delay` before resolving.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.state.connect_delay.lock() = delay;
        self
    }

    /// New connections fire `event` while the manager subscribes to it.
    /// `None` restores healthy connections.
    pub fn set_dead_on_arrival(&self, event: Option<LivenessEvent>) {
        *self.state.dead_on_arrival.lock() = event;
    }

    pub fn set_failures(&self, failures: u32) {
        *self.state.failures.lock() = failures;
    }

    pub fn calls(&self) -> u32 {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.state.connections.lock().clone()
    }

    /// `(target, options)` pairs received so far.
    pub fn seen(&self) -> Vec<(String, String)> {
        self.state.seen.lock().clone()
    }
}

#[async_trait]
impl Driver for MockDriver {
    type Connection = MockConnection;
    type Options = String;

    async fn connect(
        &self,
        target: &str,
        options: &String,
    ) -> std::result::Result<Arc<MockConnection>, DriverError> {
        let n = self.state.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .seen
            .lock()
            .push((target.to_string(), options.clone()));

        let delay = *self.state.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.state.failures.lock();
            if *failures > 0 {
                if *failures != u32::MAX {
                    *failures -= 1;
                }
                return Err(driver_error(MockError(format!("connect #{n} refused"))));
            }
        }

        let dead_on_arrival = *self.state.dead_on_arrival.lock();
        let connection = Arc::new(MockConnection::new(n, dead_on_arrival));
        self.state.connections.lock().push(connection.clone());
        Ok(connection)
    }
}

/// A logger that counts messages per level and keeps the info lines.
#[derive(Default)]
pub struct CountingLogger {
    infos: AtomicU32,
    warns: AtomicU32,
    errors: AtomicU32,
    info_lines: Mutex<Vec<String>>,
}

impl CountingLogger {
    pub fn info_lines(&self) -> Vec<String> {
        self.info_lines.lock().clone()
    }

    pub fn infos(&self) -> u32 {
        self.infos.load(Ordering::SeqCst)
    }

    pub fn warns(&self) -> u32 {
        self.warns.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> u32 {
        self.errors.load(Ordering::SeqCst)
    }
}

impl Logger for CountingLogger {
    fn info(&self, message: &str) {
        self.infos.fetch_add(1, Ordering::SeqCst);
        self.info_lines.lock().push(message.to_string());
    }
    fn warn(&self, _message: &str) {
        self.warns.fetch_add(1, Ordering::SeqCst);
    }
    fn error(&self, _message: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}
