//! tests/common/harness.rs
use async_trait::async_trait;
use lifeline::{
    config::Config,
    driver::{Driver, DriverConnection, DriverError, EventCallback, LivenessEvent, driver_error},
    logger::Logger,
    manager::ConnectionManager,
};
use std::collections::VecDeque;
use std::sync::{
    Arc, Mutex, Once,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "lifeline=debug,lifecycle=info".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Refused(pub String);

/// A connection to the fake service. Tests pull the plug with `drop_link`.
#[derive(Default)]
pub struct FakeLink {
    callbacks: Mutex<Vec<(LivenessEvent, EventCallback)>>,
}

impl std::fmt::Debug for FakeLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeLink").finish_non_exhaustive()
    }
}

impl FakeLink {
    pub fn drop_link(&self, event: LivenessEvent) {
        let callbacks: Vec<EventCallback> = self
            .callbacks
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback();
        }
    }
}

#[async_trait]
impl DriverConnection for FakeLink {
    fn subscribe(&self, event: LivenessEvent, callback: EventCallback) {
        self.callbacks.lock().unwrap().push((event, callback));
    }
}

/// A driver that replays a script of outcomes, `true` meaning success.
/// Once the script runs out every call succeeds.
#[derive(Clone, Default)]
pub struct ScriptedDriver {
    script: Arc<Mutex<VecDeque<bool>>>,
    calls: Arc<AtomicUsize>,
    latency: Duration,
}

impl ScriptedDriver {
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Every call succeeds.
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    type Connection = FakeLink;
    type Options = ();

    async fn connect(&self, _target: &str, _options: &()) -> Result<Arc<FakeLink>, DriverError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.latency).await;
        let succeed = self.script.lock().unwrap().pop_front().unwrap_or(true);
        if succeed {
            Ok(Arc::new(FakeLink::default()))
        } else {
            Err(driver_error(Refused(format!("attempt {n} refused"))))
        }
    }
}

/// Collects every message sent to the injected logger.
#[derive(Default)]
pub struct MemoryLogger {
    pub lines: Mutex<Vec<String>>,
}

impl MemoryLogger {
    pub fn count(&self, level: &str) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.starts_with(level))
            .count()
    }
}

impl Logger for MemoryLogger {
    fn info(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("INFO {message}"));
    }
    fn warn(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("WARN {message}"));
    }
    fn error(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("ERROR {message}"));
    }
}

/// Builds a manager against `driver` with a short retry interval.
pub fn manager_for(
    driver: &ScriptedDriver,
    attempts: u32,
    logger: Option<Arc<MemoryLogger>>,
) -> ConnectionManager<ScriptedDriver> {
    init_tracing();
    let mut config = Config::new("mongodb://primary.test:27017", ())
        .with_retry(attempts, Duration::from_millis(250));
    if let Some(logger) = logger {
        let logger: Arc<dyn Logger> = logger;
        config = config.with_logger(logger);
    }
    ConnectionManager::new(driver.clone(), config).unwrap()
}
