//! An optional, injected logging side-channel.
//!
//! All internal events are emitted through `tracing`. A [`Logger`] receives
//! the retry messages as well, for callers that want them routed elsewhere.
//! A logger can never influence control flow: its methods return nothing and
//! a panic inside one is swallowed.
//!
//! 可选的、注入式日志旁路。
//!
//! 所有内部事件都通过 `tracing` 发出。[`Logger`] 额外接收重试消息，
//! 供希望将其转发到别处的调用者使用。日志器永远不会影响控制流。

use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::trace;

/// A fire-and-forget message sink.
/// 发出即忘的消息接收端。
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// The default logger. Drops everything.
/// 默认日志器，丢弃所有消息。
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Level {
    Info,
    Warn,
    Error,
}

/// Delivers `message` to `logger`, isolating any panic it raises.
pub(crate) fn emit(logger: &dyn Logger, level: Level, message: &str) {
    let delivered = catch_unwind(AssertUnwindSafe(|| match level {
        Level::Info => logger.info(message),
        Level::Warn => logger.warn(message),
        Level::Error => logger.error(message),
    }));
    if delivered.is_err() {
        trace!(?level, "Injected logger panicked, message dropped");
    }
}
