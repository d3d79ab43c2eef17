//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use crate::driver::DriverError;
use crate::manager::listeners::AggregateFailure;
use thiserror::Error;

/// The primary error type for the connection lifecycle library.
///
/// The type is `Clone` so that the single outcome of a shared connection
/// attempt can be handed to every caller waiting on it.
///
/// 连接生命周期库的主要错误类型。
///
/// 该类型实现了 `Clone`，以便共享连接尝试的唯一结果可以交给每个等待它的调用者。
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The manager configuration is invalid, e.g. an empty connection target.
    /// 管理器配置无效，例如连接目标为空。
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The driver produced a connection, but it reported itself dead before
    /// the manager could commit it. No transition is announced and the next
    /// call starts a fresh attempt.
    ///
    /// 驱动返回了连接，但在管理器提交之前该连接已报告失效。
    /// 不会通知任何状态转换，下一次调用会开始新的尝试。
    #[error("connect attempt failed: {0}")]
    Connect(#[source] DriverError),

    /// Every attempt allowed by the retry policy failed. `source` is the error
    /// raised by the final attempt, unchanged.
    ///
    /// 重试策略允许的所有尝试均已失败。`source` 是最后一次尝试产生的原始错误。
    #[error("connection failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Total number of driver invocations, initial attempt included.
        /// 驱动调用的总次数，包含首次尝试。
        attempts: u32,
        /// The final driver error.
        /// 最后一次的驱动错误。
        #[source]
        source: DriverError,
    },

    /// One or more listeners failed while a state transition was being
    /// announced. The transition itself has already been committed.
    ///
    /// 在通知状态转换时一个或多个监听器失败。状态转换本身已经提交。
    #[error(transparent)]
    ListenerFailures(#[from] AggregateFailure),

    /// A connection listener tried to change the connection state while a
    /// transition was being announced.
    ///
    /// 连接监听器在状态转换通知期间试图修改连接状态。
    #[error("{0} is not allowed from inside a connection listener")]
    ReentrantMutation(&'static str),

    /// Internal bookkeeping reached a state that should be impossible.
    /// 内部记录到达了不应出现的状态。
    #[error("invariant violated: {0}")]
    InvariantViolation(&'static str),
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns `true` if this error came out of the connect path, i.e. the
    /// driver could not produce a connection.
    ///
    /// 如果该错误来自连接路径（即驱动无法建立连接），返回 `true`。
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Error::Connect(_) | Error::RetriesExhausted { .. })
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        match err {
            Error::Configuration(msg) => std::io::Error::new(ErrorKind::InvalidInput, msg),
            Error::Connect(e) => std::io::Error::new(ErrorKind::ConnectionRefused, e),
            e @ Error::RetriesExhausted { .. } => std::io::Error::new(ErrorKind::NotConnected, e),
            Error::ListenerFailures(e) => std::io::Error::other(e),
            e @ Error::ReentrantMutation(_) => std::io::Error::new(ErrorKind::WouldBlock, e),
            Error::InvariantViolation(msg) => std::io::Error::other(msg),
        }
    }
}
