//! 定义了连接管理器的可配置参数。
//! Defines configurable parameters for the connection manager.

use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::retry::RetryPolicy;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A structure containing all configurable parameters for a manager.
///
/// `O` is the driver's option type. It is opaque here and handed to the
/// driver unmodified.
///
/// 包含管理器所有可配置参数的结构体。
///
/// `O` 是驱动的选项类型，在此处是不透明的，并原样交给驱动。
#[derive(Clone)]
pub struct Config<O> {
    /// The address or descriptor of the remote service. Must not be empty.
    /// 远端服务的地址或描述符。不能为空。
    pub connection_target: String,

    /// Options passed through to every driver connect call.
    /// 传递给每次驱动连接调用的选项。
    pub driver_options: O,

    /// Retry-related parameters.
    /// 重试相关参数。
    pub retry: RetryConfig,

    /// Optional logging side-channel. `None` means no-op.
    /// 可选的日志旁路。`None` 表示不做任何事。
    pub logger: Option<Arc<dyn Logger>>,
}

/// Retry-related parameters.
///
/// 重试相关参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// The number of retries after the initial attempt. Zero means a single
    /// attempt with no retry.
    /// 首次尝试之后的重试次数。零表示只尝试一次，不重试。
    pub attempts: u32,
    /// The delay before the first retry. Doubles on each subsequent retry.
    /// 第一次重试前的延迟。之后每次重试翻倍。
    pub interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_millis(1000),
        }
    }
}

impl RetryConfig {
    /// Freezes these parameters into the policy used for connect attempts.
    /// 将这些参数固化为连接尝试所使用的策略。
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, self.interval)
    }
}

impl<O> Config<O> {
    /// Creates a configuration with default retry parameters and no logger.
    /// 使用默认重试参数、无日志器创建配置。
    pub fn new(connection_target: impl Into<String>, driver_options: O) -> Self {
        Self {
            connection_target: connection_target.into(),
            driver_options,
            retry: RetryConfig::default(),
            logger: None,
        }
    }

    pub fn with_retry(mut self, attempts: u32, interval: Duration) -> Self {
        self.retry = RetryConfig { attempts, interval };
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Checks the configuration before a manager is built from it.
    /// 在据此构建管理器之前检查配置。
    pub fn validate(&self) -> Result<()> {
        if self.connection_target.trim().is_empty() {
            return Err(Error::Configuration(
                "connection target must not be empty".into(),
            ));
        }
        Ok(())
    }
}

impl<O: fmt::Debug> fmt::Debug for Config<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("connection_target", &self.connection_target)
            .field("driver_options", &self.driver_options)
            .field("retry", &self.retry)
            .field("logger", &self.logger.as_ref().map(|_| "<logger>"))
            .finish()
    }
}
