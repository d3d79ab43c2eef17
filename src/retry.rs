//! Policy-driven retry of a fallible asynchronous action.
//!
//! The executor runs the action once immediately. Each failure while retries
//! remain is followed by a non-blocking backoff sleep of
//! `base * 2^(k-1) * (1 + 0.5 * u)` for the k-th retry, `u` uniform in `[0, 1)`.
//! When no retries remain the last error is returned unchanged.
//!
//! 基于策略的可失败异步操作重试。
//!
//! 执行器立即运行一次操作。在仍有剩余重试次数时，每次失败之后都会进行非阻塞的退避等待：
//! 第 k 次重试前等待 `base * 2^(k-1) * (1 + 0.5 * u)`，其中 `u` 在 `[0, 1)` 内均匀分布。
//! 重试次数用尽时，原样返回最后一个错误。

use crate::logger::{Level, Logger, NoopLogger, emit};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Growth factor applied to the delay after every retry.
/// 每次重试后延迟的增长因子。
pub const BACKOFF_MULTIPLIER: u32 = 2;

/// Upper bound of the random jitter, as a fraction of the nominal delay.
/// 随机抖动的上界，以名义延迟的比例表示。
pub const JITTER_RATIO: f64 = 0.5;

/// Immutable retry parameters for one sequence of attempts.
///
/// 一组尝试所使用的不可变重试参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(1000))
    }
}

impl RetryPolicy {
    /// `max_attempts` counts retries after the first attempt.
    /// `max_attempts` 表示首次尝试之后的重试次数。
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Number of times the action runs before the caller sees a failure.
    /// 调用者看到失败之前操作运行的次数。
    pub fn total_invocations(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }

    /// The un-jittered delay before the `retry`-th retry (1-based).
    /// 第 `retry` 次重试（从 1 开始）之前未加抖动的延迟。
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let factor = BACKOFF_MULTIPLIER.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// The delay before the `retry`-th retry given a jitter sample in `[0, 1)`.
    ///
    /// The result lies in `[nominal, 1.5 * nominal)`. Samples outside the
    /// range are clamped; a non-finite sample means no jitter.
    ///
    /// 给定 `[0, 1)` 内的抖动样本，计算第 `retry` 次重试之前的延迟。
    /// 结果位于 `[nominal, 1.5 * nominal)` 区间内。
    pub fn delay_for(&self, retry: u32, sample: f64) -> Duration {
        let nominal = self.nominal_delay(retry);
        let sample = if sample.is_finite() {
            sample.clamp(0.0, 1.0)
        } else {
            0.0
        };
        nominal.saturating_add(nominal.mul_f64(JITTER_RATIO * sample))
    }
}

/// Runs an action until it succeeds or the policy is exhausted.
///
/// The executor keeps no state between calls; every `execute` builds its own
/// attempt and delay chain.
///
/// 运行一个操作，直到成功或策略耗尽。
///
/// 执行器在调用之间不保存任何状态；每次 `execute` 都会构建自己的尝试和延迟链。
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    logger: Arc<dyn Logger>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .finish()
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            logger: Arc::new(NoopLogger),
        }
    }

    /// Forwards retry messages to `logger` in addition to `tracing`.
    /// 除 `tracing` 外，还将重试消息转发给 `logger`。
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invokes `action` until it returns `Ok`, or returns the error of the
    /// final permitted attempt.
    ///
    /// A started attempt always runs to completion; there is no timeout.
    ///
    /// 调用 `action` 直到其返回 `Ok`，否则返回最后一次允许尝试的错误。
    /// 已开始的尝试总会运行到结束；没有超时。
    pub async fn execute<T, E, F, Fut>(&self, mut action: F) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        let mut remaining = self.policy.max_attempts;
        let mut retry = 0u32;

        loop {
            let attempt = retry + 1;
            let err = match action().await {
                Ok(value) => {
                    if retry > 0 {
                        debug!(attempt, "Attempt succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            warn!(attempt, remaining, error = %err, "Attempt failed");
            emit(
                &*self.logger,
                Level::Warn,
                &format!("attempt {attempt} failed: {err}"),
            );

            if remaining == 0 {
                error!(attempts = attempt, error = %err, "Retries exhausted");
                emit(
                    &*self.logger,
                    Level::Error,
                    &format!("giving up after {attempt} attempts: {err}"),
                );
                return Err(err);
            }

            retry += 1;
            remaining -= 1;
            let delay = self.policy.delay_for(retry, rand::random::<f64>());
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            info!(delay_ms, retry, remaining, "Retrying after backoff");
            emit(
                &*self.logger,
                Level::Info,
                &format!("retry {retry} in {delay_ms}ms ({remaining} retries left after it)"),
            );

            tokio::time::sleep(delay).await;
        }
    }
}
