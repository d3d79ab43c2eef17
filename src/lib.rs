#![deny(clippy::expect_used, clippy::unwrap_used)]

//! Lifecycle management for a single logical connection to a remote service.
//! 管理到远端服务的单个逻辑连接的生命周期。
//!
//! A [`manager::ConnectionManager`] connects lazily through a pluggable
//! [`driver::Driver`], retries transient failures with exponential backoff and
//! jitter, shares one in-flight attempt among concurrent callers, and tells
//! registered listeners whenever the connection comes up or goes away.

pub mod config;
pub mod driver;
pub mod error;
pub mod logger;
pub mod manager;
pub mod retry;

#[cfg(test)]
mod test_utils;

pub use config::{Config, RetryConfig};
pub use error::{Error, Result};
pub use manager::{ConnectionManager, state::ConnectionState};
