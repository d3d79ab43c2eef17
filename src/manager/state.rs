//! Defines the connection state tracked by the manager.
//!
//! 定义管理器跟踪的连接状态。

use std::fmt;

/// The state of the managed connection.
/// 被管理连接的状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    /// 没有连接，也没有进行中的尝试。
    #[default]
    Disconnected,
    /// A connect-and-retry sequence is in flight.
    /// 连接与重试序列正在进行中。
    Connecting,
    /// The last attempt succeeded and no liveness loss has been observed since.
    /// 最近一次尝试成功，且此后未观察到存活丢失。
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}
