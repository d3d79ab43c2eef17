//! Traits for abstracting over the driver that performs the real handshake.
//!
//! The manager never talks to the network itself. It asks a [`Driver`] for a
//! connection and listens to the liveness events that connection emits.
//!
//! 对执行实际握手的驱动进行抽象的 trait。
//!
//! 管理器本身从不直接访问网络。它向 [`Driver`] 请求连接，并监听该连接发出的存活事件。

use async_trait::async_trait;
use std::sync::Arc;

/// An error produced by a driver. Shared so that one failed attempt can be
/// reported to every waiting caller.
///
/// 驱动产生的错误。使用共享指针，以便一次失败的尝试可以报告给所有等待的调用者。
pub type DriverError = Arc<dyn std::error::Error + Send + Sync>;

/// Wraps any error into a [`DriverError`].
/// 将任意错误包装为 [`DriverError`]。
pub fn driver_error<E>(err: E) -> DriverError
where
    E: std::error::Error + Send + Sync + 'static,
{
    Arc::new(err)
}

/// A signal from a live connection that it can no longer be used.
///
/// 来自存活连接的信号，表示该连接已不可再用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LivenessEvent {
    /// The connection was closed locally or by the transport.
    /// 连接被本地或传输层关闭。
    Closed,
    /// The connection reported an unrecoverable error.
    /// 连接报告了不可恢复的错误。
    Error,
    /// The remote service closed the connection.
    /// 远端服务关闭了连接。
    ServerClosed,
}

impl LivenessEvent {
    /// Every event the manager subscribes to.
    /// 管理器订阅的所有事件。
    pub const ALL: [LivenessEvent; 3] = [
        LivenessEvent::Closed,
        LivenessEvent::Error,
        LivenessEvent::ServerClosed,
    ];
}

/// Callback invoked by a connection when a subscribed event fires.
/// 订阅的事件触发时由连接调用的回调。
pub type EventCallback = Arc<dyn Fn() + Send + Sync>;

/// A connection handed out by a [`Driver`].
///
/// 由 [`Driver`] 提供的连接。
#[async_trait]
pub trait DriverConnection: Send + Sync + 'static {
    /// Registers `callback` to run whenever `event` fires on this connection.
    /// The callback may be invoked from any thread, including from inside
    /// this call if the connection is already dead.
    ///
    /// 注册 `callback`，在该连接上触发 `event` 时运行。回调可能在任意线程上被调用，
    /// 若连接已失效，也可能在本次调用内部被调用。
    fn subscribe(&self, event: LivenessEvent, callback: EventCallback);

    /// Releases the connection. Best effort; errors are the driver's concern.
    /// 释放连接。尽力而为，错误由驱动自行处理。
    async fn close(&self) {}
}

/// The transport/driver collaborator.
///
/// `Options` is opaque to the manager and passed through unmodified on every
/// connect call.
///
/// 传输/驱动协作方。
///
/// `Options` 对管理器是不透明的，每次连接调用时原样传递。
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// The connection type this driver produces.
    type Connection: DriverConnection;

    /// Driver-specific options.
    type Options: Clone + Send + Sync + 'static;

    /// Performs one connect attempt against `target`.
    /// 对 `target` 执行一次连接尝试。
    async fn connect(
        &self,
        target: &str,
        options: &Self::Options,
    ) -> std::result::Result<Arc<Self::Connection>, DriverError>;
}
