//! Abstract frame transport for the bridge.
//!
//! The WebSocket implementation lives in the server crate; tests use an
//! in-memory channel implementation.

use crate::error::BridgeResult;
use async_trait::async_trait;

/// One long-lived message-based connection carrying a terminal session.
///
/// Outbound frames are raw remote-process bytes with no envelope; inbound
/// frames are decoded by [`crate::control::decode`]. Handles are shared
/// between pumps, so all methods take `&self`.
#[async_trait]
pub trait FrameTransport: Send + Sync {
    /// Send one binary frame carrying raw remote output.
    async fn send(&self, frame: Vec<u8>) -> BridgeResult<()>;

    /// Receive the next inbound frame. `Ok(None)` means the peer closed cleanly.
    async fn recv(&self) -> BridgeResult<Option<Vec<u8>>>;

    /// Send one human-readable diagnostic text frame.
    ///
    /// Used only to report terminal errors before streaming starts.
    async fn send_text(&self, message: &str) -> BridgeResult<()>;

    /// Close the transport. Idempotent; safe to invoke concurrently with an
    /// in-flight send or recv (the in-flight operation fails).
    async fn close(&self);
}
