//! The terminal session bridge: one browser connection ↔ one remote shell.

mod establish;
mod lifecycle;
mod multiplex;
mod session;

pub use establish::{AcceptAnyHostKey, HostKeyVerifier, PinnedFingerprints};

use establish::SessionEstablisher;
use seashell_core::{BridgeError, BridgeResult, CredentialResolver, FrameTransport, SessionDescriptor};
use std::sync::Arc;
use std::time::Duration;

/// Tunables for session establishment.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub connect_timeout: Duration,
    pub term: String,
    /// Initial PTY geometry; the browser sends a resize immediately after
    /// connecting, so this only matters for the first prompt.
    pub default_cols: u32,
    pub default_rows: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            term: "xterm-256color".to_string(),
            default_cols: 80,
            default_rows: 40,
        }
    }
}

/// Entry point for running terminal sessions.
pub struct TerminalBridge {
    establisher: SessionEstablisher,
}

impl TerminalBridge {
    pub fn new(
        resolver: Arc<dyn CredentialResolver>,
        host_keys: Arc<dyn HostKeyVerifier>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            establisher: SessionEstablisher::new(resolver, host_keys, config),
        }
    }

    /// Run one session over an accepted transport.
    ///
    /// Establishment failures are reported to the peer before the transport
    /// closes; streaming failures close the transport directly.
    pub async fn run(
        &self,
        transport: Arc<dyn FrameTransport>,
        descriptor: SessionDescriptor,
    ) -> BridgeResult<()> {
        let session = match self.establisher.establish(&descriptor).await {
            Ok(session) => session,
            Err(e) => {
                report_fatal(transport.as_ref(), &e).await;
                return Err(e);
            }
        };
        multiplex::run(session, transport).await
    }
}

/// Send a red error line to the terminal, then close.
///
/// Best effort; the peer may already be gone.
pub(crate) async fn report_fatal(transport: &dyn FrameTransport, error: &BridgeError) {
    let message = format!("\x1b[31mError: {error}\r\n\x1b[0m");
    let _ = transport.send_text(&message).await;
    transport.close().await;
}
