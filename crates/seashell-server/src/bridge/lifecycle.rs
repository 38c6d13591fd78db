//! Session lifecycle coordination.
//!
//! The three pumps run concurrently and each reports exactly one outcome.
//! The first outcome, clean or not, ends the session: teardown closes the
//! remote session and the transport exactly once, which in turn unblocks the
//! remaining pumps.

use crate::bridge::session::SessionControl;
use seashell_core::{BridgeResult, FrameTransport, PumpKind};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

/// Terminal report from one pump.
pub struct PumpOutcome {
    pub pump: PumpKind,
    pub result: BridgeResult<()>,
}

/// Closes the session and transport exactly once.
pub struct Teardown {
    inner: Mutex<Option<(Arc<dyn SessionControl>, Arc<dyn FrameTransport>)>>,
}

impl Teardown {
    pub fn new(control: Arc<dyn SessionControl>, transport: Arc<dyn FrameTransport>) -> Self {
        Self {
            inner: Mutex::new(Some((control, transport))),
        }
    }

    /// Close both sides. Later calls are no-ops.
    pub async fn fire(&self) {
        let taken = self.inner.lock().await.take();
        if let Some((control, transport)) = taken {
            control.close().await;
            transport.close().await;
        }
    }
}

/// Wait for the first pump outcome, tear the session down, and report it.
pub async fn supervise(
    mut outcomes: mpsc::Receiver<PumpOutcome>,
    control: Arc<dyn SessionControl>,
    transport: Arc<dyn FrameTransport>,
) -> BridgeResult<()> {
    let teardown = Teardown::new(control, transport);
    let first = outcomes.recv().await;
    teardown.fire().await;

    match first {
        Some(outcome) => {
            match &outcome.result {
                Ok(()) => info!(pump = %outcome.pump, "session ended"),
                Err(e) => warn!(pump = %outcome.pump, error = %e, "session failed"),
            }
            outcome.result
        }
        // All pump handles dropped without reporting; treat as a clean end.
        None => Ok(()),
    }
}
