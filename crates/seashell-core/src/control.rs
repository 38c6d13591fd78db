//! Inbound control-frame codec.
//!
//! Browsers send either a structured JSON control message
//! (`{"type":"input","data":"..."}` or `{"type":"resize","rows":N,"cols":N}`)
//! or raw bytes. Decoding is total: every byte sequence yields exactly one
//! [`ControlFrame`], falling back to raw input when the structured parse
//! does not produce a recognized variant.

use crate::error::BridgeResult;
use serde::{Deserialize, Serialize};

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    /// Bytes to write to the remote session's input sink verbatim.
    Input { data: Vec<u8> },
    /// New terminal geometry to propagate to the remote session.
    Resize { rows: u32, cols: u32 },
}

/// The structured wire form. Tagged on `type`; unknown tags and malformed
/// payloads fail the parse and take the raw-input fallback.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireControl {
    Input { data: String },
    Resize { rows: u32, cols: u32 },
}

/// Decode one inbound frame. Pure and total — never fails.
pub fn decode(raw: &[u8]) -> ControlFrame {
    match serde_json::from_slice::<WireControl>(raw) {
        Ok(WireControl::Input { data }) => ControlFrame::Input {
            data: data.into_bytes(),
        },
        Ok(WireControl::Resize { rows, cols }) => ControlFrame::Resize { rows, cols },
        Err(_) => ControlFrame::Input { data: raw.to_vec() },
    }
}

/// Encode the structured input form (used by tests and native clients).
pub fn encode_input(data: &str) -> BridgeResult<Vec<u8>> {
    let frame = serde_json::to_vec(&WireControl::Input {
        data: data.to_string(),
    })?;
    Ok(frame)
}

/// Encode the structured resize form.
pub fn encode_resize(rows: u32, cols: u32) -> BridgeResult<Vec<u8>> {
    let frame = serde_json::to_vec(&WireControl::Resize { rows, cols })?;
    Ok(frame)
}
