//! seashell-core: Shared protocol library for seashell.
//!
//! Provides the browser control-frame codec, the bridge error taxonomy,
//! the collaborator contracts (identity verifier, credential resolver),
//! and the abstract frame transport the bridge multiplexes over.

pub mod contract;
pub mod control;
pub mod error;
pub mod transport;

// Re-export commonly used items at crate root.
pub use contract::{AuthSecret, CredentialResolver, CredentialSet, IdentityVerifier, SessionDescriptor, UserId};
pub use control::ControlFrame;
pub use error::{BridgeError, BridgeResult, CredentialError, PumpKind};
pub use transport::FrameTransport;
