use thiserror::Error;

/// Which pump detected a mid-streaming failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpKind {
    /// Remote stdout → transport.
    Output,
    /// Remote stderr → transport.
    Diagnostic,
    /// Transport → remote stdin (and resize commands).
    Input,
}

impl std::fmt::Display for PumpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PumpKind::Output => f.write_str("output"),
            PumpKind::Diagnostic => f.write_str("diagnostic"),
            PumpKind::Input => f.write_str("input"),
        }
    }
}

/// Errors produced by the credential resolver collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("connection profile not found")]
    NotFound,

    #[error("credential decryption failed")]
    DecryptionFailed,
}

/// Errors produced by the terminal session bridge.
///
/// Everything except [`BridgeError::StreamIo`] is terminal and occurs before
/// streaming starts; `StreamIo` is the first fatal pump error recorded by the
/// lifecycle coordinator.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("credential resolution failed: {0}")]
    CredentialResolutionFailed(#[from] CredentialError),

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("no authentication credentials provided")]
    NoCredentialsProvided,

    #[error("remote connection failed: {0}")]
    RemoteConnectFailed(String),

    #[error("pty negotiation failed: {0}")]
    PtyNegotiationFailed(String),

    #[error("shell start failed: {0}")]
    ShellStartFailed(String),

    #[error("{pump} pump failed: {detail}")]
    StreamIo { pump: PumpKind, detail: String },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Codec(e.to_string())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
