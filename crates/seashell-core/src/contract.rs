//! Collaborator contracts consumed by the bridge.
//!
//! The identity verifier and credential resolver are external to the bridge
//! core: the bridge only depends on these traits, never on how tokens are
//! issued or where connection profiles live.

use crate::error::{BridgeResult, CredentialError};
use async_trait::async_trait;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Identifier of an authenticated user, as established by the identity verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Locates a connection profile for one bridge run.
///
/// Not retained after session establishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub connection_id: u64,
    pub user_id: UserId,
}

/// Cleartext secret material for one authentication attempt.
///
/// Zeroed on drop; never serialized, logged, or persisted.
#[derive(Zeroize, ZeroizeOnDrop)]
pub enum AuthSecret {
    Password(String),
    PrivateKey(String),
}

impl std::fmt::Debug for AuthSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthSecret::Password(_) => f.write_str("Password([REDACTED])"),
            AuthSecret::PrivateKey(_) => f.write_str("PrivateKey([REDACTED])"),
        }
    }
}

/// Resolved connection credentials, held only for the duration of session
/// establishment.
pub struct CredentialSet {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthSecret,
}

impl std::fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSet")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("auth", &self.auth)
            .finish()
    }
}

/// Maps an opaque bearer token to a user id.
///
/// Implementations must fail closed: any shape mismatch, bad signature, or
/// expired token is `Unauthenticated`, never a panic or a default user.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> BridgeResult<UserId>;
}

/// Maps a connection + user pair to cleartext connection secrets.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, descriptor: &SessionDescriptor) -> Result<CredentialSet, CredentialError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secrets() {
        let credentials = CredentialSet {
            host: "example.com".into(),
            port: 22,
            username: "deploy".into(),
            auth: AuthSecret::Password("hunter2".into()),
        };
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("example.com"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
