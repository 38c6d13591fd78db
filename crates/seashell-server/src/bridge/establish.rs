//! Session establishment: credentials → SSH connection → PTY → shell.
//!
//! Establishment is strictly ordered so that failures map to one error each:
//! resolve credentials, build the authentication material, dial (with
//! timeout), authenticate, request a PTY, start the shell. Credentials are
//! dropped as soon as authentication completes.

use crate::bridge::session::RemoteSession;
use crate::bridge::BridgeConfig;
use russh::client;
use russh_keys::key::PrivateKeyWithHashAlg;
use russh_keys::ssh_key::{HashAlg, PublicKey};
use seashell_core::{
    AuthSecret, BridgeError, BridgeResult, CredentialResolver, CredentialSet, SessionDescriptor,
};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Decides whether a remote host key is acceptable.
///
/// `fingerprint` is the SHA-256 fingerprint in OpenSSH rendering
/// (`SHA256:<base64>`).
pub trait HostKeyVerifier: Send + Sync {
    fn verify(&self, fingerprint: &str) -> bool;
}

/// Accepts only host keys whose SHA-256 fingerprint is in the allowlist.
///
/// Configured fingerprints may carry or omit the `SHA256:` prefix. An empty
/// allowlist rejects every host.
pub struct PinnedFingerprints {
    allowed: Vec<String>,
}

impl PinnedFingerprints {
    pub fn new(fingerprints: Vec<String>) -> Self {
        let allowed = fingerprints
            .into_iter()
            .map(|f| strip_prefix(&f).to_string())
            .collect();
        Self { allowed }
    }
}

impl HostKeyVerifier for PinnedFingerprints {
    fn verify(&self, fingerprint: &str) -> bool {
        let bare = strip_prefix(fingerprint);
        self.allowed.iter().any(|allowed| allowed == bare)
    }
}

fn strip_prefix(fingerprint: &str) -> &str {
    fingerprint
        .strip_prefix("SHA256:")
        .unwrap_or(fingerprint)
        .trim()
}

/// Accepts every host key. Development only.
pub struct AcceptAnyHostKey;

impl HostKeyVerifier for AcceptAnyHostKey {
    fn verify(&self, _fingerprint: &str) -> bool {
        true
    }
}

/// russh client handler; delegates server key checks to the verifier.
struct ClientHandler {
    host_keys: Arc<dyn HostKeyVerifier>,
}

#[async_trait::async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256).to_string();
        if self.host_keys.verify(&fingerprint) {
            debug!(fingerprint = %fingerprint, "host key accepted");
            Ok(true)
        } else {
            warn!(fingerprint = %fingerprint, "host key rejected");
            Ok(false)
        }
    }
}

/// Authentication material prepared before dialing.
enum AuthPlan {
    Password(Zeroizing<String>),
    Key(PrivateKeyWithHashAlg),
}

/// Turns a session descriptor into a live [`RemoteSession`].
pub struct SessionEstablisher {
    resolver: Arc<dyn CredentialResolver>,
    host_keys: Arc<dyn HostKeyVerifier>,
    config: BridgeConfig,
}

impl SessionEstablisher {
    pub fn new(
        resolver: Arc<dyn CredentialResolver>,
        host_keys: Arc<dyn HostKeyVerifier>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            resolver,
            host_keys,
            config,
        }
    }

    pub async fn establish(&self, descriptor: &SessionDescriptor) -> BridgeResult<RemoteSession> {
        let credentials = self.resolver.resolve(descriptor).await?;
        let CredentialSet {
            host,
            port,
            username,
            auth,
        } = credentials;

        // Validate key material before opening a socket.
        let plan = match &auth {
            AuthSecret::Password(password) => {
                if password.is_empty() {
                    return Err(BridgeError::NoCredentialsProvided);
                }
                AuthPlan::Password(Zeroizing::new(password.clone()))
            }
            AuthSecret::PrivateKey(pem) => {
                if pem.trim().is_empty() {
                    return Err(BridgeError::NoCredentialsProvided);
                }
                let key = russh_keys::decode_secret_key(pem, None)
                    .map_err(|e| BridgeError::InvalidKeyMaterial(e.to_string()))?;
                let key = PrivateKeyWithHashAlg::new(Arc::new(key), None)
                    .map_err(|e| BridgeError::InvalidKeyMaterial(e.to_string()))?;
                AuthPlan::Key(key)
            }
        };
        drop(auth);

        let ssh_config = Arc::new(client::Config::default());
        let handler = ClientHandler {
            host_keys: self.host_keys.clone(),
        };

        let mut handle = tokio::time::timeout(
            self.config.connect_timeout,
            client::connect(ssh_config, (host.as_str(), port), handler),
        )
        .await
        .map_err(|_| BridgeError::RemoteConnectFailed(format!("{host}:{port}: connect timed out")))?
        .map_err(|e| BridgeError::RemoteConnectFailed(format!("{host}:{port}: {e}")))?;

        let authenticated = match plan {
            AuthPlan::Password(password) => handle
                .authenticate_password(username.as_str(), password.as_str())
                .await
                .map_err(|e| BridgeError::RemoteConnectFailed(e.to_string()))?,
            AuthPlan::Key(key) => handle
                .authenticate_publickey(username.as_str(), key)
                .await
                .map_err(|e| BridgeError::RemoteConnectFailed(e.to_string()))?,
        };
        if !authenticated {
            return Err(BridgeError::RemoteConnectFailed(
                "authentication rejected by remote host".to_string(),
            ));
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| BridgeError::PtyNegotiationFailed(e.to_string()))?;

        channel
            .request_pty(
                true,
                &self.config.term,
                self.config.default_cols,
                self.config.default_rows,
                0,
                0,
                &[
                    (russh::Pty::ECHO, 1),
                    (russh::Pty::TTY_OP_ISPEED, 14400),
                    (russh::Pty::TTY_OP_OSPEED, 14400),
                ],
            )
            .await
            .map_err(|e| BridgeError::PtyNegotiationFailed(e.to_string()))?;

        channel
            .request_shell(true)
            .await
            .map_err(|e| BridgeError::ShellStartFailed(e.to_string()))?;

        info!(host = %host, port, user = %username, "remote shell established");
        Ok(RemoteSession::from_channel(channel, handle))
    }
}
