//! Accept loop and per-connection request handling.
//!
//! Requests arrive as WebSocket upgrades on `/terminal/{connection_id}` with
//! the bearer token in the `token` query parameter. Each accepted connection
//! is verified and then handed to the bridge; one task per session.

use crate::auth::{self, HmacTokenVerifier};
use crate::bridge::{
    report_fatal, AcceptAnyHostKey, BridgeConfig, HostKeyVerifier, PinnedFingerprints,
    TerminalBridge,
};
use crate::config::ServerConfig;
use crate::profiles::ProfileStore;
use crate::transport::websocket::{self, WebSocketConnection, WsTransport};
use seashell_core::{
    BridgeError, BridgeResult, FrameTransport, IdentityVerifier, SessionDescriptor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::http::Uri;
use tracing::{info, warn};

pub struct TerminalServer {
    config: ServerConfig,
    identity: Arc<HmacTokenVerifier>,
    bridge: Arc<TerminalBridge>,
}

impl TerminalServer {
    pub fn new(config: ServerConfig) -> BridgeResult<Self> {
        let secret = auth::load_or_create_secret(&config.secret_path)?;
        let identity = Arc::new(HmacTokenVerifier::new(&secret));

        let host_keys: Arc<dyn HostKeyVerifier> = if config.accept_any_host_key {
            Arc::new(AcceptAnyHostKey)
        } else {
            Arc::new(PinnedFingerprints::new(config.host_key_fingerprints.clone()))
        };
        let resolver = Arc::new(ProfileStore::new(config.connections.clone()));
        let bridge = Arc::new(TerminalBridge::new(
            resolver,
            host_keys,
            BridgeConfig {
                connect_timeout: config.connect_timeout,
                ..BridgeConfig::default()
            },
        ));

        Ok(Self {
            config,
            identity,
            bridge,
        })
    }

    pub async fn run(&self) -> BridgeResult<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind, self.config.port)
            .parse()
            .map_err(|e| BridgeError::Config(format!("invalid bind address: {e}")))?;

        let mut connections = websocket::start_listener(addr).await?;

        while let Some(conn) = connections.recv().await {
            let identity = self.identity.clone();
            let bridge = self.bridge.clone();
            tokio::spawn(handle_connection(bridge, identity, conn));
        }

        Ok(())
    }
}

async fn handle_connection(
    bridge: Arc<TerminalBridge>,
    identity: Arc<HmacTokenVerifier>,
    conn: WebSocketConnection,
) {
    let remote = conn.remote_addr;
    let uri = conn.uri.clone();
    let transport: Arc<dyn FrameTransport> = Arc::new(WsTransport::new(conn.ws_stream));

    let (connection_id, token) = match parse_request(&uri) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(remote = %remote, path = %uri.path(), error = %e, "rejected request");
            report_fatal(transport.as_ref(), &e).await;
            return;
        }
    };

    let user_id = match identity.verify(&token).await {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!(remote = %remote, connection = connection_id, "authentication failed");
            report_fatal(transport.as_ref(), &e).await;
            return;
        }
    };

    let descriptor = SessionDescriptor {
        connection_id,
        user_id,
    };
    info!(remote = %remote, user = %user_id, connection = connection_id, "session starting");

    match bridge.run(transport, descriptor).await {
        Ok(()) => {
            info!(remote = %remote, user = %user_id, connection = connection_id, "session ended")
        }
        Err(e) => {
            warn!(remote = %remote, user = %user_id, connection = connection_id, error = %e, "session failed")
        }
    }
}

/// Extract the connection id and bearer token from the request URI.
fn parse_request(uri: &Uri) -> BridgeResult<(u64, String)> {
    let path = uri.path();
    let id_part = path
        .strip_prefix("/terminal/")
        .ok_or_else(|| BridgeError::InvalidRequest(format!("unexpected path {path}")))?;
    let connection_id: u64 = id_part
        .parse()
        .map_err(|_| BridgeError::InvalidRequest(format!("bad connection id {id_part}")))?;

    let token = uri
        .query()
        .and_then(|query| {
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == "token")
                .map(|(_, value)| value.to_string())
        })
        .ok_or_else(|| BridgeError::Unauthenticated("missing token".to_string()))?;

    Ok((connection_id, token))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn parses_id_and_token() {
        let (id, token) = parse_request(&uri("/terminal/42?token=deadbeef")).unwrap();
        assert_eq!(id, 42);
        assert_eq!(token, "deadbeef");
    }

    #[test]
    fn token_found_among_other_params() {
        let (_, token) = parse_request(&uri("/terminal/1?foo=bar&token=abc123")).unwrap();
        assert_eq!(token, "abc123");
    }

    #[test]
    fn unexpected_path_rejected() {
        assert!(matches!(
            parse_request(&uri("/shell/1?token=x")),
            Err(BridgeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn non_numeric_id_rejected() {
        assert!(matches!(
            parse_request(&uri("/terminal/abc?token=x")),
            Err(BridgeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn missing_token_rejected() {
        assert!(matches!(
            parse_request(&uri("/terminal/1")),
            Err(BridgeError::Unauthenticated(_))
        ));
    }
}
