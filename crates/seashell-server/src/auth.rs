//! HMAC bearer tokens for terminal sessions.
//!
//! Token format: `hex([8-byte user id BE][8-byte expiry BE][32-byte HMAC-SHA256])`.
//! The MAC covers the user id and expiry, so neither can be swapped without
//! invalidating the token. Verification fails closed: any shape mismatch is
//! `Unauthenticated`.

use async_trait::async_trait;
use ring::hmac;
use seashell_core::{BridgeError, BridgeResult, IdentityVerifier, UserId};
use std::path::Path;
use tracing::info;

const TOKEN_RAW_LEN: usize = 8 + 8 + 32;

/// Verifies (and mints) HMAC-signed bearer tokens.
pub struct HmacTokenVerifier {
    key: hmac::Key,
}

impl HmacTokenVerifier {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Mint a token for `user_id`, valid for `ttl_secs`.
    pub fn mint(&self, user_id: UserId, ttl_secs: u64) -> String {
        self.mint_at(user_id, unix_now() + ttl_secs)
    }

    fn mint_at(&self, user_id: UserId, expiry: u64) -> String {
        let mut raw = Vec::with_capacity(TOKEN_RAW_LEN);
        raw.extend_from_slice(&user_id.0.to_be_bytes());
        raw.extend_from_slice(&expiry.to_be_bytes());
        let tag = hmac::sign(&self.key, &raw);
        raw.extend_from_slice(tag.as_ref());
        hex::encode(raw)
    }
}

#[async_trait]
impl IdentityVerifier for HmacTokenVerifier {
    async fn verify(&self, token: &str) -> BridgeResult<UserId> {
        let raw = hex::decode(token.trim()).map_err(|_| unauthenticated("malformed token"))?;
        if raw.len() != TOKEN_RAW_LEN {
            return Err(unauthenticated("malformed token"));
        }

        let user_bytes: [u8; 8] = raw[..8]
            .try_into()
            .map_err(|_| unauthenticated("malformed token"))?;
        let expiry_bytes: [u8; 8] = raw[8..16]
            .try_into()
            .map_err(|_| unauthenticated("malformed token"))?;
        let expiry = u64::from_be_bytes(expiry_bytes);

        if unix_now() > expiry {
            return Err(unauthenticated("token expired"));
        }

        hmac::verify(&self.key, &raw[..16], &raw[16..])
            .map_err(|_| unauthenticated("invalid token signature"))?;

        Ok(UserId(u64::from_be_bytes(user_bytes)))
    }
}

fn unauthenticated(reason: &str) -> BridgeError {
    BridgeError::Unauthenticated(reason.to_string())
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Generate a random token secret (32 bytes).
pub fn generate_secret() -> Vec<u8> {
    use ring::rand::{SecureRandom, SystemRandom};
    let rng = SystemRandom::new();
    let mut secret = vec![0u8; 32];
    rng.fill(&mut secret).expect("RNG failure");
    secret
}

/// Load the token secret from `path`, creating it on first run.
pub fn load_or_create_secret(path: &Path) -> BridgeResult<Vec<u8>> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let secret = hex::decode(content.trim())
            .map_err(|_| BridgeError::Config(format!("invalid secret file {}", path.display())))?;
        if secret.len() < 16 {
            return Err(BridgeError::Config(format!(
                "secret in {} is too short",
                path.display()
            )));
        }
        return Ok(secret);
    }

    let secret = generate_secret();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, hex::encode(&secret))?;
    info!(path = %path.display(), "generated new token secret");
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mint_and_verify() {
        let verifier = HmacTokenVerifier::new(&generate_secret());
        let token = verifier.mint(UserId(42), 3600);
        assert_eq!(verifier.verify(&token).await.unwrap(), UserId(42));
    }

    #[tokio::test]
    async fn wrong_secret_rejected() {
        let minter = HmacTokenVerifier::new(&generate_secret());
        let verifier = HmacTokenVerifier::new(&generate_secret());
        let token = minter.mint(UserId(1), 3600);
        assert!(matches!(
            verifier.verify(&token).await,
            Err(BridgeError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn expired_token_rejected() {
        let verifier = HmacTokenVerifier::new(&generate_secret());
        let token = verifier.mint_at(UserId(1), unix_now().saturating_sub(60));
        assert!(matches!(
            verifier.verify(&token).await,
            Err(BridgeError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn tampered_user_id_rejected() {
        let verifier = HmacTokenVerifier::new(&generate_secret());
        let token = verifier.mint(UserId(1), 3600);
        let mut raw = hex::decode(&token).unwrap();
        raw[7] ^= 0x01;
        assert!(matches!(
            verifier.verify(&hex::encode(raw)).await,
            Err(BridgeError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn malformed_tokens_rejected() {
        let verifier = HmacTokenVerifier::new(&generate_secret());
        for token in ["", "zz", "deadbeef", "not hex at all"] {
            assert!(matches!(
                verifier.verify(token).await,
                Err(BridgeError::Unauthenticated(_))
            ));
        }
    }
}
