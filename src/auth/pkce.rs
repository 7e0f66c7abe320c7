//! PKCE (Proof Key for Code Exchange) and state token generation
//!
//! Implements RFC 7636 S256 for the authorization code flow:
//! - verifier: 32 bytes from the OS random source, base64url without padding
//! - challenge: BASE64URL(SHA256(verifier)) without padding
//! - state: 16 separate random bytes, base64url without padding
//!
//! Only the operating system's secure random source is used. If it fails the
//! flow fails with [`ConnectError::EntropyUnavailable`]; there is no fallback.

use crate::constants::{PKCE_VERIFIER_BYTES, STATE_TOKEN_BYTES};
use crate::{ConnectError, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// A verifier and the challenge derived from it
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// Generate a fresh verifier and derive its challenge
    pub fn generate() -> Result<Self> {
        let verifier = generate_verifier()?;
        let challenge = derive_challenge(&verifier);
        Ok(Self {
            verifier,
            challenge,
        })
    }
}

/// Generate a PKCE code verifier
pub fn generate_verifier() -> Result<String> {
    random_token(PKCE_VERIFIER_BYTES)
}

/// Derive the S256 code challenge for a verifier
pub fn derive_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Generate an anti-CSRF state token
pub fn generate_state() -> Result<String> {
    random_token(STATE_TOKEN_BYTES)
}

fn random_token(len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| ConnectError::EntropyUnavailable(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(&bytes))
}

/// Whether `s` only contains base64url characters
pub fn is_url_safe(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
