//! Secrets minted per authorization flow.
//!
//! One browser flow carries three random artifacts: the CSRF `state`
//! echoed back on the callback, and the RFC 7636 verifier/challenge pair
//! binding the callback to the token exchange. Only the state and the
//! challenge appear in the browser URL; the verifier stays in the
//! pending-flow table until the code exchange.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// The only challenge method offered; plain is not supported
pub const CHALLENGE_METHOD: &str = "S256";

/// Random artifacts for one authorization flow
#[derive(Debug, Clone)]
pub struct FlowSecrets {
    state: String,
    verifier: String,
    challenge: String,
}

impl FlowSecrets {
    pub fn mint() -> Self {
        let verifier = random_urlsafe(32);
        let digest = Sha256::digest(verifier.as_bytes());
        Self {
            state: random_urlsafe(16),
            challenge: URL_SAFE_NO_PAD.encode(digest),
            verifier,
        }
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

fn random_urlsafe(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(&bytes)
}
