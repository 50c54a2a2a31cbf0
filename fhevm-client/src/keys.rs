//! Ephemeral decryption key pairs.
//!
//! A fresh Ed25519 pair is generated for every decryption authorization and
//! never persisted. Keys travel hex-encoded, the form the relayer expects.

use std::fmt;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

use crate::error::{FhevmError, Result};

#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: String,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Generate a fresh random key pair.
pub fn generate_keypair() -> KeyPair {
    let signing_key = SigningKey::generate(&mut OsRng);
    KeyPair {
        public_key: hex::encode(signing_key.verifying_key().to_bytes()),
        private_key: hex::encode(signing_key.to_bytes()),
    }
}

/// Derive the hex public key belonging to a hex private key.
pub fn public_key_for(private_key: &str) -> Result<String> {
    let bytes = decode_key(private_key)?;
    let signing_key = SigningKey::from_bytes(&bytes);
    Ok(hex::encode(signing_key.verifying_key().to_bytes()))
}

/// Decode a hex key (with or without `0x`) into its 32 raw bytes.
pub fn decode_key(key: &str) -> Result<[u8; 32]> {
    let raw = hex::decode(key.trim_start_matches("0x"))
        .map_err(|e| FhevmError::Authorization(format!("invalid key encoding: {e}")))?;
    raw.try_into()
        .map_err(|_| FhevmError::Authorization("key must be 32 bytes".into()))
}
