//! Team key pair
//!
//! Stored as JSON `{ "curve", "public", "private" }` where both keys are
//! standard base64 followed by a `.ed25519` suffix. The private key is the
//! 64-byte seed+public encoding; bare 32-byte seeds are accepted on load.

use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

const CURVE: &str = "ed25519";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub curve: String,
    pub public: String,
    pub private: String,
}

impl KeyPair {
    /// Generate a fresh Ed25519 key pair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        Self::from_signing_key(&signing_key)
    }

    pub fn from_signing_key(signing_key: &SigningKey) -> Self {
        Self {
            curve: CURVE.to_string(),
            public: format!(
                "{}.{}",
                STANDARD.encode(signing_key.verifying_key().to_bytes()),
                CURVE
            ),
            private: format!("{}.{}", STANDARD.encode(signing_key.to_keypair_bytes()), CURVE),
        }
    }

    /// Load a key pair from a JSON file
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(&path)?;
        let keys: KeyPair = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Key(format!("bad key file {:?}: {}", path.as_ref(), e)))?;
        if keys.curve != CURVE {
            return Err(Error::Key(format!("unsupported curve '{}'", keys.curve)));
        }
        Ok(keys)
    }

    /// Write the key pair to a new file, refusing to overwrite an existing one
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        let json = serde_json::to_vec_pretty(self)?;
        file.write_all(&json)?;
        file.write_all(b"\n")?;
        tracing::info!("Wrote key pair to {:?}", path.as_ref());
        Ok(())
    }

    /// Decode the private key
    pub fn signing_key(&self) -> Result<SigningKey> {
        let raw = decode_key(&self.private)?;
        match raw.len() {
            64 => {
                let bytes: [u8; 64] = raw
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Key("bad private key length".to_string()))?;
                SigningKey::from_keypair_bytes(&bytes)
                    .map_err(|e| Error::Key(format!("inconsistent private key: {}", e)))
            }
            32 => {
                let bytes: [u8; 32] = raw
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Key("bad private key length".to_string()))?;
                Ok(SigningKey::from_bytes(&bytes))
            }
            n => Err(Error::Key(format!("private key has {} bytes", n))),
        }
    }

    /// Decode the public key
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        let raw = decode_key(&self.public)?;
        let bytes: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| Error::Key(format!("public key has {} bytes", raw.len())))?;
        VerifyingKey::from_bytes(&bytes).map_err(|e| Error::Key(e.to_string()))
    }
}

fn decode_key(encoded: &str) -> Result<Vec<u8>> {
    let b64 = encoded.split('.').next().unwrap_or_default();
    STANDARD
        .decode(b64)
        .map_err(|e| Error::Key(format!("bad base64 key: {}", e)))
}
