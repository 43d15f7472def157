//! Signed request envelopes

use crate::encode::{encode, inject_signature};
use crate::error::{Error, Result};
use crate::keypair::KeyPair;
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signer, SigningKey};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha512;

/// Algorithm tag appended to every encoded signature
pub const SIGNATURE_SUFFIX: &str = ".sig.ed25519";

/// Bytes of the HMAC-SHA512 output that get signed
const DIGEST_LEN: usize = 32;

type HmacSha512 = Hmac<Sha512>;

/// Produces signed envelopes for a team
#[derive(Clone)]
pub struct MessageSigner {
    api_key: Vec<u8>,
    signing_key: Option<SigningKey>,
}

impl MessageSigner {
    /// Create a signer from the base64-encoded shared API key
    ///
    /// The signer has no private key until one is attached with
    /// [`MessageSigner::with_key_pair`]; signing fails with a key error until then.
    pub fn new(api_key: &str) -> Result<Self> {
        let api_key = STANDARD
            .decode(api_key.trim())
            .map_err(|e| Error::Encoding(format!("malformed API key: {}", e)))?;
        Ok(Self {
            api_key,
            signing_key: None,
        })
    }

    pub fn with_key_pair(mut self, keys: &KeyPair) -> Result<Self> {
        self.signing_key = Some(keys.signing_key()?);
        Ok(self)
    }

    pub fn with_signing_key(mut self, signing_key: SigningKey) -> Self {
        self.signing_key = Some(signing_key);
        self
    }

    pub fn has_key(&self) -> bool {
        self.signing_key.is_some()
    }

    /// Serialize, canonicalize and sign a request body
    pub fn sign<T: Serialize + ?Sized>(&self, body: &T) -> Result<Vec<u8>> {
        let signing_key = self
            .signing_key
            .as_ref()
            .ok_or_else(|| Error::Key("no private key configured".to_string()))?;
        let plain = serde_json::to_vec(body)?;
        let encoded = encode(&plain)?;
        let digest = self.digest(encoded.as_bytes())?;
        let signature = signing_key.sign(&digest);
        let tag = format!("{}{}", STANDARD.encode(signature.to_bytes()), SIGNATURE_SUFFIX);
        tracing::trace!("Signed {} byte message", encoded.len());
        Ok(inject_signature(&encoded, &tag)?.into_bytes())
    }

    /// HMAC-SHA512 of the canonical bytes, truncated to 32 bytes
    pub fn digest(&self, canonical: &[u8]) -> Result<[u8; DIGEST_LEN]> {
        let mut mac = HmacSha512::new_from_slice(&self.api_key)
            .map_err(|e| Error::Encoding(format!("bad API key: {}", e)))?;
        mac.update(canonical);
        let full = mac.finalize().into_bytes();
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&full[..DIGEST_LEN]);
        Ok(digest)
    }
}
