//! Cryptographic primitives for the delivery engine.
//!
//! - [`SecretCipher`]: AES-256-GCM for signing secrets at rest
//! - HMAC-SHA256 computation over timestamped payloads

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::WebhookError;

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Secrets at rest
// ---------------------------------------------------------------------------

/// AES-256-GCM cipher for signing secrets at rest.
///
/// Stored format: base64(nonce || ciphertext || auth_tag), one random nonce
/// per encryption. The key length is checked once at construction.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// Build from a 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self, WebhookError> {
        if key.len() != 32 {
            return Err(WebhookError::EncryptionFailed(format!(
                "Invalid key length: expected 32 bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Encrypt a plaintext secret for storage.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, WebhookError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&sealed))
    }

    /// Decrypt a stored secret back to plaintext.
    pub fn decrypt(&self, encoded: &str) -> Result<String, WebhookError> {
        let sealed = BASE64
            .decode(encoded)
            .map_err(|e| WebhookError::EncryptionFailed(format!("Base64 decode failed: {e}")))?;

        if sealed.len() <= NONCE_SIZE {
            return Err(WebhookError::EncryptionFailed(
                "Invalid encrypted data format".to_string(),
            ));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| WebhookError::EncryptionFailed(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// HMAC-SHA256 payload signing
// ---------------------------------------------------------------------------

/// Compute HMAC-SHA256 over `{timestamp}.{body}`.
///
/// The timestamp binding is what lets receivers bound replay. Returns the
/// hex-encoded digest.
#[must_use]
pub fn compute_hmac_signature(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");

    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);

    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time byte comparison via the `subtle` crate.
///
/// Mismatched lengths short-circuit to failure; the digests compared here
/// are fixed-length so that path leaks nothing useful.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
