//! Signing-secret generation and format validation.
//!
//! Secrets are `whsec_` followed by 64 lowercase hex characters (32 bytes of
//! OS-CSPRNG entropy). The plaintext secret is handed to the owner exactly
//! once at creation or rotation; the store only ever sees it encrypted.

use rand::rngs::OsRng;
use rand::RngCore;

/// Prefix carried by every signing secret.
pub const SECRET_PREFIX: &str = "whsec_";

/// Bytes of entropy behind each secret.
const SECRET_BYTES: usize = 32;

/// Generate a new signing secret: `whsec_` + 64 hex chars.
#[must_use]
pub fn generate() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{SECRET_PREFIX}{}", hex::encode(bytes))
}

/// Check prefix and exact hex length.
///
/// Used to reject malformed secrets before any signature operation.
#[must_use]
pub fn is_valid_format(secret: &str) -> bool {
    let Some(body) = secret.strip_prefix(SECRET_PREFIX) else {
        return false;
    };
    body.len() == SECRET_BYTES * 2 && body.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_secret_has_valid_format() {
        for _ in 0..16 {
            assert!(is_valid_format(&generate()));
        }
    }

    #[test]
    fn test_generated_secrets_are_unique() {
        assert_ne!(generate(), generate());
    }

    #[test]
    fn test_generated_secret_length() {
        let secret = generate();
        assert_eq!(secret.len(), SECRET_PREFIX.len() + 64);
        assert!(secret.starts_with("whsec_"));
    }

    #[test]
    fn test_rejects_missing_prefix() {
        assert!(!is_valid_format(&"a".repeat(70)));
        assert!(!is_valid_format(""));
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(!is_valid_format("whsec_abcdef"));
        assert!(!is_valid_format(&format!("whsec_{}", "a".repeat(63))));
        assert!(!is_valid_format(&format!("whsec_{}", "a".repeat(65))));
    }

    #[test]
    fn test_rejects_non_hex_body() {
        assert!(!is_valid_format(&format!("whsec_{}", "g".repeat(64))));
        assert!(!is_valid_format(&format!("whsec_{}", "Z".repeat(64))));
    }

    #[test]
    fn test_accepts_uppercase_hex() {
        assert!(is_valid_format(&format!("whsec_{}", "A".repeat(64))));
    }
}
