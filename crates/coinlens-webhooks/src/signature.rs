//! Signature header codec.
//!
//! Every delivery carries a single `Coinlens-Signature` header of the form
//! `t=<unix-seconds>,v1=<64-hex HMAC-SHA256>`. The digest covers
//! `"{timestamp}.{body}"`, so receivers can bound replay by checking the
//! timestamp against their own clock before comparing digests.

use chrono::Utc;

use crate::crypto;

/// Header name carrying the signature on every delivery POST.
pub const SIGNATURE_HEADER: &str = "Coinlens-Signature";

/// Default replay tolerance in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// A computed payload signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Unix timestamp (seconds) the signature was computed at.
    pub timestamp: i64,
    /// Hex-encoded HMAC-SHA256 digest.
    pub v1: String,
}

impl Signature {
    /// Render as the wire header value: `t=<timestamp>,v1=<hex>`.
    #[must_use]
    pub fn to_header(&self) -> String {
        format!("t={},v1={}", self.timestamp, self.v1)
    }
}

/// Why verification rejected a signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature header: {0}")]
    Malformed(String),

    #[error("signature timestamp outside tolerance (skew {skew_secs}s, tolerance {tolerance_secs}s)")]
    Expired { skew_secs: i64, tolerance_secs: i64 },

    #[error("signature mismatch")]
    Mismatch,
}

/// Sign a payload with the given secret at an explicit timestamp.
#[must_use]
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> Signature {
    Signature {
        timestamp,
        v1: crypto::compute_hmac_signature(secret, timestamp, payload),
    }
}

/// Sign a payload at the current time and render the header value.
#[must_use]
pub fn build_header(payload: &[u8], secret: &str) -> String {
    sign(payload, secret, Utc::now().timestamp()).to_header()
}

/// Verify a received signature header against a payload.
///
/// Receiver-side: the engine only produces signatures, but exposes
/// verification for receivers and tests. Fails `Malformed` when `t=` or
/// `v1=` is missing or unparseable, `Expired` when the timestamp skew
/// exceeds `tolerance_secs` in either direction, and `Mismatch` when the
/// recomputed digest differs (constant-time comparison).
pub fn verify(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let parsed = parse_header(header)?;

    let now = Utc::now().timestamp();
    let skew = (now - parsed.timestamp).abs();
    if skew > tolerance_secs {
        return Err(SignatureError::Expired {
            skew_secs: skew,
            tolerance_secs,
        });
    }

    let expected = crypto::compute_hmac_signature(secret, parsed.timestamp, payload);
    let expected_bytes = hex::decode(&expected).expect("computed digest is hex");

    if !crypto::constant_time_eq(&expected_bytes, &parsed.v1_digest) {
        return Err(SignatureError::Mismatch);
    }

    Ok(())
}

struct ParsedHeader {
    timestamp: i64,
    v1_digest: Vec<u8>,
}

/// Parse `t=<ts>,v1=<hex>`; unknown `k=v` fields are ignored for forward
/// compatibility.
fn parse_header(header: &str) -> Result<ParsedHeader, SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut v1_digest: Option<Vec<u8>> = None;

    for part in header.split(',') {
        let (key, value) = part
            .trim()
            .split_once('=')
            .ok_or_else(|| SignatureError::Malformed("expected k=v fields".to_string()))?;

        match key {
            "t" => {
                timestamp = Some(value.parse().map_err(|_| {
                    SignatureError::Malformed("invalid timestamp".to_string())
                })?);
            }
            "v1" => {
                let digest = hex::decode(value).map_err(|_| {
                    SignatureError::Malformed("invalid v1 signature hex".to_string())
                })?;
                v1_digest = Some(digest);
            }
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| SignatureError::Malformed("missing timestamp".to_string()))?;
    let v1_digest =
        v1_digest.ok_or_else(|| SignatureError::Malformed("missing v1 signature".to_string()))?;

    Ok(ParsedHeader {
        timestamp,
        v1_digest,
    })
}
