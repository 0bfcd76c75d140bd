//! HMAC-SHA256 payload digests carried in the `HashSHA256` header.
//!
//! The digest is computed over the exact bytes on the wire (the gzip body for
//! delivery batches) and transported base64-encoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{ProtoError, Result};

/// Header carrying the payload digest.
pub const HASH_HEADER: &str = "HashSHA256";

type HmacSha256 = Hmac<Sha256>;

fn mac(key: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key.as_bytes()).map_err(|_| ProtoError::InvalidKey)
}

/// Computes the base64 HMAC-SHA256 of `data`.
///
/// Returns `Ok(None)` when `key` is empty: signing is disabled.
///
/// # Errors
///
/// Returns [`ProtoError::InvalidKey`] if the MAC rejects the key.
pub fn sign(key: &str, data: &[u8]) -> Result<Option<String>> {
    if key.is_empty() {
        return Ok(None);
    }
    let mut mac = mac(key)?;
    mac.update(data);
    Ok(Some(STANDARD.encode(mac.finalize().into_bytes())))
}

/// Verifies a base64 digest against `data` in constant time.
///
/// Returns `false` for undecodable digests.
#[must_use]
pub fn verify(key: &str, data: &[u8], digest: &str) -> bool {
    let Ok(expected) = STANDARD.decode(digest.trim()) else {
        return false;
    };
    let Ok(mut mac) = mac(key) else {
        return false;
    };
    mac.update(data);
    mac.verify_slice(&expected).is_ok()
}
