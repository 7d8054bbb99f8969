//! HMAC-SHA256 request signing.
//!
//! The signed payload is `operation_code`, `username` and the unix timestamp
//! in milliseconds, joined with `|`. The signature is lowercase hex.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Build the canonical payload for a signed request.
#[must_use]
pub fn payload(operation_code: &str, username: &str, timestamp_ms: i64) -> String {
    format!("{operation_code}|{username}|{timestamp_ms}")
}

/// Sign `payload` with `secret`.
///
/// # Errors
/// Returns an error if the secret cannot key the MAC.
pub fn sign(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Parse(format!("signing key: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a signature produced by [`sign`].
#[must_use]
pub fn verify(secret: &str, payload: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload.as_bytes());
    mac.verify_slice(&expected).is_ok()
}
