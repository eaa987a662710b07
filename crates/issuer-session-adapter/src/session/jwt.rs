/*
[INPUT]:  Access token string (JWT)
[OUTPUT]: Expiration timestamp from the `exp` claim, if any
[POS]:    Session layer - token metadata extraction
[UPDATE]: When token format changes
*/

use base64::{
    Engine as _,
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
};
use chrono::{DateTime, Utc};

/// Read the `exp` claim of a JWT without verifying it.
///
/// Opaque (non-JWT) tokens return `None`; the server stays authoritative.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload_b64 = token.trim().split('.').nth(1)?;
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .or_else(|_| URL_SAFE.decode(payload_b64))
        .ok()?;
    let payload: serde_json::Value = serde_json::from_slice(&payload_bytes).ok()?;
    let exp = payload.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}
