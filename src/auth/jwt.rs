// JWT expiry extraction (no signature verification; the backend owns that)
// Author: kelexine (https://github.com/kelexine)

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Read the `exp` claim (seconds since epoch) from a compact JWT.
///
/// Returns `None` for anything that is not three dot-separated segments
/// with a base64url JSON payload carrying a numeric `exp`.
pub fn expiration(token: &str) -> Option<DateTime<Utc>> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;

    let exp = claims.get("exp")?;
    let seconds = exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))?;
    DateTime::from_timestamp(seconds, 0)
}

/// A token without a readable expiry counts as expired.
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match expiration(token) {
        Some(exp) => exp <= now,
        None => true,
    }
}

pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

#[cfg(test)]
pub(crate) fn encode_for_test(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}
