//! HMAC-SHA256 request signing for the OKX v5 REST API.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::credentials::OkxCredentials;
use crate::domain::error::SigtraderError;

type HmacSha256 = Hmac<Sha256>;

/// ISO-8601 UTC with milliseconds and a `Z` suffix, e.g. `2020-12-08T09:08:57.715Z`.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// base64(HMAC-SHA256(secret, timestamp + METHOD + path_with_query + body))
pub fn sign(
    secret: &str,
    timestamp: &str,
    method: &str,
    path_with_query: &str,
    body: &str,
) -> Result<String, SigtraderError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| {
        SigtraderError::InvalidInput {
            reason: format!("unusable API secret: {e}"),
        }
    })?;
    mac.update(timestamp.as_bytes());
    mac.update(method.to_ascii_uppercase().as_bytes());
    mac.update(path_with_query.as_bytes());
    mac.update(body.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Authentication headers for one request.
pub fn signed_headers(
    credentials: &OkxCredentials,
    now: DateTime<Utc>,
    method: &str,
    path_with_query: &str,
    body: &str,
) -> Result<Vec<(&'static str, String)>, SigtraderError> {
    let ts = timestamp(now);
    let signature = sign(credentials.expose_secret(), &ts, method, path_with_query, body)?;
    Ok(vec![
        ("OK-ACCESS-KEY", credentials.api_key().to_string()),
        ("OK-ACCESS-SIGN", signature),
        ("OK-ACCESS-PASSPHRASE", credentials.expose_passphrase().to_string()),
        ("OK-ACCESS-TIMESTAMP", ts),
    ])
}
