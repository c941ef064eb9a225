//! Slack request signing: `v0=` + hex(HMAC-SHA256(signing_secret, "v0:{timestamp}:{body}")).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Requests older (or newer) than this are rejected as possible replays.
pub const MAX_REQUEST_AGE_SECS: i64 = 60 * 5;

const VERSION: &str = "v0";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("request timestamp is not a number")]
    BadTimestamp,
    #[error("request timestamp is outside the allowed window")]
    StaleTimestamp,
    #[error("malformed signature header")]
    Malformed,
    #[error("signature mismatch")]
    Mismatch,
}

fn mac_for(secret: &str, timestamp: &str, body: &[u8]) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    mac
}

/// Compute the `X-Slack-Signature` value for a request body.
pub fn sign_request(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let digest = mac_for(secret, timestamp, body).finalize().into_bytes();
    format!("{}={}", VERSION, hex::encode(digest))
}

/// Verify `X-Slack-Request-Timestamp` and `X-Slack-Signature` against the raw body. `now_secs` is Unix seconds.
pub fn verify_request(
    secret: &str,
    timestamp: &str,
    signature: &str,
    body: &[u8],
    now_secs: i64,
) -> Result<(), SignatureError> {
    let ts: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::BadTimestamp)?;
    let age = now_secs.checked_sub(ts).map(i64::unsigned_abs);
    if age.map_or(true, |age| age > MAX_REQUEST_AGE_SECS as u64) {
        return Err(SignatureError::StaleTimestamp);
    }
    let sig_hex = signature
        .strip_prefix("v0=")
        .ok_or(SignatureError::Malformed)?;
    let expected = hex::decode(sig_hex).map_err(|_| SignatureError::Malformed)?;
    mac_for(secret, timestamp, body)
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}
