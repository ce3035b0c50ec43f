//! Webhook signature verification.
//!
//! The processor signs each delivery with HMAC-SHA256 over `"{timestamp}.{raw body}"`
//! and sends the result in the `stripe-signature` header:
//!
//! ```text
//! stripe-signature: t=1700000000,v1=5257a869e7ec...,v1=...
//! ```
//!
//! Several `v1` entries may be present while a secret is being rolled; the
//! delivery is authentic if any of them matches.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use super::WebhookError;

type HmacSha256 = Hmac<Sha256>;

const SCHEME: &str = "v1";

/// Parsed `stripe-signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    /// Hex digests from every `v1` entry
    pub signatures: Vec<String>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };

            match key {
                "t" => timestamp = value.parse::<i64>().ok(),
                SCHEME => signatures.push(value.to_string()),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(WebhookError::NoSignatures);
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Verify a webhook signature header against the raw body.
///
/// # Arguments
///
/// * `secret` - The webhook signing secret
/// * `payload` - The request body exactly as received
/// * `header` - The `stripe-signature` header value
/// * `tolerance_secs` - Maximum age of the signed timestamp; `0` disables the check
/// * `now` - Current Unix time in seconds
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), WebhookError> {
    let header = SignatureHeader::parse(header)?;
    let expected = hex::encode(compute_signature(secret, header.timestamp, payload));

    let matched = header
        .signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate));

    if !matched {
        warn!(
            candidates = header.signatures.len(),
            body_length = payload.len(),
            "webhook_signature_mismatch"
        );
        return Err(WebhookError::SignatureMismatch);
    }

    // Future timestamps have a negative age and always pass
    let age_secs = now.saturating_sub(header.timestamp);
    let stale = u64::try_from(age_secs).is_ok_and(|age| age > tolerance_secs);
    if tolerance_secs > 0 && stale {
        warn!(
            webhook_time = header.timestamp,
            current_time = now,
            age_seconds = age_secs,
            max_age_seconds = tolerance_secs,
            "webhook_signature_stale"
        );
        return Err(WebhookError::TimestampOutsideTolerance { age_secs });
    }

    Ok(())
}

/// HMAC-SHA256(secret, "{timestamp}.{payload}").
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");

    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Build a `stripe-signature` header value for a payload.
///
/// Used to sign fixtures and replayed deliveries.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!(
        "t={},{}={}",
        timestamp,
        SCHEME,
        hex::encode(compute_signature(secret, timestamp, payload))
    )
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}
