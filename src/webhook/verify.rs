//! Inbound webhook signature verification.
//!
//! Two schemes are accepted:
//!
//! - Push authorization: the `Authorization` header carries the hex
//!   HMAC-SHA256 of `<full_url>|<raw_body>`, keyed with the push key.
//! - Legacy: `X-Shopee-Signature` carries the hex HMAC-SHA256 of the raw
//!   body followed by a trailing `|` (the historical base string), with an
//!   optional `X-Shopee-Timestamp` that must be within a fixed drift of
//!   the receiver's clock.
//!
//! Verification happens before any parsing or disk I/O, and always over the
//! raw bytes as received.

use crate::signing::verify_hex_signature;

/// Maximum allowed clock drift for the legacy timestamp header.
pub const MAX_TIMESTAMP_DRIFT_SECONDS: i64 = 300;

/// The signature material found on an inbound delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookSignature {
    /// Hex HMAC from the `Authorization` header, computed over
    /// `<full_url>|<raw_body>`.
    PushAuthorization(String),

    /// Hex HMAC over the raw body plus a trailing `|`, with an optional
    /// timestamp to bound replay age.
    Legacy {
        signature: String,
        timestamp: Option<i64>,
    },
}

/// Verifies an inbound delivery.
///
/// `full_url` is the externally visible URL of the webhook endpoint, which
/// must match what the sender signed. Comparison is constant time; any
/// malformed input verifies as false.
pub fn verify_webhook(
    push_key: &str,
    full_url: &str,
    body: &[u8],
    signature: &WebhookSignature,
    now: i64,
) -> bool {
    match signature {
        WebhookSignature::PushAuthorization(authorization) => {
            let mut base = Vec::with_capacity(full_url.len() + 1 + body.len());
            base.extend_from_slice(full_url.as_bytes());
            base.push(b'|');
            base.extend_from_slice(body);
            verify_hex_signature(authorization, push_key.as_bytes(), &base)
        }
        WebhookSignature::Legacy { signature, timestamp } => {
            if let Some(ts) = timestamp {
                if (now - ts).abs() > MAX_TIMESTAMP_DRIFT_SECONDS {
                    return false;
                }
            }
            let mut base = Vec::with_capacity(body.len() + 1);
            base.extend_from_slice(body);
            base.push(b'|');
            verify_hex_signature(signature, push_key.as_bytes(), &base)
        }
    }
}
