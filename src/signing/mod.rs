//! HMAC-SHA256 request signing.
//!
//! Every outbound API call carries a `sign` query parameter: the lowercase
//! hex HMAC-SHA256 of a canonical string keyed with the partner key. The
//! canonical string is an order-sensitive concatenation with no separators;
//! any deviation invalidates the signature.
//!
//! Two canonical forms exist:
//! - API calls: `partner_id + path + timestamp [+ access_token [+ shop_id]]`
//! - Authorization URL and token endpoints: `partner_id + path + timestamp`
//!
//! The second form omits access_token/shop_id because authorization precedes
//! token issuance.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::types::PartnerId;

type HmacSha256 = Hmac<Sha256>;

/// Computes the lowercase hex HMAC-SHA256 signature of `data` under `key`.
///
/// The output is always 64 hex characters. Deterministic; no side effects.
pub fn sign(key: &str, data: &str) -> String {
    hex::encode(hmac_sha256(key.as_bytes(), data.as_bytes()))
}

/// Raw HMAC-SHA256 over arbitrary bytes.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Canonical string for a signed API call.
///
/// `access_token` and `shop_or_merchant_id` are appended, in that order,
/// only when present. The common-parameter form (token endpoints) passes
/// `None` for both.
pub fn canonical_string(
    partner_id: PartnerId,
    path: &str,
    timestamp: i64,
    access_token: Option<&str>,
    shop_or_merchant_id: Option<u64>,
) -> String {
    let mut base = format!("{partner_id}{path}{timestamp}");
    if let Some(token) = access_token {
        base.push_str(token);
    }
    if let Some(id) = shop_or_merchant_id {
        base.push_str(&id.to_string());
    }
    base
}

/// Verifies a hex-encoded HMAC-SHA256 signature in constant time.
///
/// Returns `false` for malformed hex rather than erroring; a garbage
/// signature is just an invalid one.
pub fn verify_hex_signature(expected_hex: &str, key: &[u8], data: &[u8]) -> bool {
    let expected = match hex::decode(expected_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(data);
    // Constant-time comparison via the HMAC library
    mac.verify_slice(&expected).is_ok()
}
