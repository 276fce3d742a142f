//! Idempotency key derivation.
//!
//! Upstream may deliver the same logical event more than once, and not every
//! payload carries an `event_id`. The key is derived in order of preference:
//!
//! 1. `event_id` from the payload, sanitized for use as a file name.
//! 2. A hash over the stable identifying fields (event type, entity,
//!    status, update time).
//! 3. A hash over the whole payload, for shapes with none of the above.
//!
//! Keys are stable across repeated deliveries of the same event and safe to
//! use as inbox file names.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::IdempotencyKey;

/// Fields that identify the affected entity, in order of preference.
const ENTITY_FIELDS: &[&str] = &["order_sn", "ordersn", "package_number", "tracking_number"];

/// Derives the idempotency key for a webhook payload.
pub fn derive_key(payload: &Value) -> IdempotencyKey {
    if let Some(event_id) = payload.get("event_id") {
        let raw = match event_id {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        };
        if let Some(raw) = raw {
            return IdempotencyKey::new(format!("evt-{}", sanitize(&raw)));
        }
    }

    let event_type = payload
        .get("code")
        .map(stringify)
        .or_else(|| payload.get("event_type").map(stringify));
    // Identifying fields usually live under `data`, sometimes at top level.
    let data = payload.get("data").unwrap_or(payload);
    let entity = ENTITY_FIELDS
        .iter()
        .find_map(|field| data.get(*field).map(stringify));
    let status = data.get("status").map(stringify);
    let update_time = data
        .get("update_time")
        .or_else(|| payload.get("timestamp"))
        .map(stringify);

    let parts = [&event_type, &entity, &status, &update_time];
    if parts.iter().any(|p| p.is_some()) {
        let composite = parts
            .iter()
            .map(|p| p.as_deref().unwrap_or(""))
            .collect::<Vec<_>>()
            .join("|");
        return IdempotencyKey::new(format!("cmp-{}", short_hash(composite.as_bytes())));
    }

    // Nothing identifying at all: key on the canonical payload text.
    let canonical = serde_json::to_string(payload).unwrap_or_default();
    IdempotencyKey::new(format!("raw-{}", short_hash(canonical.as_bytes())))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn short_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..20])
}

/// Maps an arbitrary event id onto the file-name-safe charset. When the
/// sanitized form differs from the original, a short hash of the original is
/// appended so distinct ids cannot collapse onto the same key.
fn sanitize(raw: &str) -> String {
    let safe: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if safe == raw {
        safe
    } else {
        format!("{}-{}", safe, &short_hash(raw.as_bytes())[..8])
    }
}
