//! Webhook endpoint handler.
//!
//! Verifies the delivery signature over the raw bytes, derives the
//! idempotency key, persists the event durably, and hands the key to the
//! worker before returning 202. No marketplace or downstream calls happen
//! on this path; latency here is bounded by one disk write.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::api::HttpTransport;
use crate::config::InvalidWebhookPolicy;
use crate::types::now_epoch;
use crate::webhook::idempotency::derive_key;
use crate::webhook::inbox::{InboxError, InboxStatus};
use crate::webhook::verify::{WebhookSignature, verify_webhook};

const HEADER_AUTHORIZATION: &str = "authorization";
const HEADER_SIGNATURE: &str = "x-shopee-signature";
const HEADER_TIMESTAMP: &str = "x-shopee-timestamp";

/// Errors that can occur while accepting a delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("no signature header present")]
    MissingSignature,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("inbox error: {0}")]
    Inbox(#[from] InboxError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingSignature | WebhookError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            WebhookError::Inbox(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Accepts a webhook delivery.
///
/// - 202 Accepted: stored (or coalesced onto an existing entry)
/// - 401 Unauthorized: missing or invalid signature
/// - 400 Bad Request: signature valid but body is not JSON
pub async fn webhook_handler<T>(
    State(state): State<AppState<T>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError>
where
    T: HttpTransport + Clone + Send + Sync + 'static,
{
    let signature = extract_signature(&headers)?;
    let now = now_epoch();

    if !verify_webhook(state.push_key(), state.public_url(), &body, &signature, now) {
        warn!("webhook signature verification failed");
        match state.invalid_webhook_policy() {
            InvalidWebhookPolicy::Reject => return Err(WebhookError::InvalidSignature),
            InvalidWebhookPolicy::Persist => {
                // Keep the raw text; an attacker-controlled body is not
                // worth a parse failure on this path.
                let payload = Value::String(String::from_utf8_lossy(&body).into_owned());
                let key = derive_key(&payload);
                state.coordinator().inbox().ingest(
                    key,
                    "invalid",
                    payload,
                    InboxStatus::InvalidSignature,
                    now,
                )?;
                return Err(WebhookError::InvalidSignature);
            }
        }
    }

    let payload: Value = serde_json::from_slice(&body)?;
    let event_type = event_type_of(&payload);
    let key = derive_key(&payload);

    let ingest = state.coordinator().inbox().ingest(
        key.clone(),
        event_type.clone(),
        payload,
        InboxStatus::Queued,
        now,
    )?;

    if ingest.is_duplicate() {
        debug!(key = %key, "duplicate delivery coalesced");
        return Ok((StatusCode::ACCEPTED, "accepted (duplicate)"));
    }

    info!(key = %key, event_type = %event_type, "webhook accepted");
    // Best effort: if the channel is closed or full the sweep loop picks the
    // queued entry up.
    if state.sender().try_send(key.clone()).is_err() {
        debug!(key = %key, "processing channel unavailable; leaving for sweep");
    }
    Ok((StatusCode::ACCEPTED, "accepted"))
}

fn extract_signature(headers: &HeaderMap) -> Result<WebhookSignature, WebhookError> {
    if let Some(authorization) = header_str(headers, HEADER_AUTHORIZATION) {
        return Ok(WebhookSignature::PushAuthorization(authorization));
    }
    if let Some(signature) = header_str(headers, HEADER_SIGNATURE) {
        let timestamp = header_str(headers, HEADER_TIMESTAMP).and_then(|v| v.parse().ok());
        return Ok(WebhookSignature::Legacy { signature, timestamp });
    }
    Err(WebhookError::MissingSignature)
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Event type label for operator surfaces: the numeric push `code` when
/// present, else an explicit `event_type`, else "unknown".
fn event_type_of(payload: &Value) -> String {
    if let Some(code) = payload.get("code") {
        return match code {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    }
    payload
        .get("event_type")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_signature_prefers_authorization() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "abcd".parse().unwrap());
        headers.insert("x-shopee-signature", "ffff".parse().unwrap());
        assert_eq!(
            extract_signature(&headers).unwrap(),
            WebhookSignature::PushAuthorization("abcd".into())
        );
    }

    #[test]
    fn extract_signature_legacy_with_timestamp() {
        let mut headers = HeaderMap::new();
        headers.insert("x-shopee-signature", "ffff".parse().unwrap());
        headers.insert("x-shopee-timestamp", "1700000000".parse().unwrap());
        assert_eq!(
            extract_signature(&headers).unwrap(),
            WebhookSignature::Legacy {
                signature: "ffff".into(),
                timestamp: Some(1_700_000_000),
            }
        );
    }

    #[test]
    fn extract_signature_missing_is_an_error() {
        let headers = HeaderMap::new();
        assert!(matches!(
            extract_signature(&headers),
            Err(WebhookError::MissingSignature)
        ));
    }

    #[test]
    fn event_type_prefers_numeric_code() {
        assert_eq!(event_type_of(&json!({"code": 3})), "3");
        assert_eq!(event_type_of(&json!({"event_type": "order_status"})), "order_status");
        assert_eq!(event_type_of(&json!({})), "unknown");
    }
}
