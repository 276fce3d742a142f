//! API error types.
//!
//! The client never raises across its boundary: every failure becomes an
//! [`ApiError`] with a [`kind`](ApiErrorKind) that callers match on. The
//! kind also drives retry decisions: rate limits and transport faults are
//! retriable, everything else is not.

use std::fmt;
use thiserror::Error;

/// The kind of API error, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Transport-level failure: connect error, timeout, DNS. Retriable.
    Request,

    /// Upstream throttling (HTTP 429). Retriable with backoff, never fatal.
    RateLimited,

    /// Non-JSON or unexpected HTTP response; the raw body text is carried
    /// in the message.
    Http,

    /// The upstream returned a structured `{error, message}` payload.
    Upstream,

    /// No usable access token for an authenticated endpoint.
    AuthRequired,
}

impl ApiErrorKind {
    /// Whether an error of this kind is safe to retry as-is.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ApiErrorKind::Request | ApiErrorKind::RateLimited)
    }
}

/// A categorized API failure.
#[derive(Debug, Error)]
pub struct ApiError {
    pub kind: ApiErrorKind,

    /// HTTP status, when a response was received at all.
    pub status: Option<u16>,

    /// Human-readable description. For `Http` this carries the (truncated)
    /// raw response text.
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "{:?} (HTTP {}): {}", self.kind, code, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl ApiError {
    pub fn request(message: impl Into<String>) -> Self {
        ApiError {
            kind: ApiErrorKind::Request,
            status: None,
            message: message.into(),
        }
    }

    pub fn auth_required(message: impl Into<String>) -> Self {
        ApiError {
            kind: ApiErrorKind::AuthRequired,
            status: None,
            message: message.into(),
        }
    }

    pub fn http(status: u16, body: impl Into<String>) -> Self {
        ApiError {
            kind: ApiErrorKind::Http,
            status: Some(status),
            message: truncate(body.into(), 300),
        }
    }

    pub fn rate_limited(status: u16, body: impl Into<String>) -> Self {
        ApiError {
            kind: ApiErrorKind::RateLimited,
            status: Some(status),
            message: truncate(body.into(), 300),
        }
    }

    pub fn upstream(status: Option<u16>, error: &str, message: &str) -> Self {
        ApiError {
            kind: ApiErrorKind::Upstream,
            status,
            message: format!("{error}: {message}"),
        }
    }
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
        s.push('…');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_kinds() {
        assert!(ApiErrorKind::Request.is_retriable());
        assert!(ApiErrorKind::RateLimited.is_retriable());
        assert!(!ApiErrorKind::Http.is_retriable());
        assert!(!ApiErrorKind::Upstream.is_retriable());
        assert!(!ApiErrorKind::AuthRequired.is_retriable());
    }

    #[test]
    fn http_error_truncates_body() {
        let err = ApiError::http(500, "x".repeat(1000));
        assert!(err.message.len() <= 304); // 300 + ellipsis bytes
        assert!(err.message.ends_with('…'));
    }

    #[test]
    fn display_includes_status() {
        let err = ApiError::http(502, "bad gateway");
        assert_eq!(err.to_string(), "Http (HTTP 502): bad gateway");
        let err = ApiError::request("timed out");
        assert_eq!(err.to_string(), "Request: timed out");
    }
}
