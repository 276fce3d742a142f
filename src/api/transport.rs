//! HTTP transport seam.
//!
//! The client is generic over [`HttpTransport`] so tests exercise the full
//! signing and response-normalization path against a scripted transport
//! while production uses [`ReqwestTransport`].

use std::future::Future;
use std::time::Duration;

use crate::api::endpoint::Method;

/// Bounded timeout applied to every outbound call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A fully prepared outbound request (URL already carries the signed query).
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<serde_json::Value>,
}

/// A raw response: status plus body text, before any normalization.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Transport-level failure (connect error, timeout, DNS).
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        TransportError {
            message: message.into(),
        }
    }
}

/// Executes prepared HTTP requests.
pub trait HttpTransport {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

/// Production transport backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a transport with the bounded request timeout.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::new(format!("failed to build HTTP client: {e}")))?;
        Ok(ReqwestTransport { client })
    }
}

impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => {
                let builder = self.client.post(&request.url);
                match &request.body {
                    Some(body) => builder.json(body),
                    None => builder,
                }
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::new(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::new(e.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}
