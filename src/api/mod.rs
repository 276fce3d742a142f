//! Signed API access: endpoint descriptors, the generic client, response
//! normalization, and bounded retry.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod retry;
pub mod transport;

pub use client::ApiClient;
pub use endpoint::{Endpoint, Method, Signing};
pub use error::{ApiError, ApiErrorKind};
pub use retry::{RetryConfig, retry_with_backoff};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
