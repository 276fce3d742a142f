//! OAuth lifecycle: authorization URL, code exchange, token refresh.

pub mod authorize;
pub mod lifecycle;

pub use authorize::build_authorize_url;
pub use lifecycle::{AuthError, RefreshStatus, TokenLifecycle};
