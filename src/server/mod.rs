//! HTTP surface of the bridge.
//!
//! - `POST /webhooks/shopee` - accepts deliveries (202 on success)
//! - `GET /health` - liveness probe
//! - `GET /api/v1/token/status` - token expiry projection
//! - `POST /api/v1/token/refresh` - refresh now (or report still-valid)
//! - `GET /api/v1/authorize/url` - signed authorization URL
//! - `GET /api/v1/authorize/callback` - code exchange redirect target
//! - `GET /api/v1/inbox` - inbox listing for operators
//! - `POST /api/v1/sync/orders` - run one incremental order sync
//! - `GET /api/v1/sync/log` - recorded sync runs

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::sync::mpsc;

pub mod admin;
pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::webhook_handler;

use crate::api::{ApiClient, HttpTransport};
use crate::auth::TokenLifecycle;
use crate::config::InvalidWebhookPolicy;
use crate::credential::CredentialStore;
use crate::sync::SyncPlanner;
use crate::types::IdempotencyKey;
use crate::webhook::coordinator::Coordinator;

/// Shared application state, passed to handlers via axum's `State`.
///
/// Generic over the HTTP transport so the full router can be exercised in
/// tests without a network.
pub struct AppState<T> {
    inner: Arc<AppStateInner<T>>,
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> Self {
        AppState {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AppStateInner<T> {
    client: ApiClient<T>,
    lifecycle: TokenLifecycle<T>,
    credential_store: CredentialStore,
    coordinator: Coordinator,
    planner: SyncPlanner,
    sender: mpsc::Sender<IdempotencyKey>,
    push_key: String,
    public_url: String,
    redirect_url: Option<String>,
    invalid_webhook_policy: InvalidWebhookPolicy,
}

impl<T: HttpTransport> AppState<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: ApiClient<T>,
        lifecycle: TokenLifecycle<T>,
        credential_store: CredentialStore,
        coordinator: Coordinator,
        planner: SyncPlanner,
        sender: mpsc::Sender<IdempotencyKey>,
        push_key: impl Into<String>,
        public_url: impl Into<String>,
        redirect_url: Option<String>,
        invalid_webhook_policy: InvalidWebhookPolicy,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                client,
                lifecycle,
                credential_store,
                coordinator,
                planner,
                sender,
                push_key: push_key.into(),
                public_url: public_url.into(),
                redirect_url,
                invalid_webhook_policy,
            }),
        }
    }

    pub fn client(&self) -> &ApiClient<T> {
        &self.inner.client
    }

    pub fn lifecycle(&self) -> &TokenLifecycle<T> {
        &self.inner.lifecycle
    }

    pub fn credential_store(&self) -> &CredentialStore {
        &self.inner.credential_store
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.inner.coordinator
    }

    pub fn planner(&self) -> &SyncPlanner {
        &self.inner.planner
    }

    pub fn sender(&self) -> &mpsc::Sender<IdempotencyKey> {
        &self.inner.sender
    }

    pub fn push_key(&self) -> &str {
        &self.inner.push_key
    }

    pub fn public_url(&self) -> &str {
        &self.inner.public_url
    }

    pub fn redirect_url(&self) -> Option<&str> {
        self.inner.redirect_url.as_deref()
    }

    pub fn invalid_webhook_policy(&self) -> InvalidWebhookPolicy {
        self.inner.invalid_webhook_policy
    }
}

/// Builds the axum router over the given state.
pub fn build_router<T>(state: AppState<T>) -> Router
where
    T: HttpTransport + Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/webhooks/shopee", post(webhook_handler::<T>))
        .route("/health", get(health_handler))
        .route("/api/v1/token/status", get(admin::token_status_handler::<T>))
        .route("/api/v1/token/refresh", post(admin::token_refresh_handler::<T>))
        .route("/api/v1/authorize/url", get(admin::authorize_url_handler::<T>))
        .route(
            "/api/v1/authorize/callback",
            get(admin::authorize_callback_handler::<T>),
        )
        .route("/api/v1/inbox", get(admin::inbox_handler::<T>))
        .route("/api/v1/sync/orders", post(admin::sync_orders_handler::<T>))
        .route("/api/v1/sync/log", get(admin::sync_log_handler::<T>))
        .with_state(state)
}
