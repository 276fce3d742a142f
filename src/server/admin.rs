//! Operator endpoints: token inspection and refresh, authorization flow,
//! inbox listing.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::AppState;
use crate::api::HttpTransport;
use crate::auth::lifecycle::{AuthError, RefreshStatus};
use crate::auth::build_authorize_url;
use crate::credential::{StoreError, TokenStatus};
use crate::sync::log::{SyncLogEntry, SyncLogError};
use crate::sync::orders::OrderSync;
use crate::sync::planner::SyncError;
use crate::types::{JobName, ShopId, now_epoch};
use crate::webhook::inbox::{InboxError, InboxStatus};

/// Errors surfaced to operators as JSON.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("missing query parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid query parameter {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },

    #[error("authorization failed: {0}")]
    Auth(#[from] AuthError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("inbox error: {0}")]
    Inbox(#[from] InboxError),

    #[error("sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("failed to build URL: {0}")]
    Url(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::MissingParameter(_) | AdminError::InvalidParameter { .. } => {
                StatusCode::BAD_REQUEST
            }
            AdminError::Auth(_) => StatusCode::BAD_GATEWAY,
            AdminError::Sync(SyncError::Log(SyncLogError::DuplicateRun { .. })) => {
                StatusCode::CONFLICT
            }
            AdminError::Sync(_)
            | AdminError::Store(_)
            | AdminError::Inbox(_)
            | AdminError::Url(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// GET /api/v1/token/status
pub async fn token_status_handler<T>(State(state): State<AppState<T>>) -> Json<TokenStatus>
where
    T: HttpTransport + Clone + Send + Sync + 'static,
{
    Json(state.lifecycle().token_status().await)
}

#[derive(Debug, Deserialize)]
pub struct RefreshParams {
    #[serde(default)]
    pub force: bool,
}

/// POST /api/v1/token/refresh
///
/// Always 200; the body's tagged `status` field reports the outcome, so an
/// external scheduler can poll this endpoint blindly.
pub async fn token_refresh_handler<T>(
    State(state): State<AppState<T>>,
    Query(params): Query<RefreshParams>,
) -> Json<RefreshStatus>
where
    T: HttpTransport + Clone + Send + Sync + 'static,
{
    Json(state.lifecycle().refresh_if_needed(params.force).await)
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub redirect: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeUrlResponse {
    pub url: String,
}

/// GET /api/v1/authorize/url
pub async fn authorize_url_handler<T>(
    State(state): State<AppState<T>>,
    Query(params): Query<AuthorizeParams>,
) -> Result<Json<AuthorizeUrlResponse>, AdminError>
where
    T: HttpTransport + Clone + Send + Sync + 'static,
{
    let redirect = params
        .redirect
        .or_else(|| state.redirect_url().map(str::to_string))
        .ok_or(AdminError::MissingParameter("redirect"))?;

    let credential = state.credential_store().snapshot().await;
    let url = build_authorize_url(state.client(), &credential, &redirect, now_epoch())
        .map_err(|e| AdminError::Url(e.to_string()))?;
    Ok(Json(AuthorizeUrlResponse { url: url.into() }))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: String,
    pub shop_id: Option<u64>,
}

/// GET /api/v1/authorize/callback
///
/// The redirect target of the authorization flow. Exchanges the one-time
/// code for the initial token pair; a shop id in the callback is adopted
/// when none is configured yet.
pub async fn authorize_callback_handler<T>(
    State(state): State<AppState<T>>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<TokenStatus>, AdminError>
where
    T: HttpTransport + Clone + Send + Sync + 'static,
{
    if let Some(shop_id) = params.shop_id {
        let current = state.credential_store().snapshot().await;
        if current.shop_id.is_none() {
            state
                .credential_store()
                .update(|cred| cred.shop_id = Some(ShopId(shop_id)))
                .await?;
            info!(shop_id, "adopted shop id from authorization callback");
        }
    }

    let status = state.lifecycle().exchange_code(&params.code).await?;
    Ok(Json(status))
}

/// POST /api/v1/sync/orders
///
/// Runs one incremental order sync, planned from the stored checkpoint.
/// The returned entry's `status` field reports the outcome, aborted runs
/// included; 409 when the planned window was already run.
pub async fn sync_orders_handler<T>(
    State(state): State<AppState<T>>,
) -> Result<Json<SyncLogEntry>, AdminError>
where
    T: HttpTransport + Clone + Send + Sync + 'static,
{
    let executor = OrderSync::new(state.client().clone());
    let entry = state
        .planner()
        .run(&JobName::new("sync_orders"), &executor)
        .await?;
    Ok(Json(entry))
}

/// GET /api/v1/sync/log
pub async fn sync_log_handler<T>(
    State(state): State<AppState<T>>,
) -> Result<Json<Vec<SyncLogEntry>>, AdminError>
where
    T: HttpTransport + Clone + Send + Sync + 'static,
{
    let entries = state.planner().log().list().map_err(SyncError::from)?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct InboxParams {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

/// Operator projection of an inbox entry. The payload itself is omitted;
/// this is a listing, not an export.
#[derive(Debug, Serialize)]
pub struct InboxItem {
    pub key: String,
    pub event_type: String,
    pub status: InboxStatus,
    pub attempts: u32,
    pub received_at: i64,
    pub next_retry_at: Option<i64>,
    pub last_error: Option<String>,
    pub summary: String,
}

/// GET /api/v1/inbox
pub async fn inbox_handler<T>(
    State(state): State<AppState<T>>,
    Query(params): Query<InboxParams>,
) -> Result<Json<Vec<InboxItem>>, AdminError>
where
    T: HttpTransport + Clone + Send + Sync + 'static,
{
    let status = params.status.as_deref().map(parse_status).transpose()?;
    let limit = params.limit.unwrap_or(100);

    let items = state
        .coordinator()
        .inbox()
        .list(status)?
        .into_iter()
        .take(limit)
        .map(|entry| InboxItem {
            key: entry.idempotency_key.as_str().to_string(),
            event_type: entry.event_type.clone(),
            status: entry.status,
            attempts: entry.attempts,
            received_at: entry.received_at,
            next_retry_at: entry.next_retry_at,
            last_error: entry.last_error.clone(),
            summary: entry.summary(),
        })
        .collect();
    Ok(Json(items))
}

fn parse_status(raw: &str) -> Result<InboxStatus, AdminError> {
    match raw {
        "queued" => Ok(InboxStatus::Queued),
        "processing" => Ok(InboxStatus::Processing),
        "done" => Ok(InboxStatus::Done),
        "failed" => Ok(InboxStatus::Failed),
        "invalid_signature" => Ok(InboxStatus::InvalidSignature),
        other => Err(AdminError::InvalidParameter {
            name: "status",
            message: format!("unknown status {other:?}"),
        }),
    }
}
