//! Token lifecycle: code exchange and clock-skew-safe refresh.
//!
//! Refresh is serialized through the credential store's refresh lock so two
//! triggers (scheduled check, on-demand endpoint) cannot race to spend the
//! same refresh_token. The credential is re-read after the lock is acquired;
//! whoever lost the race sees the already-refreshed token and returns
//! `StillValid` without a network call.
//!
//! A failed refresh writes nothing: the previous token pair stays intact so
//! the operation can be retried once the upstream recovers.

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::api::endpoint::{ACCESS_TOKEN_GET, TOKEN_GET};
use crate::api::{ApiClient, ApiError, HttpTransport, RetryConfig, retry_with_backoff};
use crate::credential::{CredentialStore, StoreError, TokenStatus};
#[cfg(test)]
use crate::credential::Credential;
use crate::types::now_epoch;

/// Assumed token lifetime when the exchange response omits `expire_in`.
const DEFAULT_EXPIRE_IN_SECONDS: i64 = 14_400;

/// Errors from the code exchange path.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("token response missing field: {0}")]
    MissingField(&'static str),
}

/// Outcome of a refresh decision. Transient failures are reported, not
/// raised: the caller (scheduler or operator endpoint) only ever observes
/// one of these three states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshStatus {
    /// The current token has enough lifetime left; no call was made.
    StillValid { seconds_remaining: i64 },

    /// A new token pair was obtained and persisted.
    Refreshed { expires_in: i64 },

    /// The refresh could not complete; the stored credential is unchanged.
    Failed { message: String },
}

/// Drives the token lifecycle for one credential.
#[derive(Debug, Clone)]
pub struct TokenLifecycle<T> {
    client: ApiClient<T>,
    store: CredentialStore,
    buffer_seconds: i64,
    retry: RetryConfig,
}

impl<T: HttpTransport> TokenLifecycle<T> {
    pub fn new(client: ApiClient<T>, store: CredentialStore, buffer_seconds: i64) -> Self {
        TokenLifecycle {
            client,
            store,
            buffer_seconds,
            retry: RetryConfig::DEFAULT,
        }
    }

    /// Read-only token status for operator surfaces.
    pub async fn token_status(&self) -> TokenStatus {
        let credential = self.store.snapshot().await;
        credential.token_status(now_epoch(), self.buffer_seconds)
    }

    /// Exchanges a one-time authorization code for the initial token pair.
    ///
    /// Both tokens are required in the response; `expire_in` defaults to
    /// four hours when the upstream omits it.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenStatus, AuthError> {
        let credential = self.store.snapshot().await;

        let mut body = json!({
            "code": code,
            "partner_id": credential.partner_id.0,
        });
        if let Some(shop_id) = credential.shop_id {
            body["shop_id"] = json!(shop_id.0);
        } else if let Some(merchant_id) = credential.merchant_id {
            body["main_account_id"] = json!(merchant_id.0);
        }

        let response = retry_with_backoff(self.retry, || {
            self.client.call(&TOKEN_GET, &credential, &[], Some(body.clone()))
        })
        .await?;

        let access_token = require_str(&response, "access_token")?;
        let refresh_token = require_str(&response, "refresh_token")?;
        let expire_in = response
            .get("expire_in")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_EXPIRE_IN_SECONDS);
        let now = now_epoch();

        let updated = self
            .store
            .update(|cred| {
                cred.access_token = Some(access_token.clone());
                cred.refresh_token = Some(refresh_token.clone());
                cred.token_expire_at = Some(now + expire_in);
            })
            .await?;

        info!(expire_in, "authorization code exchanged");
        Ok(updated.token_status(now, self.buffer_seconds))
    }

    /// Refreshes the access token when it is missing or inside the expiry
    /// buffer; `force` skips the buffer check.
    ///
    /// Holds the refresh lock for the whole round-trip. Never returns `Err`:
    /// transient failures become [`RefreshStatus::Failed`] and leave the
    /// stored credential untouched.
    pub async fn refresh_if_needed(&self, force: bool) -> RefreshStatus {
        let lock = self.store.refresh_lock();
        let _guard = lock.lock().await;

        // Re-read under the lock: a concurrent refresh may have already run.
        let credential = self.store.snapshot().await;
        let now = now_epoch();

        if !force && !credential.refresh_due(now, self.buffer_seconds) {
            let seconds_remaining = credential.seconds_remaining(now).unwrap_or(0);
            return RefreshStatus::StillValid { seconds_remaining };
        }

        let Some(refresh_token) = credential.refresh_token.clone() else {
            warn!("refresh due but no refresh_token is stored; re-authorization required");
            return RefreshStatus::Failed {
                message: "no refresh_token stored; re-authorization required".to_string(),
            };
        };

        let mut body = json!({
            "partner_id": credential.partner_id.0,
            "refresh_token": refresh_token,
        });
        if let Some(shop_id) = credential.shop_id {
            body["shop_id"] = json!(shop_id.0);
        } else if let Some(merchant_id) = credential.merchant_id {
            body["merchant_id"] = json!(merchant_id.0);
        }

        let response = match retry_with_backoff(self.retry, || {
            self.client
                .call(&ACCESS_TOKEN_GET, &credential, &[], Some(body.clone()))
        })
        .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                return RefreshStatus::Failed {
                    message: e.to_string(),
                };
            }
        };

        // A refresh that does not report both a token and a lifetime is
        // unusable; treat it as a failure rather than storing a token whose
        // expiry is unknown.
        let access_token = match response.get("access_token").and_then(Value::as_str) {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => {
                warn!("token refresh response missing access_token");
                return RefreshStatus::Failed {
                    message: "refresh response missing access_token".to_string(),
                };
            }
        };
        let expire_in = match response.get("expire_in").and_then(Value::as_i64) {
            Some(expire_in) if expire_in > 0 => expire_in,
            _ => {
                warn!("token refresh response missing expire_in");
                return RefreshStatus::Failed {
                    message: "refresh response missing expire_in".to_string(),
                };
            }
        };
        // Upstream may rotate the refresh token; keep the previous one when
        // the response omits it.
        let next_refresh_token = response
            .get("refresh_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let update = self
            .store
            .update(|cred| {
                cred.access_token = Some(access_token.clone());
                if let Some(token) = next_refresh_token.clone() {
                    cred.refresh_token = Some(token);
                }
                cred.token_expire_at = Some(now + expire_in);
            })
            .await;

        match update {
            Ok(_) => {
                info!(expire_in, "access token refreshed");
                RefreshStatus::Refreshed { expires_in: expire_in }
            }
            Err(e) => {
                warn!(error = %e, "failed to persist refreshed token");
                RefreshStatus::Failed {
                    message: format!("persist failed: {e}"),
                }
            }
        }
    }
}

fn require_str(response: &Value, field: &'static str) -> Result<String, AuthError> {
    response
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(AuthError::MissingField(field))
}
