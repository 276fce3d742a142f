//! Process configuration from environment variables.
//!
//! Everything is prefixed `SHOPEE_`. Partner id and key are required; the
//! rest has workable defaults for a test-environment deployment.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::credential::Credential;
use crate::types::{Environment, MerchantId, PartnerId, ShopId};

/// What to do with a delivery whose signature does not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidWebhookPolicy {
    /// Reject with 401 and persist nothing.
    #[default]
    Reject,
    /// Persist for operator inspection (never processed), still 401.
    Persist,
}

/// Configuration problems that prevent startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {message}")]
    Invalid {
        name: &'static str,
        message: String,
    },
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub listen_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub environment: Environment,
    pub partner_id: PartnerId,
    pub partner_key: String,
    pub shop_id: Option<ShopId>,
    pub merchant_id: Option<MerchantId>,
    /// Externally visible URL of the webhook endpoint; the push
    /// authorization signature is computed over this exact string.
    pub public_url: String,
    /// Dedicated webhook push key; falls back to the partner key.
    pub push_key: Option<String>,
    /// Where the authorization flow sends the merchant back to.
    pub redirect_url: Option<String>,
    pub invalid_webhook_policy: InvalidWebhookPolicy,
}

impl BridgeConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = optional("SHOPEE_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| ConfigError::Invalid {
                name: "SHOPEE_LISTEN_ADDR",
                message: format!("{e}"),
            })?;

        let environment = match optional("SHOPEE_ENV").as_deref() {
            None | Some("test") => Environment::Test,
            Some("live") => Environment::Live,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "SHOPEE_ENV",
                    message: format!("expected \"test\" or \"live\", got {other:?}"),
                });
            }
        };

        let partner_id = PartnerId(parse_u64(required("SHOPEE_PARTNER_ID")?, "SHOPEE_PARTNER_ID")?);
        let partner_key = required("SHOPEE_PARTNER_KEY")?;
        let shop_id = optional("SHOPEE_SHOP_ID")
            .map(|v| parse_u64(v, "SHOPEE_SHOP_ID").map(ShopId))
            .transpose()?;
        let merchant_id = optional("SHOPEE_MERCHANT_ID")
            .map(|v| parse_u64(v, "SHOPEE_MERCHANT_ID").map(MerchantId))
            .transpose()?;

        let invalid_webhook_policy = match optional("SHOPEE_INVALID_WEBHOOK").as_deref() {
            None | Some("reject") => InvalidWebhookPolicy::Reject,
            Some("persist") => InvalidWebhookPolicy::Persist,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "SHOPEE_INVALID_WEBHOOK",
                    message: format!("expected \"reject\" or \"persist\", got {other:?}"),
                });
            }
        };

        Ok(BridgeConfig {
            listen_addr,
            data_dir: optional("SHOPEE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            environment,
            partner_id,
            partner_key,
            shop_id,
            merchant_id,
            public_url: required("SHOPEE_PUBLIC_URL")?,
            push_key: optional("SHOPEE_PUSH_KEY"),
            redirect_url: optional("SHOPEE_REDIRECT_URL"),
            invalid_webhook_policy,
        })
    }

    /// The key used to verify inbound webhook signatures.
    pub fn push_key(&self) -> &str {
        self.push_key.as_deref().unwrap_or(&self.partner_key)
    }

    /// The credential used to seed the store on first start.
    pub fn initial_credential(&self) -> Credential {
        let mut credential = Credential::new(self.partner_id, self.partner_key.clone(), self.environment);
        credential.shop_id = self.shop_id;
        credential.merchant_id = self.merchant_id;
        credential
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_u64(value: String, name: &'static str) -> Result<u64, ConfigError> {
    value.parse().map_err(|e| ConfigError::Invalid {
        name,
        message: format!("{e}"),
    })
}
