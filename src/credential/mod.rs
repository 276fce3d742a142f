//! Partner/shop credential state.
//!
//! The credential is the single most contended record in the system: the
//! token lifecycle mutates it on every refresh and the sync planner advances
//! its checkpoint. All mutation goes through [`store::CredentialStore`],
//! which enforces read-modify-write under a lock.

pub mod store;

pub use store::{CredentialStore, StoreError};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::{Environment, MerchantId, PartnerId, ShopId};

/// Default refresh buffer: refresh when less than this many seconds remain.
pub const DEFAULT_REFRESH_BUFFER_SECONDS: i64 = 600;

/// Configuration problems that make a credential unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("partner_id is not set")]
    MissingPartnerId,

    #[error("partner_key is not set")]
    MissingPartnerKey,

    #[error("neither shop_id nor merchant_id is set")]
    MissingShopOrMerchant,
}

/// The partner identity and current token pair for one integration.
///
/// Created once at setup with empty tokens; mutated by the token lifecycle
/// on every refresh and by the OAuth exchange on first authorization. Never
/// deleted, only rotated.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub partner_id: PartnerId,
    /// Partner secret used as the HMAC key. Never logged in full.
    pub partner_key: String,
    pub shop_id: Option<ShopId>,
    pub merchant_id: Option<MerchantId>,
    pub environment: Environment,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Epoch seconds at which the access token expires.
    pub token_expire_at: Option<i64>,
    /// Checkpoint of the last fully successful sync window, epoch seconds.
    pub last_success_sync_at: Option<i64>,
    /// Safety buffer subtracted from the checkpoint when planning the next
    /// sync window, and compared against remaining token lifetime when
    /// deciding whether a refresh is due.
    pub overlap_seconds: i64,
}

impl Credential {
    /// Creates a credential with empty tokens, as at integration setup.
    pub fn new(partner_id: PartnerId, partner_key: impl Into<String>, environment: Environment) -> Self {
        Credential {
            partner_id,
            partner_key: partner_key.into(),
            shop_id: None,
            merchant_id: None,
            environment,
            access_token: None,
            refresh_token: None,
            token_expire_at: None,
            last_success_sync_at: None,
            overlap_seconds: DEFAULT_REFRESH_BUFFER_SECONDS,
        }
    }

    /// Checks that the fields required for any signed call are present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.partner_id.0 == 0 {
            return Err(ValidationError::MissingPartnerId);
        }
        if self.partner_key.is_empty() {
            return Err(ValidationError::MissingPartnerKey);
        }
        if self.shop_id.is_none() && self.merchant_id.is_none() {
            return Err(ValidationError::MissingShopOrMerchant);
        }
        Ok(())
    }

    /// The shop or merchant id used in signing and token calls.
    ///
    /// Exactly one of the two is meaningful per call; shop_id takes
    /// precedence when both are somehow set.
    pub fn shop_or_merchant_id(&self) -> Option<u64> {
        self.shop_id
            .map(|s| s.0)
            .or_else(|| self.merchant_id.map(|m| m.0))
    }

    /// Seconds until token expiry relative to `now`. Negative when expired,
    /// `None` when no expiry is recorded.
    pub fn seconds_remaining(&self, now: i64) -> Option<i64> {
        self.token_expire_at.map(|at| at - now)
    }

    /// Whether a refresh is due: no token, no recorded expiry, or fewer than
    /// `buffer_seconds` remaining.
    pub fn refresh_due(&self, now: i64, buffer_seconds: i64) -> bool {
        if self.access_token.is_none() {
            return true;
        }
        match self.seconds_remaining(now) {
            Some(remaining) => remaining <= buffer_seconds,
            None => true,
        }
    }

    /// Read-only token status projection for operator surfaces.
    pub fn token_status(&self, now: i64, buffer_seconds: i64) -> TokenStatus {
        let expires_in = self.seconds_remaining(now);
        TokenStatus {
            has_access_token: self.access_token.is_some(),
            expires_in,
            expires_soon: self.refresh_due(now, buffer_seconds),
        }
    }
}

// Manual Debug so the secret fields cannot leak through logging.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("partner_id", &self.partner_id)
            .field("partner_key", &mask_secret(&self.partner_key))
            .field("shop_id", &self.shop_id)
            .field("merchant_id", &self.merchant_id)
            .field("environment", &self.environment)
            .field("access_token", &self.access_token.as_deref().map(mask_secret))
            .field("refresh_token", &self.refresh_token.as_deref().map(mask_secret))
            .field("token_expire_at", &self.token_expire_at)
            .field("last_success_sync_at", &self.last_success_sync_at)
            .field("overlap_seconds", &self.overlap_seconds)
            .finish()
    }
}

/// Token status projection exposed to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStatus {
    pub has_access_token: bool,
    pub expires_in: Option<i64>,
    pub expires_soon: bool,
}

/// Masks a secret for logging: first four characters, then asterisks.
pub fn mask_secret(value: &str) -> String {
    if value.is_empty() {
        return "<empty>".to_string();
    }
    if value.len() <= 4 {
        return "*".repeat(value.chars().count());
    }
    // get() avoids a panic should a secret ever contain multi-byte characters
    match value.get(..4) {
        Some(prefix) => format!("{}…{}", prefix, "*".repeat(value.len() - 4)),
        None => "*".repeat(value.chars().count()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential_with_expiry(expire_at: Option<i64>) -> Credential {
        let mut cred = Credential::new(PartnerId(123), "secret-key", Environment::Test);
        cred.shop_id = Some(ShopId(777));
        cred.access_token = Some("A1".into());
        cred.refresh_token = Some("R1".into());
        cred.token_expire_at = expire_at;
        cred
    }

    #[test]
    fn validate_requires_partner_fields() {
        let cred = Credential::new(PartnerId(0), "k", Environment::Test);
        assert_eq!(cred.validate(), Err(ValidationError::MissingPartnerId));

        let cred = Credential::new(PartnerId(1), "", Environment::Test);
        assert_eq!(cred.validate(), Err(ValidationError::MissingPartnerKey));

        let cred = Credential::new(PartnerId(1), "k", Environment::Test);
        assert_eq!(cred.validate(), Err(ValidationError::MissingShopOrMerchant));
    }

    #[test]
    fn shop_id_takes_precedence_over_merchant_id() {
        let mut cred = Credential::new(PartnerId(1), "k", Environment::Test);
        cred.shop_id = Some(ShopId(10));
        cred.merchant_id = Some(MerchantId(20));
        assert_eq!(cred.shop_or_merchant_id(), Some(10));

        cred.shop_id = None;
        assert_eq!(cred.shop_or_merchant_id(), Some(20));
    }

    #[test]
    fn refresh_due_inside_buffer() {
        let cred = credential_with_expiry(Some(1_000));
        // 400 seconds remaining, buffer 600 -> due
        assert!(cred.refresh_due(600, 600));
        // 700 seconds remaining, buffer 600 -> not due
        assert!(!cred.refresh_due(300, 600));
        // exactly at the buffer boundary -> due
        assert!(cred.refresh_due(400, 600));
    }

    #[test]
    fn refresh_due_without_token_or_expiry() {
        let mut cred = credential_with_expiry(None);
        assert!(cred.refresh_due(0, 600));

        cred.access_token = None;
        cred.token_expire_at = Some(i64::MAX);
        assert!(cred.refresh_due(0, 600));
    }

    #[test]
    fn token_status_projection() {
        let cred = credential_with_expiry(Some(5_000));
        let status = cred.token_status(1_000, 600);
        assert!(status.has_access_token);
        assert_eq!(status.expires_in, Some(4_000));
        assert!(!status.expires_soon);

        let status = cred.token_status(4_700, 600);
        assert!(status.expires_soon);
    }

    #[test]
    fn debug_never_prints_full_secrets() {
        let cred = credential_with_expiry(Some(1));
        let debug = format!("{:?}", cred);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("secr…"));
    }

    #[test]
    fn mask_secret_shapes() {
        assert_eq!(mask_secret(""), "<empty>");
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret("abcdefgh"), "abcd…****");
    }
}
