//! Core domain types.

mod ids;

pub use ids::{IdempotencyKey, InboxId, JobName, MerchantId, PartnerId, ShopId};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which Shopee environment a credential targets.
///
/// The environment selects the API host; everything else (paths, signing)
/// is identical between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Test,
    Live,
}

impl Environment {
    /// Base URL of the partner API for this environment.
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Live => "https://partner.shopeemobile.com",
            Environment::Test => "https://partner.test-stable.shopeemobile.com",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Live => write!(f, "live"),
        }
    }
}

/// Current epoch time in whole seconds.
pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}
