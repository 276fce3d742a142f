//! Webhook ingestion: signature verification, idempotency keys, the durable
//! inbox, and the retry coordinator.

pub mod coordinator;
pub mod idempotency;
pub mod inbox;
pub mod verify;

pub use coordinator::{BACKOFF_SCHEDULE_SECONDS, ClaimGuard, Coordinator, MAX_ATTEMPTS};
pub use idempotency::derive_key;
pub use inbox::{InboxEntry, InboxError, InboxStatus, InboxStore, Ingest};
pub use verify::{MAX_TIMESTAMP_DRIFT_SECONDS, WebhookSignature, verify_webhook};
