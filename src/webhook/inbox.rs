//! Durable webhook inbox.
//!
//! One JSON file per logical event, named by idempotency key, so a repeat
//! delivery lands on the existing file and is coalesced instead of creating
//! a second record. Files are written atomically; an entry is never observed
//! half-written.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::persistence::{self, PersistError};
use crate::types::{IdempotencyKey, InboxId};

/// Errors from inbox operations.
#[derive(Debug, Error)]
pub enum InboxError {
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),

    #[error("no inbox entry for key {0}")]
    NotFound(IdempotencyKey),
}

/// Lifecycle state of an inbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxStatus {
    /// Accepted and waiting for a worker.
    Queued,
    /// Claimed by a worker; no other worker may touch it.
    Processing,
    /// Processed successfully. Terminal.
    Done,
    /// Processing failed. Retried while attempts remain, terminal after.
    Failed,
    /// Stored for operator inspection; never processed.
    InvalidSignature,
}

impl std::fmt::Display for InboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InboxStatus::Queued => "queued",
            InboxStatus::Processing => "processing",
            InboxStatus::Done => "done",
            InboxStatus::Failed => "failed",
            InboxStatus::InvalidSignature => "invalid_signature",
        };
        write!(f, "{s}")
    }
}

/// One received webhook event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxEntry {
    pub id: InboxId,
    pub idempotency_key: IdempotencyKey,
    pub event_type: String,
    pub payload: Value,
    /// Epoch seconds of first receipt. Repeat deliveries do not change it.
    pub received_at: i64,
    pub status: InboxStatus,
    /// Processing attempts so far (claims, not deliveries).
    pub attempts: u32,
    pub last_error: Option<String>,
    /// When a failed entry becomes due for retry. `None` on terminal
    /// failures and non-failed entries.
    pub next_retry_at: Option<i64>,
}

impl InboxEntry {
    /// One-line operator summary.
    pub fn summary(&self) -> String {
        format!(
            "{} | {} | attempts: {}",
            self.status, self.event_type, self.attempts
        )
    }
}

/// Outcome of ingesting a delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    /// First delivery of this event.
    Created(InboxEntry),
    /// The key already has an entry; nothing was written.
    Duplicate(InboxEntry),
}

impl Ingest {
    pub fn entry(&self) -> &InboxEntry {
        match self {
            Ingest::Created(e) | Ingest::Duplicate(e) => e,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Ingest::Duplicate(_))
    }
}

/// Directory-backed inbox, one file per idempotency key.
#[derive(Debug, Clone)]
pub struct InboxStore {
    dir: PathBuf,
}

impl InboxStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, InboxError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(PersistError::from)?;
        Ok(InboxStore { dir })
    }

    fn entry_path(&self, key: &IdempotencyKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }

    /// Ingests a delivery with the given status.
    ///
    /// A delivery whose key already has an entry is coalesced: the existing
    /// entry is returned unchanged, whatever its status. An event being
    /// processed, done, or terminally failed is not re-queued by a repeat
    /// delivery.
    pub fn ingest(
        &self,
        key: IdempotencyKey,
        event_type: impl Into<String>,
        payload: Value,
        status: InboxStatus,
        now: i64,
    ) -> Result<Ingest, InboxError> {
        if let Some(existing) = self.get(&key)? {
            return Ok(Ingest::Duplicate(existing));
        }
        let entry = InboxEntry {
            id: InboxId::new(key.as_str()),
            idempotency_key: key,
            event_type: event_type.into(),
            payload,
            received_at: now,
            status,
            attempts: 0,
            last_error: None,
            next_retry_at: None,
        };
        self.save(&entry)?;
        Ok(Ingest::Created(entry))
    }

    /// Loads the entry for `key`, if any.
    pub fn get(&self, key: &IdempotencyKey) -> Result<Option<InboxEntry>, InboxError> {
        match persistence::load_json::<InboxEntry>(&self.entry_path(key)) {
            Ok(entry) => Ok(Some(entry)),
            Err(PersistError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically rewrites an entry.
    pub fn save(&self, entry: &InboxEntry) -> Result<(), InboxError> {
        persistence::save_json_atomic(&self.entry_path(&entry.idempotency_key), entry)?;
        Ok(())
    }

    /// All entries, newest first, optionally filtered by status.
    pub fn list(&self, status: Option<InboxStatus>) -> Result<Vec<InboxEntry>, InboxError> {
        let mut entries = Vec::new();
        for dirent in std::fs::read_dir(&self.dir).map_err(PersistError::from)? {
            let path = dirent.map_err(PersistError::from)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let entry = persistence::load_json::<InboxEntry>(&path)?;
            if status.is_none_or(|s| entry.status == s) {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(entries)
    }

    /// Failed entries whose retry time has arrived.
    pub fn due_retries(&self, now: i64) -> Result<Vec<InboxEntry>, InboxError> {
        let mut due: Vec<InboxEntry> = self
            .list(Some(InboxStatus::Failed))?
            .into_iter()
            .filter(|e| e.next_retry_at.is_some_and(|at| at <= now))
            .collect();
        due.sort_by_key(|e| e.next_retry_at);
        Ok(due)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn store() -> (InboxStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = InboxStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn key(s: &str) -> IdempotencyKey {
        IdempotencyKey::new(s)
    }

    #[test]
    fn ingest_creates_then_coalesces() {
        let (store, _dir) = store();

        let first = store
            .ingest(key("evt-1"), "order_status", json!({"n": 1}), InboxStatus::Queued, 100)
            .unwrap();
        assert!(matches!(first, Ingest::Created(_)));

        // Second delivery, possibly with a slightly different body.
        let second = store
            .ingest(key("evt-1"), "order_status", json!({"n": 2}), InboxStatus::Queued, 200)
            .unwrap();
        assert!(second.is_duplicate());
        // The original payload and receipt time are preserved.
        assert_eq!(second.entry().payload, json!({"n": 1}));
        assert_eq!(second.entry().received_at, 100);
    }

    #[test]
    fn repeat_delivery_does_not_requeue_done_entries() {
        let (store, _dir) = store();
        store
            .ingest(key("evt-1"), "order_status", json!({}), InboxStatus::Queued, 100)
            .unwrap();

        let mut entry = store.get(&key("evt-1")).unwrap().unwrap();
        entry.status = InboxStatus::Done;
        store.save(&entry).unwrap();

        let repeat = store
            .ingest(key("evt-1"), "order_status", json!({}), InboxStatus::Queued, 200)
            .unwrap();
        assert!(repeat.is_duplicate());
        assert_eq!(repeat.entry().status, InboxStatus::Done);
    }

    #[test]
    fn list_filters_by_status_newest_first() {
        let (store, _dir) = store();
        store
            .ingest(key("a"), "t", json!({}), InboxStatus::Queued, 100)
            .unwrap();
        store
            .ingest(key("b"), "t", json!({}), InboxStatus::Queued, 300)
            .unwrap();
        store
            .ingest(key("c"), "t", json!({}), InboxStatus::InvalidSignature, 200)
            .unwrap();

        let queued = store.list(Some(InboxStatus::Queued)).unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].idempotency_key, key("b"));
        assert_eq!(queued[1].idempotency_key, key("a"));

        let all = store.list(None).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn due_retries_respects_next_retry_at() {
        let (store, _dir) = store();
        for (k, next_retry_at) in [("a", Some(100)), ("b", Some(500)), ("c", None)] {
            store
                .ingest(key(k), "t", json!({}), InboxStatus::Queued, 50)
                .unwrap();
            let mut entry = store.get(&key(k)).unwrap().unwrap();
            entry.status = InboxStatus::Failed;
            entry.next_retry_at = next_retry_at;
            store.save(&entry).unwrap();
        }

        let due = store.due_retries(200).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].idempotency_key, key("a"));

        // Terminal failures (no retry time) are never due.
        let due = store.due_retries(i64::MAX).unwrap();
        assert_eq!(due.len(), 2);
    }

    #[test]
    fn summary_shape() {
        let (store, _dir) = store();
        store
            .ingest(key("a"), "order_status", json!({}), InboxStatus::Queued, 100)
            .unwrap();
        let entry = store.get(&key("a")).unwrap().unwrap();
        assert_eq!(entry.summary(), "queued | order_status | attempts: 0");
    }
}
