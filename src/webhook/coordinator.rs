//! Retry coordination for inbox processing.
//!
//! The coordinator enforces two rules on top of the durable inbox:
//!
//! - Per-key exclusivity: a key is processed by at most one worker at a
//!   time, tracked by an in-memory in-flight set. Different keys proceed in
//!   parallel.
//! - Bounded retries: each failure schedules the next attempt on a fixed
//!   backoff schedule until the attempt cap, after which the entry is
//!   terminally failed and only operator action can revive it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::types::IdempotencyKey;
use crate::webhook::inbox::{InboxEntry, InboxError, InboxStatus, InboxStore};

/// Delay before attempt N+1 after failure N (1-indexed by attempts made).
/// The last delay repeats should the cap ever be raised above its length.
pub const BACKOFF_SCHEDULE_SECONDS: &[i64] = &[60, 300, 900, 3_600, 10_800];

/// Total processing attempts before an entry is terminally failed.
pub const MAX_ATTEMPTS: u32 = 5;

/// Coordinates claims and retries over one inbox.
#[derive(Debug, Clone)]
pub struct Coordinator {
    inbox: InboxStore,
    in_flight: Arc<Mutex<HashSet<IdempotencyKey>>>,
    max_attempts: u32,
}

/// A successful claim. Holds the key's in-flight slot; dropping the guard
/// (on completion, failure, or panic) releases the slot so the key can be
/// claimed again.
pub struct ClaimGuard {
    key: IdempotencyKey,
    entry: InboxEntry,
    in_flight: Arc<Mutex<HashSet<IdempotencyKey>>>,
}

impl ClaimGuard {
    pub fn entry(&self) -> &InboxEntry {
        &self.entry
    }

    pub fn key(&self) -> &IdempotencyKey {
        &self.key
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .expect("in-flight set lock poisoned")
            .remove(&self.key);
    }
}

impl Coordinator {
    pub fn new(inbox: InboxStore) -> Self {
        Coordinator {
            inbox,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            max_attempts: MAX_ATTEMPTS,
        }
    }

    pub fn inbox(&self) -> &InboxStore {
        &self.inbox
    }

    /// Attempts to claim `key` for processing.
    ///
    /// Returns `None` when the key is already in flight, has no entry, or
    /// its entry is not claimable (done, invalid, terminally failed, or a
    /// failed entry whose retry time has not arrived). On success the entry
    /// is moved to `processing` with its attempt counter bumped, durably,
    /// before the guard is handed out.
    pub fn claim(&self, key: &IdempotencyKey, now: i64) -> Result<Option<ClaimGuard>, InboxError> {
        {
            let mut in_flight = self.in_flight.lock().expect("in-flight set lock poisoned");
            if !in_flight.insert(key.clone()) {
                debug!(key = %key, "claim refused: already in flight");
                return Ok(None);
            }
        }

        // The slot is held from here; release it on every early return.
        let release = |key: &IdempotencyKey| {
            self.in_flight
                .lock()
                .expect("in-flight set lock poisoned")
                .remove(key);
        };

        let entry = match self.inbox.get(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                release(key);
                return Ok(None);
            }
            Err(e) => {
                release(key);
                return Err(e);
            }
        };

        let claimable = match entry.status {
            InboxStatus::Queued => true,
            InboxStatus::Failed => {
                entry.attempts < self.max_attempts
                    && entry.next_retry_at.is_some_and(|at| at <= now)
            }
            InboxStatus::Processing | InboxStatus::Done | InboxStatus::InvalidSignature => false,
        };
        if !claimable {
            debug!(key = %key, status = %entry.status, "claim refused: not claimable");
            release(key);
            return Ok(None);
        }

        let mut claimed = entry;
        claimed.status = InboxStatus::Processing;
        claimed.attempts += 1;
        claimed.next_retry_at = None;
        if let Err(e) = self.inbox.save(&claimed) {
            release(key);
            return Err(e);
        }

        debug!(key = %key, attempt = claimed.attempts, "claimed for processing");
        Ok(Some(ClaimGuard {
            key: key.clone(),
            entry: claimed,
            in_flight: Arc::clone(&self.in_flight),
        }))
    }

    /// Marks a claimed entry as done. Terminal.
    pub fn complete(&self, guard: ClaimGuard) -> Result<(), InboxError> {
        let mut entry = guard.entry.clone();
        entry.status = InboxStatus::Done;
        entry.last_error = None;
        entry.next_retry_at = None;
        self.inbox.save(&entry)?;
        info!(key = %guard.key, attempts = entry.attempts, "processing complete");
        Ok(())
    }

    /// Marks a claimed entry as failed, scheduling a retry when attempts
    /// remain.
    pub fn fail(
        &self,
        guard: ClaimGuard,
        error: impl Into<String>,
        now: i64,
    ) -> Result<(), InboxError> {
        let mut entry = guard.entry.clone();
        entry.status = InboxStatus::Failed;
        entry.last_error = Some(error.into());
        if entry.attempts < self.max_attempts {
            let idx = (entry.attempts as usize - 1).min(BACKOFF_SCHEDULE_SECONDS.len() - 1);
            entry.next_retry_at = Some(now + BACKOFF_SCHEDULE_SECONDS[idx]);
            warn!(
                key = %guard.key,
                attempt = entry.attempts,
                next_retry_at = entry.next_retry_at,
                "processing failed; retry scheduled"
            );
        } else {
            entry.next_retry_at = None;
            warn!(
                key = %guard.key,
                attempts = entry.attempts,
                "processing failed terminally; attempts exhausted"
            );
        }
        self.inbox.save(&entry)
    }

    /// Keys of failed entries now due for retry.
    pub fn due_retries(&self, now: i64) -> Result<Vec<IdempotencyKey>, InboxError> {
        Ok(self
            .inbox
            .due_retries(now)?
            .into_iter()
            .map(|e| e.idempotency_key)
            .collect())
    }

    /// Everything that should be handed to a worker right now: queued
    /// entries (covers keys whose channel send was lost) plus due retries.
    /// Claiming makes spurious entries harmless.
    pub fn due_work(&self, now: i64) -> Result<Vec<IdempotencyKey>, InboxError> {
        let mut keys: Vec<IdempotencyKey> = self
            .inbox
            .list(Some(InboxStatus::Queued))?
            .into_iter()
            .map(|e| e.idempotency_key)
            .collect();
        keys.extend(self.due_retries(now)?);
        Ok(keys)
    }

    /// Recovers entries stranded in `processing` by a crash: anything on
    /// disk in that state with no in-flight claim is moved back to a due
    /// retry without consuming an attempt.
    pub fn recover_stranded(&self, now: i64) -> Result<usize, InboxError> {
        let in_flight = self
            .in_flight
            .lock()
            .expect("in-flight set lock poisoned")
            .clone();
        let mut recovered = 0;
        for mut entry in self.inbox.list(Some(InboxStatus::Processing))? {
            if in_flight.contains(&entry.idempotency_key) {
                continue;
            }
            entry.status = InboxStatus::Failed;
            entry.next_retry_at = Some(now);
            self.inbox.save(&entry)?;
            recovered += 1;
        }
        if recovered > 0 {
            info!(recovered, "recovered stranded processing entries");
        }
        Ok(recovered)
    }
}
