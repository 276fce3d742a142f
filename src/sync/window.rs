//! Sync window planning.
//!
//! Each incremental run covers a half-open window `[time_from, time_to)`.
//! The lower bound backs off from the last successful checkpoint by a fixed
//! overlap so records that landed just before the checkpoint (late upstream
//! writes, clock skew between hosts) are re-fetched rather than lost.
//! Downstream processing is idempotent, so re-fetching is safe.

use serde::{Deserialize, Serialize};

/// Lookback for a first run with no checkpoint: 24 hours.
pub const DEFAULT_LOOKBACK_SECONDS: i64 = 86_400;

/// A half-open time window `[time_from, time_to)`, epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub time_from: i64,
    pub time_to: i64,
}

impl SyncWindow {
    /// Stable identity of this window, used for run-log uniqueness.
    pub fn key_ref(&self) -> String {
        format!("{}-{}", self.time_from, self.time_to)
    }

    pub fn is_empty(&self) -> bool {
        self.time_from >= self.time_to
    }
}

/// Plans the next sync window.
///
/// With a checkpoint, the window starts `overlap_seconds` before it (floored
/// at zero); without one, it starts `lookback_seconds` ago. The upper bound
/// is always `now`.
pub fn plan_window(
    last_success_sync_at: Option<i64>,
    overlap_seconds: i64,
    lookback_seconds: i64,
    now: i64,
) -> SyncWindow {
    let time_from = match last_success_sync_at {
        Some(last) if last > 0 => (last - overlap_seconds).max(0),
        _ => (now - lookback_seconds).max(0),
    };
    SyncWindow {
        time_from,
        time_to: now,
    }
}
