//! Sync run orchestration.
//!
//! The planner owns the cross-cutting rules every job shares: one run per
//! job at a time, a duplicate-window check against the run log, and the
//! checkpoint rule. Every run is recorded, including aborted ones; the
//! checkpoint only advances when a run completes with zero failures, so a
//! partial or aborted run leaves the span to be re-covered (with overlap)
//! by the next run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::api::ApiError;
use crate::credential::{Credential, CredentialStore, StoreError};
use crate::sync::log::{SyncLogEntry, SyncLogError, SyncLogStore, SyncRunStatus};
use crate::sync::window::{DEFAULT_LOOKBACK_SECONDS, SyncWindow, plan_window};
use crate::types::{JobName, now_epoch};

/// Errors that prevent a run from being planned or recorded. Executor
/// failures are not among them: an aborted run is a recorded outcome, not
/// an error.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Log(#[from] SyncLogError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Per-record outcome counts for one executed window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub notes: Vec<String>,
}

/// Executes the records of one sync window.
///
/// Per-record failures are counted in the report; an `Err` means the run
/// could not proceed at all (for example the initial listing call failed).
pub trait SyncExecutor {
    fn execute(
        &self,
        credential: &Credential,
        window: &SyncWindow,
    ) -> impl Future<Output = Result<ExecutionReport, ApiError>> + Send;
}

/// Plans and runs incremental sync jobs against one credential.
#[derive(Clone)]
pub struct SyncPlanner {
    store: CredentialStore,
    log: SyncLogStore,
    lookback_seconds: i64,
    job_locks: Arc<Mutex<HashMap<JobName, Arc<Mutex<()>>>>>,
}

impl SyncPlanner {
    pub fn new(store: CredentialStore, log: SyncLogStore) -> Self {
        SyncPlanner {
            store,
            log,
            lookback_seconds: DEFAULT_LOOKBACK_SECONDS,
            job_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Overrides the lookback used when no checkpoint exists yet.
    pub fn with_lookback(mut self, lookback_seconds: i64) -> Self {
        self.lookback_seconds = lookback_seconds;
        self
    }

    pub fn log(&self) -> &SyncLogStore {
        &self.log
    }

    /// Runs `job` over the next planned window.
    pub async fn run<E: SyncExecutor>(
        &self,
        job: &JobName,
        executor: &E,
    ) -> Result<SyncLogEntry, SyncError> {
        self.run_at(job, executor, now_epoch()).await
    }

    /// Runs `job` with an explicit clock, for deterministic window planning.
    pub async fn run_at<E: SyncExecutor>(
        &self,
        job: &JobName,
        executor: &E,
        now: i64,
    ) -> Result<SyncLogEntry, SyncError> {
        let lock = self.job_lock(job).await;
        let _guard = lock.lock().await;

        let credential = self.store.snapshot().await;
        let window = plan_window(
            credential.last_success_sync_at,
            credential.overlap_seconds,
            self.lookback_seconds,
            now,
        );
        let key_ref = window.key_ref();

        if self.log.contains(job, &key_ref) {
            return Err(SyncLogError::DuplicateRun {
                job: job.clone(),
                key_ref,
            }
            .into());
        }

        info!(job = %job, time_from = window.time_from, time_to = window.time_to, "sync run starting");
        let (status, report) = match executor.execute(&credential, &window).await {
            Ok(report) if report.failed == 0 => (SyncRunStatus::Success, report),
            Ok(report) => (SyncRunStatus::Partial, report),
            Err(e) => {
                let report = ExecutionReport {
                    notes: vec![format!("aborted: {e}")],
                    ..ExecutionReport::default()
                };
                (SyncRunStatus::Failed, report)
            }
        };

        if status == SyncRunStatus::Success {
            self.store
                .update(|cred| cred.last_success_sync_at = Some(window.time_to))
                .await?;
            info!(job = %job, total = report.total, "sync run clean; checkpoint advanced");
        } else {
            warn!(
                job = %job,
                status = %status,
                failed = report.failed,
                total = report.total,
                "sync run not clean; checkpoint not advanced"
            );
        }

        let entry = SyncLogEntry {
            job: job.clone(),
            window,
            started_at: now,
            status,
            total: report.total,
            succeeded: report.succeeded,
            failed: report.failed,
            notes: report.notes,
        };
        self.log.record(&entry)?;
        Ok(entry)
    }

    async fn job_lock(&self, job: &JobName) -> Arc<Mutex<()>> {
        let mut locks = self.job_locks.lock().await;
        Arc::clone(locks.entry(job.clone()).or_default())
    }
}
