//! Durable sync run log.
//!
//! One JSON file per run, named `<job>__<key_ref>.json`, so the filesystem
//! itself enforces (job, window) uniqueness: a second run over an identical
//! window finds the file already present and is rejected. Entries are kept
//! for operator inspection and never executed from.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::persistence::{self, PersistError};
use crate::sync::window::SyncWindow;
use crate::types::JobName;

/// Errors from the sync log.
#[derive(Debug, Error)]
pub enum SyncLogError {
    #[error("a run of {job} already exists for window {key_ref}")]
    DuplicateRun { job: JobName, key_ref: String },

    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
}

/// Overall outcome of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncRunStatus {
    /// Every record in the window was applied.
    Success,
    /// The run completed, but some records failed.
    Partial,
    /// The run aborted before the window was covered.
    Failed,
}

impl std::fmt::Display for SyncRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncRunStatus::Success => write!(f, "success"),
            SyncRunStatus::Partial => write!(f, "partial"),
            SyncRunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one recorded sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub job: JobName,
    pub window: SyncWindow,
    /// Epoch seconds at which the run started.
    pub started_at: i64,
    pub status: SyncRunStatus,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Free-form notes: per-record failure reasons, truncation markers.
    pub notes: Vec<String>,
}

impl SyncLogEntry {
    pub fn key_ref(&self) -> String {
        self.window.key_ref()
    }
}

/// Directory-backed store of sync run entries.
#[derive(Debug, Clone)]
pub struct SyncLogStore {
    dir: PathBuf,
}

impl SyncLogStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SyncLogError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(PersistError::from)?;
        Ok(SyncLogStore { dir })
    }

    fn entry_path(&self, job: &JobName, key_ref: &str) -> PathBuf {
        self.dir.join(format!("{}__{}.json", job.as_str(), key_ref))
    }

    /// Whether a run of `job` over the window named by `key_ref` exists.
    pub fn contains(&self, job: &JobName, key_ref: &str) -> bool {
        self.entry_path(job, key_ref).exists()
    }

    /// Records a run. Every run is recorded, whatever its status; fails
    /// with `DuplicateRun` when an entry for the same (job, window) pair
    /// already exists.
    pub fn record(&self, entry: &SyncLogEntry) -> Result<(), SyncLogError> {
        let key_ref = entry.key_ref();
        let path = self.entry_path(&entry.job, &key_ref);
        if path.exists() {
            return Err(SyncLogError::DuplicateRun {
                job: entry.job.clone(),
                key_ref,
            });
        }
        persistence::save_json_atomic(&path, entry)?;
        Ok(())
    }

    /// All recorded entries, most recent first.
    pub fn list(&self) -> Result<Vec<SyncLogEntry>, SyncLogError> {
        let mut entries = Vec::new();
        for dirent in std::fs::read_dir(&self.dir).map_err(PersistError::from)? {
            let path = dirent.map_err(PersistError::from)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            entries.push(persistence::load_json::<SyncLogEntry>(&path)?);
        }
        entries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(entries)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
