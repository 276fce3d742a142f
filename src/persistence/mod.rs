//! Durable file persistence primitives.
//!
//! Credential, inbox, and sync-log records are small JSON files written with
//! the write-to-temp-then-rename pattern:
//!
//! 1. Write to `<name>.tmp`
//! 2. fsync the temp file
//! 3. Rename to `<name>`
//! 4. fsync the directory
//!
//! Without the directory fsync a rename may not survive a power loss even
//! when the file contents were synced.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistError>;

/// Syncs a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory, ensuring its entries (creations, renames) are durable.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

/// Atomically writes `value` as pretty JSON to `path`.
///
/// The parent directory is created if missing. After this returns, the file
/// either contains the complete new contents or (on crash) the complete old
/// contents; never a torn write.
pub fn save_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let bytes = serde_json::to_vec_pretty(value)?;
    let temp_path = path.with_extension("tmp");
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&bytes)?;
        fsync_file(&file)?;
    }
    std::fs::rename(&temp_path, path)?;
    fsync_dir(parent)?;
    Ok(())
}

/// Loads a JSON value from `path`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
