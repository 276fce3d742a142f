//! Durable credential store with serialized mutation.
//!
//! All writes are read-modify-write under the store's internal lock; callers
//! never persist a credential they read earlier (a stale in-memory copy
//! could silently undo a concurrent refresh). The token lifecycle
//! additionally holds [`CredentialStore::refresh_lock`] across its whole
//! refresh round-trip so two triggers cannot race to spend the same
//! refresh_token.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use super::Credential;
use crate::persistence::{self, PersistError};

/// Errors from credential store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable store for a single credential.
///
/// Cloning is cheap; clones share the same underlying state and locks.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Mutex<Credential>>,
    path: PathBuf,
    refresh_lock: Arc<Mutex<()>>,
}

impl CredentialStore {
    /// Opens the store at `path`, loading the persisted credential if one
    /// exists, otherwise initializing (and persisting) `initial`.
    pub fn open(path: impl Into<PathBuf>, initial: Credential) -> Result<Self> {
        let path = path.into();
        let credential = match persistence::load_json::<Credential>(&path) {
            Ok(cred) => cred,
            Err(PersistError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                persistence::save_json_atomic(&path, &initial)?;
                initial
            }
            Err(e) => return Err(e.into()),
        };
        Ok(CredentialStore {
            inner: Arc::new(Mutex::new(credential)),
            path,
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Returns a point-in-time copy of the credential.
    pub async fn snapshot(&self) -> Credential {
        self.inner.lock().await.clone()
    }

    /// Applies `mutate` to the current credential and persists the result
    /// atomically. The mutation sees the freshest state, never a caller-held
    /// copy.
    pub async fn update<F>(&self, mutate: F) -> Result<Credential>
    where
        F: FnOnce(&mut Credential),
    {
        let mut guard = self.inner.lock().await;
        let mut next = guard.clone();
        mutate(&mut next);
        // Persist before publishing so a crash can't leave memory ahead of disk.
        persistence::save_json_atomic(&self.path, &next)?;
        *guard = next.clone();
        Ok(next)
    }

    /// The lock serializing token refresh for this credential.
    ///
    /// Held across the whole refresh round-trip (decide, call, persist).
    /// Lock scope bounds the hold time; a failed refresh releases it on
    /// drop, so a crashed worker cannot wedge later refreshes.
    pub fn refresh_lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.refresh_lock)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Environment, PartnerId, ShopId};
    use tempfile::tempdir;

    fn test_credential() -> Credential {
        let mut cred = Credential::new(PartnerId(1001), "pk", Environment::Test);
        cred.shop_id = Some(ShopId(5));
        cred
    }

    #[tokio::test]
    async fn open_initializes_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credential.json");

        let store = CredentialStore::open(&path, test_credential()).unwrap();
        assert!(path.exists());
        assert_eq!(store.snapshot().await.partner_id, PartnerId(1001));
    }

    #[tokio::test]
    async fn open_prefers_persisted_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credential.json");

        let store = CredentialStore::open(&path, test_credential()).unwrap();
        store
            .update(|cred| cred.access_token = Some("A1".into()))
            .await
            .unwrap();
        drop(store);

        // Reopen with a fresh initial credential; the persisted tokens win.
        let store = CredentialStore::open(&path, test_credential()).unwrap();
        assert_eq!(store.snapshot().await.access_token.as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn update_persists_atomically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credential.json");

        let store = CredentialStore::open(&path, test_credential()).unwrap();
        store
            .update(|cred| {
                cred.access_token = Some("A2".into());
                cred.token_expire_at = Some(9_999);
            })
            .await
            .unwrap();

        let on_disk: Credential = crate::persistence::load_json(&path).unwrap();
        assert_eq!(on_disk.access_token.as_deref(), Some("A2"));
        assert_eq!(on_disk.token_expire_at, Some(9_999));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let dir = tempdir().unwrap();
        let store =
            CredentialStore::open(dir.path().join("c.json"), test_credential()).unwrap();
        let clone = store.clone();

        store
            .update(|cred| cred.refresh_token = Some("R9".into()))
            .await
            .unwrap();
        assert_eq!(clone.snapshot().await.refresh_token.as_deref(), Some("R9"));
    }

    #[tokio::test]
    async fn refresh_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let store =
            CredentialStore::open(dir.path().join("c.json"), test_credential()).unwrap();

        let lock = store.refresh_lock();
        let guard = lock.lock().await;
        // A second acquisition must not succeed while the first is held.
        assert!(store.refresh_lock().try_lock().is_err());
        drop(guard);
        assert!(store.refresh_lock().try_lock().is_ok());
    }
}
