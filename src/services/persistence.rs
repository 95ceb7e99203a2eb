//! Persistence service: the `{user, profile}` blob that survives restarts.
//!
//! DESIGN
//! ======
//! A background task watches the auth store and rewrites the blob whenever
//! the persisted subset changes. Loading flags and errors are never written.
//! Writes go to a sibling temp file first and are renamed into place, so a
//! crash mid-write leaves the previous blob intact.

use std::path::{Path, PathBuf};

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::state::{AuthStore, PersistedAuth};

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("auth state io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("auth state encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Read the blob. A missing or unreadable file yields `None`.
pub async fn load(path: &Path) -> Option<PersistedAuth> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no persisted auth state");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "persisted auth state unreadable");
            return None;
        }
    };
    match serde_json::from_slice(&raw) {
        Ok(persisted) => Some(persisted),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "persisted auth state corrupt; ignoring");
            None
        }
    }
}

/// Write the blob atomically.
///
/// # Errors
///
/// Returns an error if encoding, writing or renaming fails.
pub async fn save(path: &Path, persisted: &PersistedAuth) -> Result<(), PersistError> {
    let raw = serde_json::to_vec_pretty(persisted)?;
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, raw).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Spawn the background writer. Ends when the store is dropped.
pub fn spawn_persistence_task(store: &AuthStore, path: PathBuf) -> JoinHandle<()> {
    let mut rx = store.subscribe();
    tokio::spawn(async move {
        let mut last = PersistedAuth::from(&*rx.borrow_and_update());
        while rx.changed().await.is_ok() {
            let current = PersistedAuth::from(&*rx.borrow_and_update());
            if current == last {
                continue;
            }
            match save(&path, &current).await {
                Ok(()) => debug!(path = %path.display(), signed_in = current.user.is_some(), "auth state saved"),
                Err(e) => error!(path = %path.display(), error = %e, "auth state save failed"),
            }
            last = current;
        }
    })
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
