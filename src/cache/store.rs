// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable key-value store for cache entries.
//!
//! Layout: `<root>/<namespace>@<buster>/<storage_key>.json`. Opening a store
//! deletes every sibling directory of the same namespace with a different
//! buster, which is how a new buster invalidates everything in one step.
//!
//! Each file holds the entry plus the [`QueryKey`] it was stored under, so
//! entries can be evicted by key properties without a separate index.

use super::{PersistedEntry, QueryKey};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const BUSTER_SEPARATOR: char = '@';

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid storage name '{0}'")]
    InvalidName(String),
}

/// On-disk form of an entry.
#[derive(Serialize)]
struct StoredRecord<'a> {
    key: &'a QueryKey,
    #[serde(flatten)]
    entry: &'a PersistedEntry,
}

/// Just the key of a stored record.
#[derive(Deserialize)]
struct StoredKey {
    #[serde(default)]
    key: Option<QueryKey>,
}

/// File-backed entry store.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) the store for `namespace` and `buster`
    /// under `root`, purging entries left by other busters.
    pub async fn open(root: &Path, namespace: &str, buster: &str) -> Result<Self, PersistenceError> {
        validate_name(namespace)?;
        validate_name(buster)?;

        let dir_name = format!("{}{}{}", namespace, BUSTER_SEPARATOR, buster);
        let dir = root.join(&dir_name);
        tokio::fs::create_dir_all(&dir).await?;

        purge_orphans(root, namespace, &dir_name).await?;

        tracing::info!(path = %dir.display(), "Opened durable query cache");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read an entry. Unreadable or corrupt entries are deleted and treated
    /// as absent.
    pub async fn read(&self, key: &QueryKey) -> Result<Option<PersistedEntry>, PersistenceError> {
        let storage_key = key.storage_key();
        let path = self.entry_path(&storage_key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                tracing::warn!(key = %storage_key, error = %e, "Discarding corrupt cache entry");
                self.remove(key).await?;
                Ok(None)
            }
        }
    }

    /// Write an entry atomically: a temp file is renamed over the target,
    /// so readers see either the old entry or the new one.
    pub async fn write(&self, key: &QueryKey, entry: &PersistedEntry) -> Result<(), PersistenceError> {
        let storage_key = key.storage_key();
        let bytes = serde_json::to_vec(&StoredRecord { key, entry })?;
        let tmp = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            storage_key,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&tmp, self.entry_path(&storage_key)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        Ok(())
    }

    pub async fn remove(&self, key: &QueryKey) -> Result<(), PersistenceError> {
        remove_file(&self.entry_path(&key.storage_key())).await
    }

    /// Delete every entry whose key satisfies `pred`. Files that cannot be
    /// attributed to a key are left alone. Returns the number removed.
    pub async fn remove_where<F>(&self, pred: F) -> Result<usize, PersistenceError>
    where
        F: Fn(&QueryKey) -> bool,
    {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_entry = path.extension().is_some_and(|ext| ext == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_entry {
                continue;
            }

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let Ok(StoredKey { key: Some(key) }) = serde_json::from_slice(&bytes) else {
                continue;
            };

            if pred(&key) {
                remove_file(&path).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    fn entry_path(&self, storage_key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", storage_key))
    }
}

async fn remove_file(path: &Path) -> Result<(), PersistenceError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn validate_name(name: &str) -> Result<(), PersistenceError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && name != "."
        && name != "..";

    if valid {
        Ok(())
    } else {
        Err(PersistenceError::InvalidName(name.to_string()))
    }
}

/// Delete directories of `namespace` written under other busters.
async fn purge_orphans(root: &Path, namespace: &str, current: &str) -> Result<(), PersistenceError> {
    let prefix = format!("{}{}", namespace, BUSTER_SEPARATOR);
    let mut entries = tokio::fs::read_dir(root).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name == current || !name.starts_with(&prefix) {
            continue;
        }

        tracing::info!(dir = name, "Purging query cache written under an old buster");
        if let Err(e) = tokio::fs::remove_dir_all(entry.path()).await {
            tracing::warn!(dir = name, error = %e, "Failed to purge old cache directory");
        }
    }

    Ok(())
}
