// # File Pending Store
//
// File-based implementation of PendingStore, for hosts that run perform and
// cleanup as separate processes.
//
// ## Crash Recovery
//
// - Atomic writes: the whole file is written to `.tmp`, then renamed
// - Automatic backup: the previous file is copied to `.backup` before each
//   rename
// - Recovery: an unparsable file falls back to the backup, then to empty
//
// Losing the file is not fatal: cleanup without a stored record still
// removes the challenge value.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "records": {
//     "example.com#token": {
//       "domain": "example.com",
//       "zone": { "suffix": "example.com", ... },
//       "record_name": "_acme-challenge",
//       "value": "token",
//       "created_new": true,
//       "created_at": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::challenge::PendingRecord;
use crate::traits::pending_store::PendingStore;

/// Pending file format version
const PENDING_FILE_VERSION: &str = "1.0";

/// File-based pending store
///
/// Every change is written through immediately. The write lock is held
/// across the file write so concurrent changes never interleave on disk.
///
/// # Example
///
/// ```rust,no_run
/// use dns01_core::state::FilePendingStore;
/// use dns01_core::traits::PendingStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FilePendingStore::new("/var/lib/dns01/pending.json").await?;
///     println!("{} pending records", store.keys().await?.len());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FilePendingStore {
    path: PathBuf,
    state: RwLock<FileState>,
}

#[derive(Debug, Default)]
struct FileState {
    records: HashMap<String, PendingRecord>,
    dirty: bool,
}

/// Serializable pending file format
#[derive(Debug, Serialize, Deserialize)]
struct PendingFileFormat {
    version: String,
    records: HashMap<String, PendingRecord>,
}

/// Why a pending file could not be loaded
enum LoadError {
    /// File exists but is not valid pending JSON
    Corrupt(Error),
    /// File could not be read at all
    Unreadable(Error),
}

impl FilePendingStore {
    /// Create or load a file pending store
    ///
    /// Creates parent directories as needed and recovers from a corrupted
    /// file via its backup.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::state_store(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let records = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: RwLock::new(FileState {
                records,
                dirty: false,
            }),
        })
    }

    /// Path of the pending file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_with_recovery(path: &Path) -> Result<HashMap<String, PendingRecord>, Error> {
        let error = match Self::load(path).await {
            Ok(records) => {
                tracing::debug!("Loaded {} pending records from {}", records.len(), path.display());
                return Ok(records);
            }
            Err(LoadError::Unreadable(e)) => return Err(e),
            Err(LoadError::Corrupt(e)) => e,
        };

        tracing::warn!("Pending file is corrupted: {}. Trying backup.", error);

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with no pending records.");
            return Ok(HashMap::new());
        }

        match Self::load(&backup_path).await {
            Ok(records) => {
                tracing::info!("Recovered {} pending records from backup", records.len());
                if let Err(e) = fs::copy(&backup_path, path).await {
                    tracing::error!("Failed to restore pending file from backup: {}", e);
                }
                Ok(records)
            }
            Err(LoadError::Corrupt(e)) | Err(LoadError::Unreadable(e)) => {
                tracing::error!("Backup unusable: {}. Starting with no pending records.", e);
                Ok(HashMap::new())
            }
        }
    }

    async fn load(path: &Path) -> Result<HashMap<String, PendingRecord>, LoadError> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadError::Unreadable(Error::state_store(format!(
                "Failed to read pending file {}: {}",
                path.display(),
                e
            )))
        })?;

        let file: PendingFileFormat = serde_json::from_str(&content).map_err(|e| {
            LoadError::Corrupt(Error::state_store(format!(
                "Failed to parse pending file {}: {}",
                path.display(),
                e
            )))
        })?;

        if file.version != PENDING_FILE_VERSION {
            tracing::warn!(
                "Pending file version mismatch: expected {}, got {}. Loading anyway.",
                PENDING_FILE_VERSION,
                file.version
            );
        }

        Ok(file.records)
    }

    /// Write `state` to disk atomically; caller holds the write lock
    async fn write(&self, state: &mut FileState) -> Result<(), Error> {
        let file = PendingFileFormat {
            version: PENDING_FILE_VERSION.to_string(),
            records: state.records.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::state_store(format!("Failed to serialize pending records: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.flush().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        state.dirty = false;
        tracing::trace!("Pending records written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl PendingStore for FilePendingStore {
    async fn get(&self, key: &str) -> Result<Option<PendingRecord>, Error> {
        Ok(self.state.read().await.records.get(key).cloned())
    }

    async fn put(&self, record: &PendingRecord) -> Result<(), Error> {
        let mut state = self.state.write().await;
        state.records.insert(record.key(), record.clone());
        state.dirty = true;
        self.write(&mut state).await
    }

    async fn take(&self, key: &str) -> Result<Option<PendingRecord>, Error> {
        let mut state = self.state.write().await;
        let taken = state.records.remove(key);
        if taken.is_some() {
            state.dirty = true;
            self.write(&mut state).await?;
        }
        Ok(taken)
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.state.read().await.records.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if state.dirty {
            self.write(&mut state).await
        } else {
            Ok(())
        }
    }
}
