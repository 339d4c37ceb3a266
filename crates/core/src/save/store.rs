//! Durable save records, one per save identity.

use std::{
    collections::HashMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::warn;

use super::is_valid_save_id;

/// Root directory under the platform data directory used for save records.
pub const DEFAULT_SAVE_DIR: &str = "neon-genesis/saves";

/// One stored row: the serialized document and when it was last written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    /// Save identity.
    pub id: String,
    /// Serialized JSON document, stored as received.
    pub data: String,
    /// Time of the last write.
    pub updated_at: DateTime<Utc>,
}

/// Listing entry for a stored save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveEntry {
    /// Save identity.
    pub id: String,
    /// Time of the last write.
    pub updated_at: DateTime<Utc>,
}

/// Failures of a save store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The id is not a valid save identity.
    #[error("invalid save id `{0}`")]
    InvalidId(String),
    /// Filesystem access failed.
    #[error("failed to access {path}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A record file exists but cannot be parsed.
    #[error("corrupt save record {path}")]
    Corrupt {
        /// Path of the record.
        path: PathBuf,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },
    /// A record could not be serialized.
    #[error("failed to encode save record")]
    Encode(#[from] serde_json::Error),
    /// The temporary file could not be moved into place.
    #[error("failed to replace save record")]
    Persist(#[from] tempfile::PersistError),
}

/// Keyed storage of save records with last-write-wins upserts.
pub trait SaveStore: Send + Sync {
    /// Fetch the record for `id`, `None` if it was never written.
    fn get(&self, id: &str) -> Result<Option<SaveRecord>, StoreError>;

    /// Insert or replace the record for `id`.
    fn put(&self, id: &str, data: &str) -> Result<SaveRecord, StoreError>;

    /// All records, most recently written first.
    fn entries(&self) -> Result<Vec<SaveEntry>, StoreError>;
}

/// Store keeping one JSON record file per id inside a directory.
#[derive(Debug, Clone)]
pub struct FileSaveStore {
    root: PathBuf,
}

impl FileSaveStore {
    /// Create a store rooted at the provided directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default location under the user's data directory.
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_SAVE_DIR)
    }

    /// Directory holding the record files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_save_id(id) {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(format!("{id}.json")))
    }

    fn read_record(&self, path: &Path) -> Result<SaveRecord, StoreError> {
        let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_record(&self, path: &Path, record: &SaveRecord) -> Result<(), StoreError> {
        let io_error = |source| StoreError::Io {
            path: self.root.clone(),
            source,
        };
        fs::create_dir_all(&self.root).map_err(io_error)?;
        let serialised = serde_json::to_vec_pretty(record)?;
        // Written beside the target and renamed over it.
        let mut file = NamedTempFile::new_in(&self.root).map_err(io_error)?;
        file.write_all(&serialised).map_err(io_error)?;
        file.as_file().sync_all().map_err(io_error)?;
        file.persist(path)?;
        Ok(())
    }
}

impl SaveStore for FileSaveStore {
    fn get(&self, id: &str) -> Result<Option<SaveRecord>, StoreError> {
        let path = self.record_path(id)?;
        if !path.is_file() {
            return Ok(None);
        }
        self.read_record(&path).map(Some)
    }

    fn put(&self, id: &str, data: &str) -> Result<SaveRecord, StoreError> {
        let path = self.record_path(id)?;
        let record = SaveRecord {
            id: id.to_string(),
            data: data.to_string(),
            updated_at: Utc::now(),
        };
        self.write_record(&path, &record)?;
        Ok(record)
    }

    fn entries(&self) -> Result<Vec<SaveEntry>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let io_error = |source| StoreError::Io {
            path: self.root.clone(),
            source,
        };
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            if !entry.file_type().map_err(io_error)?.is_file() {
                continue;
            }
            if entry.path().extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            match self.read_record(&entry.path()) {
                Ok(record) => entries.push(SaveEntry {
                    id: record.id,
                    updated_at: record.updated_at,
                }),
                Err(err) => {
                    warn!(path = %entry.path().display(), ?err, "Skipping unreadable save record");
                }
            }
        }

        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(entries)
    }
}

/// Store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemorySaveStore {
    records: RwLock<HashMap<String, SaveRecord>>,
}

impl MemorySaveStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SaveStore for MemorySaveStore {
    fn get(&self, id: &str) -> Result<Option<SaveRecord>, StoreError> {
        Ok(self.records.read().get(id).cloned())
    }

    fn put(&self, id: &str, data: &str) -> Result<SaveRecord, StoreError> {
        if !is_valid_save_id(id) {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        let record = SaveRecord {
            id: id.to_string(),
            data: data.to_string(),
            updated_at: Utc::now(),
        };
        self.records.write().insert(id.to_string(), record.clone());
        Ok(record)
    }

    fn entries(&self) -> Result<Vec<SaveEntry>, StoreError> {
        let mut entries: Vec<_> = self
            .records
            .read()
            .values()
            .map(|record| SaveEntry {
                id: record.id.clone(),
                updated_at: record.updated_at,
            })
            .collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(entries)
    }
}
