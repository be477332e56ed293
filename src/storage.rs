//! Persistent key-value storage.
//!
//! The update checker keeps its cache and reads the user's ignore list
//! through the [`Storage`] trait. [`FileStorage`] persists a JSON object and
//! replaces the whole file on every write, so a crash mid-write leaves the
//! previous contents intact.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum storage file size (4 MB).
const MAX_FILE_SIZE: u64 = 4 * 1024 * 1024;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File too large.
    #[error("Storage file too large (max {MAX_FILE_SIZE} bytes)")]
    FileTooLarge,

    /// The stored document is not a JSON object.
    #[error("Storage file is not a JSON object")]
    NotAnObject,
}

/// Key-value persistence used for caching.
pub trait Storage: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.set_many(vec![(key.to_string(), value)])
    }

    /// Stores all `entries` in one write. On error none of them is stored.
    fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), StorageError>;
}

fn poisoned() -> StorageError {
    StorageError::Io(io::Error::other("storage lock poisoned"))
}

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), StorageError> {
        let mut values = self.values.write().map_err(|_| poisoned())?;
        values.extend(entries);
        Ok(())
    }
}

/// Storage backed by a single JSON file.
#[derive(Debug)]
pub struct FileStorage {
    /// Path to the JSON file.
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: RwLock<()>,
}

impl FileStorage {
    /// Creates a storage handle for `path`. The file is created lazily on
    /// first write.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: RwLock::new(()),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole document. A missing file is an empty document.
    fn read_document(&self) -> Result<Map<String, Value>, StorageError> {
        let metadata = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if metadata.len() > MAX_FILE_SIZE {
            return Err(StorageError::FileTooLarge);
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str(&content)? {
            Value::Object(map) => Ok(map),
            _ => Err(StorageError::NotAnObject),
        }
    }

    /// Writes the document to a temporary sibling and renames it over the
    /// target.
    fn write_document(&self, document: &Map<String, Value>) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut temp, document)?;
        temp.write_all(b"\n")?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| StorageError::Io(e.error))?;

        debug!("[STORAGE] Wrote {} key(s) to {}", document.len(), self.path.display());
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<Value> {
        let _guard = self.lock.read().ok()?;
        match self.read_document() {
            Ok(mut document) => document.remove(key),
            Err(e) => {
                warn!("[STORAGE] Failed to read {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), StorageError> {
        let _guard = self.lock.write().map_err(|_| poisoned())?;
        let mut document = self.read_document()?;
        document.extend(entries);
        self.write_document(&document)
    }
}
