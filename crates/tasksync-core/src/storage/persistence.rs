//! Embedded store persistence
//!
//! Saves and loads the store's Automerge document. Writes are atomic (write
//! to a temp file, sync, then rename) so the store file is never left
//! half-written.
//!
//! Storage location: `~/.local/share/tasksync/store.automerge` (configurable
//! via `Config`)

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::error::{StorageError, StorageResult};
use crate::embedded::document::CollectionsDocument;
use crate::error::StoreError;

/// Suffix appended to the store file name when a damaged copy is kept
const CORRUPT_BACKUP_SUFFIX: &str = "corrupt.backup";

/// Persistence layer for the embedded store
pub struct StorePersistence {
    path: PathBuf,
}

impl StorePersistence {
    /// Persist to the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if a store file exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Save the document using an atomic write
    pub fn save(&self, doc: &mut CollectionsDocument) -> StorageResult<()> {
        let bytes = doc.save();
        atomic_write(&self.path, &bytes)?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "Saved store");
        Ok(())
    }

    /// Load the document from disk
    ///
    /// Returns `None` if the file doesn't exist. A file that exists but can't
    /// be decoded is copied aside and reported as [`StorageError::CorruptDocument`].
    pub fn load(&self) -> StorageResult<Option<CollectionsDocument>> {
        if !self.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&self.path).map_err(|source| StorageError::ReadError {
            path: self.path.clone(),
            source,
        })?;

        match CollectionsDocument::load(&bytes) {
            Ok(doc) => Ok(Some(doc)),
            Err(e) => {
                let backup_path = self.backup_path();
                if let Err(copy_err) = fs::copy(&self.path, &backup_path) {
                    warn!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to back up corrupted store file"
                    );
                }
                Err(StorageError::CorruptDocument {
                    path: self.path.clone(),
                    backup_path,
                    details: e.to_string(),
                })
            }
        }
    }

    /// Load an existing document or create and save a new one
    pub fn load_or_create(&self) -> Result<CollectionsDocument, StoreError> {
        if let Some(doc) = self.load()? {
            return Ok(doc);
        }

        let mut doc = CollectionsDocument::new()?;
        self.save(&mut doc)?;
        Ok(doc)
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(CORRUPT_BACKUP_SUFFIX);
        self.path.with_file_name(name)
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.sync_all()
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|source| StorageError::AtomicWriteFailed {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source,
    })?;

    Ok(())
}
