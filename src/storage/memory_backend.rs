//! In-memory filesystem backend
//!
//! Keeps every file in a `HashMap`. Used by tests and by callers that want a
//! throwaway cache without touching the disk.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::backend::DiskBackend;
use super::error::StorageError;

/// Backend that stores files in memory
#[derive(Clone, Default)]
pub struct MemoryBackend {
    files: Arc<RwLock<HashMap<PathBuf, Bytes>>>,
    directories: Arc<RwLock<HashSet<PathBuf>>>,
    simulate_storage_full: Arc<RwLock<bool>>,
    simulate_permission_denied: Arc<RwLock<bool>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail with `StorageFull`
    pub fn set_storage_full(&self, enabled: bool) {
        *self.simulate_storage_full.write() = enabled;
    }

    /// Make every operation fail with `PermissionDenied`
    pub fn set_permission_denied(&self, enabled: bool) {
        *self.simulate_permission_denied.write() = enabled;
    }

    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    /// Overwrite a file without going through the atomic write path.
    pub fn corrupt_file(&self, path: &Path, data: Bytes) {
        self.files.write().insert(path.to_path_buf(), data);
    }

    fn check_permission(&self) -> Result<(), StorageError> {
        if *self.simulate_permission_denied.read() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "Simulated permission denied",
            )));
        }
        Ok(())
    }

    fn not_found() -> StorageError {
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        ))
    }
}

#[async_trait]
impl DiskBackend for MemoryBackend {
    async fn read_file(&self, path: &Path) -> Result<Bytes, StorageError> {
        self.check_permission()?;
        self.files.read().get(path).cloned().ok_or_else(Self::not_found)
    }

    async fn write_file_atomic(&self, path: &Path, data: Bytes) -> Result<(), StorageError> {
        if *self.simulate_storage_full.read() {
            return Err(StorageError::StorageFull);
        }
        self.check_permission()?;

        if let Some(parent) = path.parent() {
            self.create_dir_all(parent).await?;
        }

        self.files.write().insert(path.to_path_buf(), data);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<(), StorageError> {
        self.check_permission()?;
        self.files.write().remove(path);
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), StorageError> {
        self.check_permission()?;
        self.directories.write().insert(path.to_path_buf());
        Ok(())
    }

    async fn file_size(&self, path: &Path) -> Result<u64, StorageError> {
        self.check_permission()?;
        self.files
            .read()
            .get(path)
            .map(|data| data.len() as u64)
            .ok_or_else(Self::not_found)
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>, StorageError> {
        self.check_permission()?;
        let entries = self
            .files
            .read()
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect();
        Ok(entries)
    }
}
