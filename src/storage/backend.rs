//! Filesystem seam used by `DiskStorage`

use super::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

/// Filesystem operations needed by the record store
#[async_trait]
pub trait DiskBackend: Send + Sync {
    /// Read entire file contents
    async fn read_file(&self, path: &Path) -> Result<Bytes, StorageError>;

    /// Write file contents atomically (temp file + rename)
    async fn write_file_atomic(&self, path: &Path, data: Bytes) -> Result<(), StorageError>;

    /// Delete a file. Missing files are not an error.
    async fn delete_file(&self, path: &Path) -> Result<(), StorageError>;

    /// Create directory and all parent directories
    async fn create_dir_all(&self, path: &Path) -> Result<(), StorageError>;

    async fn file_size(&self, path: &Path) -> Result<u64, StorageError>;

    /// List the files directly inside a directory
    async fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>, StorageError>;
}
