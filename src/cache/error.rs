//! Cache error types
//!
//! Only opening the cache can fail. Every other facade operation reports
//! policy outcomes through the decision enums and logs storage failures.

use std::path::PathBuf;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache directory could not be created
    #[error("failed to create cache directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The storage engine failed to open
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
