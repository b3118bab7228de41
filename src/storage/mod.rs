//! Record storage
//!
//! The cache talks to storage through the `Storage` trait: an asynchronous
//! key/value service for `Record`s. `DiskStorage` is the bundled
//! implementation, laid out as
//!
//! ```text
//! <dir>/v1/salt                  8 byte key salt
//! <dir>/v1/records/<hash>.meta   JSON record metadata
//! <dir>/v1/records/<hash>.data   body bytes
//! ```
//!
//! Filesystem access goes through a `DiskBackend` (tokio::fs or in-memory).

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::time::SystemTime;
use tokio::sync::mpsc;

use crate::cache::{Key, Salt};
use crate::resource::LoadPriority;

pub mod backend;
mod disk_storage;
mod error;
mod index;
pub mod memory_backend;
mod record;
pub mod tokio_backend;

pub use backend::DiskBackend;
pub use disk_storage::DiskStorage;
pub use error::StorageError;
pub use memory_backend::MemoryBackend;
pub use record::{compute_body_hash, Record, RecordInfo};
pub(crate) use record::{millis_to_system_time, system_time_to_millis};
pub use tokio_backend::TokioFsBackend;

/// How the salt is chosen when storage opens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Normal,
    /// Fixed all-zero salt so keys are reproducible across runs (testing)
    AvoidRandomness,
}

/// Body bytes shared back to the caller after a store. `None` when the
/// body was too small to be worth sharing or mapping failed.
pub type MappedBody = Option<Bytes>;

/// Extra work requested from a traversal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraverseFlags {
    pub compute_worth: bool,
    pub share_count: bool,
}

/// Timing of one storage lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageTimings {
    pub start_time: SystemTime,
    pub completion_time: SystemTime,
    pub priority: LoadPriority,
}

/// Result of `Storage::retrieve`
#[derive(Debug, Clone)]
pub struct StorageRetrieval {
    pub record: Option<Record>,
    pub timings: StorageTimings,
}

/// Asynchronous record store consumed by the cache
#[async_trait]
pub trait Storage: Send + Sync {
    fn salt(&self) -> Salt;

    fn base_path(&self) -> &Path;

    /// Maximum total size in bytes
    fn capacity(&self) -> u64;

    /// Change the capacity, evicting records until the store fits.
    async fn set_capacity(&self, capacity: u64) -> Result<(), StorageError>;

    /// Current total size in bytes
    fn approximate_size(&self) -> u64;

    async fn retrieve(
        &self,
        key: &Key,
        priority: LoadPriority,
    ) -> Result<StorageRetrieval, StorageError>;

    async fn store(&self, record: Record) -> Result<MappedBody, StorageError>;

    async fn remove(&self, key: &Key) -> Result<(), StorageError>;

    async fn remove_many(&self, keys: &[Key]) -> Result<(), StorageError>;

    /// Stream every record of `resource_type` (and `partition`, if given).
    /// The channel closing marks the end of the traversal.
    fn traverse(
        &self,
        resource_type: &str,
        partition: Option<&str>,
        flags: TraverseFlags,
    ) -> mpsc::Receiver<(Record, RecordInfo)>;

    /// Remove records of `resource_type` (all types when `None`) whose
    /// timestamp is at or after `modified_since`.
    async fn clear(
        &self,
        resource_type: Option<&str>,
        modified_since: SystemTime,
    ) -> Result<(), StorageError>;
}
