//! Records as exchanged with storage and persisted on disk

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::error::StorageError;
use crate::cache::Key;

/// One stored item: an encoded entry header plus the body bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: Key,
    pub timestamp: SystemTime,
    /// Encoded entry header, opaque to storage
    pub header: Bytes,
    pub body: Bytes,
    /// Hex SHA-256 of `body`, `None` for body-less records
    pub body_hash: Option<String>,
}

impl Record {
    pub fn new(key: Key, timestamp: SystemTime, header: Bytes, body: Bytes) -> Self {
        let body_hash = if body.is_empty() {
            None
        } else {
            Some(compute_body_hash(&body))
        };
        Self {
            key,
            timestamp,
            header,
            body,
            body_hash,
        }
    }
}

/// Storage-side facts about a record reported during traversal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordInfo {
    pub body_size: u64,
    /// How often the record was used relative to its age, in `0.0..=1.0`.
    /// Only computed when requested.
    pub worth: f64,
    /// Number of records with the same body. Only computed when requested.
    pub body_share_count: u32,
    pub body_hash: Option<String>,
}

pub fn compute_body_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

pub(crate) fn system_time_to_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub(crate) fn millis_to_system_time(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}

/// Content of a `<hash>.meta` file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RecordMetadata {
    pub key: Key,
    /// Record timestamp, milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// Base64 of the encoded entry header
    pub header: String,
    #[serde(default)]
    pub body_hash: Option<String>,
    pub body_size: u64,
    /// When the record was written, milliseconds since the Unix epoch
    pub created_at_ms: u64,
}

impl RecordMetadata {
    pub fn from_record(record: &Record, created_at: SystemTime) -> Self {
        Self {
            key: record.key.clone(),
            timestamp_ms: system_time_to_millis(record.timestamp),
            header: STANDARD.encode(&record.header),
            body_hash: record.body_hash.clone(),
            body_size: record.body.len() as u64,
            created_at_ms: system_time_to_millis(created_at),
        }
    }

    pub fn header_bytes(&self) -> Result<Bytes, StorageError> {
        STANDARD
            .decode(&self.header)
            .map(Bytes::from)
            .map_err(|e| StorageError::InvalidMetadata(format!("header is not base64: {}", e)))
    }

    /// Size accounted against capacity: header plus body.
    pub fn total_size(&self) -> u64 {
        self.header.len() as u64 + self.body_size
    }
}

/// Paths of the metadata and body files for a record hash.
pub(crate) fn record_paths(records_dir: &Path, hash: &str) -> (PathBuf, PathBuf) {
    let meta_path = records_dir.join(format!("{}.meta", hash));
    let data_path = records_dir.join(format!("{}.data", hash));
    (meta_path, data_path)
}
