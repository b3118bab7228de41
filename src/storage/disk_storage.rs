//! Record store on top of a `DiskBackend`

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;

use super::backend::DiskBackend;
use super::error::StorageError;
use super::index::{IndexEntry, RecordIndex};
use super::record::{millis_to_system_time, record_paths, Record, RecordInfo, RecordMetadata};
use super::tokio_backend::TokioFsBackend;
use super::{MappedBody, Mode, Storage, StorageRetrieval, StorageTimings, TraverseFlags};
use crate::cache::{Key, Salt};
use crate::constants::{
    BODY_SHARE_THRESHOLD, STORAGE_RECORDS_DIRECTORY, STORAGE_SALT_FILE,
    STORAGE_VERSION_DIRECTORY, TRAVERSE_CHANNEL_CAPACITY,
};
use crate::resource::LoadPriority;

/// Disk-backed `Storage`
#[derive(Clone)]
pub struct DiskStorage {
    inner: Arc<Inner>,
}

struct Inner {
    base_path: PathBuf,
    records_dir: PathBuf,
    backend: Arc<dyn DiskBackend>,
    index: RecordIndex,
    salt: Salt,
    capacity: AtomicU64,
    /// Serializes the data-then-meta writes of a store
    write_lock: tokio::sync::Mutex<()>,
}

impl DiskStorage {
    /// Open (or create) storage under `base_path` on the real filesystem.
    pub async fn open(base_path: &Path, mode: Mode, capacity: u64) -> Result<Self, StorageError> {
        Self::open_with_backend(base_path, mode, capacity, Arc::new(TokioFsBackend::new())).await
    }

    pub async fn open_with_backend(
        base_path: &Path,
        mode: Mode,
        capacity: u64,
        backend: Arc<dyn DiskBackend>,
    ) -> Result<Self, StorageError> {
        let version_dir = base_path.join(STORAGE_VERSION_DIRECTORY);
        let records_dir = version_dir.join(STORAGE_RECORDS_DIRECTORY);
        backend.create_dir_all(&records_dir).await?;

        let salt = load_or_create_salt(backend.as_ref(), &version_dir, mode).await?;

        let inner = Inner {
            base_path: base_path.to_path_buf(),
            records_dir,
            backend,
            index: RecordIndex::new(),
            salt,
            capacity: AtomicU64::new(capacity),
            write_lock: tokio::sync::Mutex::new(()),
        };
        inner.rebuild_index().await?;

        tracing::info!(
            path = %base_path.display(),
            records = inner.index.entry_count(),
            size = inner.index.total_size(),
            capacity = capacity,
            "Storage opened"
        );

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn record_count(&self) -> usize {
        self.inner.index.entry_count()
    }
}

async fn load_or_create_salt(
    backend: &dyn DiskBackend,
    version_dir: &Path,
    mode: Mode,
) -> Result<Salt, StorageError> {
    if mode == Mode::AvoidRandomness {
        return Ok([0; 8]);
    }

    let salt_path = version_dir.join(STORAGE_SALT_FILE);
    match backend.read_file(&salt_path).await {
        Ok(data) if data.len() == 8 => {
            let mut salt = [0u8; 8];
            salt.copy_from_slice(&data);
            return Ok(salt);
        }
        Ok(_) => tracing::warn!(path = %salt_path.display(), "Invalid salt file, regenerating"),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }

    let mut salt = [0u8; 8];
    salt.copy_from_slice(&uuid::Uuid::new_v4().as_bytes()[..8]);
    backend
        .write_file_atomic(&salt_path, Bytes::copy_from_slice(&salt))
        .await?;
    Ok(salt)
}

impl Inner {
    fn paths(&self, hash: &str) -> (PathBuf, PathBuf) {
        record_paths(&self.records_dir, hash)
    }

    async fn read_metadata(&self, meta_path: &Path) -> Result<RecordMetadata, StorageError> {
        let data = self.backend.read_file(meta_path).await?;
        serde_json::from_slice(&data).map_err(|e| StorageError::InvalidMetadata(e.to_string()))
    }

    async fn delete_files(&self, hash: &str) -> Result<(), StorageError> {
        let (meta_path, data_path) = self.paths(hash);
        self.backend.delete_file(&meta_path).await?;
        self.backend.delete_file(&data_path).await?;
        Ok(())
    }

    /// Scan `*.meta` files, dropping anything unreadable or inconsistent.
    async fn rebuild_index(&self) -> Result<(), StorageError> {
        let files = self.backend.read_dir(&self.records_dir).await?;
        let mut discarded = 0usize;

        for file_path in files {
            let Some(filename) = file_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if filename.ends_with(".tmp") {
                let _ = self.backend.delete_file(&file_path).await;
                continue;
            }
            let Some(hash) = filename.strip_suffix(".meta") else {
                continue;
            };

            match self.validate_record(hash, &file_path).await {
                Ok(entry) => self.index.insert(entry),
                Err(e) => {
                    tracing::debug!(hash = hash, error = %e, "Discarding unreadable record");
                    discarded += 1;
                    let _ = self.delete_files(hash).await;
                }
            }
        }

        if discarded > 0 {
            tracing::warn!(discarded = discarded, "Discarded invalid records while opening storage");
        }
        Ok(())
    }

    async fn validate_record(&self, hash: &str, meta_path: &Path) -> Result<IndexEntry, StorageError> {
        let metadata = self.read_metadata(meta_path).await?;
        if metadata.key.hash_string() != hash {
            return Err(StorageError::InvalidMetadata("key does not match file name".into()));
        }
        if metadata.body_size > 0 {
            let (_, data_path) = self.paths(hash);
            let size = self.backend.file_size(&data_path).await?;
            if size != metadata.body_size {
                return Err(StorageError::InvalidMetadata(format!(
                    "body size {} does not match metadata {}",
                    size, metadata.body_size
                )));
            }
        }
        Ok(index_entry(&metadata))
    }

    async fn read_record(&self, hash: &str) -> Result<(Record, RecordMetadata), StorageError> {
        let (meta_path, data_path) = self.paths(hash);
        let metadata = self.read_metadata(&meta_path).await?;
        let body = if metadata.body_size > 0 {
            self.backend.read_file(&data_path).await?
        } else {
            Bytes::new()
        };
        let record = Record {
            key: metadata.key.clone(),
            timestamp: millis_to_system_time(metadata.timestamp_ms),
            header: metadata.header_bytes()?,
            body,
            body_hash: metadata.body_hash.clone(),
        };
        Ok((record, metadata))
    }

    async fn remove_hash(&self, hash: &str) -> Result<(), StorageError> {
        self.index.remove(hash);
        self.delete_files(hash).await
    }

    /// Evict least recently used records until the total size fits.
    async fn shrink_if_needed(&self, keep: Option<&str>) -> Result<(), StorageError> {
        let capacity = self.capacity.load(Ordering::SeqCst);
        let mut evicted = 0usize;
        while self.index.total_size() > capacity {
            let Some(victim) = self.index.find_lru_entry(keep) else {
                break;
            };
            self.remove_hash(victim.key.hash_string()).await?;
            evicted += 1;
        }
        if evicted > 0 {
            tracing::debug!(
                evicted = evicted,
                size = self.index.total_size(),
                capacity = capacity,
                "Evicted records over capacity"
            );
        }
        Ok(())
    }
}

fn index_entry(metadata: &RecordMetadata) -> IndexEntry {
    let created_at = millis_to_system_time(metadata.created_at_ms);
    IndexEntry {
        key: metadata.key.clone(),
        timestamp: millis_to_system_time(metadata.timestamp_ms),
        size: metadata.total_size(),
        body_size: metadata.body_size,
        body_hash: metadata.body_hash.clone(),
        created_at,
        last_accessed_at: created_at,
    }
}

#[async_trait]
impl Storage for DiskStorage {
    fn salt(&self) -> Salt {
        self.inner.salt
    }

    fn base_path(&self) -> &Path {
        &self.inner.base_path
    }

    fn capacity(&self) -> u64 {
        self.inner.capacity.load(Ordering::SeqCst)
    }

    async fn set_capacity(&self, capacity: u64) -> Result<(), StorageError> {
        self.inner.capacity.store(capacity, Ordering::SeqCst);
        tracing::info!(capacity = capacity, "Storage capacity changed");
        self.inner.shrink_if_needed(None).await
    }

    fn approximate_size(&self) -> u64 {
        self.inner.index.total_size()
    }

    async fn retrieve(
        &self,
        key: &Key,
        priority: LoadPriority,
    ) -> Result<StorageRetrieval, StorageError> {
        let start_time = SystemTime::now();
        let hash = key.hash_string();

        let record = if self.inner.index.get(hash).is_none() {
            None
        } else {
            match self.inner.read_record(hash).await {
                Ok((record, _)) if record.key == *key => {
                    self.inner.index.touch(hash, SystemTime::now());
                    Some(record)
                }
                Ok(_) => None,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(key = %key, "Record files missing, dropping from index");
                    self.inner.index.remove(hash);
                    None
                }
                Err(e @ StorageError::InvalidMetadata(_)) => {
                    tracing::warn!(key = %key, error = %e, "Removing record with invalid metadata");
                    self.inner.remove_hash(hash).await?;
                    None
                }
                Err(e) => return Err(e),
            }
        };

        tracing::trace!(
            key = %key,
            hit = record.is_some(),
            priority = priority.as_u32(),
            "Storage retrieve"
        );

        Ok(StorageRetrieval {
            record,
            timings: StorageTimings {
                start_time,
                completion_time: SystemTime::now(),
                priority,
            },
        })
    }

    async fn store(&self, record: Record) -> Result<MappedBody, StorageError> {
        let inner = &self.inner;
        if inner.capacity.load(Ordering::SeqCst) == 0 {
            tracing::debug!(key = %record.key, "Storage has no capacity, record dropped");
            return Ok(None);
        }

        let hash = record.key.hash_string().to_string();
        let (meta_path, data_path) = inner.paths(&hash);
        let metadata = RecordMetadata::from_record(&record, SystemTime::now());

        let write_guard = inner.write_lock.lock().await;
        if record.body.is_empty() {
            inner.backend.delete_file(&data_path).await?;
        } else {
            inner
                .backend
                .write_file_atomic(&data_path, record.body.clone())
                .await?;
        }
        let json = serde_json::to_vec(&metadata)?;
        inner
            .backend
            .write_file_atomic(&meta_path, Bytes::from(json))
            .await?;

        inner.index.insert(index_entry(&metadata));
        drop(write_guard);
        inner.shrink_if_needed(Some(&hash)).await?;

        let mapped = if record.body.len() >= BODY_SHARE_THRESHOLD {
            Some(record.body)
        } else {
            None
        };
        Ok(mapped)
    }

    async fn remove(&self, key: &Key) -> Result<(), StorageError> {
        self.inner.remove_hash(key.hash_string()).await
    }

    async fn remove_many(&self, keys: &[Key]) -> Result<(), StorageError> {
        for key in keys {
            self.inner.remove_hash(key.hash_string()).await?;
        }
        Ok(())
    }

    fn traverse(
        &self,
        resource_type: &str,
        partition: Option<&str>,
        flags: TraverseFlags,
    ) -> mpsc::Receiver<(Record, RecordInfo)> {
        let (tx, rx) = mpsc::channel(TRAVERSE_CHANNEL_CAPACITY);
        let partition = partition.map(str::to_string);
        let matching = self.inner.index.entries_matching(|entry| {
            entry.key.resource_type() == resource_type
                && partition
                    .as_deref()
                    .map_or(true, |p| entry.key.partition() == p)
        });
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let now = SystemTime::now();
            for entry in matching {
                let hash = entry.key.hash_string();
                let (record, metadata) = match inner.read_record(hash).await {
                    Ok(read) => read,
                    Err(e) => {
                        tracing::debug!(key = %entry.key, error = %e, "Skipping unreadable record");
                        continue;
                    }
                };

                let mut info = RecordInfo {
                    body_size: metadata.body_size,
                    body_hash: metadata.body_hash.clone(),
                    ..RecordInfo::default()
                };
                if flags.compute_worth {
                    info.worth = inner.index.get(hash).map_or(0.0, |e| e.worth(now));
                }
                if flags.share_count {
                    info.body_share_count = metadata
                        .body_hash
                        .as_deref()
                        .map_or(0, |h| inner.index.body_share_count(h));
                }

                if tx.send((record, info)).await.is_err() {
                    break;
                }
            }
        });

        rx
    }

    async fn clear(
        &self,
        resource_type: Option<&str>,
        modified_since: SystemTime,
    ) -> Result<(), StorageError> {
        let victims = self.inner.index.entries_matching(|entry| {
            resource_type.map_or(true, |t| entry.key.resource_type() == t)
                && entry.timestamp >= modified_since
        });
        let count = victims.len();
        for entry in victims {
            self.inner.remove_hash(entry.key.hash_string()).await?;
        }
        tracing::info!(
            resource_type = resource_type.unwrap_or("*"),
            removed = count,
            "Storage cleared"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use std::time::{Duration, UNIX_EPOCH};

    const BASE: &str = "/cache";

    async fn open(backend: &MemoryBackend, capacity: u64) -> DiskStorage {
        DiskStorage::open_with_backend(
            Path::new(BASE),
            Mode::AvoidRandomness,
            capacity,
            Arc::new(backend.clone()),
        )
        .await
        .unwrap()
    }

    fn key(url: &str) -> Key {
        Key::new("", "Resource", "", url, &[0; 8])
    }

    fn record(url: &str, body: &'static [u8]) -> Record {
        Record::new(
            key(url),
            UNIX_EPOCH + Duration::from_secs(1_000),
            Bytes::from_static(b"header"),
            Bytes::from_static(body),
        )
    }

    #[tokio::test]
    async fn test_store_then_retrieve() {
        let backend = MemoryBackend::new();
        let storage = open(&backend, 1 << 20).await;

        storage.store(record("https://a/", b"body")).await.unwrap();
        let retrieval = storage
            .retrieve(&key("https://a/"), LoadPriority::Medium)
            .await
            .unwrap();
        let found = retrieval.record.unwrap();
        assert_eq!(found.body, Bytes::from_static(b"body"));
        assert_eq!(found.header, Bytes::from_static(b"header"));
        assert_eq!(found.timestamp, UNIX_EPOCH + Duration::from_secs(1_000));
        assert!(retrieval.timings.completion_time >= retrieval.timings.start_time);
    }

    #[tokio::test]
    async fn test_retrieve_missing() {
        let backend = MemoryBackend::new();
        let storage = open(&backend, 1 << 20).await;
        let retrieval = storage
            .retrieve(&key("https://missing/"), LoadPriority::Low)
            .await
            .unwrap();
        assert!(retrieval.record.is_none());
    }

    // Test: only bodies at or above the share threshold are handed back
    #[tokio::test]
    async fn test_mapped_body_threshold() {
        let backend = MemoryBackend::new();
        let storage = open(&backend, 1 << 20).await;

        assert!(storage.store(record("https://small/", b"x")).await.unwrap().is_none());

        let big = Record::new(
            key("https://big/"),
            UNIX_EPOCH,
            Bytes::new(),
            Bytes::from(vec![7u8; BODY_SHARE_THRESHOLD]),
        );
        let mapped = storage.store(big).await.unwrap().unwrap();
        assert_eq!(mapped.len(), BODY_SHARE_THRESHOLD);
    }

    #[tokio::test]
    async fn test_zero_capacity_drops_records() {
        let backend = MemoryBackend::new();
        let storage = open(&backend, 0).await;
        storage.store(record("https://a/", b"body")).await.unwrap();
        assert_eq!(storage.record_count(), 0);
    }

    #[tokio::test]
    async fn test_remove() {
        let backend = MemoryBackend::new();
        let storage = open(&backend, 1 << 20).await;
        storage.store(record("https://a/", b"body")).await.unwrap();
        storage.remove(&key("https://a/")).await.unwrap();

        assert_eq!(storage.record_count(), 0);
        assert_eq!(backend.file_count(), 0);
        assert_eq!(storage.approximate_size(), 0);
    }

    // Test: records survive reopening and the index is rebuilt from .meta files
    #[tokio::test]
    async fn test_reopen_rebuilds_index() {
        let backend = MemoryBackend::new();
        {
            let storage = open(&backend, 1 << 20).await;
            storage.store(record("https://a/", b"body")).await.unwrap();
            storage.store(record("https://b/", b"")).await.unwrap();
        }
        let reopened = open(&backend, 1 << 20).await;
        assert_eq!(reopened.record_count(), 2);
        let found = reopened
            .retrieve(&key("https://a/"), LoadPriority::Medium)
            .await
            .unwrap();
        assert!(found.record.is_some());
    }

    #[tokio::test]
    async fn test_reopen_discards_corrupt_metadata() {
        let backend = MemoryBackend::new();
        {
            let storage = open(&backend, 1 << 20).await;
            storage.store(record("https://a/", b"body")).await.unwrap();
        }
        let hash = key("https://a/").hash_string().to_string();
        let meta_path = Path::new(BASE)
            .join("v1")
            .join("records")
            .join(format!("{}.meta", hash));
        backend.corrupt_file(&meta_path, Bytes::from_static(b"not json"));

        let reopened = open(&backend, 1 << 20).await;
        assert_eq!(reopened.record_count(), 0);
        assert!(backend.read_file(&meta_path).await.is_err());
    }

    // Test: metadata corrupted behind an open store is removed on first read
    #[tokio::test]
    async fn test_retrieve_removes_record_with_corrupt_metadata() {
        let backend = MemoryBackend::new();
        let storage = open(&backend, 1 << 20).await;
        storage.store(record("https://a/", b"body")).await.unwrap();

        let hash = key("https://a/").hash_string().to_string();
        let records = Path::new(BASE).join("v1").join("records");
        let meta_path = records.join(format!("{}.meta", hash));
        backend.corrupt_file(&meta_path, Bytes::from_static(b"not json"));

        let retrieval = storage
            .retrieve(&key("https://a/"), LoadPriority::Medium)
            .await
            .unwrap();
        assert!(retrieval.record.is_none());
        assert_eq!(storage.record_count(), 0);
        assert_eq!(storage.approximate_size(), 0);
        assert!(backend.read_file(&meta_path).await.is_err());
        assert!(backend
            .read_file(&records.join(format!("{}.data", hash)))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_concurrent_stores_for_one_key_stay_consistent() {
        let backend = MemoryBackend::new();
        let storage = open(&backend, 1 << 20).await;

        let (a, b) = tokio::join!(
            storage.store(record("https://a/", b"first body")),
            storage.store(record("https://a/", b"second")),
        );
        a.unwrap();
        b.unwrap();

        let found = storage
            .retrieve(&key("https://a/"), LoadPriority::Medium)
            .await
            .unwrap()
            .record
            .unwrap();
        assert_eq!(found.body_hash, Some(crate::storage::compute_body_hash(&found.body)));
        assert_eq!(storage.record_count(), 1);
    }

    #[tokio::test]
    async fn test_eviction_keeps_newest_record() {
        let backend = MemoryBackend::new();
        // Each record is "header" base64 (8 chars) + 4 body bytes = 12 bytes.
        let storage = open(&backend, 20).await;
        storage.store(record("https://a/", b"aaaa")).await.unwrap();
        storage.store(record("https://b/", b"bbbb")).await.unwrap();

        assert_eq!(storage.record_count(), 1);
        let newest = storage
            .retrieve(&key("https://b/"), LoadPriority::Medium)
            .await
            .unwrap();
        assert!(newest.record.is_some());
    }

    #[tokio::test]
    async fn test_set_capacity_evicts() {
        let backend = MemoryBackend::new();
        let storage = open(&backend, 1 << 20).await;
        storage.store(record("https://a/", b"aaaa")).await.unwrap();
        storage.store(record("https://b/", b"bbbb")).await.unwrap();

        storage.set_capacity(0).await.unwrap();
        assert_eq!(storage.capacity(), 0);
        assert_eq!(storage.record_count(), 0);
    }

    #[tokio::test]
    async fn test_traverse_filters_by_type_and_partition() {
        let backend = MemoryBackend::new();
        let storage = open(&backend, 1 << 20).await;
        storage.store(record("https://a/", b"aaaa")).await.unwrap();
        storage
            .store(Record::new(
                Key::new("site.example", "Resource", "", "https://p/", &[0; 8]),
                UNIX_EPOCH,
                Bytes::new(),
                Bytes::from_static(b"aaaa"),
            ))
            .await
            .unwrap();
        storage
            .store(Record::new(
                Key::new("", "SubResources", "", "https://s/", &[0; 8]),
                UNIX_EPOCH,
                Bytes::new(),
                Bytes::new(),
            ))
            .await
            .unwrap();

        let flags = TraverseFlags {
            compute_worth: true,
            share_count: true,
        };
        let mut rx = storage.traverse("Resource", None, flags);
        let mut seen = Vec::new();
        while let Some((record, info)) = rx.recv().await {
            assert_eq!(info.body_size, 4);
            // Both Resource records share the same body
            assert_eq!(info.body_share_count, 2);
            seen.push(record.key.identifier().to_string());
        }
        seen.sort();
        assert_eq!(seen, vec!["https://a/", "https://p/"]);

        let mut rx = storage.traverse("Resource", Some("site.example"), TraverseFlags::default());
        let (record, _) = rx.recv().await.unwrap();
        assert_eq!(record.key.identifier(), "https://p/");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_modified_since() {
        let backend = MemoryBackend::new();
        let storage = open(&backend, 1 << 20).await;
        storage
            .store(Record::new(key("https://old/"), UNIX_EPOCH + Duration::from_secs(10), Bytes::new(), Bytes::new()))
            .await
            .unwrap();
        storage
            .store(Record::new(key("https://new/"), UNIX_EPOCH + Duration::from_secs(100), Bytes::new(), Bytes::new()))
            .await
            .unwrap();

        storage
            .clear(Some("Resource"), UNIX_EPOCH + Duration::from_secs(50))
            .await
            .unwrap();
        assert_eq!(storage.record_count(), 1);
        assert!(storage
            .retrieve(&key("https://old/"), LoadPriority::Medium)
            .await
            .unwrap()
            .record
            .is_some());

        storage.clear(None, UNIX_EPOCH).await.unwrap();
        assert_eq!(storage.record_count(), 0);
    }

    #[tokio::test]
    async fn test_salt_is_persisted_in_normal_mode() {
        let backend = MemoryBackend::new();
        let first = DiskStorage::open_with_backend(
            Path::new(BASE),
            Mode::Normal,
            1 << 20,
            Arc::new(backend.clone()),
        )
        .await
        .unwrap();
        let second = DiskStorage::open_with_backend(
            Path::new(BASE),
            Mode::Normal,
            1 << 20,
            Arc::new(backend.clone()),
        )
        .await
        .unwrap();
        assert_eq!(first.salt(), second.salt());

        let testing = open(&backend, 1 << 20).await;
        assert_eq!(testing.salt(), [0; 8]);
    }
}
