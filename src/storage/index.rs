//! In-memory index of stored records

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::cache::Key;

/// What the index knows about one record without touching the disk
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub key: Key,
    pub timestamp: SystemTime,
    pub size: u64,
    pub body_size: u64,
    pub body_hash: Option<String>,
    pub created_at: SystemTime,
    pub last_accessed_at: SystemTime,
}

impl IndexEntry {
    /// Share of the record's lifetime during which it kept being used.
    pub fn worth(&self, now: SystemTime) -> f64 {
        let age = now
            .duration_since(self.created_at)
            .unwrap_or_default()
            .as_secs_f64();
        if age <= 0.0 {
            return 1.0;
        }
        let used = self
            .last_accessed_at
            .duration_since(self.created_at)
            .unwrap_or_default()
            .as_secs_f64();
        (used / age).clamp(0.0, 1.0)
    }
}

/// Thread-safe index of records keyed by key hash
#[derive(Default)]
pub struct RecordIndex {
    entries: RwLock<HashMap<String, IndexEntry>>,
    total_size: AtomicU64,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &str) -> Option<IndexEntry> {
        self.entries.read().get(hash).cloned()
    }

    /// Insert or replace the entry for `entry.key`.
    pub fn insert(&self, entry: IndexEntry) {
        let size = entry.size;
        let hash = entry.key.hash_string().to_string();
        let previous = self.entries.write().insert(hash, entry);
        if let Some(previous) = previous {
            self.total_size.fetch_sub(previous.size, Ordering::SeqCst);
        }
        self.total_size.fetch_add(size, Ordering::SeqCst);
    }

    pub fn remove(&self, hash: &str) -> Option<IndexEntry> {
        let removed = self.entries.write().remove(hash);
        if let Some(ref entry) = removed {
            self.total_size.fetch_sub(entry.size, Ordering::SeqCst);
        }
        removed
    }

    /// Record a use of the record.
    pub fn touch(&self, hash: &str, now: SystemTime) {
        if let Some(entry) = self.entries.write().get_mut(hash) {
            entry.last_accessed_at = now;
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size.load(Ordering::SeqCst)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Least recently accessed entry, skipping `except`.
    pub fn find_lru_entry(&self, except: Option<&str>) -> Option<IndexEntry> {
        self.entries
            .read()
            .iter()
            .filter(|(hash, _)| Some(hash.as_str()) != except)
            .min_by_key(|(_, entry)| entry.last_accessed_at)
            .map(|(_, entry)| entry.clone())
    }

    /// Entries matching `filter`, in no particular order.
    pub fn entries_matching<F>(&self, filter: F) -> Vec<IndexEntry>
    where
        F: Fn(&IndexEntry) -> bool,
    {
        self.entries
            .read()
            .values()
            .filter(|entry| filter(entry))
            .cloned()
            .collect()
    }

    /// Number of records whose body hashes to `body_hash`.
    pub fn body_share_count(&self, body_hash: &str) -> u32 {
        self.entries
            .read()
            .values()
            .filter(|entry| entry.body_hash.as_deref() == Some(body_hash))
            .count() as u32
    }
}
