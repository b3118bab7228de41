//! Diagnostic value types
//!
//! - `RetrieveInfo`: timing of one facade retrieval
//! - `TraversalEntry`: an entry plus its storage metadata
//! - `CacheSummary`: totals over the whole cache
//! - `WebsiteDataEntry`: per-origin aggregation for website data management

use serde::Serialize;
use std::time::SystemTime;

use super::entry::Entry;
use crate::resource::{LoadPriority, SecurityOrigin};
use crate::storage::{RecordInfo, StorageTimings};

/// Timing of a facade retrieval
#[derive(Debug, Clone)]
pub struct RetrieveInfo {
    pub start_time: SystemTime,
    pub completion_time: SystemTime,
    /// Present when storage was queried
    pub storage_timings: Option<StorageTimings>,
    pub priority: LoadPriority,
    pub was_speculative_load: bool,
}

impl RetrieveInfo {
    pub(crate) fn started(priority: LoadPriority) -> Self {
        let now = SystemTime::now();
        Self {
            start_time: now,
            completion_time: now,
            storage_timings: None,
            priority,
            was_speculative_load: false,
        }
    }

    pub(crate) fn complete(mut self) -> Self {
        self.completion_time = SystemTime::now();
        self
    }
}

/// One item yielded by a facade traversal
#[derive(Debug, Clone)]
pub struct TraversalEntry {
    pub entry: Entry,
    pub record_info: RecordInfo,
}

/// Totals over every entry of the cache
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheSummary {
    pub capacity: u64,
    pub count: u64,
    pub body_size: u64,
    pub average_worth: f64,
}

impl CacheSummary {
    pub(crate) fn add(&mut self, info: &RecordInfo) {
        self.count += 1;
        self.body_size += info.body_size;
        self.average_worth += info.worth;
    }

    pub(crate) fn finish(mut self) -> Self {
        if self.count > 0 {
            self.average_worth /= self.count as f64;
        }
        self
    }
}

/// Cached data attributed to one security origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebsiteDataEntry {
    pub origin: SecurityOrigin,
    /// Header plus body bytes, when size computation was requested
    pub size: Option<u64>,
}
