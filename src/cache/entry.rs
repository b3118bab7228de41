//! Cache entries
//!
//! An `Entry` is either a direct entry (response metadata plus body) or a
//! redirect entry (response metadata plus the request to follow, no body).
//! Entries are encoded into storage `Record`s: the header is JSON, the body
//! is stored as-is and protected by its SHA-256 hash.

use bytes::Bytes;
use http::header::CACHE_CONTROL;
use http::HeaderValue;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

use super::key::Key;
use super::validation::VaryingRequestHeaders;
use crate::resource::{ResourceRequest, ResponseMetadata};
use crate::storage::{compute_body_hash, Record};

/// A cached response.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    key: Key,
    /// When the response was received
    timestamp: SystemTime,
    response: ResponseMetadata,
    varying_request_headers: VaryingRequestHeaders,
    redirect_request: Option<ResourceRequest>,
    buffer: Option<Bytes>,
    /// Size of the encoded header when the entry came from storage
    source_header_size: usize,
    needs_validation: bool,
}

/// Serialized form of everything except the body
#[derive(Serialize, Deserialize)]
struct EntryHeader {
    key: Key,
    timestamp_ms: u64,
    response: ResponseMetadata,
    #[serde(default)]
    varying_request_headers: VaryingRequestHeaders,
    #[serde(default)]
    redirect_request: Option<ResourceRequest>,
    #[serde(default)]
    body_hash: Option<String>,
    #[serde(default)]
    body_size: u64,
}

impl Entry {
    /// Direct entry with an optional body, timestamped now.
    pub fn new(
        key: Key,
        response: ResponseMetadata,
        buffer: Option<Bytes>,
        varying_request_headers: VaryingRequestHeaders,
    ) -> Self {
        Self {
            key,
            timestamp: SystemTime::now(),
            response,
            varying_request_headers,
            redirect_request: None,
            buffer,
            source_header_size: 0,
            needs_validation: false,
        }
    }

    /// Redirect entry pointing at `redirect_request`, timestamped now.
    pub fn new_redirect(
        key: Key,
        response: ResponseMetadata,
        redirect_request: ResourceRequest,
        varying_request_headers: VaryingRequestHeaders,
    ) -> Self {
        Self {
            key,
            timestamp: SystemTime::now(),
            response,
            varying_request_headers,
            redirect_request: Some(redirect_request),
            buffer: None,
            source_header_size: 0,
            needs_validation: false,
        }
    }

    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn response(&self) -> &ResponseMetadata {
        &self.response
    }

    pub fn varying_request_headers(&self) -> &VaryingRequestHeaders {
        &self.varying_request_headers
    }

    pub fn redirect_request(&self) -> Option<&ResourceRequest> {
        self.redirect_request.as_ref()
    }

    pub fn is_redirect(&self) -> bool {
        self.redirect_request.is_some()
    }

    pub fn buffer(&self) -> Option<&Bytes> {
        self.buffer.as_ref()
    }

    pub fn needs_validation(&self) -> bool {
        self.needs_validation
    }

    /// Flag the entry so the loader revalidates it before use. Never persisted.
    pub fn set_needs_validation(&mut self, needs_validation: bool) {
        self.needs_validation = needs_validation;
    }

    pub fn body_size(&self) -> usize {
        self.buffer.as_ref().map_or(0, Bytes::len)
    }

    /// Header plus body bytes as last read from storage.
    pub fn source_storage_size(&self) -> usize {
        self.source_header_size + self.body_size()
    }

    /// Limit the stored freshness to `cap`: a missing or larger `max-age`
    /// is replaced with `max-age=<cap>`.
    pub fn cap_max_age(&mut self, cap: Duration) {
        let max_age = self.response.cache_control().max_age;
        if max_age.is_some_and(|max_age| max_age <= cap) {
            return;
        }
        let value = format!("max-age={}", cap.as_secs());
        if let Ok(value) = HeaderValue::from_str(&value) {
            self.response.set_header(CACHE_CONTROL, value);
        }
    }

    pub fn encode_as_storage_record(&self) -> serde_json::Result<Record> {
        let body = self.buffer.clone().unwrap_or_default();
        let body_hash = if body.is_empty() {
            None
        } else {
            Some(compute_body_hash(&body))
        };
        let header = EntryHeader {
            key: self.key.clone(),
            timestamp_ms: crate::storage::system_time_to_millis(self.timestamp),
            response: self.response.clone(),
            varying_request_headers: self.varying_request_headers.clone(),
            redirect_request: self.redirect_request.clone(),
            body_hash: body_hash.clone(),
            body_size: body.len() as u64,
        };
        let encoded = serde_json::to_vec(&header)?;

        Ok(Record {
            key: self.key.clone(),
            timestamp: self.timestamp,
            header: Bytes::from(encoded),
            body,
            body_hash,
        })
    }

    /// Rebuild an entry from a storage record. `None` when the header does
    /// not parse, belongs to another key or the body fails its hash check.
    pub fn decode_storage_record(record: &Record) -> Option<Self> {
        let header: EntryHeader = match serde_json::from_slice(&record.header) {
            Ok(header) => header,
            Err(e) => {
                tracing::debug!(key = %record.key, error = %e, "Entry header does not decode");
                return None;
            }
        };

        if header.key != record.key {
            tracing::debug!(key = %record.key, "Entry header key mismatch");
            return None;
        }

        let buffer = if header.redirect_request.is_some() {
            None
        } else {
            if header.body_size != record.body.len() as u64 {
                tracing::debug!(key = %record.key, "Entry body size mismatch");
                return None;
            }
            if let Some(ref expected) = header.body_hash {
                if compute_body_hash(&record.body) != *expected {
                    tracing::debug!(key = %record.key, "Entry body hash mismatch");
                    return None;
                }
            }
            Some(record.body.clone())
        };

        Some(Self {
            key: header.key,
            timestamp: crate::storage::millis_to_system_time(header.timestamp_ms),
            response: header.response,
            varying_request_headers: header.varying_request_headers,
            redirect_request: header.redirect_request,
            buffer,
            source_header_size: record.header.len(),
            needs_validation: false,
        })
    }
}
