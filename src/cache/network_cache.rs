//! Cache facade
//!
//! `Cache` ties the key builder, the decision functions and the revalidation
//! coordinator to a `Storage`. Policy outcomes never surface as errors: a
//! rejected retrieve is a miss and a rejected store returns `None`. Storage
//! failures are logged and treated the same way.

use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

use super::capacity::{compute_capacity, CacheModel};
use super::entry::Entry;
use super::error::CacheError;
use super::key::Key;
use super::policy::{
    can_use_speculative_revalidation, make_retrieve_decision, make_store_decision,
    make_use_decision, RetrieveDecision, StoreDecision, UseDecision,
};
use super::revalidation::{AsyncRevalidator, GlobalFrameId, RevalidationCoordinator};
use super::speculative::{SpeculativeGate, SpeculativeLoadManager};
use super::stats::{CacheSummary, RetrieveInfo, TraversalEntry, WebsiteDataEntry};
use super::validation::{
    collect_varying_request_headers, update_response_headers_after_revalidation,
    verify_varying_request_headers,
};
use crate::constants::{
    DEFAULT_RESOURCE_TYPE, DEFAULT_STALE_WHILE_REVALIDATE, MAX_PARALLEL_TRAVERSALS,
};
use crate::resource::{
    RegistrableDomain, ResourceRequest, ResponseMetadata, SecurityOrigin,
};
use crate::storage::{
    DiskStorage, MappedBody, Mode, Record, RecordInfo, Storage, TraverseFlags,
};

/// Options fixed when the cache is opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Reproducible keys (zero salt)
    pub testing_mode: bool,
    /// Consult the session's speculative load manager
    pub speculative_revalidation: bool,
    /// Fixed capacity in bytes instead of one derived from free disk space
    pub capacity_override: Option<u64>,
}

/// The network session owning the cache and its collaborators
#[derive(Clone)]
pub struct Session {
    pub id: u64,
    pub cache_model: CacheModel,
    pub stale_while_revalidate_enabled: bool,
    pub revalidator: Option<Arc<dyn AsyncRevalidator>>,
    pub speculative_load_manager: Option<Arc<dyn SpeculativeLoadManager>>,
}

impl Session {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            cache_model: CacheModel::default(),
            stale_while_revalidate_enabled: DEFAULT_STALE_WHILE_REVALIDATE,
            revalidator: None,
            speculative_load_manager: None,
        }
    }

    pub fn with_cache_model(mut self, cache_model: CacheModel) -> Self {
        self.cache_model = cache_model;
        self
    }

    pub fn with_stale_while_revalidate(mut self, enabled: bool) -> Self {
        self.stale_while_revalidate_enabled = enabled;
        self
    }

    pub fn with_revalidator(mut self, revalidator: Arc<dyn AsyncRevalidator>) -> Self {
        self.revalidator = Some(revalidator);
        self
    }

    pub fn with_speculative_load_manager(mut self, manager: Arc<dyn SpeculativeLoadManager>) -> Self {
        self.speculative_load_manager = Some(manager);
        self
    }
}

/// A stored entry and the body bytes storage shared back
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub entry: Entry,
    pub mapped_body: MappedBody,
}

/// Releases a traversal slot when dropped
struct TraversalSlot {
    active: Arc<AtomicUsize>,
}

impl Drop for TraversalSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Stream of decodable entries. Records that fail to decode are skipped.
pub struct Traversal {
    receiver: Option<mpsc::Receiver<(Record, RecordInfo)>>,
    _slot: Option<TraversalSlot>,
}

impl Traversal {
    fn finished() -> Self {
        Self {
            receiver: None,
            _slot: None,
        }
    }

    /// Next entry, `None` at the end of the traversal.
    pub async fn next(&mut self) -> Option<TraversalEntry> {
        let receiver = self.receiver.as_mut()?;
        while let Some((record, record_info)) = receiver.recv().await {
            if let Some(entry) = Entry::decode_storage_record(&record) {
                return Some(TraversalEntry { entry, record_info });
            }
        }
        self.receiver = None;
        None
    }
}

/// HTTP disk cache for one session
pub struct Cache {
    storage: Arc<dyn Storage>,
    session_id: u64,
    options: CacheOptions,
    cache_model: CacheModel,
    stale_while_revalidate_enabled: bool,
    revalidation: RevalidationCoordinator,
    speculative: SpeculativeGate,
    active_traversals: Arc<AtomicUsize>,
    resource_type: String,
}

impl Cache {
    /// Open the cache in `storage_directory`, creating it if needed.
    ///
    /// Capacity comes from the session's cache model and the free space of
    /// the volume, unless `options.capacity_override` is set.
    pub async fn open(
        storage_directory: &Path,
        options: CacheOptions,
        session: Session,
    ) -> Result<Self, CacheError> {
        tokio::fs::create_dir_all(storage_directory)
            .await
            .map_err(|source| CacheError::CreateDirectory {
                path: storage_directory.to_path_buf(),
                source,
            })?;

        let capacity = options
            .capacity_override
            .unwrap_or_else(|| compute_capacity(session.cache_model, storage_directory));
        let mode = if options.testing_mode {
            Mode::AvoidRandomness
        } else {
            Mode::Normal
        };
        let storage = DiskStorage::open(storage_directory, mode, capacity).await?;

        Ok(Self::with_storage(Arc::new(storage), options, session))
    }

    /// Build a cache on an already opened storage.
    pub fn with_storage(storage: Arc<dyn Storage>, options: CacheOptions, session: Session) -> Self {
        let manager = if options.speculative_revalidation {
            session.speculative_load_manager
        } else {
            None
        };

        tracing::info!(
            session = session.id,
            path = %storage.base_path().display(),
            capacity = storage.capacity(),
            cache_model = ?session.cache_model,
            speculative_revalidation = manager.is_some(),
            stale_while_revalidate = session.stale_while_revalidate_enabled,
            "Cache opened"
        );

        Self {
            storage,
            session_id: session.id,
            options,
            cache_model: session.cache_model,
            stale_while_revalidate_enabled: session.stale_while_revalidate_enabled,
            revalidation: RevalidationCoordinator::new(session.revalidator),
            speculative: SpeculativeGate::new(manager),
            active_traversals: Arc::new(AtomicUsize::new(0)),
            resource_type: DEFAULT_RESOURCE_TYPE.to_string(),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn make_cache_key(&self, request: &ResourceRequest) -> Key {
        Key::from_request(request, &self.resource_type, &self.storage.salt())
    }

    /// Look up a usable entry for `request`.
    ///
    /// Entries that must be validated before use come back with
    /// `needs_validation` set. `frame` scopes background revalidation; without
    /// it a stale-while-revalidate hit is returned for synchronous validation.
    pub async fn retrieve(
        &self,
        request: &ResourceRequest,
        frame: Option<GlobalFrameId>,
    ) -> (Option<Entry>, RetrieveInfo) {
        let mut info = RetrieveInfo::started(request.priority);
        let key = self.make_cache_key(request);

        let speculative = match (self.speculative.active(), frame) {
            (Some(manager), Some(frame)) if can_use_speculative_revalidation(request) => {
                manager.register_load(frame, request, &key);
                Some((manager, frame))
            }
            _ => None,
        };

        match make_retrieve_decision(request) {
            RetrieveDecision::Yes => {}
            decision @ (RetrieveDecision::NoDueToHttpMethod
            | RetrieveDecision::NoDueToReloadIgnoringCache) => {
                tracing::debug!(url = %request.url, decision = %decision, "Not retrieving from cache");
                return (None, info.complete());
            }
        }

        if let Some((manager, frame)) = speculative {
            if manager.can_retrieve(&key, request, frame) {
                if let Some(entry) = manager.retrieve(&key).await {
                    if !verify_varying_request_headers(entry.varying_request_headers(), request) {
                        tracing::debug!(key = %key, "Speculative entry failed vary check");
                        return (None, info.complete());
                    }
                    tracing::debug!(key = %key, "Retrieved speculatively loaded entry");
                    info.was_speculative_load = true;
                    return (Some(entry), info.complete());
                }
            }
        }

        let retrieval = match self.storage.retrieve(&key, request.priority).await {
            Ok(retrieval) => retrieval,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Storage retrieve failed");
                return (None, info.complete());
            }
        };
        info.storage_timings = Some(retrieval.timings);

        let Some(record) = retrieval.record else {
            tracing::debug!(key = %key, "Cache miss");
            return (None, info.complete());
        };

        let Some(mut entry) = Entry::decode_storage_record(&record) else {
            tracing::warn!(key = %key, decision = %UseDecision::NoDueToDecodeFailure, "Removing undecodable record");
            if let Err(e) = self.storage.remove(&key).await {
                tracing::warn!(key = %key, error = %e, "Failed to remove undecodable record");
            }
            return (None, info.complete());
        };

        let decision = make_use_decision(
            &entry,
            request,
            SystemTime::now(),
            self.stale_while_revalidate_enabled,
        );
        tracing::debug!(key = %key, decision = %decision, "Use decision");

        match decision {
            UseDecision::Use => {}
            UseDecision::AsyncRevalidate => match frame {
                Some(frame) if self.revalidation.has_revalidator() => {
                    let mut revalidating = entry.clone();
                    revalidating.set_needs_validation(true);
                    self.revalidation.start_if_needed(request, &revalidating, frame);
                }
                _ => entry.set_needs_validation(true),
            },
            UseDecision::Validate => entry.set_needs_validation(true),
            UseDecision::NoDueToVaryingHeaderMismatch
            | UseDecision::NoDueToRequestContainingFragments
            | UseDecision::NoDueToMissingValidatorFields
            | UseDecision::NoDueToExpiredRedirect
            | UseDecision::NoDueToDecodeFailure => return (None, info.complete()),
        }

        (Some(entry), info.complete())
    }

    /// Store a network response.
    ///
    /// When the response may not be stored, any existing entry for the
    /// request is removed unless the response is a 304.
    pub async fn store(
        &self,
        request: &ResourceRequest,
        response: ResponseMetadata,
        body: Option<Bytes>,
    ) -> Option<StoredEntry> {
        let body_size = body.as_ref().map_or(0, Bytes::len);
        let decision = make_store_decision(request, &response, body_size, SystemTime::now());
        let key = self.make_cache_key(request);

        match decision {
            StoreDecision::Yes => {}
            StoreDecision::NoDueToProtocol
            | StoreDecision::NoDueToHttpMethod
            | StoreDecision::NoDueToNoStoreRequest
            | StoreDecision::NoDueToNoStoreResponse
            | StoreDecision::NoDueToHttpStatusCode
            | StoreDecision::NoDueToRequestContainingFragments
            | StoreDecision::NoDueToUnlikelyToReuse
            | StoreDecision::NoDueToStreamingMedia => {
                tracing::debug!(key = %key, status = response.status, decision = %decision, "Not storing response");
                let is_successful_revalidation = response.status == 304;
                if !is_successful_revalidation {
                    self.remove(&key).await;
                }
                return None;
            }
        }

        let varying_request_headers = collect_varying_request_headers(request, &response);
        let entry = Entry::new(key, response, body, varying_request_headers);
        let mapped_body = self.persist(&entry).await;

        tracing::debug!(key = %entry.key(), body_size = body_size, "Stored entry");
        Some(StoredEntry { entry, mapped_body })
    }

    /// Store a redirect. The redirect request loses its `Authorization`
    /// header and the response's `max-age` is capped at `max_age_cap`.
    pub async fn store_redirect(
        &self,
        request: &ResourceRequest,
        response: ResponseMetadata,
        redirect_request: ResourceRequest,
        max_age_cap: Option<Duration>,
    ) -> Option<Entry> {
        let decision = make_store_decision(request, &response, 0, SystemTime::now());
        if decision != StoreDecision::Yes {
            tracing::debug!(url = %request.url, decision = %decision, "Not storing redirect");
            return None;
        }

        let mut redirect_request = redirect_request;
        redirect_request.clear_authorization();

        let key = self.make_cache_key(request);
        let varying_request_headers = collect_varying_request_headers(request, &response);
        let mut entry = Entry::new_redirect(key, response, redirect_request, varying_request_headers);
        if let Some(cap) = max_age_cap {
            entry.cap_max_age(cap);
        }

        self.persist(&entry).await;
        tracing::debug!(key = %entry.key(), "Stored redirect");
        Some(entry)
    }

    /// Refresh `existing_entry` with the headers of a 304 and store it.
    pub async fn update(
        &self,
        original_request: &ResourceRequest,
        existing_entry: &Entry,
        validating_response: &ResponseMetadata,
    ) -> Entry {
        let mut response = existing_entry.response().clone();
        update_response_headers_after_revalidation(&mut response, validating_response);

        let varying_request_headers = collect_varying_request_headers(original_request, &response);
        let entry = Entry::new(
            existing_entry.key().clone(),
            response,
            existing_entry.buffer().cloned(),
            varying_request_headers,
        );

        self.persist(&entry).await;
        tracing::debug!(key = %entry.key(), "Updated entry after revalidation");
        entry
    }

    async fn persist(&self, entry: &Entry) -> MappedBody {
        let record = match entry.encode_as_storage_record() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(key = %entry.key(), error = %e, "Failed to encode entry");
                return None;
            }
        };
        match self.storage.store(record).await {
            Ok(mapped_body) => mapped_body,
            Err(e) => {
                tracing::warn!(key = %entry.key(), error = %e, "Storage store failed");
                None
            }
        }
    }

    pub async fn remove(&self, key: &Key) {
        if let Err(e) = self.storage.remove(key).await {
            tracing::warn!(key = %key, error = %e, "Failed to remove entry");
        }
    }

    pub async fn remove_request(&self, request: &ResourceRequest) {
        let key = self.make_cache_key(request);
        self.remove(&key).await;
    }

    pub async fn remove_keys(&self, keys: &[Key]) {
        if keys.is_empty() {
            return;
        }
        if let Err(e) = self.storage.remove_many(keys).await {
            tracing::warn!(count = keys.len(), error = %e, "Failed to remove entries");
        }
    }

    /// Remove entries stored at or after `modified_since`.
    pub async fn clear(&self, modified_since: SystemTime) {
        tracing::info!(session = self.session_id, "Clearing cache");
        if let Err(e) = self
            .storage
            .clear(Some(&self.resource_type), modified_since)
            .await
        {
            tracing::warn!(error = %e, "Failed to clear cache");
        }
    }

    pub async fn clear_all(&self) {
        self.clear(UNIX_EPOCH).await;
    }

    /// Walk every entry. At most `MAX_PARALLEL_TRAVERSALS` run at a time;
    /// extra requests get an already finished traversal.
    pub fn traverse(&self) -> Traversal {
        self.traverse_partition(None)
    }

    pub fn traverse_partition(&self, partition: Option<&str>) -> Traversal {
        let acquired = self
            .active_traversals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
                (active < MAX_PARALLEL_TRAVERSALS).then_some(active + 1)
            })
            .is_ok();
        if !acquired {
            tracing::warn!(
                limit = MAX_PARALLEL_TRAVERSALS,
                "Too many parallel traversals, ending traversal immediately"
            );
            return Traversal::finished();
        }

        let slot = TraversalSlot {
            active: Arc::clone(&self.active_traversals),
        };
        let flags = TraverseFlags {
            compute_worth: true,
            share_count: true,
        };
        Traversal {
            receiver: Some(self.storage.traverse(&self.resource_type, partition, flags)),
            _slot: Some(slot),
        }
    }

    async fn for_each_entry<F>(&self, flags: TraverseFlags, mut handler: F)
    where
        F: FnMut(Entry, RecordInfo),
    {
        let mut receiver = self.storage.traverse(&self.resource_type, None, flags);
        while let Some((record, info)) = receiver.recv().await {
            if let Some(entry) = Entry::decode_storage_record(&record) {
                handler(entry, info);
            }
        }
    }

    /// Cached data grouped by the security origin of each stored response.
    pub async fn fetch_data(&self, compute_size: bool) -> Vec<WebsiteDataEntry> {
        let mut sizes: HashMap<SecurityOrigin, u64> = HashMap::new();
        self.for_each_entry(TraverseFlags::default(), |entry, _| {
            let Some(origin) = SecurityOrigin::from_url(&entry.response().url) else {
                return;
            };
            *sizes.entry(origin).or_default() += entry.source_storage_size() as u64;
        })
        .await;

        let mut entries: Vec<WebsiteDataEntry> = sizes
            .into_iter()
            .map(|(origin, size)| WebsiteDataEntry {
                origin,
                size: compute_size.then_some(size),
            })
            .collect();
        entries.sort_by(|a, b| a.origin.cmp(&b.origin));
        entries
    }

    /// Remove every entry whose response came from one of `origins`.
    pub async fn delete_data(&self, origins: &[SecurityOrigin]) {
        let origins: HashSet<&SecurityOrigin> = origins.iter().collect();
        let mut keys = Vec::new();
        self.for_each_entry(TraverseFlags::default(), |entry, _| {
            let matches = SecurityOrigin::from_url(&entry.response().url)
                .is_some_and(|origin| origins.contains(&origin));
            if matches {
                keys.push(entry.key().clone());
            }
        })
        .await;

        tracing::info!(origins = origins.len(), entries = keys.len(), "Deleting cached data for origins");
        self.remove_keys(&keys).await;
    }

    /// Remove every entry whose response host belongs to one of `domains`.
    /// Returns the domains that had at least one entry.
    pub async fn delete_data_for_registrable_domains(
        &self,
        domains: &[RegistrableDomain],
    ) -> HashSet<RegistrableDomain> {
        let requested: HashSet<RegistrableDomain> = domains.iter().cloned().collect();
        let mut keys = Vec::new();
        let mut found = HashSet::new();
        self.for_each_entry(TraverseFlags::default(), |entry, _| {
            let matched = RegistrableDomain::candidates_for_url(&entry.response().url)
                .into_iter()
                .find(|candidate| requested.contains(candidate));
            if let Some(domain) = matched {
                keys.push(entry.key().clone());
                found.insert(domain);
            }
        })
        .await;

        tracing::info!(
            domains = domains.len(),
            found = found.len(),
            entries = keys.len(),
            "Deleting cached data for registrable domains"
        );
        self.remove_keys(&keys).await;
        found
    }

    /// Totals over every entry, with the average worth of the records.
    pub async fn summary(&self) -> CacheSummary {
        let mut summary = CacheSummary {
            capacity: self.storage.capacity(),
            ..CacheSummary::default()
        };
        let flags = TraverseFlags {
            compute_worth: true,
            share_count: false,
        };
        self.for_each_entry(flags, |_, info| summary.add(&info)).await;
        summary.finish()
    }

    pub fn capacity(&self) -> u64 {
        self.storage.capacity()
    }

    /// Recompute the capacity from the cache model and free disk space.
    pub async fn update_capacity(&self) {
        let capacity = self
            .options
            .capacity_override
            .unwrap_or_else(|| compute_capacity(self.cache_model, self.storage.base_path()));
        tracing::info!(capacity = capacity, "Updating cache capacity");
        if let Err(e) = self.storage.set_capacity(capacity).await {
            tracing::warn!(capacity = capacity, error = %e, "Failed to update capacity");
        }
    }

    /// Cancel background revalidations started for `frame`.
    pub fn browsing_context_removed(&self, frame: GlobalFrameId) -> usize {
        self.revalidation.cancel_for_frame(frame)
    }

    pub fn has_pending_revalidation(&self, key: &Key) -> bool {
        self.revalidation.is_pending(key)
    }

    pub fn pending_revalidation_count(&self) -> usize {
        self.revalidation.pending_count()
    }

    pub fn set_low_power_mode(&self, enabled: bool) {
        self.speculative.set_low_power_mode(enabled);
    }

    pub fn set_thermal_mitigation(&self, enabled: bool) {
        self.speculative.set_thermal_mitigation(enabled);
    }

    /// True while a speculative load manager is configured and not paused.
    pub fn speculative_loads_active(&self) -> bool {
        self.speculative.active().is_some()
    }
}
