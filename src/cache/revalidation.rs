//! Background revalidation of stale-while-revalidate entries
//!
//! At most one revalidation runs per key. Each revalidation is also indexed
//! by the frame that triggered it so that closing the frame cancels its
//! work:
//! - First request for a key: spawns a task and records its abort handle
//! - Later requests for the same key: coalesced, nothing is spawned
//! - Task completion: removes itself from both indices
//! - Frame removal: aborts every task the frame registered

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::task::AbortHandle;

use super::entry::Entry;
use super::key::Key;
use crate::resource::ResourceRequest;

/// Identifies a frame across processes: the owning page proxy, the page
/// and the frame inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalFrameId {
    pub page_proxy_id: u64,
    pub page_id: u64,
    pub frame_id: u64,
}

impl GlobalFrameId {
    pub fn new(page_proxy_id: u64, page_id: u64, frame_id: u64) -> Self {
        Self {
            page_proxy_id,
            page_id,
            frame_id,
        }
    }
}

impl fmt::Display for GlobalFrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.page_proxy_id, self.page_id, self.frame_id)
    }
}

/// Outcome reported by an `AsyncRevalidator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncRevalidationResult {
    Success,
    Failure,
    Cancelled,
}

/// Performs the network revalidation of a stale entry and refreshes the
/// cache with the result.
#[async_trait]
pub trait AsyncRevalidator: Send + Sync {
    async fn revalidate(&self, request: ResourceRequest, entry: Entry) -> AsyncRevalidationResult;
}

struct PendingRevalidation {
    id: u64,
    frame: GlobalFrameId,
    handle: AbortHandle,
}

#[derive(Default)]
struct PendingState {
    by_key: HashMap<Key, PendingRevalidation>,
    by_frame: HashMap<GlobalFrameId, HashSet<Key>>,
    next_id: u64,
}

impl PendingState {
    /// Remove `key` if it is still owned by revalidation `id`.
    fn finish(&mut self, key: &Key, id: u64) -> bool {
        match self.by_key.get(key) {
            Some(pending) if pending.id == id => {}
            _ => return false,
        }
        if let Some(pending) = self.by_key.remove(key) {
            if let Some(keys) = self.by_frame.get_mut(&pending.frame) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_frame.remove(&pending.frame);
                }
            }
        }
        true
    }
}

/// Tracks in-flight background revalidations
pub struct RevalidationCoordinator {
    state: Arc<Mutex<PendingState>>,
    revalidator: Option<Arc<dyn AsyncRevalidator>>,
}

impl RevalidationCoordinator {
    pub fn new(revalidator: Option<Arc<dyn AsyncRevalidator>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(PendingState::default())),
            revalidator,
        }
    }

    pub fn has_revalidator(&self) -> bool {
        self.revalidator.is_some()
    }

    /// Start revalidating `entry` for `frame` unless a revalidation for its
    /// key is already running. Returns true when a new task was spawned.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_if_needed(
        &self,
        request: &ResourceRequest,
        entry: &Entry,
        frame: GlobalFrameId,
    ) -> bool {
        let Some(revalidator) = self.revalidator.clone() else {
            tracing::debug!(key = %entry.key(), "No revalidator configured, skipping");
            return false;
        };

        let key = entry.key().clone();
        let mut state = self.state.lock();
        if state.by_key.contains_key(&key) {
            tracing::debug!(key = %key, frame = %frame, "Revalidation already in flight, coalesced");
            return false;
        }

        let id = state.next_id;
        state.next_id += 1;

        let weak: Weak<Mutex<PendingState>> = Arc::downgrade(&self.state);
        let task_key = key.clone();
        let request = request.clone();
        let entry = entry.clone();
        let task = tokio::spawn(async move {
            let result = revalidator.revalidate(request, entry).await;
            // The cache may be gone by now.
            let Some(state) = weak.upgrade() else {
                return;
            };
            if state.lock().finish(&task_key, id) {
                tracing::debug!(key = %task_key, result = ?result, "Revalidation finished");
            }
        });

        state.by_key.insert(
            key.clone(),
            PendingRevalidation {
                id,
                frame,
                handle: task.abort_handle(),
            },
        );
        state.by_frame.entry(frame).or_default().insert(key.clone());

        tracing::debug!(key = %key, frame = %frame, "Revalidation started");
        true
    }

    /// Abort every revalidation registered by `frame`. Returns how many were
    /// cancelled; revalidations of other frames are untouched.
    pub fn cancel_for_frame(&self, frame: GlobalFrameId) -> usize {
        let mut state = self.state.lock();
        let Some(keys) = state.by_frame.remove(&frame) else {
            return 0;
        };

        let mut cancelled = 0;
        for key in keys {
            let owned = state
                .by_key
                .get(&key)
                .is_some_and(|pending| pending.frame == frame);
            if !owned {
                continue;
            }
            if let Some(pending) = state.by_key.remove(&key) {
                pending.handle.abort();
                cancelled += 1;
            }
        }

        if cancelled > 0 {
            tracing::debug!(frame = %frame, cancelled = cancelled, "Cancelled revalidations for frame");
        }
        cancelled
    }

    pub fn is_pending(&self, key: &Key) -> bool {
        self.state.lock().by_key.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().by_key.len()
    }

    pub fn pending_count_for_frame(&self, frame: GlobalFrameId) -> usize {
        self.state
            .lock()
            .by_frame
            .get(&frame)
            .map_or(0, HashSet::len)
    }
}

impl Drop for RevalidationCoordinator {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        for (_, pending) in state.by_key.drain() {
            pending.handle.abort();
        }
        state.by_frame.clear();
    }
}
