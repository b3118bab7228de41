//! Speculative load collaborator
//!
//! The heuristics deciding what to preload live outside the cache. The cache
//! only registers loads with the manager and asks it for entries it may
//! already have revalidated. The manager is consulted only while neither
//! low power mode nor thermal mitigation is active.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::entry::Entry;
use super::key::Key;
use super::revalidation::GlobalFrameId;
use crate::resource::ResourceRequest;

/// Preloads and revalidates subresources ahead of their use.
#[async_trait]
pub trait SpeculativeLoadManager: Send + Sync {
    /// A load for `key` started in `frame`.
    fn register_load(&self, frame: GlobalFrameId, request: &ResourceRequest, key: &Key);

    /// True when a speculative load for `key` exists or is in flight.
    fn can_retrieve(&self, key: &Key, request: &ResourceRequest, frame: GlobalFrameId) -> bool;

    /// Entry produced by the speculative load, `None` if it failed.
    async fn retrieve(&self, key: &Key) -> Option<Entry>;
}

/// Holds the optional manager and the environment switches that pause it.
pub(crate) struct SpeculativeGate {
    manager: Option<Arc<dyn SpeculativeLoadManager>>,
    low_power_mode: AtomicBool,
    thermal_mitigation: AtomicBool,
}

impl SpeculativeGate {
    pub fn new(manager: Option<Arc<dyn SpeculativeLoadManager>>) -> Self {
        Self {
            manager,
            low_power_mode: AtomicBool::new(false),
            thermal_mitigation: AtomicBool::new(false),
        }
    }

    /// The manager, if configured and not paused.
    pub fn active(&self) -> Option<&Arc<dyn SpeculativeLoadManager>> {
        if self.low_power_mode.load(Ordering::SeqCst) || self.thermal_mitigation.load(Ordering::SeqCst) {
            return None;
        }
        self.manager.as_ref()
    }

    pub fn set_low_power_mode(&self, enabled: bool) {
        let previous = self.low_power_mode.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            tracing::info!(
                low_power_mode = enabled,
                speculative_loads = self.active().is_some(),
                "Low power mode changed"
            );
        }
    }

    pub fn set_thermal_mitigation(&self, enabled: bool) {
        let previous = self.thermal_mitigation.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            tracing::info!(
                thermal_mitigation = enabled,
                speculative_loads = self.active().is_some(),
                "Thermal mitigation changed"
            );
        }
    }
}
