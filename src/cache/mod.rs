//! HTTP disk cache policy
//!
//! - `Key`: salted identifier of a stored record
//! - `Entry`: a cached response or redirect
//! - `policy`: retrieve, use and store decisions
//! - `RevalidationCoordinator`: background stale-while-revalidate loads
//! - `Cache`: the facade combining all of the above with a `Storage`

pub mod capacity;
mod control;
mod entry;
mod error;
mod key;
mod network_cache;
pub mod policy;
mod revalidation;
mod speculative;
mod stats;
pub mod validation;

pub use capacity::{calculate_url_cache_disk_capacity, CacheModel};
pub use control::CacheControl;
pub use entry::Entry;
pub use error::CacheError;
pub use key::{Key, Salt};
pub use network_cache::{Cache, CacheOptions, Session, StoredEntry, Traversal};
pub use policy::{RetrieveDecision, StoreDecision, UseDecision};
pub use revalidation::{
    AsyncRevalidationResult, AsyncRevalidator, GlobalFrameId, RevalidationCoordinator,
};
pub use speculative::SpeculativeLoadManager;
pub use stats::{CacheSummary, RetrieveInfo, TraversalEntry, WebsiteDataEntry};
