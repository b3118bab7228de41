//! Disk capacity derived from the cache model and free volume space

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{FREE_SPACE_UNIT_BYTES, MB};

/// How aggressively the embedding application caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheModel {
    /// Minimal caching, e.g. a document viewer
    DocumentViewer,
    /// Moderate caching for a secondary browser
    DocumentBrowser,
    /// Full caching for the primary web browser
    #[default]
    PrimaryWebBrowser,
}

/// Disk cache capacity in bytes for `free_space_mb` megabytes of free space.
pub fn calculate_url_cache_disk_capacity(model: CacheModel, free_space_mb: u64) -> u64 {
    match model {
        CacheModel::DocumentViewer => 0,
        CacheModel::DocumentBrowser => {
            if free_space_mb >= 16384 {
                75 * MB
            } else if free_space_mb >= 8192 {
                40 * MB
            } else if free_space_mb >= 4096 {
                30 * MB
            } else {
                20 * MB
            }
        }
        CacheModel::PrimaryWebBrowser => {
            // Capacity is bounded by free space, not by memory.
            if free_space_mb >= 16384 {
                1024 * MB
            } else if free_space_mb >= 8192 {
                500 * MB
            } else if free_space_mb >= 4096 {
                250 * MB
            } else if free_space_mb >= 2048 {
                200 * MB
            } else if free_space_mb >= 1024 {
                150 * MB
            } else {
                100 * MB
            }
        }
    }
}

/// Free bytes available to unprivileged users on the volume holding `path`.
#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
pub fn volume_free_space(path: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };

    // SAFETY: statvfs is called with a valid NUL-terminated path and a
    // properly sized output struct
    let result = unsafe { libc::statvfs(c_path.as_ptr(), &mut stats) };
    if result != 0 {
        return None;
    }

    Some((stats.f_bavail as u64).saturating_mul(stats.f_frsize as u64))
}

#[cfg(not(unix))]
pub fn volume_free_space(_path: &Path) -> Option<u64> {
    None
}

/// Capacity for `model` on the volume holding `path`. Unknown free space
/// gives a capacity of zero.
pub fn compute_capacity(model: CacheModel, path: &Path) -> u64 {
    match volume_free_space(path) {
        Some(free_bytes) => {
            let free_space_mb = free_bytes / FREE_SPACE_UNIT_BYTES;
            calculate_url_cache_disk_capacity(model, free_space_mb)
        }
        None => {
            tracing::warn!(path = %path.display(), "Could not determine free disk space");
            0
        }
    }
}
