// Constants module - centralized default values
//
// Defaults for configuration plus the fixed limits the cache and storage
// rely on.

// =============================================================================
// Configuration defaults
// =============================================================================

/// Default storage directory
pub const DEFAULT_STORAGE_DIRECTORY: &str = "/var/cache/http-disk-cache";

/// Default log level filter
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Stale-while-revalidate is honoured unless disabled
pub const DEFAULT_STALE_WHILE_REVALIDATE: bool = true;

// =============================================================================
// Cache defaults
// =============================================================================

/// Resource type of every entry written by the HTTP cache
pub const DEFAULT_RESOURCE_TYPE: &str = "Resource";

/// Maximum number of facade traversals running at once
pub const MAX_PARALLEL_TRAVERSALS: usize = 3;

// =============================================================================
// Capacity
// =============================================================================

/// Free space is divided by 1000 KB instead of 1 MiB to leave some slack.
pub const FREE_SPACE_UNIT_BYTES: u64 = 1024 * 1000;

/// One megabyte as used by the capacity tables
pub const MB: u64 = 1024 * 1024;

// =============================================================================
// Storage
// =============================================================================

/// Version directory under the storage root
pub const STORAGE_VERSION_DIRECTORY: &str = "v1";

/// Directory holding `.meta` / `.data` pairs
pub const STORAGE_RECORDS_DIRECTORY: &str = "records";

/// File holding the 8 byte key salt
pub const STORAGE_SALT_FILE: &str = "salt";

/// Bodies at least this large are handed back as shareable after a store
pub const BODY_SHARE_THRESHOLD: usize = 16 * 1024;

/// Buffered records per traversal channel
pub const TRAVERSE_CHANNEL_CAPACITY: usize = 32;
