//! Global configuration constants for smallworld.
//!
//! All tuning defaults and hard limits are defined here. These are
//! compile-time constants; per-index configuration is carried by
//! [`HnswParams`](crate::HnswParams).

/// Default number of bidirectional links per node above layer 0.
///
/// Layer 0 allows `2 * M` links. Higher values improve recall but increase
/// memory and build time. Typical range: 8–48.
pub const DEFAULT_M: usize = 10;

/// Default beam width during index construction.
///
/// Controls the size of the dynamic candidate list while inserting.
/// Higher values produce a better graph but slow down the build.
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Default beam width during search.
///
/// Queries always use at least `k`, so this is a floor, not a cap.
/// Higher values improve recall at the cost of latency.
pub const DEFAULT_EF_SEARCH: usize = 50;

/// Default number of entries in the construction-time distance cache (2^20).
pub const DEFAULT_CACHE_ENTRIES: usize = 1 << 20;

/// Hard cap on distance-cache entries (2^28). Capacities are rounded to a
/// power of two below this limit so slot lookup is a bitmask.
pub const MAX_CACHE_ENTRIES: usize = 1 << 28;

/// Default pre-allocation for the item store.
pub const DEFAULT_INITIAL_ITEMS: usize = 1024;

/// Maximum number of times a query is restarted after the graph mutated
/// underneath it before the failure is surfaced to the caller.
pub const SEARCH_RETRY_LIMIT: usize = 1024;
