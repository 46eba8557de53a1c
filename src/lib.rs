//! # smallworld
//!
//! An embeddable in-memory Hierarchical Navigable Small World (HNSW) index
//! for approximate nearest-neighbor search over a caller-supplied metric
//! space.
//!
//! ## Features
//!
//! - **Layered proximity graph** over opaque items with dense `u32` ids,
//!   insertion-only, with simple or heuristic neighbor selection
//! - **Tunable search** via beam widths (`ef_construction`, `ef_search`),
//!   result filtering, and cooperative cancellation
//! - **Optimistic reader consistency**: an atomic version counter brackets
//!   every structural mutation; overlapping readers retry instead of
//!   observing a half-written neighbor list
//! - **Construction distance cache**: direct-mapped, keyed by unordered
//!   item pairs, bypassed entirely by queries
//! - **Snapshots** to any `io::Write` sink (magic-framed bincode), restored
//!   against the caller's item list
//!
//! ## Architecture
//!
//! ```text
//! HnswIndex (RwLock writer gate) → HnswGraph → { NodeStore, ItemStore }
//! Insert:  level sample → greedy descent → per-layer beam → select → connect
//! Search:  descent (ef=1) → layer-0 beam (max(k, ef_search)) → sort/truncate
//! Snapshot: "HNSW" magic → params → node array → entry point (bincode)
//! ```

/// Cooperative cancellation token for long-running searches.
pub mod cancel;
/// Global configuration constants: defaults, limits, and retry budgets.
pub mod config;
/// The `Metric` trait and built-in distance functions for `Vec<f32>` items.
pub mod distance;
/// Error taxonomy for construction, search, and snapshot handling.
pub mod error;
/// The HNSW graph engine: storage, insertion, search, and selection.
pub mod hnsw;
/// Thread-safe index facade with a readers-writer gate.
pub mod index;
/// Snapshot codec: deterministic graph serialization.
mod snapshot;

pub use cancel::CancellationToken;
pub use distance::{CosineDistance, DotProductDistance, EuclideanDistance, Metric};
pub use error::HnswError;
pub use hnsw::{HnswGraph, HnswParams, NeighborStrategy, ScoredItem};
pub use index::HnswIndex;
