//! Error types for index construction, search, and snapshot handling.

use thiserror::Error;

/// Errors surfaced by the smallworld index.
///
/// `GraphChanged` is transient: the query path consumes it internally and
/// retries; callers only see it after the retry budget is exhausted.
#[derive(Debug, Error)]
pub enum HnswError {
    /// Construction-time parameter validation failure.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// The requested operation is not permitted in the current state,
    /// e.g. serializing an empty graph.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// The snapshot stream does not start with the `"HNSW"` magic string.
    #[error("snapshot header mismatch: expected \"HNSW\", found {found:?}")]
    InvalidHeader { found: [u8; 4] },

    /// The snapshot decoded but failed structural validation.
    #[error("snapshot failed validation: {0}")]
    CorruptSnapshot(String),

    /// Snapshot payload could not be encoded or decoded. A truncated stream
    /// shows up here as an unexpected-EOF codec error, distinct from a bad
    /// header.
    #[error("snapshot codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// The graph was structurally mutated while a search was traversing it.
    #[error("graph changed during search")]
    GraphChanged,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
