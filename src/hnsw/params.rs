//! Index construction parameters.
//!
//! [`HnswParams`] controls the trade-off between build speed, search speed,
//! recall, and memory. Parameters are frozen at construction and travel
//! inside snapshots.

use crate::config;
use crate::error::HnswError;
use serde::{Deserialize, Serialize};

/// Strategy used when choosing which candidates become graph neighbors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeighborStrategy {
    /// Keep the M candidates closest to the target, ties to the smaller id.
    #[default]
    Simple,
    /// The diversity heuristic (Algorithm 4 of the HNSW paper): a candidate
    /// is kept only while it beats the farthest already-kept neighbor, with
    /// optional candidate expansion and pruned-connection retention.
    Heuristic,
}

/// Configuration parameters for an HNSW graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswParams {
    /// Number of bidirectional links per node above layer 0; layer 0 allows
    /// `2 * m`.
    pub m: usize,
    /// Scale of the exponential layer distribution. `None` means `1 / ln(m)`.
    pub level_lambda: Option<f64>,
    /// Neighbor selection strategy.
    pub neighbor_strategy: NeighborStrategy,
    /// Beam width while inserting.
    pub ef_construction: usize,
    /// Beam width while searching; queries use `max(k, ef_search)`.
    pub ef_search: usize,
    /// Heuristic only: also consider the candidates' own neighbors.
    pub expand_best_selection: bool,
    /// Heuristic only: top the result back up from discarded candidates.
    pub keep_pruned_connections: bool,
    /// Whether the pairwise distance cache is live during construction.
    pub enable_distance_cache: bool,
    /// Entries in the construction cache; 0 disables it outright. Forced to
    /// 0 when a graph is restored from a snapshot.
    pub initial_distance_cache_size: usize,
    /// Pre-allocation for the item store.
    pub initial_items_size: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: config::DEFAULT_M,
            level_lambda: None,
            neighbor_strategy: NeighborStrategy::default(),
            ef_construction: config::DEFAULT_EF_CONSTRUCTION,
            ef_search: config::DEFAULT_EF_SEARCH,
            expand_best_selection: false,
            keep_pruned_connections: false,
            enable_distance_cache: true,
            initial_distance_cache_size: config::DEFAULT_CACHE_ENTRIES,
            initial_items_size: config::DEFAULT_INITIAL_ITEMS,
        }
    }
}

impl HnswParams {
    /// Rejects parameter combinations the graph cannot run with.
    pub fn validate(&self) -> Result<(), HnswError> {
        if self.m < 2 {
            return Err(HnswError::InvalidParameter("m must be at least 2"));
        }
        if self.ef_construction == 0 {
            return Err(HnswError::InvalidParameter(
                "ef_construction must be positive",
            ));
        }
        if self.ef_search == 0 {
            return Err(HnswError::InvalidParameter("ef_search must be positive"));
        }
        if let Some(lambda) = self.level_lambda {
            if !(lambda > 0.0) || !lambda.is_finite() {
                return Err(HnswError::InvalidParameter(
                    "level_lambda must be positive and finite",
                ));
            }
        }
        Ok(())
    }

    /// Per-layer cap on neighbor-list length: `2 * m` at layer 0, `m` above.
    pub(crate) fn mmax(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m * 2
        } else {
            self.m
        }
    }

    /// Effective layer-distribution scale.
    pub(crate) fn lambda(&self) -> f64 {
        self.level_lambda
            .unwrap_or_else(|| 1.0 / (self.m as f64).ln())
    }
}
