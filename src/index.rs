//! Thread-safe index facade.
//!
//! [`HnswIndex`] wraps the graph engine in a readers-writer gate: `add` and
//! `resize_distance_cache` take the write lock, everything else shares the
//! read lock. For single-threaded callers the raw
//! [`HnswGraph`](crate::HnswGraph) is the ungated alternative; there the
//! caller guarantees external synchronization.

use crate::cancel::CancellationToken;
use crate::distance::Metric;
use crate::error::HnswError;
use crate::hnsw::{HnswGraph, HnswParams, ScoredItem};
use parking_lot::RwLock;
use std::io::{Read, Write};

/// A shared-memory HNSW index: one writer at a time, any number of readers.
pub struct HnswIndex<T, M: Metric<T>> {
    graph: RwLock<HnswGraph<T, M>>,
}

impl<T, M: Metric<T>> HnswIndex<T, M> {
    /// Creates an empty index with an entropy-seeded level RNG.
    pub fn new(params: HnswParams, metric: M) -> Result<Self, HnswError> {
        Ok(Self::from_graph(HnswGraph::new(params, metric)?))
    }

    /// Creates an empty index whose build is deterministic for a given seed
    /// and (serialized) insertion order.
    pub fn with_seed(params: HnswParams, metric: M, seed: u64) -> Result<Self, HnswError> {
        Ok(Self::from_graph(HnswGraph::with_seed(params, metric, seed)?))
    }

    /// Wraps an existing graph in the concurrency gate.
    pub fn from_graph(graph: HnswGraph<T, M>) -> Self {
        Self {
            graph: RwLock::new(graph),
        }
    }

    /// Unwraps the facade, returning the inner graph.
    pub fn into_graph(self) -> HnswGraph<T, M> {
        self.graph.into_inner()
    }

    /// Inserts a batch of items, returning their assigned ids. Writer-gated;
    /// inserts within the batch are serialized.
    pub fn add(&self, items: Vec<T>) -> Vec<u32> {
        self.graph.write().add(items)
    }

    /// Number of indexed items.
    pub fn len(&self) -> usize {
        self.graph.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.read().is_empty()
    }

    /// Current value of the structural version counter.
    pub fn version(&self) -> u64 {
        self.graph.read().version()
    }

    /// Re-sizes (or drops, with 0) the construction distance cache.
    pub fn resize_distance_cache(&self, expected_points: usize) {
        self.graph.write().resize_distance_cache(expected_points);
    }

    /// `(hits, lookups)` of the distance cache, if one is live.
    pub fn cache_stats(&self) -> Option<(u64, u64)> {
        self.graph.read().cache_stats()
    }

    /// Deterministic per-layer adjacency listing, sorted by id.
    pub fn adjacency_dump(&self) -> String {
        self.graph.read().adjacency_dump()
    }

    /// Writes a snapshot of the graph to `sink`. Reader-gated, so it is
    /// mutually exclusive with writers but not with other readers.
    pub fn snapshot<W: Write>(&self, sink: W) -> Result<(), HnswError> {
        self.graph.read().snapshot(sink)
    }

    /// Restores an index from a snapshot stream plus the caller's item list.
    /// Returns the index and the items beyond the serialized node count.
    pub fn restore<R: Read>(
        source: R,
        items: Vec<T>,
        metric: M,
    ) -> Result<(Self, Vec<T>), HnswError> {
        let (graph, leftover) = HnswGraph::restore(source, items, metric)?;
        Ok((Self::from_graph(graph), leftover))
    }
}

impl<T: Clone, M: Metric<T>> HnswIndex<T, M> {
    /// The item stored under `id`.
    pub fn item(&self, id: u32) -> Option<T> {
        self.graph.read().get(id).cloned()
    }

    /// k nearest neighbors of `query`, ascending by distance.
    pub fn search(&self, query: &T, k: usize) -> Result<Vec<ScoredItem<T>>, HnswError> {
        self.graph.read().search(query, k)
    }

    /// Like [`search`](Self::search), keeping only items accepted by
    /// `filter`. The predicate gates results, not traversal.
    pub fn search_filtered<F>(
        &self,
        query: &T,
        k: usize,
        filter: F,
    ) -> Result<Vec<ScoredItem<T>>, HnswError>
    where
        F: Fn(&T) -> bool,
    {
        self.graph.read().search_filtered(query, k, filter)
    }

    /// Full-control search with an optional filter and a cancellation token.
    pub fn search_with<F>(
        &self,
        query: &T,
        k: usize,
        filter: Option<&F>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoredItem<T>>, HnswError>
    where
        F: Fn(&T) -> bool,
    {
        self.graph.read().search_with(query, k, filter, cancel)
    }
}
