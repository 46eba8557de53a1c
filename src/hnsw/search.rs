//! Layer search and the k-NN query path.
//!
//! `search_layer` is the bounded-beam best-first traversal both insertion
//! and queries are built on. Queries add the greedy descent from the entry
//! point, optimistic version validation with bounded retries, an optional
//! result predicate, and cooperative cancellation.
//!
//! Filter semantics: the predicate gates entry to the *result* set only.
//! Traversal is never filtered, so aggressively filtered searches still walk
//! the full graph topology; the cost grows with the filtered-out fraction,
//! the connectivity does not.

use crate::cancel::CancellationToken;
use crate::config;
use crate::distance::Metric;
use crate::error::HnswError;
use crate::hnsw::graph::{HnswGraph, NodeStore};
use crate::hnsw::queue::{FarthestFirst, NearestFirst};
use crate::hnsw::visited::VisitedSet;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// One search result: the item, its dense id, and its distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem<T> {
    pub id: u32,
    pub item: T,
    pub distance: f32,
}

/// Reusable per-thread search state: the visited set and both heaps.
pub(crate) struct SearchScratch {
    visited: VisitedSet,
    expansion: NearestFirst,
    results: FarthestFirst,
}

impl SearchScratch {
    fn new() -> Self {
        Self {
            visited: VisitedSet::default(),
            expansion: NearestFirst::new(),
            results: FarthestFirst::new(),
        }
    }

    fn prepare(&mut self, nodes: usize, ef: usize) {
        self.visited.grow_to(nodes);
        self.visited.reset();
        self.expansion.clear();
        self.expansion.reserve(ef + 1);
        self.results.clear();
        self.results.reserve(ef + 1);
    }
}

thread_local! {
    /// Per-thread scratch shared by insertion and queries. Eliminates
    /// per-operation allocation of the visited array and heap buffers.
    static SCRATCH: RefCell<SearchScratch> = RefCell::new(SearchScratch::new());
}

/// Runs `f` with this thread's search scratch.
pub(crate) fn with_scratch<R>(f: impl FnOnce(&mut SearchScratch) -> R) -> R {
    SCRATCH.with(|cell| f(&mut cell.borrow_mut()))
}

/// Bounded-beam best-first search within one layer.
///
/// Returns up to `ef` ids passing `keep`, ascending by `(distance, id)`.
/// Fails with [`HnswError::GraphChanged`] when `version` no longer matches
/// `start_version`; returns the partial result accumulated so far when
/// `cancel` fires.
#[allow(clippy::too_many_arguments)]
pub(crate) fn search_layer<C, K>(
    store: &NodeStore,
    cost: &C,
    entry: u32,
    layer: usize,
    ef: usize,
    keep: &K,
    cancel: &CancellationToken,
    version: &AtomicU64,
    start_version: u64,
    scratch: &mut SearchScratch,
) -> Result<Vec<(f32, u32)>, HnswError>
where
    C: Fn(u32) -> f32,
    K: Fn(u32) -> bool,
{
    scratch.prepare(store.len(), ef);

    let entry_cost = cost(entry);
    scratch.visited.mark(entry);
    scratch.expansion.push(entry_cost, entry);
    if keep(entry) {
        scratch.results.push(entry_cost, entry);
    }

    loop {
        if cancel.is_cancelled() {
            break;
        }
        if version.load(Ordering::Relaxed) != start_version {
            return Err(HnswError::GraphChanged);
        }
        let Some((dist, id)) = scratch.expansion.pop() else {
            break;
        };
        if let Some(farthest) = scratch.results.farthest() {
            if dist > farthest {
                break;
            }
        }
        for &nb in store.connections(id, layer) {
            if cancel.is_cancelled() {
                break;
            }
            if !scratch.visited.mark(nb) {
                continue;
            }
            let d = cost(nb);
            let admit = scratch.results.len() < ef
                || scratch.results.farthest().map_or(true, |far| d < far);
            if admit {
                scratch.expansion.push(d, nb);
                if keep(nb) {
                    scratch.results.push(d, nb);
                    if scratch.results.len() > ef {
                        scratch.results.pop();
                    }
                }
            }
        }
    }

    let mut out = Vec::new();
    scratch.results.drain_ascending(&mut out);
    Ok(out)
}

impl<T: Clone, M: Metric<T>> HnswGraph<T, M> {
    /// k nearest neighbors of `query`, ascending by distance.
    ///
    /// The query item is not inserted; its distances are computed ad hoc and
    /// never touch the construction cache. An empty graph yields an empty
    /// result; `k` larger than the graph yields every node.
    pub fn search(&self, query: &T, k: usize) -> Result<Vec<ScoredItem<T>>, HnswError> {
        self.search_with(query, k, None::<&fn(&T) -> bool>, &CancellationToken::new())
    }

    /// Like [`search`](Self::search), keeping only items accepted by
    /// `filter`. Filtered-out nodes are still traversed.
    pub fn search_filtered<F>(
        &self,
        query: &T,
        k: usize,
        filter: F,
    ) -> Result<Vec<ScoredItem<T>>, HnswError>
    where
        F: Fn(&T) -> bool,
    {
        self.search_with(query, k, Some(&filter), &CancellationToken::new())
    }

    /// Full-control search: optional result filter plus a cancellation
    /// token. Cancellation is not an error; the best partial result found so
    /// far comes back. A query that keeps racing structural mutations is
    /// retried from scratch up to [`config::SEARCH_RETRY_LIMIT`] times
    /// before [`HnswError::GraphChanged`] surfaces.
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
        for _ in 0..config::SEARCH_RETRY_LIMIT {
            match self.search_attempt(query, k, filter, cancel) {
                Err(HnswError::GraphChanged) => continue,
                other => return other,
            }
        }
        tracing::warn!(
            retries = config::SEARCH_RETRY_LIMIT,
            "graph kept mutating; search retry budget exhausted"
        );
        Err(HnswError::GraphChanged)
    }

    fn search_attempt<F>(
        &self,
        query: &T,
        k: usize,
        filter: Option<&F>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoredItem<T>>, HnswError>
    where
        F: Fn(&T) -> bool,
    {
        let start_version = self.version.load(Ordering::Acquire);
        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };
        let cost = |id: u32| self.oracle.distance_to(query, id);
        let keep_all = |_: u32| true;

        with_scratch(|scratch| {
            let mut best = entry;
            let mut best_dist = cost(entry);
            for layer in (1..=self.store.level(entry) as usize).rev() {
                let found = search_layer(
                    &self.store,
                    &cost,
                    best,
                    layer,
                    1,
                    &keep_all,
                    cancel,
                    &self.version,
                    start_version,
                    scratch,
                )?;
                if let Some(&(d, id)) = found.first() {
                    if d < best_dist {
                        best = id;
                        best_dist = d;
                    }
                }
            }

            let ef = self.params.ef_search.max(k);
            let mut raw = match filter {
                Some(f) => {
                    let keep = |id: u32| f(self.oracle.get(id));
                    search_layer(
                        &self.store,
                        &cost,
                        best,
                        0,
                        ef,
                        &keep,
                        cancel,
                        &self.version,
                        start_version,
                        scratch,
                    )?
                }
                None => search_layer(
                    &self.store,
                    &cost,
                    best,
                    0,
                    ef,
                    &keep_all,
                    cancel,
                    &self.version,
                    start_version,
                    scratch,
                )?,
            };
            raw.truncate(k);
            Ok(raw
                .into_iter()
                .map(|(distance, id)| ScoredItem {
                    id,
                    item: self.oracle.get(id).clone(),
                    distance,
                })
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::EuclideanDistance;
    use crate::hnsw::params::HnswParams;
    use std::cell::Cell;

    fn params() -> HnswParams {
        HnswParams {
            initial_distance_cache_size: 0,
            ..HnswParams::default()
        }
    }

    /// Hand-built single-layer path graph over items 0.0, 1.0, ..
    fn path_graph(n: usize) -> HnswGraph<Vec<f32>, EuclideanDistance> {
        let p = params();
        let mut graph = HnswGraph::with_seed(p.clone(), EuclideanDistance, 1).unwrap();
        let items: Vec<Vec<f32>> = (0..n).map(|i| vec![i as f32]).collect();
        graph.oracle.append(items);
        let version = AtomicU64::new(0);
        for i in 0..n as u32 {
            graph.store.push_node(0, &p);
            if i > 0 {
                graph
                    .store
                    .connect(i - 1, i, 0, p.mmax(0), &graph.oracle, &p, &version);
                graph
                    .store
                    .connect(i, i - 1, 0, p.mmax(0), &graph.oracle, &p, &version);
            }
        }
        graph.entry_point = Some(0);
        graph
    }

    #[test]
    fn test_search_layer_walks_the_path() {
        let graph = path_graph(10);
        let query = vec![7.2];
        let cost = |id: u32| graph.oracle.distance_to(&query, id);
        let keep_all = |_: u32| true;
        let out = with_scratch(|scratch| {
            search_layer(
                &graph.store,
                &cost,
                0,
                0,
                3,
                &keep_all,
                &CancellationToken::new(),
                &graph.version,
                0,
                scratch,
            )
        })
        .unwrap();
        let ids: Vec<u32> = out.iter().map(|&(_, id)| id).collect();
        assert_eq!(ids, vec![7, 8, 6]);
        assert!(out.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn test_search_layer_filter_skips_results_not_traversal() {
        let graph = path_graph(10);
        let query = vec![9.0];
        let cost = |id: u32| graph.oracle.distance_to(&query, id);
        // Only even ids may enter the result; reaching id 8 from the entry
        // still requires walking through the odd ids.
        let keep_even = |id: u32| id % 2 == 0;
        let out = with_scratch(|scratch| {
            search_layer(
                &graph.store,
                &cost,
                0,
                0,
                2,
                &keep_even,
                &CancellationToken::new(),
                &graph.version,
                0,
                scratch,
            )
        })
        .unwrap();
        let ids: Vec<u32> = out.iter().map(|&(_, id)| id).collect();
        assert!(ids.iter().all(|id| id % 2 == 0));
        assert!(ids.contains(&8));
    }

    #[test]
    fn test_search_layer_raises_graph_changed() {
        let graph = path_graph(5);
        let cost = |id: u32| graph.oracle.distance_to(&vec![2.0], id);
        let keep_all = |_: u32| true;
        graph.version.fetch_add(1, Ordering::Release);
        let res = with_scratch(|scratch| {
            search_layer(
                &graph.store,
                &cost,
                0,
                0,
                3,
                &keep_all,
                &CancellationToken::new(),
                &graph.version,
                0,
                scratch,
            )
        });
        assert!(matches!(res, Err(HnswError::GraphChanged)));
    }

    #[test]
    fn test_cancelled_search_returns_partial_sorted() {
        let graph = path_graph(10);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = graph
            .search_with(&vec![4.0], 5, None::<&fn(&Vec<f32>) -> bool>, &cancel)
            .unwrap();
        // The entry seed is the only thing a pre-cancelled search can see.
        assert!(out.len() <= 1);
        for hit in &out {
            assert!((hit.id as usize) < graph.len());
        }
    }

    #[test]
    fn test_search_retries_after_transient_mutation() {
        let graph = path_graph(8);
        let bumped = Cell::new(false);
        let version = &graph.version;
        // The filter fires mid-search; the first bump forces one retry.
        let filter = |_: &Vec<f32>| {
            if !bumped.get() {
                bumped.set(true);
                version.fetch_add(1, Ordering::Release);
            }
            true
        };
        let out = graph
            .search_with(&vec![3.0], 3, Some(&filter), &CancellationToken::new())
            .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].id, 3);
    }

    #[test]
    fn test_search_surfaces_graph_changed_when_budget_exhausted() {
        let graph = path_graph(4);
        let version = &graph.version;
        let filter = |_: &Vec<f32>| {
            version.fetch_add(1, Ordering::Release);
            true
        };
        let res = graph.search_with(&vec![1.0], 2, Some(&filter), &CancellationToken::new());
        assert!(matches!(res, Err(HnswError::GraphChanged)));
    }

    #[test]
    fn test_search_empty_graph() {
        let graph = HnswGraph::new(params(), EuclideanDistance).unwrap();
        assert!(graph.search(&vec![1.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_returns_sorted_scored_items() {
        let graph = path_graph(6);
        let out = graph.search(&vec![2.4], 4).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].id, 2);
        assert_eq!(out[0].item, vec![2.0]);
        assert!(out.windows(2).all(|w| w[0].distance <= w[1].distance));
    }
}
