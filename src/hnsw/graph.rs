//! Graph state and storage: items, nodes, and the distance oracle.
//!
//! Nodes use a struct-of-arrays layout: per-node layer assignments in one
//! array and per-node per-layer neighbor lists in another, indexed by dense
//! `u32` ids. Neighbor lists hold ids, never references, which keeps the
//! intrinsically cyclic graph trivially serializable.

use crate::distance::Metric;
use crate::error::HnswError;
use crate::hnsw::cache::DistanceCache;
use crate::hnsw::params::HnswParams;
use crate::hnsw::select::select_neighbors;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

/// Items plus the metric and the optional construction-time distance cache.
///
/// This is the distance oracle: all pairwise distances between stored items
/// flow through [`distance`](Self::distance), and query-to-item distances
/// through [`distance_to`](Self::distance_to). Only the former consults the
/// cache; the query path bypasses it so readers never contend with the
/// single cache writer.
pub(crate) struct ItemStore<T, M> {
    items: Vec<T>,
    metric: M,
    cache: Option<Mutex<DistanceCache>>,
}

impl<T, M: Metric<T>> ItemStore<T, M> {
    pub fn new(metric: M, params: &HnswParams) -> Self {
        let cache = if params.enable_distance_cache && params.initial_distance_cache_size > 0 {
            Some(Mutex::new(DistanceCache::with_entries(
                params.initial_distance_cache_size,
            )))
        } else {
            None
        };
        Self {
            items: Vec::with_capacity(params.initial_items_size),
            metric,
            cache,
        }
    }

    pub fn from_parts(items: Vec<T>, metric: M) -> Self {
        Self {
            items,
            metric,
            cache: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn get(&self, id: u32) -> &T {
        &self.items[id as usize]
    }

    pub fn try_get(&self, id: u32) -> Option<&T> {
        self.items.get(id as usize)
    }

    pub fn append(&mut self, batch: Vec<T>) {
        self.items.extend(batch);
    }

    /// Distance between two stored items, through the cache when one is live.
    pub fn distance(&self, i: u32, j: u32) -> f32 {
        if let Some(cache) = &self.cache {
            let key = DistanceCache::pair_key(i, j);
            let mut cache = cache.lock();
            if let Some(d) = cache.lookup(key) {
                return d;
            }
            let d = self
                .metric
                .distance(&self.items[i as usize], &self.items[j as usize]);
            cache.store(key, d);
            d
        } else {
            self.metric
                .distance(&self.items[i as usize], &self.items[j as usize])
        }
    }

    /// Distance from an ad hoc query item (not in the store) to a stored
    /// item. Never cached.
    pub fn distance_to(&self, query: &T, id: u32) -> f32 {
        self.metric.distance(query, &self.items[id as usize])
    }

    /// Replaces the cache with one sized for `expected_points` items
    /// (lossy), or drops it when `expected_points` is 0 or caching is
    /// disabled by `params`.
    pub fn resize_cache(&mut self, expected_points: usize, params: &HnswParams) {
        if params.enable_distance_cache && expected_points > 0 {
            self.cache = Some(Mutex::new(DistanceCache::for_points(expected_points)));
        } else {
            self.cache = None;
        }
    }

    /// `(hits, lookups)` of the distance cache, if one is live.
    pub fn cache_stats(&self) -> Option<(u64, u64)> {
        self.cache.as_ref().map(|c| c.lock().stats())
    }
}

/// Append-only store of graph nodes: one layer assignment and one neighbor
/// list per layer for every dense id.
#[derive(Debug, Default)]
pub(crate) struct NodeStore {
    levels: Vec<u32>,
    links: Vec<Vec<Vec<u32>>>,
}

impl NodeStore {
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Appends a node with empty neighbor lists for layers `0..=level`.
    /// Each list reserves `Mmax(layer) + 1` so the connect-then-shrink
    /// overshoot never reallocates.
    pub fn push_node(&mut self, level: u32, params: &HnswParams) {
        let mut layers = Vec::with_capacity(level as usize + 1);
        for layer in 0..=level as usize {
            layers.push(Vec::with_capacity(params.mmax(layer) + 1));
        }
        self.links.push(layers);
        self.levels.push(level);
    }

    pub fn level(&self, id: u32) -> u32 {
        self.levels[id as usize]
    }

    /// Read view of a node's neighbors at `layer`; empty above its level.
    pub fn connections(&self, id: u32, layer: usize) -> &[u32] {
        self.links[id as usize]
            .get(layer)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn from_parts(levels: Vec<u32>, links: Vec<Vec<Vec<u32>>>) -> Self {
        Self { levels, links }
    }

    pub(crate) fn layers_of(&self, id: u32) -> &[Vec<u32>] {
        &self.links[id as usize]
    }

    /// Appends `to` to `from`'s layer list. Past `cap` the list is shrunk
    /// back through the neighbor selector, keeping the best `cap` ids by
    /// distance to `from`.
    pub fn connect<T, M: Metric<T>>(
        &mut self,
        from: u32,
        to: u32,
        layer: usize,
        cap: usize,
        oracle: &ItemStore<T, M>,
        params: &HnswParams,
        version: &AtomicU64,
    ) {
        {
            let list = &mut self.links[from as usize][layer];
            if list.iter().any(|&id| id == to) {
                return;
            }
            list.push(to);
            if list.len() <= cap {
                return;
            }
        }

        version.fetch_add(1, Ordering::Release);
        let owner = from;
        let cost = |id: u32| oracle.distance(owner, id);
        let candidates: Vec<(f32, u32)> = self.links[from as usize][layer]
            .iter()
            .map(|&id| (cost(id), id))
            .collect();
        let kept = select_neighbors(self, &cost, owner, candidates, layer, cap, params);
        let list = &mut self.links[from as usize][layer];
        list.clear();
        list.extend(kept.iter().map(|&(_, id)| id));
    }
}

/// The HNSW graph engine.
///
/// This is the single-threaded surface: mutation requires `&mut self`, and
/// the caller provides any external synchronization. The thread-safe facade
/// is [`HnswIndex`](crate::HnswIndex).
pub struct HnswGraph<T, M: Metric<T>> {
    pub(crate) params: HnswParams,
    pub(crate) oracle: ItemStore<T, M>,
    pub(crate) store: NodeStore,
    pub(crate) entry_point: Option<u32>,
    pub(crate) version: AtomicU64,
    pub(crate) rng: StdRng,
}

impl<T, M: Metric<T>> HnswGraph<T, M> {
    /// Creates an empty graph with an entropy-seeded level RNG.
    pub fn new(params: HnswParams, metric: M) -> Result<Self, HnswError> {
        Self::with_rng(params, metric, StdRng::from_entropy())
    }

    /// Creates an empty graph whose layer assignment is deterministic for a
    /// given seed and insertion order.
    pub fn with_seed(params: HnswParams, metric: M, seed: u64) -> Result<Self, HnswError> {
        Self::with_rng(params, metric, StdRng::seed_from_u64(seed))
    }

    fn with_rng(params: HnswParams, metric: M, rng: StdRng) -> Result<Self, HnswError> {
        params.validate()?;
        let oracle = ItemStore::new(metric, &params);
        Ok(Self {
            params,
            oracle,
            store: NodeStore::default(),
            entry_point: None,
            version: AtomicU64::new(0),
            rng,
        })
    }

    pub(crate) fn from_parts(
        params: HnswParams,
        oracle: ItemStore<T, M>,
        store: NodeStore,
        entry_point: Option<u32>,
    ) -> Self {
        Self {
            params,
            oracle,
            store,
            entry_point,
            version: AtomicU64::new(0),
            rng: StdRng::from_entropy(),
        }
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.len() == 0
    }

    /// The stored item behind `id`.
    pub fn get(&self, id: u32) -> Option<&T> {
        if (id as usize) < self.store.len() {
            self.oracle.try_get(id)
        } else {
            None
        }
    }

    pub fn entry_point(&self) -> Option<u32> {
        self.entry_point
    }

    /// Top layer of the graph, i.e. the entry point's layer assignment.
    pub fn max_level(&self) -> Option<u32> {
        self.entry_point.map(|ep| self.store.level(ep))
    }

    /// Current value of the structural version counter.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    /// Samples a layer assignment: `⌊-ln(u) * λ⌋` with `u` uniform in (0, 1].
    pub(crate) fn sample_level(&mut self) -> u32 {
        let u: f64 = 1.0 - self.rng.gen::<f64>();
        (-u.ln() * self.params.lambda()).floor() as u32
    }

    /// Re-sizes (or drops, with 0) the construction distance cache. Cached
    /// entries are not carried over.
    pub fn resize_distance_cache(&mut self, expected_points: usize) {
        self.oracle.resize_cache(expected_points, &self.params);
    }

    /// `(hits, lookups)` of the distance cache, if one is live.
    pub fn cache_stats(&self) -> Option<(u64, u64)> {
        self.oracle.cache_stats()
    }

    /// Deterministic per-layer adjacency listing, one node per line, ids
    /// ascending and each layer's neighbors sorted. Two graphs with the same
    /// structure produce identical dumps.
    pub fn adjacency_dump(&self) -> String {
        let mut out = String::new();
        for id in 0..self.store.len() as u32 {
            let level = self.store.level(id);
            let _ = write!(out, "{id} (level {level}):");
            for layer in 0..=level as usize {
                let mut ids: Vec<u32> = self.store.connections(id, layer).to_vec();
                ids.sort_unstable();
                let _ = write!(out, " [{layer}:");
                for n in ids {
                    let _ = write!(out, " {n}");
                }
                out.push(']');
            }
            out.push('\n');
        }
        out
    }

    /// Checks the structural invariants of the graph. Returns a description
    /// of the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        let n = self.store.len();
        if self.oracle.len() < n {
            return Err(format!(
                "item store holds {} items for {} nodes",
                self.oracle.len(),
                n
            ));
        }
        match self.entry_point {
            None if n > 0 => return Err("non-empty graph without an entry point".to_string()),
            Some(ep) if n == 0 => return Err(format!("empty graph with entry point {ep}")),
            Some(ep) if (ep as usize) >= n => {
                return Err(format!("entry point {ep} out of range for {n} nodes"));
            }
            _ => {}
        }

        let mut top = 0u32;
        for id in 0..n as u32 {
            let level = self.store.level(id);
            top = top.max(level);
            let layers = self.store.layers_of(id);
            if layers.len() != level as usize + 1 {
                return Err(format!(
                    "node {id} at level {level} has {} layer lists",
                    layers.len()
                ));
            }
            for (layer, list) in layers.iter().enumerate() {
                if list.len() > self.params.mmax(layer) {
                    return Err(format!(
                        "node {id} layer {layer} holds {} links, cap {}",
                        list.len(),
                        self.params.mmax(layer)
                    ));
                }
                let mut seen = Vec::with_capacity(list.len());
                for &nb in list {
                    if nb == id {
                        return Err(format!("node {id} links to itself at layer {layer}"));
                    }
                    if (nb as usize) >= n {
                        return Err(format!(
                            "node {id} layer {layer} links to out-of-range id {nb}"
                        ));
                    }
                    if self.store.level(nb) < layer as u32 {
                        return Err(format!(
                            "node {id} layer {layer} links to {nb} whose level is {}",
                            self.store.level(nb)
                        ));
                    }
                    if seen.contains(&nb) {
                        return Err(format!(
                            "node {id} layer {layer} links to {nb} twice"
                        ));
                    }
                    seen.push(nb);
                }
            }
        }
        if let Some(ep) = self.entry_point {
            if self.store.level(ep) != top {
                return Err(format!(
                    "entry point {ep} at level {}, but the graph's top level is {top}",
                    self.store.level(ep)
                ));
            }
        }
        Ok(())
    }
}
