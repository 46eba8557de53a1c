//! Incremental insertion.
//!
//! Items append to the store first; each new node then gets a sampled layer
//! assignment, a greedy descent from the entry point, and per-layer
//! bidirectional connections chosen by the neighbor selector. Insertion is
//! not transactional: the version counter brackets every structural
//! mutation so overlapping readers retry instead of observing a half-written
//! neighbor list.

use crate::cancel::CancellationToken;
use crate::distance::Metric;
use crate::hnsw::graph::HnswGraph;
use crate::hnsw::search::{search_layer, with_scratch};
use crate::hnsw::select::select_neighbors;
use std::sync::atomic::Ordering;

impl<T, M: Metric<T>> HnswGraph<T, M> {
    /// Appends `batch` to the item store and links one node per item.
    /// Returns the assigned ids, in batch order.
    pub fn add(&mut self, batch: Vec<T>) -> Vec<u32> {
        if batch.is_empty() {
            return Vec::new();
        }
        let first = self.oracle.len() as u32;
        self.oracle.append(batch);
        let ids: Vec<u32> = (first..self.oracle.len() as u32).collect();
        for &id in &ids {
            self.insert_node(id);
        }
        ids
    }

    fn insert_node(&mut self, id: u32) {
        self.version.fetch_add(1, Ordering::Release);
        let level = self.sample_level();
        self.store.push_node(level, &self.params);

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(id);
            return;
        };
        let entry_level = self.store.level(entry);

        let params = &self.params;
        let oracle = &self.oracle;
        let version = &self.version;
        let store = &mut self.store;
        let cancel = CancellationToken::new();
        let cost = |other: u32| oracle.distance(id, other);
        let keep_all = |_: u32| true;

        with_scratch(|scratch| {
            let mut best = entry;
            let mut best_dist = cost(entry);

            // Descent: single-width beam from the top of the graph down to
            // the first layer above the new node's level.
            for layer in (level as usize + 1..=entry_level as usize).rev() {
                let start = version.load(Ordering::Acquire);
                let found = search_layer(
                    store, &cost, best, layer, 1, &keep_all, &cancel, version, start, scratch,
                )
                .expect("single-writer search cannot observe a version change");
                if let Some(&(d, node)) = found.first() {
                    if d < best_dist {
                        best = node;
                        best_dist = d;
                    }
                }
            }

            // Connect: full beam per shared layer; the selector caps the
            // outgoing links at Mmax(layer), and the reverse connection may
            // shrink the neighbor's list.
            let top = level.min(entry_level) as usize;
            for layer in (0..=top).rev() {
                let start = version.load(Ordering::Acquire);
                let candidates = search_layer(
                    store,
                    &cost,
                    best,
                    layer,
                    params.ef_construction,
                    &keep_all,
                    &cancel,
                    version,
                    start,
                    scratch,
                )
                .expect("single-writer search cannot observe a version change");

                let cap = params.mmax(layer);
                let selected = select_neighbors(store, &cost, id, candidates, layer, cap, params);
                for &(d, nb) in &selected {
                    version.fetch_add(1, Ordering::Release);
                    store.connect(id, nb, layer, cap, oracle, params, version);
                    version.fetch_add(1, Ordering::Release);
                    store.connect(nb, id, layer, cap, oracle, params, version);
                    if d < best_dist {
                        best = nb;
                        best_dist = d;
                    }
                }
            }
        });

        if level > entry_level {
            self.entry_point = Some(id);
        }
    }
}
