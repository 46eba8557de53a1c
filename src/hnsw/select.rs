//! Neighbor selection: which candidates become graph edges.
//!
//! Two strategies with one contract: at most `cap` ids, no duplicates, never
//! the target itself. The strategy is fixed at construction, so the dispatch
//! here is a plain match, not a virtual call on the search hot path.

use crate::hnsw::graph::NodeStore;
use crate::hnsw::params::{HnswParams, NeighborStrategy};
use crate::hnsw::queue::NearestFirst;
use ordered_float::OrderedFloat;
use std::collections::HashSet;

/// Picks up to `cap` neighbors for `target` out of `candidates`
/// (`(distance-to-target, id)` pairs) at the given layer.
pub(crate) fn select_neighbors<C>(
    store: &NodeStore,
    cost: &C,
    target: u32,
    candidates: Vec<(f32, u32)>,
    layer: usize,
    cap: usize,
    params: &HnswParams,
) -> Vec<(f32, u32)>
where
    C: Fn(u32) -> f32,
{
    match params.neighbor_strategy {
        NeighborStrategy::Simple => select_simple(candidates, target, cap),
        NeighborStrategy::Heuristic => {
            select_heuristic(store, cost, target, candidates, layer, cap, params)
        }
    }
}

/// Top-`cap` by distance, ties broken by the smaller id.
fn select_simple(mut candidates: Vec<(f32, u32)>, target: u32, cap: usize) -> Vec<(f32, u32)> {
    candidates.retain(|&(_, id)| id != target);
    candidates.sort_unstable_by_key(|&(d, id)| (OrderedFloat(d), id));
    candidates.dedup_by_key(|&mut (_, id)| id);
    candidates.truncate(cap);
    candidates
}

/// Algorithm 4 from the HNSW paper. Maintains a working queue `W`
/// (closer-first), the result `R`, and a discard queue `Wd` (closer-first).
/// A popped candidate joins `R` only while it beats the farthest member of
/// `R`; with `keep_pruned_connections`, `R` is topped back up from `Wd`.
fn select_heuristic<C>(
    store: &NodeStore,
    cost: &C,
    target: u32,
    candidates: Vec<(f32, u32)>,
    layer: usize,
    cap: usize,
    params: &HnswParams,
) -> Vec<(f32, u32)>
where
    C: Fn(u32) -> f32,
{
    let mut seen: HashSet<u32> = HashSet::with_capacity(candidates.len() * 2);
    let mut working = NearestFirst::with_capacity(candidates.len() + 1);
    for &(d, id) in &candidates {
        if id != target && seen.insert(id) {
            working.push(d, id);
        }
    }

    if params.expand_best_selection {
        for &(_, id) in &candidates {
            for &nb in store.connections(id, layer) {
                if nb != target && seen.insert(nb) {
                    working.push(cost(nb), nb);
                }
            }
        }
    }

    let mut result: Vec<(f32, u32)> = Vec::with_capacity(cap);
    let mut discarded = NearestFirst::new();
    let mut farthest = f32::NEG_INFINITY;
    while result.len() < cap {
        let Some((d, id)) = working.pop() else { break };
        if result.is_empty() || d < farthest {
            farthest = farthest.max(d);
            result.push((d, id));
        } else if params.keep_pruned_connections {
            discarded.push(d, id);
        }
    }

    if params.keep_pruned_connections {
        while result.len() < cap {
            let Some((d, id)) = discarded.pop() else { break };
            result.push((d, id));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_store(n: usize, level: u32) -> NodeStore {
        let params = HnswParams::default();
        let mut store = NodeStore::default();
        for _ in 0..n {
            store.push_node(level, &params);
        }
        store
    }

    fn simple_params() -> HnswParams {
        HnswParams::default()
    }

    fn heuristic_params(expand: bool, keep_pruned: bool) -> HnswParams {
        HnswParams {
            neighbor_strategy: NeighborStrategy::Heuristic,
            expand_best_selection: expand,
            keep_pruned_connections: keep_pruned,
            ..HnswParams::default()
        }
    }

    #[test]
    fn test_simple_top_m_with_ties() {
        let store = line_store(6, 0);
        let cost = |id: u32| id as f32;
        let candidates = vec![(2.0, 4), (1.0, 3), (1.0, 1), (3.0, 5), (0.5, 2)];
        let picked = select_neighbors(&store, &cost, 0, candidates, 0, 3, &simple_params());
        // Tie at distance 1.0 resolves to the smaller id.
        assert_eq!(picked, vec![(0.5, 2), (1.0, 1), (1.0, 3)]);
    }

    #[test]
    fn test_simple_excludes_target_and_duplicates() {
        let store = line_store(4, 0);
        let cost = |id: u32| id as f32;
        let candidates = vec![(0.0, 0), (1.0, 1), (1.0, 1), (2.0, 2)];
        let picked = select_neighbors(&store, &cost, 0, candidates, 0, 10, &simple_params());
        assert_eq!(picked, vec![(1.0, 1), (2.0, 2)]);
    }

    #[test]
    fn test_heuristic_without_keep_pruned_keeps_nearest() {
        let store = line_store(5, 0);
        let cost = |id: u32| id as f32;
        let candidates = vec![(1.0, 1), (2.0, 2), (3.0, 3), (4.0, 4)];
        let picked = select_neighbors(
            &store,
            &cost,
            0,
            candidates,
            0,
            3,
            &heuristic_params(false, false),
        );
        // Candidates pop in ascending order, so after the first admission no
        // later candidate beats the farthest result.
        assert_eq!(picked, vec![(1.0, 1)]);
    }

    #[test]
    fn test_heuristic_keep_pruned_tops_up_nearest_first() {
        let store = line_store(6, 0);
        let cost = |id: u32| id as f32;
        let candidates = vec![(4.0, 4), (1.0, 1), (3.0, 3), (2.0, 2), (5.0, 5)];
        let picked = select_neighbors(
            &store,
            &cost,
            0,
            candidates,
            0,
            3,
            &heuristic_params(false, true),
        );
        assert_eq!(picked, vec![(1.0, 1), (2.0, 2), (3.0, 3)]);
    }

    #[test]
    fn test_heuristic_expand_pulls_candidate_neighbors() {
        let params = heuristic_params(true, true);
        let mut store = NodeStore::default();
        for _ in 0..4 {
            store.push_node(0, &params);
        }
        // Node 1 knows node 3, which is closer to the target than node 2.
        let version = std::sync::atomic::AtomicU64::new(0);
        let items: Vec<Vec<f32>> = vec![vec![0.0], vec![1.0], vec![5.0], vec![0.5]];
        let oracle =
            crate::hnsw::graph::ItemStore::from_parts(items, crate::distance::EuclideanDistance);
        store.connect(1, 3, 0, params.mmax(0), &oracle, &params, &version);

        let cost = |id: u32| oracle.distance(0, id);
        let candidates = vec![(cost(1), 1), (cost(2), 2)];
        let picked = select_neighbors(&store, &cost, 0, candidates, 0, 2, &params);
        let ids: Vec<u32> = picked.iter().map(|&(_, id)| id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn test_output_never_exceeds_cap() {
        let store = line_store(20, 0);
        let cost = |id: u32| id as f32;
        let candidates: Vec<(f32, u32)> = (1..20).map(|i| (i as f32, i)).collect();
        for params in [
            simple_params(),
            heuristic_params(false, true),
            heuristic_params(true, true),
        ] {
            let picked = select_neighbors(&store, &cost, 0, candidates.clone(), 0, 5, &params);
            assert!(picked.len() <= 5);
            let mut ids: Vec<u32> = picked.iter().map(|&(_, id)| id).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), picked.len(), "duplicate ids in {picked:?}");
        }
    }
}
