//! Snapshot codec: deterministic serialization of the graph to a byte
//! stream.
//!
//! Layout, in order: the 4-byte magic string `"HNSW"`, the bincode-encoded
//! parameters, the node array (per node: layer assignment, then one
//! length-prefixed id list per layer), and the nullable entry-point id.
//! Items are not part of the payload; `restore` takes them back from the
//! caller and returns whatever was left over.
//!
//! The codec is the crate's only compatibility surface. bincode's
//! fixed-width little-endian integer encoding makes the bytes a pure
//! function of the graph state.

use crate::distance::Metric;
use crate::error::HnswError;
use crate::hnsw::graph::{HnswGraph, ItemStore, NodeStore};
use crate::hnsw::params::HnswParams;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

const SNAPSHOT_MAGIC: &[u8; 4] = b"HNSW";

#[derive(Debug, Serialize, Deserialize)]
struct NodeRecord {
    level: u32,
    layers: Vec<Vec<u32>>,
}

impl<T, M: Metric<T>> HnswGraph<T, M> {
    /// Writes the graph to `sink`. Fails with
    /// [`HnswError::InvalidOperation`] on an empty graph.
    pub fn snapshot<W: Write>(&self, mut sink: W) -> Result<(), HnswError> {
        if self.store.len() == 0 {
            return Err(HnswError::InvalidOperation(
                "cannot serialize an empty graph",
            ));
        }
        sink.write_all(SNAPSHOT_MAGIC)?;
        bincode::serialize_into(&mut sink, &self.params)?;
        let nodes: Vec<NodeRecord> = (0..self.store.len() as u32)
            .map(|id| NodeRecord {
                level: self.store.level(id),
                layers: self.store.layers_of(id).to_vec(),
            })
            .collect();
        bincode::serialize_into(&mut sink, &nodes)?;
        bincode::serialize_into(&mut sink, &self.entry_point)?;
        tracing::info!(nodes = nodes.len(), "serialized graph snapshot");
        Ok(())
    }

    /// Reads a graph back from `source`, reattaching the caller-supplied
    /// `items` (the first `|nodes|` of them; the rest are returned).
    ///
    /// The restored graph starts without a distance cache regardless of the
    /// serialized parameters; use
    /// [`resize_distance_cache`](Self::resize_distance_cache) to bring one
    /// back.
    pub fn restore<R: Read>(
        mut source: R,
        items: Vec<T>,
        metric: M,
    ) -> Result<(Self, Vec<T>), HnswError> {
        let mut magic = [0u8; 4];
        source.read_exact(&mut magic)?;
        if &magic != SNAPSHOT_MAGIC {
            return Err(HnswError::InvalidHeader { found: magic });
        }

        let mut params: HnswParams = bincode::deserialize_from(&mut source)?;
        params.initial_distance_cache_size = 0;
        params.validate()?;
        let nodes: Vec<NodeRecord> = bincode::deserialize_from(&mut source)?;
        let entry_point: Option<u32> = bincode::deserialize_from(&mut source)?;

        if items.len() < nodes.len() {
            return Err(HnswError::InvalidOperation(
                "fewer items supplied than serialized nodes",
            ));
        }
        let mut items = items;
        let leftover = items.split_off(nodes.len());

        let mut levels = Vec::with_capacity(nodes.len());
        let mut links = Vec::with_capacity(nodes.len());
        for node in nodes {
            let mut layers = node.layers;
            for (layer, list) in layers.iter_mut().enumerate() {
                list.reserve((params.mmax(layer) + 1).saturating_sub(list.len()));
            }
            levels.push(node.level);
            links.push(layers);
        }
        let store = NodeStore::from_parts(levels, links);
        let oracle = ItemStore::from_parts(items, metric);
        let graph = Self::from_parts(params, oracle, store, entry_point);
        graph.validate().map_err(HnswError::CorruptSnapshot)?;
        tracing::debug!(
            nodes = graph.len(),
            leftover = leftover.len(),
            "restored graph snapshot"
        );
        Ok((graph, leftover))
    }
}
