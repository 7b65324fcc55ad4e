//! Graph map types and the node type index
//!
//! Defines the core data structures for efficient graph lookup.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::context::ComputeGraph;
use super::node::{AttrValue, Node, NodeId};

/// Type alias for attribute map: key → value (order preserved)
pub type AttrMap = IndexMap<String, AttrValue>;

/// Type alias for node arena: id → node (insertion order preserved)
pub type NodeMap = IndexMap<NodeId, Node>;

/// Type alias for name map: node name → id
pub type NameMap = FxHashMap<String, NodeId>;

/// Type alias for type map: op type → node ids
/// SmallVec optimized for the common case of a handful of nodes per type
pub type TypeMap = FxHashMap<String, SmallVec<[NodeId; 4]>>;

/// Index from operator type to the nodes of that type
///
/// Passes share one index per graph so that nodes produced by an earlier
/// fusion are visible to later patterns without rescanning the graph.
/// Readers must tolerate stale entries: removed nodes stay in the index
/// until it is rebuilt.
#[derive(Debug, Default, Clone)]
pub struct NodeTypeIndex {
    map: TypeMap,
    /// Number of pass runs that consumed this index
    pub run_count: u64,
}

impl NodeTypeIndex {
    /// Build the index from every node currently in the graph
    pub fn build(graph: &ComputeGraph) -> Self {
        let mut map: TypeMap = FxHashMap::default();

        for node in graph.nodes() {
            map.entry(node.op_type.clone()).or_default().push(node.id());
        }

        Self { map, run_count: 0 }
    }

    /// Nodes recorded for an op type
    pub fn nodes_of(&self, op_type: &str) -> &[NodeId] {
        self.map.get(op_type).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Register a node under its current type
    ///
    /// Returns false if the node is not in the graph.
    pub fn insert(&mut self, graph: &ComputeGraph, id: NodeId) -> bool {
        let Some(node) = graph.node(id) else {
            return false;
        };
        let entry = self.map.entry(node.op_type.clone()).or_default();
        if !entry.contains(&id) {
            entry.push(id);
        }
        true
    }

    /// Number of distinct op types recorded
    pub fn type_count(&self) -> usize {
        self.map.len()
    }
}
