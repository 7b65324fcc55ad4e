//! Compute graph arena
//!
//! `ComputeGraph` is the central structure the matcher and fusion passes work
//! on. It owns every node, keeps nodes in insertion order and maintains a
//! name → id map for O(1) lookups.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::maps::{NameMap, NodeMap};
use super::node::{InAnchor, Node, NodeId, OutAnchor};

/// Graph context for matching and rewriting
#[derive(Debug)]
pub struct ComputeGraph {
    /// Graph name, used in logs
    pub name: String,
    pub(crate) session_id: u64,
    pub(crate) graph_id: u32,
    pub(crate) nodes: NodeMap,
    pub(crate) names: NameMap,
    pub(crate) next_id: u32,
}

impl ComputeGraph {
    /// Create an empty graph with session 0, graph 0
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            session_id: 0,
            graph_id: 0,
            nodes: NodeMap::default(),
            names: FxHashMap::default(),
            next_id: 0,
        }
    }

    /// Set the session and graph ids used as the statistics key
    pub fn with_ids(mut self, session_id: u64, graph_id: u32) -> Self {
        self.session_id = session_id;
        self.graph_id = graph_id;
        self
    }

    /// Session this graph belongs to
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Graph id inside the session
    pub fn graph_id(&self) -> u32 {
        self.graph_id
    }

    // ========================================================================
    // Node accessors
    // ========================================================================

    /// Get a node by id
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Get a mutable node by id
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Find a node by name
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Check if a node exists
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate over all nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Node ids in insertion order
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    /// Op type of a node
    pub fn op_type(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.op_type.as_str())
    }

    /// Name of a node
    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    // ========================================================================
    // Edge traversal
    // ========================================================================

    /// Producer anchor feeding an input anchor
    pub fn peer_out_anchor(&self, anchor: InAnchor) -> Option<OutAnchor> {
        self.node(anchor.node)?.inputs.get(anchor.index)?.peer
    }

    /// Consumer anchors fed by an output anchor
    pub fn peer_in_anchors(&self, anchor: OutAnchor) -> &[InAnchor] {
        self.node(anchor.node)
            .and_then(|n| n.outputs.get(anchor.index))
            .map(|s| s.peers.as_slice())
            .unwrap_or(&[])
    }

    /// Connected input anchors of a node, in slot order
    pub fn connected_in_anchors(&self, id: NodeId) -> SmallVec<[(InAnchor, OutAnchor); 4]> {
        let Some(node) = self.node(id) else {
            return SmallVec::new();
        };
        node.inputs
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.peer.map(|peer| (InAnchor::new(id, index), peer)))
            .collect()
    }

    /// Producer nodes of all connected inputs (may repeat)
    pub fn in_data_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.connected_in_anchors(id)
            .into_iter()
            .map(|(_, peer)| peer.node)
            .collect()
    }

    /// Consumer nodes of all outputs (may repeat)
    pub fn out_data_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|n| {
                n.outputs
                    .iter()
                    .flat_map(|s| s.peers.iter().map(|p| p.node))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether a node has at least one edge in either direction
    pub fn has_edges(&self, id: NodeId) -> bool {
        self.node(id)
            .map(|n| n.has_inputs() || n.has_outputs())
            .unwrap_or(false)
    }

    /// Check whether an output of `producer` feeds `consumer`
    pub fn are_adjacent(&self, producer: NodeId, consumer: NodeId) -> bool {
        self.out_data_nodes(producer).contains(&consumer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OpDesc;

    fn make_test_graph() -> (ComputeGraph, NodeId, NodeId, NodeId) {
        let mut graph = ComputeGraph::new("test").with_ids(1, 2);
        let data = graph.add_node(OpDesc::new("x", "Data").with_anchors(0, 1)).unwrap();
        let conv = graph.add_node(OpDesc::new("conv_0", "Conv").with_anchors(2, 1)).unwrap();
        let relu = graph.add_node(OpDesc::new("relu_0", "Relu").with_anchors(1, 1)).unwrap();
        graph.link(data, 0, conv, 0).unwrap();
        graph.link(conv, 0, relu, 0).unwrap();
        (graph, data, conv, relu)
    }

    #[test]
    fn test_context_creation() {
        let (graph, _, _, _) = make_test_graph();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.session_id(), 1);
        assert_eq!(graph.graph_id(), 2);
        assert!(graph.find_node("conv_0").is_some());
        assert!(graph.find_node("nonexistent").is_none());
    }

    #[test]
    fn test_traversal() {
        let (graph, data, conv, relu) = make_test_graph();

        assert_eq!(graph.in_data_nodes(relu), vec![conv]);
        assert_eq!(graph.out_data_nodes(data), vec![conv]);
        assert!(graph.are_adjacent(conv, relu));
        assert!(!graph.are_adjacent(relu, conv));

        let anchors = graph.connected_in_anchors(conv);
        assert_eq!(anchors.len(), 1); // input 1 is unconnected
        assert_eq!(anchors[0].0, InAnchor::new(conv, 0));
        assert_eq!(anchors[0].1, OutAnchor::new(data, 0));
    }

    #[test]
    fn test_has_edges() {
        let (mut graph, _, _, _) = make_test_graph();
        let lonely = graph.add_node(OpDesc::new("lonely", "Relu")).unwrap();

        assert!(!graph.has_edges(lonely));
        assert!(graph.has_edges(graph.find_node("relu_0").unwrap()));
    }

    #[test]
    fn test_node_iteration_order() {
        let (graph, _, _, _) = make_test_graph();

        let names: Vec<_> = graph.nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["x", "conv_0", "relu_0"]);
    }
}
