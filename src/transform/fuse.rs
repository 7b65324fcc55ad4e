//! Node fusion
//!
//! Replaces a set of matched nodes with one new node, keeping every edge
//! that crosses the boundary of the set.

use tracing::trace;

use crate::error::{FusionError, FusionResult};
use crate::graph::{ComputeGraph, InAnchor, NodeId, OpDesc, OutAnchor};

/// Edges that cross the boundary of a node set
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Boundary {
    /// Producers outside the set feeding a node inside, in input order
    pub inputs: Vec<OutAnchor>,
    /// Output anchors inside the set with consumers outside, and those consumers
    pub outputs: Vec<(OutAnchor, Vec<InAnchor>)>,
}

/// Collect the boundary edges of `nodes`
///
/// Inputs are ordered by node (in the given order) then by input index;
/// outputs by node then by output index.
pub fn boundary(graph: &ComputeGraph, nodes: &[NodeId]) -> FusionResult<Boundary> {
    let mut result = Boundary::default();

    for &id in nodes {
        let node = graph
            .node(id)
            .ok_or_else(|| FusionError::NodeNotFound(id.to_string()))?;

        for slot in node.inputs() {
            if let Some(peer) = slot.peer {
                if !nodes.contains(&peer.node) {
                    result.inputs.push(peer);
                }
            }
        }

        for (index, slot) in node.outputs().iter().enumerate() {
            let external: Vec<InAnchor> = slot
                .peers
                .iter()
                .filter(|p| !nodes.contains(&p.node))
                .copied()
                .collect();
            if !external.is_empty() {
                result.outputs.push((OutAnchor::new(id, index), external));
            }
        }
    }

    Ok(result)
}

/// Fuse `originals` into a single node built from `desc`
///
/// External producers feed the new node's inputs in boundary order, and
/// each output anchor with external consumers becomes one output of the new
/// node. The originals are removed before the new node is added, so `desc`
/// may reuse one of their names.
///
/// # Returns
/// * `Ok(NodeId)` - the fused node
/// * `Err` if an original is missing or the graph rejects an edge
pub fn fuse_nodes(graph: &mut ComputeGraph, originals: &[NodeId], desc: OpDesc) -> FusionResult<NodeId> {
    if originals.is_empty() {
        return Err(FusionError::Graph("nothing to fuse".to_string()));
    }
    let edges = boundary(graph, originals)?;

    for &id in originals {
        graph.remove_node(id)?;
    }

    let fused = graph.add_node(desc)?;
    for (index, producer) in edges.inputs.iter().enumerate() {
        graph.add_edge(*producer, InAnchor::new(fused, index))?;
    }
    for (index, (_, consumers)) in edges.outputs.iter().enumerate() {
        for consumer in consumers {
            graph.add_edge(OutAnchor::new(fused, index), *consumer)?;
        }
    }

    trace!(
        fused = %fused,
        originals = originals.len(),
        inputs = edges.inputs.len(),
        outputs = edges.outputs.len(),
        "nodes fused"
    );
    Ok(fused)
}

/// Check if `producer` can be folded into `consumer`
///
/// Conditions:
/// 1. Nodes must be adjacent
/// 2. Every consumer of the producer must be `consumer`
pub fn can_fuse(graph: &ComputeGraph, producer: NodeId, consumer: NodeId) -> bool {
    if !graph.are_adjacent(producer, consumer) {
        return false;
    }
    graph.out_data_nodes(producer).iter().all(|&n| n == consumer)
}
