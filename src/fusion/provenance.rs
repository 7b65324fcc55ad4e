//! Provenance bookkeeping for fused nodes
//!
//! Before a match is rewritten, the consumers of its output node are
//! snapshotted together with the producer they were fed by. After the
//! rewrite, every consumer that is now fed by a fused node gets the original
//! producer's name and output index recorded on the new output anchor, so
//! data dumps can still be attributed to the original operators.

use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::error::{FusionError, FusionResult};
use crate::graph::{
    AttrHolder, ComputeGraph, InAnchor, NodeId, ATTR_DATA_DUMP_IS_MULTIOP,
    ATTR_DATA_DUMP_ORIGINAL_OP_NAMES, ATTR_DATA_DUMP_ORIGIN_NAME,
    ATTR_DATA_DUMP_ORIGIN_OUTPUT_INDEX, STREAM_LABEL,
};

/// One consumer edge of a matched output node, as seen before rewriting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginRecord {
    /// Consumer input anchor, outside the match
    pub consumer: InAnchor,
    /// Name of the node that originally produced the data
    pub origin_name: String,
    /// Output index on that node
    pub origin_index: i64,
}

/// Pre-rewrite consumer edges of matched output nodes
#[derive(Debug, Default, Clone)]
pub struct AnchorSnapshot {
    records: FxHashMap<NodeId, Vec<OriginRecord>>,
}

impl AnchorSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every consumer edge of `output_node`
    ///
    /// An output anchor that already carries an origin (from an earlier
    /// fusion) passes that origin on instead of its own position.
    pub fn record(&mut self, graph: &ComputeGraph, output_node: NodeId) {
        let Some(node) = graph.node(output_node) else {
            return;
        };

        let mut records = Vec::new();
        for (index, slot) in node.outputs().iter().enumerate() {
            let (origin_name, origin_index) = match slot.get_str(ATTR_DATA_DUMP_ORIGIN_NAME) {
                Some(name) => (
                    name.to_string(),
                    slot.get_int(ATTR_DATA_DUMP_ORIGIN_OUTPUT_INDEX).unwrap_or(index as i64),
                ),
                None => (node.name.clone(), index as i64),
            };
            for &consumer in &slot.peers {
                records.push(OriginRecord {
                    consumer,
                    origin_name: origin_name.clone(),
                    origin_index,
                });
            }
        }

        if !records.is_empty() {
            self.records.insert(output_node, records);
        }
    }

    /// Records of one output node
    pub fn records_of(&self, node: NodeId) -> &[OriginRecord] {
        self.records.get(&node).map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Number of snapshotted output nodes
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Names a fused node should report as its origin
///
/// A node that is itself the product of an earlier fusion contributes the
/// names it already carries.
pub fn original_names(graph: &ComputeGraph, nodes: &[NodeId]) -> Vec<String> {
    let mut names = Vec::with_capacity(nodes.len());
    for &id in nodes {
        let Some(node) = graph.node(id) else {
            continue;
        };
        match node.get_strings(ATTR_DATA_DUMP_ORIGINAL_OP_NAMES) {
            Some(carried) if !carried.is_empty() => names.extend(carried.iter().cloned()),
            _ => names.push(node.name.clone()),
        }
    }
    names
}

/// Stream label of a node, if it has one
pub fn stream_label(graph: &ComputeGraph, node: NodeId) -> Option<String> {
    graph
        .node(node)
        .and_then(|n| n.get_str(STREAM_LABEL))
        .map(str::to_string)
}

/// Copy `label` onto every fused node
///
/// Nothing happens when the representative had no label. A fused node that
/// is not in the graph is an error.
pub fn set_stream_label_to_fused_nodes(
    graph: &mut ComputeGraph,
    fused: &[NodeId],
    label: Option<&str>,
) -> FusionResult<()> {
    let Some(label) = label else {
        return Ok(());
    };
    for &id in fused {
        let node = graph
            .node_mut(id)
            .ok_or_else(|| FusionError::StreamLabel(format!("fused node {} does not exist", id)))?;
        node.set_str(STREAM_LABEL, label);
    }
    Ok(())
}

/// Attach data-dump provenance to fused nodes
///
/// # Arguments
/// * `graph` - Graph after the rewrite
/// * `snapshot` - Consumer edges recorded before the rewrite
/// * `originals` - Every node of the mapping
/// * `names` - Original names, collected before the rewrite
/// * `fused` - Nodes produced by the rewrite
///
/// # Returns
/// Number of output anchors that received an origin
pub fn set_data_dump_attr(
    graph: &mut ComputeGraph,
    snapshot: &AnchorSnapshot,
    originals: &[NodeId],
    names: &[String],
    fused: &[NodeId],
) -> usize {
    let mut annotated = 0;

    for &original in originals {
        for record in snapshot.records_of(original) {
            let Some(producer) = graph.peer_out_anchor(record.consumer) else {
                warn!(consumer = %record.consumer.node, "snapshotted consumer lost its producer");
                continue;
            };
            if !fused.contains(&producer.node) {
                continue;
            }
            let Some(slot) = graph
                .node_mut(producer.node)
                .and_then(|n| n.output_mut(producer.index))
            else {
                continue;
            };
            slot.set_str(ATTR_DATA_DUMP_ORIGIN_NAME, record.origin_name.as_str());
            slot.set_int(ATTR_DATA_DUMP_ORIGIN_OUTPUT_INDEX, record.origin_index);
            annotated += 1;
            trace!(
                fused = %producer.node,
                output = producer.index,
                origin = %record.origin_name,
                origin_index = record.origin_index,
                "origin recorded"
            );
        }
    }

    let multi_op = fused.len() > 1;
    for &id in fused {
        if let Some(node) = graph.node_mut(id) {
            node.set_strings(ATTR_DATA_DUMP_ORIGINAL_OP_NAMES, names.to_vec());
            if multi_op {
                node.set_bool(ATTR_DATA_DUMP_IS_MULTIOP, true);
            }
        }
    }

    annotated
}
