//! Pattern matching engine
//!
//! Matches a built [`FusionPattern`] against a [`ComputeGraph`] in reverse
//! (output-to-input) order. Each candidate output node seeds a breadth-first
//! walk over producer edges; a candidate either yields a complete
//! [`Mapping`] or nothing.

use std::collections::VecDeque;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::graph::{AttrHolder, ComputeGraph, NodeId, NodeTypeIndex, STREAM_LABEL};

use super::builder::FusionPattern;
use super::descriptor::{DescId, Descriptor};

/// Nodes bound to one descriptor
pub type NodeList = SmallVec<[NodeId; 2]>;

/// Result of one successful match: descriptor → matched nodes
///
/// Bindings keep insertion order, so the output descriptor and its node
/// always come first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    bindings: IndexMap<DescId, NodeList>,
}

impl Mapping {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `node` to the nodes bound to `desc`
    pub fn bind(&mut self, desc: DescId, node: NodeId) {
        self.bindings.entry(desc).or_default().push(node);
    }

    /// Check if `node` is already bound to `desc`
    pub fn is_matched(&self, desc: DescId, node: NodeId) -> bool {
        self.bindings
            .get(&desc)
            .map(|nodes| nodes.contains(&node))
            .unwrap_or(false)
    }

    /// Nodes bound to a descriptor, in binding order
    pub fn nodes_of(&self, desc: DescId) -> &[NodeId] {
        self.bindings.get(&desc).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// First bound node of the first binding
    pub fn first_node(&self) -> Option<NodeId> {
        self.bindings.values().find_map(|nodes| nodes.first().copied())
    }

    /// Every bound node, in binding order
    pub fn nodes(&self) -> Vec<NodeId> {
        self.bindings.values().flatten().copied().collect()
    }

    /// Iterate over bindings
    pub fn iter(&self) -> impl Iterator<Item = (DescId, &[NodeId])> {
        self.bindings.iter().map(|(d, n)| (*d, n.as_slice()))
    }

    /// Number of bound descriptors
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// First matched node none of whose producers is part of the match
    pub fn matched_head_node(&self, graph: &ComputeGraph) -> Option<NodeId> {
        let matched = self.nodes();
        matched.iter().copied().find(|&node| {
            !graph
                .in_data_nodes(node)
                .iter()
                .any(|producer| matched.contains(producer))
        })
    }
}

/// First node bound to the descriptor named `id`
pub fn get_node_from_mapping(pattern: &FusionPattern, id: &str, mapping: &Mapping) -> Option<NodeId> {
    let desc = pattern.descriptor_id(id)?;
    mapping.nodes_of(desc).first().copied()
}

/// Every node bound to the descriptor named `name`
pub fn get_matched_nodes_by_desc_name(
    pattern: &FusionPattern,
    name: &str,
    mapping: &Mapping,
) -> Vec<NodeId> {
    pattern
        .descriptor_id(name)
        .map(|desc| mapping.nodes_of(desc).to_vec())
        .unwrap_or_default()
}

/// Check that all nodes carry the same stream label
///
/// A node without a label counts as labelled `"null"`.
pub fn check_stream_label(graph: &ComputeGraph, nodes: &[NodeId]) -> bool {
    let mut expected: Option<&str> = None;
    for &id in nodes {
        let label = graph
            .node(id)
            .and_then(|n| n.get_str(STREAM_LABEL))
            .unwrap_or("null");
        match expected {
            None => expected = Some(label),
            Some(e) if e != label => return false,
            Some(_) => {}
        }
    }
    true
}

/// Log every mapping at debug level
pub fn dump_mappings(pattern: &FusionPattern, graph: &ComputeGraph, mappings: &[Mapping]) {
    for (i, mapping) in mappings.iter().enumerate() {
        debug!(pattern = pattern.name(), "mapping {}/{}", i + 1, mappings.len());
        for (desc, nodes) in mapping.iter() {
            let desc_name = pattern.get(desc).map(|d| d.name()).unwrap_or("?");
            let node_names: Vec<&str> = nodes
                .iter()
                .filter_map(|&n| graph.node_name(n))
                .collect();
            debug!(pattern = pattern.name(), "    {} -> {:?}", desc_name, node_names);
        }
    }
}

/// A predecessor slot of one descriptor
///
/// `requirement` is the position in the descriptor's declared inputs this
/// slot can satisfy. See-through slots of an optional predecessor share its
/// requirement.
#[derive(Debug, Clone, Copy)]
struct Slot {
    desc: DescId,
    requirement: usize,
}

/// Pattern matcher over one graph and one built pattern
pub struct PatternMatcher<'a> {
    graph: &'a ComputeGraph,
    pattern: &'a FusionPattern,
}

impl<'a> PatternMatcher<'a> {
    /// Create a new pattern matcher
    pub fn new(graph: &'a ComputeGraph, pattern: &'a FusionPattern) -> Self {
        Self { graph, pattern }
    }

    /// Match the pattern backwards from `output_node` bound to `output_desc`
    ///
    /// # Returns
    /// * `Some(Mapping)` if every required predecessor was matched
    /// * `None` otherwise; the partial mapping is discarded
    pub fn match_from_output(&self, output_node: NodeId, output_desc: DescId) -> Option<Mapping> {
        let mut mapping = Mapping::new();
        let mut worklist: VecDeque<(NodeId, DescId)> = VecDeque::new();

        mapping.bind(output_desc, output_node);
        worklist.push_back((output_node, output_desc));

        while let Some((node, desc)) = worklist.pop_front() {
            if !self.match_inputs(node, desc, &mut worklist, &mut mapping) {
                return None;
            }
        }

        Some(mapping)
    }

    /// Align the producers of `node` with the predecessors of `desc`
    fn match_inputs(
        &self,
        node: NodeId,
        desc: DescId,
        worklist: &mut VecDeque<(NodeId, DescId)>,
        mapping: &mut Mapping,
    ) -> bool {
        let Some(descriptor) = self.pattern.get(desc) else {
            return false;
        };
        if descriptor.inputs().is_empty() {
            return true;
        }

        // connected_in_anchors yields slot order, which is ascending anchor index
        let in_anchors = self.graph.connected_in_anchors(node);
        if in_anchors.is_empty() {
            trace!(descriptor = descriptor.name(), %node, "no connected inputs");
            return false;
        }

        let slots = self.predecessor_slots(descriptor);
        let mut used = vec![false; slots.len()];

        for (_, producer) in &in_anchors {
            let Some(producer_type) = self.graph.op_type(producer.node) else {
                continue;
            };

            for (j, slot) in slots.iter().enumerate() {
                let Some(candidate) = self.pattern.get(slot.desc) else {
                    continue;
                };
                let fits = candidate.accepts(producer_type)
                    && (!used[j] || candidate.is_repeatable());
                if !fits {
                    continue;
                }

                // a producer feeding several matched nodes is walked once
                if !mapping.is_matched(slot.desc, producer.node) {
                    worklist.push_back((producer.node, slot.desc));
                    mapping.bind(slot.desc, producer.node);
                }
                used[j] = true;
                break;
            }
        }

        let all_matched = descriptor.inputs().iter().enumerate().all(|(k, &pred)| {
            let satisfied = slots
                .iter()
                .zip(&used)
                .any(|(slot, &u)| u && slot.requirement == k);
            satisfied || self.is_skippable(pred)
        });
        if !all_matched {
            trace!(descriptor = descriptor.name(), %node, "not all inputs are matched");
        }
        all_matched
    }

    /// Slots for every declared predecessor, optional ones see-through
    fn predecessor_slots(&self, descriptor: &Descriptor) -> Vec<Slot> {
        let mut slots = Vec::with_capacity(descriptor.inputs().len());
        for (requirement, &pred) in descriptor.inputs().iter().enumerate() {
            self.push_slot(pred, requirement, &mut slots);
        }
        slots
    }

    fn push_slot(&self, desc: DescId, requirement: usize, slots: &mut Vec<Slot>) {
        slots.push(Slot { desc, requirement });
        if let Some(d) = self.pattern.get(desc) {
            if d.is_optional() {
                for &pred in d.inputs() {
                    self.push_slot(pred, requirement, slots);
                }
            }
        }
    }

    /// An optional predecessor with nothing behind it may be absent
    fn is_skippable(&self, desc: DescId) -> bool {
        self.pattern
            .get(desc)
            .map(|d| d.is_optional() && d.inputs().iter().all(|&p| self.is_skippable(p)))
            .unwrap_or(false)
    }

    /// Graph nodes that may bind to the output descriptor
    ///
    /// Uses the type index when given, otherwise scans the graph in node
    /// order. Nodes without any edge are never candidates.
    pub fn candidate_output_nodes(&self, index: Option<&NodeTypeIndex>) -> Vec<NodeId> {
        let Some(output) = self.pattern.output() else {
            return Vec::new();
        };

        let mut candidates = Vec::new();
        match index {
            Some(index) if !output.types().is_empty() => {
                for op_type in output.types() {
                    for &id in index.nodes_of(op_type) {
                        let Some(node) = self.graph.node(id) else {
                            continue;
                        };
                        if node.op_type == *op_type
                            && self.graph.has_edges(id)
                            && !candidates.contains(&id)
                        {
                            candidates.push(id);
                        }
                    }
                }
            }
            _ => {
                for node in self.graph.nodes() {
                    if output.accepts(&node.op_type) && self.graph.has_edges(node.id()) {
                        candidates.push(node.id());
                    }
                }
            }
        }
        candidates
    }

    /// Find every match of the pattern in the graph
    ///
    /// Matches whose nodes disagree on the stream label are dropped.
    pub fn match_all(&self, index: Option<&NodeTypeIndex>) -> Vec<Mapping> {
        let Some(output) = self.pattern.output() else {
            warn!(pattern = self.pattern.name(), "pattern is not built, nothing to match");
            return Vec::new();
        };
        let output_desc = output.id();

        let mut mappings = Vec::new();
        for candidate in self.candidate_output_nodes(index) {
            let Some(mapping) = self.match_from_output(candidate, output_desc) else {
                continue;
            };
            if !check_stream_label(self.graph, &mapping.nodes()) {
                debug!(
                    pattern = self.pattern.name(),
                    node = self.graph.node_name(candidate).unwrap_or("?"),
                    "matched nodes disagree on stream label"
                );
                continue;
            }
            mappings.push(mapping);
        }

        trace!(pattern = self.pattern.name(), matches = mappings.len(), "match_all done");
        mappings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OpDesc;
    use crate::pattern::BranchKind;

    fn add(graph: &mut ComputeGraph, name: &str, op_type: &str) -> NodeId {
        graph.add_node(OpDesc::new(name, op_type)).unwrap()
    }

    fn conv_relu_pattern() -> FusionPattern {
        let mut pattern = FusionPattern::new("ConvRelu")
            .add_descriptor("A", &["Conv"], 1, 1)
            .add_descriptor("B", &["Relu"], 1, 1)
            .set_outputs("A", &["B"], BranchKind::Serial)
            .set_head(&["A"]);
        pattern.build().unwrap();
        pattern
    }

    /// n1:Conv -> n2:Relu -> n3:Pool
    fn make_chain_graph() -> (ComputeGraph, NodeId, NodeId, NodeId) {
        let mut graph = ComputeGraph::new("chain");
        let n1 = add(&mut graph, "n1", "Conv");
        let n2 = add(&mut graph, "n2", "Relu");
        let n3 = add(&mut graph, "n3", "Pool");
        graph.link(n1, 0, n2, 0).unwrap();
        graph.link(n2, 0, n3, 0).unwrap();
        (graph, n1, n2, n3)
    }

    #[test]
    fn test_match_all_chain() {
        let (graph, n1, n2, n3) = make_chain_graph();
        let pattern = conv_relu_pattern();
        let matcher = PatternMatcher::new(&graph, &pattern);

        let mappings = matcher.match_all(None);
        assert_eq!(mappings.len(), 1);

        let m = &mappings[0];
        let a = pattern.descriptor_id("A").unwrap();
        let b = pattern.descriptor_id("B").unwrap();
        assert_eq!(m.nodes_of(a), &[n1]);
        assert_eq!(m.nodes_of(b), &[n2]);
        assert_eq!(m.first_node(), Some(n2));
        assert!(!m.nodes().contains(&n3));
    }

    #[test]
    fn test_match_all_with_index_is_identical() {
        let (graph, _, _, _) = make_chain_graph();
        let pattern = conv_relu_pattern();
        let matcher = PatternMatcher::new(&graph, &pattern);
        let index = NodeTypeIndex::build(&graph);

        assert_eq!(matcher.match_all(None), matcher.match_all(Some(&index)));
    }

    #[test]
    fn test_match_all_deterministic() {
        let mut graph = ComputeGraph::new("g");
        for i in 0..4 {
            let c = add(&mut graph, &format!("conv_{i}"), "Conv");
            let r = add(&mut graph, &format!("relu_{i}"), "Relu");
            graph.link(c, 0, r, 0).unwrap();
        }
        let pattern = conv_relu_pattern();
        let matcher = PatternMatcher::new(&graph, &pattern);

        let first = matcher.match_all(None);
        assert_eq!(first.len(), 4);
        for _ in 0..3 {
            assert_eq!(matcher.match_all(None), first);
        }
    }

    #[test]
    fn test_missing_input_fails() {
        let mut graph = ComputeGraph::new("g");
        let relu = add(&mut graph, "relu", "Relu");
        let pool = add(&mut graph, "pool", "Pool");
        graph.link(relu, 0, pool, 0).unwrap();

        let pattern = conv_relu_pattern();
        let matcher = PatternMatcher::new(&graph, &pattern);

        // relu has an edge, so it is a candidate, but nothing feeds it
        assert_eq!(matcher.candidate_output_nodes(None), vec![relu]);
        assert!(matcher.match_all(None).is_empty());
    }

    #[test]
    fn test_wrong_producer_type_fails() {
        let mut graph = ComputeGraph::new("g");
        let pool = add(&mut graph, "pool", "Pool");
        let relu = add(&mut graph, "relu", "Relu");
        graph.link(pool, 0, relu, 0).unwrap();

        let pattern = conv_relu_pattern();
        let matcher = PatternMatcher::new(&graph, &pattern);
        let b = pattern.descriptor_id("B").unwrap();
        assert!(matcher.match_from_output(relu, b).is_none());
    }

    #[test]
    fn test_isolated_output_not_candidate() {
        let mut graph = ComputeGraph::new("g");
        add(&mut graph, "relu", "Relu");

        let pattern = conv_relu_pattern();
        let matcher = PatternMatcher::new(&graph, &pattern);
        assert!(matcher.candidate_output_nodes(None).is_empty());
    }

    #[test]
    fn test_optional_descriptor_is_transparent() {
        let mut pattern = FusionPattern::new("ConvCastRelu")
            .add_descriptor("A", &["Conv"], 1, 1)
            .add_descriptor("B", &["Cast"], 0, 1)
            .add_descriptor("C", &["Relu"], 1, 1)
            .set_outputs("A", &["B"], BranchKind::Serial)
            .set_outputs("B", &["C"], BranchKind::Serial)
            .set_head(&["A"]);
        pattern.build().unwrap();
        let a = pattern.descriptor_id("A").unwrap();
        let b = pattern.descriptor_id("B").unwrap();
        let c = pattern.descriptor_id("C").unwrap();

        // Conv -> Relu, no Cast in between
        let mut graph = ComputeGraph::new("g");
        let conv = add(&mut graph, "conv", "Conv");
        let relu = add(&mut graph, "relu", "Relu");
        graph.link(conv, 0, relu, 0).unwrap();

        let mappings = PatternMatcher::new(&graph, &pattern).match_all(None);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].nodes_of(c), &[relu]);
        assert_eq!(mappings[0].nodes_of(a), &[conv]);
        assert!(mappings[0].nodes_of(b).is_empty());

        // Conv -> Cast -> Relu binds the Cast too
        let mut graph = ComputeGraph::new("g");
        let conv = add(&mut graph, "conv", "Conv");
        let cast = add(&mut graph, "cast", "Cast");
        let relu = add(&mut graph, "relu", "Relu");
        graph.link(conv, 0, cast, 0).unwrap();
        graph.link(cast, 0, relu, 0).unwrap();

        let mappings = PatternMatcher::new(&graph, &pattern).match_all(None);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].nodes_of(b), &[cast]);
        assert_eq!(mappings[0].nodes_of(a), &[conv]);
    }

    #[test]
    fn test_input_anchor_order_decides_alignment() {
        // two wildcard-compatible predecessors; anchor 0 must go to the first
        let mut pattern = FusionPattern::new("AddPair")
            .add_descriptor("lhs", &["Conv", "Pool"], 1, 1)
            .add_descriptor("rhs", &["Conv", "Pool"], 1, 1)
            .add_descriptor("add", &["Add"], 1, 1)
            .set_outputs("lhs", &["add"], BranchKind::Serial)
            .set_outputs("rhs", &["add"], BranchKind::Serial);
        pattern.build().unwrap();
        let lhs = pattern.descriptor_id("lhs").unwrap();
        let rhs = pattern.descriptor_id("rhs").unwrap();

        let mut graph = ComputeGraph::new("g");
        let pool = add(&mut graph, "pool", "Pool");
        let conv = add(&mut graph, "conv", "Conv");
        let sum = add(&mut graph, "add", "Add");
        // connect anchor 1 first; alignment must still follow anchor index
        graph.link(conv, 0, sum, 1).unwrap();
        graph.link(pool, 0, sum, 0).unwrap();

        let mappings = PatternMatcher::new(&graph, &pattern).match_all(None);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].nodes_of(lhs), &[pool]);
        assert_eq!(mappings[0].nodes_of(rhs), &[conv]);
    }

    #[test]
    fn test_non_repeatable_slot_needs_enough_inputs() {
        let mut pattern = FusionPattern::new("AddPair")
            .add_descriptor("lhs", &["Conv"], 1, 1)
            .add_descriptor("rhs", &["Conv"], 1, 1)
            .add_descriptor("add", &["Add"], 1, 1)
            .set_outputs("lhs", &["add"], BranchKind::Serial)
            .set_outputs("rhs", &["add"], BranchKind::Serial);
        pattern.build().unwrap();

        let mut graph = ComputeGraph::new("g");
        let conv = add(&mut graph, "conv", "Conv");
        let sum = add(&mut graph, "add", "Add");
        graph.link(conv, 0, sum, 0).unwrap();

        assert!(PatternMatcher::new(&graph, &pattern).match_all(None).is_empty());
    }

    #[test]
    fn test_repeatable_slot_binds_many() {
        let mut pattern = FusionPattern::new("ConcatOfCasts")
            .add_descriptor("cast", &["Cast"], 1, 8)
            .add_descriptor("concat", &["Concat"], 1, 1)
            .set_outputs("cast", &["concat"], BranchKind::Serial);
        pattern.build().unwrap();
        let cast_desc = pattern.descriptor_id("cast").unwrap();

        let mut graph = ComputeGraph::new("g");
        let concat = add(&mut graph, "concat", "Concat");
        let mut casts = Vec::new();
        for i in 0..3 {
            let c = add(&mut graph, &format!("cast_{i}"), "Cast");
            graph.link(c, 0, concat, i).unwrap();
            casts.push(c);
        }

        let mappings = PatternMatcher::new(&graph, &pattern).match_all(None);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].nodes_of(cast_desc), casts.as_slice());
        assert_eq!(mappings[0].matched_head_node(&graph), Some(casts[0]));
    }

    #[test]
    fn test_shared_producer_walked_once() {
        // conv feeds both inputs of mul
        let mut pattern = FusionPattern::new("Square")
            .add_descriptor("x", &["Conv"], 1, 2)
            .add_descriptor("mul", &["Mul"], 1, 1)
            .set_outputs("x", &["mul"], BranchKind::Serial);
        pattern.build().unwrap();
        let x = pattern.descriptor_id("x").unwrap();

        let mut graph = ComputeGraph::new("g");
        let conv = add(&mut graph, "conv", "Conv");
        let mul = add(&mut graph, "mul", "Mul");
        graph.link(conv, 0, mul, 0).unwrap();
        graph.link(conv, 0, mul, 1).unwrap();

        let mappings = PatternMatcher::new(&graph, &pattern).match_all(None);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].nodes_of(x), &[conv]);
    }

    #[test]
    fn test_stream_label_mismatch_rejected() {
        let (mut graph, n1, n2, _) = make_chain_graph();
        graph.node_mut(n1).unwrap().set_str(STREAM_LABEL, "s0");

        let pattern = conv_relu_pattern();
        assert!(PatternMatcher::new(&graph, &pattern).match_all(None).is_empty());

        graph.node_mut(n2).unwrap().set_str(STREAM_LABEL, "s0");
        assert_eq!(PatternMatcher::new(&graph, &pattern).match_all(None).len(), 1);
    }

    #[test]
    fn test_unbuilt_pattern_matches_nothing() {
        let (graph, _, _, _) = make_chain_graph();
        let pattern = FusionPattern::new("p").add_descriptor("B", &["Relu"], 1, 1);
        assert!(PatternMatcher::new(&graph, &pattern).match_all(None).is_empty());
    }

    #[test]
    fn test_get_node_from_mapping() {
        let (graph, n1, n2, _) = make_chain_graph();
        let pattern = conv_relu_pattern();
        let mappings = PatternMatcher::new(&graph, &pattern).match_all(None);

        assert_eq!(get_node_from_mapping(&pattern, "A", &mappings[0]), Some(n1));
        assert_eq!(get_node_from_mapping(&pattern, "B", &mappings[0]), Some(n2));
        assert_eq!(get_node_from_mapping(&pattern, "Z", &mappings[0]), None);
        assert_eq!(
            get_matched_nodes_by_desc_name(&pattern, "A", &mappings[0]),
            vec![n1]
        );
        assert_eq!(mappings[0].matched_head_node(&graph), Some(n1));
    }
}
