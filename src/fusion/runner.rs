//! Pattern fusion runner
//!
//! Wraps a [`FusionPass`] and implements the run loop around it: patterns
//! are defined and built on the first run, every pattern is matched in
//! declaration order, each mapping is handed to the pass, and the results
//! are recorded on the fused nodes and in the statistics ledger.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{FusionError, FusionResult};
use crate::graph::{ComputeGraph, NodeTypeIndex};
use crate::pattern::{dump_mappings, FusionPattern, PatternMatcher};
use crate::statistics::{FusionInfo, FusionStatisticRecorder};
use crate::traits::{FusionOutcome, FusionPass, GraphPass, OpsKernelInfoStore, RunStatus};

use super::config::{PassConfig, PassKind};
use super::provenance::{
    original_names, set_data_dump_attr, set_stream_label_to_fused_nodes, stream_label,
    AnchorSnapshot,
};
use super::FusionContext;

/// Lazily built patterns of one pass
#[derive(Debug, Default)]
enum PatternCache {
    #[default]
    Undefined,
    Ready(Vec<FusionPattern>),
    Failed,
}

/// Counts of one run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunCounts {
    /// Mappings found across all patterns
    pub match_times: u32,
    /// Mappings the pass actually rewrote
    pub effect_times: u32,
}

impl RunCounts {
    fn merge(&mut self, other: RunCounts) {
        self.match_times = self.match_times.saturating_add(other.match_times);
        self.effect_times = self.effect_times.saturating_add(other.effect_times);
    }
}

/// Drives one [`FusionPass`] over graphs
///
/// Runs take `&mut self`; one runner serves one graph at a time.
pub struct PatternFusionRunner<P: FusionPass> {
    pass: P,
    config: PassConfig,
    recorder: Arc<FusionStatisticRecorder>,
    checker: Option<Arc<dyn OpsKernelInfoStore>>,
    patterns: PatternCache,
    snapshot: AnchorSnapshot,
    last_counts: RunCounts,
}

impl<P: FusionPass> PatternFusionRunner<P> {
    /// Create a runner reporting into `recorder`
    pub fn new(pass: P, recorder: Arc<FusionStatisticRecorder>) -> Self {
        Self {
            pass,
            config: PassConfig::default(),
            recorder,
            checker: None,
            patterns: PatternCache::Undefined,
            snapshot: AnchorSnapshot::new(),
            last_counts: RunCounts::default(),
        }
    }

    /// Configure the runner
    pub fn with_config(mut self, config: PassConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach a capability checker
    pub fn with_checker(mut self, checker: Arc<dyn OpsKernelInfoStore>) -> Self {
        self.checker = Some(checker);
        self
    }

    /// Wrapped pass
    pub fn pass(&self) -> &P {
        &self.pass
    }

    /// Mutable wrapped pass
    pub fn pass_mut(&mut self) -> &mut P {
        &mut self.pass
    }

    /// Current configuration
    pub fn config(&self) -> &PassConfig {
        &self.config
    }

    /// Built patterns; empty before the first run or after a failed build
    pub fn patterns(&self) -> &[FusionPattern] {
        match &self.patterns {
            PatternCache::Ready(patterns) => patterns,
            _ => &[],
        }
    }

    /// Counts of the most recent run
    pub fn last_counts(&self) -> RunCounts {
        self.last_counts
    }

    /// Define and build patterns on first use
    fn ensure_patterns(&mut self) -> FusionResult<()> {
        match self.patterns {
            PatternCache::Ready(_) => return Ok(()),
            PatternCache::Failed => {
                return Err(FusionError::PatternsInvalid(self.pass.name().to_string()))
            }
            PatternCache::Undefined => {}
        }

        let mut patterns = self.pass.define_patterns();
        for pattern in &mut patterns {
            if let Err(e) = pattern.build() {
                error!(pass = self.pass.name(), error = %e, "pattern build failed");
                self.patterns = PatternCache::Failed;
                return Err(FusionError::PatternsInvalid(self.pass.name().to_string()));
            }
            pattern.dump();
        }

        debug!(pass = self.pass.name(), patterns = patterns.len(), "patterns built");
        self.patterns = PatternCache::Ready(patterns);
        Ok(())
    }

    /// Run the pass over a graph
    ///
    /// # Arguments
    /// * `graph` - Graph to rewrite in place
    /// * `index` - Optional shared type index, updated with fused nodes
    ///
    /// # Returns
    /// * `Ok(RunStatus::Changed)` if at least one mapping was rewritten
    /// * `Ok(RunStatus::NotChanged)` otherwise
    /// * `Err(_)` if the patterns are invalid or a rewrite failed
    #[tracing::instrument(skip_all, fields(pass = self.pass.name(), graph = %graph.name))]
    pub fn run(
        &mut self,
        graph: &mut ComputeGraph,
        mut index: Option<&mut NodeTypeIndex>,
    ) -> FusionResult<RunStatus> {
        self.ensure_patterns()?;
        self.snapshot.clear();
        self.last_counts = RunCounts::default();

        if let Some(index) = index.as_deref_mut() {
            index.run_count += 1;
        }

        let pass_name = self.pass.name().to_string();
        let checker = self.checker.as_deref();
        let mut status = RunStatus::NotChanged;
        let mut totals = RunCounts::default();

        if let PatternCache::Ready(patterns) = &self.patterns {
            for pattern in patterns {
                self.snapshot.clear();
                let (pattern_status, counts) = run_one_pattern(
                    &mut self.pass,
                    &pass_name,
                    pattern,
                    graph,
                    index.as_deref_mut(),
                    &mut self.snapshot,
                    &self.config,
                    checker,
                )?;
                status = status.merge(pattern_status);
                totals.merge(counts);
            }
        }

        let fusion_info = FusionInfo::new(graph.session_id(), graph.graph_id().to_string(), pass_name.as_str())
            .with_match_times(totals.match_times)
            .with_effect_times(totals.effect_times);
        match self.config.kind {
            PassKind::Graph => self.recorder.update_graph_fusion(&fusion_info),
            PassKind::Buffer => self.recorder.update_buffer_fusion(&fusion_info),
        }
        self.last_counts = totals;

        info!(
            session = graph.session_id(),
            graph_id = graph.graph_id(),
            matched = totals.match_times,
            effected = totals.effect_times,
            "fusion pass finished"
        );
        Ok(status)
    }
}

/// Match one pattern and rewrite every mapping
#[allow(clippy::too_many_arguments)]
fn run_one_pattern<P: FusionPass>(
    pass: &mut P,
    pass_name: &str,
    pattern: &FusionPattern,
    graph: &mut ComputeGraph,
    mut index: Option<&mut NodeTypeIndex>,
    snapshot: &mut AnchorSnapshot,
    config: &PassConfig,
    checker: Option<&dyn OpsKernelInfoStore>,
) -> FusionResult<(RunStatus, RunCounts)> {
    let mappings = PatternMatcher::new(graph, pattern).match_all(index.as_deref());
    if mappings.is_empty() {
        debug!(pattern = pattern.name(), "no match");
        return Ok((RunStatus::NotChanged, RunCounts::default()));
    }

    if config.record_provenance {
        for mapping in &mappings {
            if let Some(output_node) = mapping.first_node() {
                snapshot.record(graph, output_node);
            }
        }
    }
    if config.dump_mappings {
        dump_mappings(pattern, graph, &mappings);
    }

    let ctx = FusionContext::new(pass_name, pattern, checker);
    let mut counts = RunCounts {
        match_times: u32::try_from(mappings.len()).unwrap_or(u32::MAX),
        effect_times: 0,
    };
    let mut status = RunStatus::NotChanged;

    for mapping in &mappings {
        let representative = mapping.first_node();
        let originals = mapping.nodes();
        let (label, names) = if config.record_provenance {
            (
                representative.and_then(|node| stream_label(graph, node)),
                original_names(graph, &originals),
            )
        } else {
            (None, Vec::new())
        };

        let fused = match pass.fusion(graph, mapping, &ctx) {
            Ok(FusionOutcome::Fused(fused)) => fused,
            Ok(FusionOutcome::NotChanged) => continue,
            Err(e) => {
                error!(pattern = pattern.name(), error = %e, "fusion failed");
                return Err(e);
            }
        };

        if config.record_provenance {
            set_stream_label_to_fused_nodes(graph, &fused, label.as_deref())?;
            set_data_dump_attr(graph, snapshot, &originals, &names, &fused);
        }

        if let Some(index) = index.as_deref_mut() {
            for &node in &fused {
                if !index.insert(graph, node) {
                    warn!(pattern = pattern.name(), %node, "fused node missing from graph");
                }
            }
        }

        counts.effect_times = counts.effect_times.saturating_add(1);
        status = RunStatus::Changed;
    }

    debug!(
        pattern = pattern.name(),
        matched = counts.match_times,
        effected = counts.effect_times,
        "pattern applied"
    );
    Ok((status, counts))
}

impl<P: FusionPass> GraphPass for PatternFusionRunner<P> {
    fn name(&self) -> &str {
        self.pass.name()
    }

    fn run(
        &mut self,
        graph: &mut ComputeGraph,
        index: Option<&mut NodeTypeIndex>,
    ) -> FusionResult<RunStatus> {
        PatternFusionRunner::run(self, graph, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::graph::{
        AttrHolder, NodeId, OpDesc, ATTR_DATA_DUMP_ORIGINAL_OP_NAMES, STREAM_LABEL,
    };
    use crate::pattern::{BranchKind, Mapping};

    /// Replaces conv -> relu with a single "ConvRelu" node
    struct MergePass {
        defined: Cell<usize>,
        fail: bool,
    }

    impl MergePass {
        fn new() -> Self {
            Self {
                defined: Cell::new(0),
                fail: false,
            }
        }
    }

    impl FusionPass for MergePass {
        fn name(&self) -> &str {
            "MergePass"
        }

        fn define_patterns(&self) -> Vec<FusionPattern> {
            self.defined.set(self.defined.get() + 1);
            vec![
                FusionPattern::new("ConvRelu")
                    .add_descriptor("conv", &["Conv"], 1, 1)
                    .add_descriptor("relu", &["Relu"], 1, 1)
                    .set_outputs("conv", &["relu"], BranchKind::Serial)
                    .set_head(&["conv"]),
                FusionPattern::new("ConvReluSigmoid")
                    .add_descriptor("fused", &["ConvRelu"], 1, 1)
                    .add_descriptor("sig", &["Sigmoid"], 1, 1)
                    .set_outputs("fused", &["sig"], BranchKind::Serial),
            ]
        }

        fn fusion(
            &mut self,
            graph: &mut ComputeGraph,
            mapping: &Mapping,
            ctx: &FusionContext<'_>,
        ) -> FusionResult<FusionOutcome> {
            if self.fail {
                return Err(FusionError::FusionFailed {
                    pass: ctx.pass_name().to_string(),
                    pattern: ctx.pattern().name().to_string(),
                    reason: "refused".to_string(),
                });
            }
            let nodes = mapping.nodes();
            let name = format!("fused_{}", graph.node_count());
            let op_type = if ctx.pattern().name() == "ConvRelu" {
                "ConvRelu"
            } else {
                "ConvReluSigmoid"
            };
            let fused = crate::transform::fuse_nodes(graph, &nodes, OpDesc::new(name, op_type))?;
            Ok(FusionOutcome::Fused(vec![fused]))
        }
    }

    struct BrokenPass;

    impl FusionPass for BrokenPass {
        fn name(&self) -> &str {
            "BrokenPass"
        }

        fn define_patterns(&self) -> Vec<FusionPattern> {
            vec![FusionPattern::new("broken").add_descriptor("a", &["Conv"], 2, 1)]
        }

        fn fusion(
            &mut self,
            _graph: &mut ComputeGraph,
            _mapping: &Mapping,
            _ctx: &FusionContext<'_>,
        ) -> FusionResult<FusionOutcome> {
            Ok(FusionOutcome::NotChanged)
        }
    }

    /// x -> conv -> relu -> sigmoid -> out
    fn make_test_graph() -> (ComputeGraph, NodeId, NodeId, NodeId) {
        let mut graph = ComputeGraph::new("g").with_ids(1, 0);
        let x = graph.add_node(OpDesc::new("x", "Data")).unwrap();
        let conv = graph.add_node(OpDesc::new("conv", "Conv")).unwrap();
        let relu = graph.add_node(OpDesc::new("relu", "Relu")).unwrap();
        let sig = graph.add_node(OpDesc::new("sig", "Sigmoid")).unwrap();
        let out = graph.add_node(OpDesc::new("out", "NetOutput")).unwrap();
        graph.link(x, 0, conv, 0).unwrap();
        graph.link(conv, 0, relu, 0).unwrap();
        graph.link(relu, 0, sig, 0).unwrap();
        graph.link(sig, 0, out, 0).unwrap();
        (graph, conv, relu, out)
    }

    #[test]
    fn test_run_builds_patterns_once() {
        let recorder = Arc::new(FusionStatisticRecorder::new());
        let mut runner = PatternFusionRunner::new(MergePass::new(), recorder);

        let (mut graph, _, _, _) = make_test_graph();
        runner.run(&mut graph, None).unwrap();
        let (mut graph, _, _, _) = make_test_graph();
        runner.run(&mut graph, None).unwrap();

        assert_eq!(runner.pass().defined.get(), 1);
        assert_eq!(runner.patterns().len(), 2);
    }

    #[test]
    fn test_later_pattern_sees_fused_node_through_index() {
        let recorder = Arc::new(FusionStatisticRecorder::new());
        let mut runner = PatternFusionRunner::new(MergePass::new(), Arc::clone(&recorder));
        let (mut graph, _, _, out) = make_test_graph();
        let mut index = NodeTypeIndex::build(&graph);

        let status = runner.run(&mut graph, Some(&mut index)).unwrap();
        assert!(status.is_changed());
        assert_eq!(index.run_count, 1);
        assert_eq!(index.nodes_of("ConvRelu").len(), 1);
        assert_eq!(index.nodes_of("ConvReluSigmoid").len(), 1);

        // x -> ConvReluSigmoid -> out
        assert_eq!(graph.node_count(), 3);
        let producer = graph.in_data_nodes(out)[0];
        assert_eq!(graph.op_type(producer), Some("ConvReluSigmoid"));

        // names of the first fusion are flattened into the second
        let names = graph
            .node(producer)
            .unwrap()
            .get_strings(ATTR_DATA_DUMP_ORIGINAL_OP_NAMES)
            .unwrap()
            .to_vec();
        assert_eq!(names, vec!["sig", "relu", "conv"]);

        let drained = recorder.get_and_clear_fusion_info("1_0");
        assert_eq!(drained.graph_fusion["MergePass"].match_times(), 2);
        assert_eq!(drained.graph_fusion["MergePass"].effect_times(), 2);
        assert_eq!(runner.last_counts().effect_times, 2);
    }

    #[test]
    fn test_without_index_later_pattern_scans_graph() {
        let recorder = Arc::new(FusionStatisticRecorder::new());
        let mut runner = PatternFusionRunner::new(MergePass::new(), recorder);
        let (mut graph, _, _, _) = make_test_graph();

        runner.run(&mut graph, None).unwrap();
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn test_stream_label_propagated() {
        let recorder = Arc::new(FusionStatisticRecorder::new());
        let mut runner = PatternFusionRunner::new(MergePass::new(), recorder);
        let (mut graph, conv, relu, out) = make_test_graph();
        let sig = graph.find_node("sig").unwrap();
        for node in [conv, relu, sig] {
            graph.node_mut(node).unwrap().set_str(STREAM_LABEL, "s2");
        }

        runner.run(&mut graph, None).unwrap();
        let producer = graph.in_data_nodes(out)[0];
        assert_eq!(graph.node(producer).unwrap().get_str(STREAM_LABEL), Some("s2"));
    }

    #[test]
    fn test_plain_config_skips_provenance() {
        let recorder = Arc::new(FusionStatisticRecorder::new());
        let mut runner =
            PatternFusionRunner::new(MergePass::new(), recorder).with_config(PassConfig::plain());
        let (mut graph, _, _, out) = make_test_graph();

        runner.run(&mut graph, None).unwrap();
        let producer = graph.in_data_nodes(out)[0];
        assert!(!graph
            .node(producer)
            .unwrap()
            .has_attr(ATTR_DATA_DUMP_ORIGINAL_OP_NAMES));
    }

    #[test]
    fn test_fusion_failure_aborts_run() {
        let recorder = Arc::new(FusionStatisticRecorder::new());
        let mut pass = MergePass::new();
        pass.fail = true;
        let mut runner = PatternFusionRunner::new(pass, Arc::clone(&recorder));
        let (mut graph, _, _, _) = make_test_graph();

        let result = runner.run(&mut graph, None);
        assert!(matches!(result, Err(FusionError::FusionFailed { .. })));
        assert_eq!(graph.node_count(), 5);
        assert!(recorder.get_and_clear_fusion_info("1_0").is_empty());
    }

    #[test]
    fn test_invalid_pattern_aborts_before_matching() {
        let recorder = Arc::new(FusionStatisticRecorder::new());
        let mut runner = PatternFusionRunner::new(BrokenPass, recorder);
        let (mut graph, _, _, _) = make_test_graph();

        let first = runner.run(&mut graph, None);
        assert!(matches!(first, Err(FusionError::PatternsInvalid(_))));
        let second = runner.run(&mut graph, None);
        assert!(matches!(second, Err(FusionError::PatternsInvalid(_))));
        assert!(runner.patterns().is_empty());
    }

    #[test]
    fn test_buffer_kind_reports_into_buffer_table() {
        let recorder = Arc::new(FusionStatisticRecorder::new());
        let mut runner = PatternFusionRunner::new(MergePass::new(), Arc::clone(&recorder))
            .with_config(PassConfig::default().with_kind(PassKind::Buffer));
        let (mut graph, _, _, _) = make_test_graph();

        runner.run(&mut graph, None).unwrap();
        let drained = recorder.get_and_clear_fusion_info("1_0");
        assert!(drained.graph_fusion.is_empty());
        assert_eq!(drained.buffer_fusion["MergePass"].effect_times(), 2);
    }
}
