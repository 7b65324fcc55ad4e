//! Ready-to-use fusion passes and the pipeline that runs them
//!
//! - **Fusion**: fold an activation into its convolution
//! - **Split**: break a BatchNorm into reduce + update halves
//!
//! # Overview
//!
//! Each pass implements the [`FusionPass`] trait and is driven by a
//! [`PatternFusionRunner`]. [`FusionPipeline`] owns the statistics recorder
//! every runner reports into, and runs its passes in order over a graph.
//!
//! # Example
//!
//! ```
//! use graph_fusion::graph::{ComputeGraph, OpDesc};
//! use graph_fusion::transformers::FusionPipeline;
//!
//! let mut graph = ComputeGraph::new("net").with_ids(1, 0);
//! let conv = graph.add_node(OpDesc::new("conv_0", "Conv")).unwrap();
//! let relu = graph.add_node(OpDesc::new("relu_0", "Relu")).unwrap();
//! graph.link(conv, 0, relu, 0).unwrap();
//!
//! let mut pipeline = FusionPipeline::default();
//! let status = pipeline.run(&mut graph).unwrap();
//! assert!(status.is_changed());
//!
//! let stats = pipeline.take_statistics(&graph);
//! assert_eq!(stats.graph_fusion["ConvActivationFusionPass"].effect_times(), 1);
//! ```

/// Fuse Conv + activation
pub mod fuse_conv_activation;
/// Split BatchNorm
pub mod split_batch_norm;

pub use fuse_conv_activation::{has_activation, ConvActivationFusionPass, ACTIVATIONS, ATTR_ACTIVATION};
pub use split_batch_norm::{BatchNormSplitPass, BN_TRAINING_REDUCE, BN_TRAINING_UPDATE};

use std::sync::Arc;

use tracing::{debug, error};

use crate::error::FusionResult;
use crate::fusion::{PassConfig, PatternFusionRunner};
use crate::graph::{ComputeGraph, NodeTypeIndex};
use crate::statistics::{self, DrainedFusionInfo, FusionStatisticRecorder};
use crate::traits::{FusionPass, GraphPass, OpsKernelInfoStore, RunStatus};

/// Ordered list of passes sharing one statistics recorder
pub struct FusionPipeline {
    recorder: Arc<FusionStatisticRecorder>,
    checker: Option<Arc<dyn OpsKernelInfoStore>>,
    passes: Vec<Box<dyn GraphPass>>,
}

impl Default for FusionPipeline {
    /// Pipeline with every built-in pass
    fn default() -> Self {
        Self::new()
            .add_pass(ConvActivationFusionPass::new())
            .add_pass(BatchNormSplitPass::new())
    }
}

impl FusionPipeline {
    /// Create an empty pipeline with its own recorder
    pub fn new() -> Self {
        Self::with_recorder(Arc::new(FusionStatisticRecorder::new()))
    }

    /// Create an empty pipeline reporting into `recorder`
    pub fn with_recorder(recorder: Arc<FusionStatisticRecorder>) -> Self {
        Self {
            recorder,
            checker: None,
            passes: Vec::new(),
        }
    }

    /// Attach a capability checker to every pass added afterwards
    pub fn with_checker(mut self, checker: Arc<dyn OpsKernelInfoStore>) -> Self {
        self.checker = Some(checker);
        self
    }

    /// Append a pass with the default configuration
    pub fn add_pass<P: FusionPass + 'static>(self, pass: P) -> Self {
        self.add_pass_with_config(pass, PassConfig::default())
    }

    /// Append a pass with an explicit configuration
    pub fn add_pass_with_config<P: FusionPass + 'static>(mut self, pass: P, config: PassConfig) -> Self {
        let mut runner = PatternFusionRunner::new(pass, Arc::clone(&self.recorder)).with_config(config);
        if let Some(checker) = &self.checker {
            runner = runner.with_checker(Arc::clone(checker));
        }
        self.passes.push(Box::new(runner));
        self
    }

    /// Append an already assembled pass
    pub fn add_graph_pass(mut self, pass: Box<dyn GraphPass>) -> Self {
        self.passes.push(pass);
        self
    }

    /// Shared statistics recorder
    pub fn recorder(&self) -> &Arc<FusionStatisticRecorder> {
        &self.recorder
    }

    /// Names of the passes, in run order
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Number of passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run every pass over `graph`
    ///
    /// All passes share one type index built up front. The first failing
    /// pass aborts the pipeline.
    #[tracing::instrument(skip_all, fields(graph = %graph.name))]
    pub fn run(&mut self, graph: &mut ComputeGraph) -> FusionResult<RunStatus> {
        let mut index = NodeTypeIndex::build(graph);
        let mut status = RunStatus::NotChanged;

        for pass in &mut self.passes {
            let pass_status = pass.run(graph, Some(&mut index)).map_err(|e| {
                error!(pass = pass.name(), error = %e, "fusion pass failed");
                e
            })?;
            debug!(pass = pass.name(), changed = pass_status.is_changed(), "pass done");
            status = status.merge(pass_status);
        }

        Ok(status)
    }

    /// Drain the statistics recorded for `graph`
    pub fn take_statistics(&self, graph: &ComputeGraph) -> DrainedFusionInfo {
        let key = statistics::key(graph.session_id(), &graph.graph_id().to_string());
        self.recorder.get_and_clear_fusion_info(&key)
    }
}

impl std::fmt::Debug for FusionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionPipeline")
            .field("passes", &self.pass_names())
            .field("has_checker", &self.checker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FusionError;
    use crate::graph::{AttrHolder, OpDesc, ATTR_DATA_DUMP_ORIGINAL_OP_NAMES};

    struct AlwaysFails;

    impl GraphPass for AlwaysFails {
        fn name(&self) -> &str {
            "AlwaysFails"
        }

        fn run(
            &mut self,
            _graph: &mut ComputeGraph,
            _index: Option<&mut NodeTypeIndex>,
        ) -> FusionResult<RunStatus> {
            Err(FusionError::Internal("boom".to_string()))
        }
    }

    /// x -> conv -> relu -> bn -> out
    fn make_test_graph() -> ComputeGraph {
        let mut graph = ComputeGraph::new("net").with_ids(4, 7);
        let x = graph.add_node(OpDesc::new("x", "Data")).unwrap();
        let conv = graph.add_node(OpDesc::new("conv", "Conv")).unwrap();
        let relu = graph.add_node(OpDesc::new("relu", "Relu")).unwrap();
        let bn = graph.add_node(OpDesc::new("bn", "BatchNorm")).unwrap();
        let out = graph.add_node(OpDesc::new("out", "NetOutput")).unwrap();
        graph.link(x, 0, conv, 0).unwrap();
        graph.link(conv, 0, relu, 0).unwrap();
        graph.link(relu, 0, bn, 0).unwrap();
        graph.link(bn, 0, out, 0).unwrap();
        graph
    }

    #[test]
    fn test_default_pipeline() {
        let mut graph = make_test_graph();
        let mut pipeline = FusionPipeline::default();
        assert_eq!(
            pipeline.pass_names(),
            vec!["ConvActivationFusionPass", "BatchNormSplitPass"]
        );

        assert!(pipeline.run(&mut graph).unwrap().is_changed());

        // x -> conv(relu) -> reduce/update -> out
        assert_eq!(graph.node_count(), 5);
        let conv = graph.find_node("conv").unwrap();
        assert!(has_activation(graph.node(conv).unwrap(), "Relu"));
        let update = graph.find_node("bn_update").unwrap();
        assert_eq!(
            graph.node(update).unwrap().get_strings(ATTR_DATA_DUMP_ORIGINAL_OP_NAMES),
            Some(&["bn".to_string()][..])
        );

        let stats = pipeline.take_statistics(&graph);
        assert_eq!(stats.graph_fusion.len(), 2);
        assert_eq!(stats.graph_fusion["BatchNormSplitPass"].match_times(), 1);
        assert!(pipeline.take_statistics(&graph).is_empty());
    }

    #[test]
    fn test_second_run_not_changed() {
        let mut graph = make_test_graph();
        let mut pipeline = FusionPipeline::default();
        pipeline.run(&mut graph).unwrap();
        assert_eq!(pipeline.run(&mut graph).unwrap(), RunStatus::NotChanged);
    }

    #[test]
    fn test_failure_aborts_pipeline() {
        let mut graph = make_test_graph();
        let mut pipeline = FusionPipeline::new()
            .add_graph_pass(Box::new(AlwaysFails))
            .add_pass(ConvActivationFusionPass::new());

        assert!(pipeline.run(&mut graph).is_err());
        assert_eq!(graph.node_count(), 5);
        assert!(graph.find_node("relu").is_some());
    }

    #[test]
    fn test_empty_pipeline() {
        let mut graph = make_test_graph();
        let mut pipeline = FusionPipeline::new();
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.run(&mut graph).unwrap(), RunStatus::NotChanged);
    }
}
