//! Core traits for graph-fusion
//!
//! Defines the interfaces a fusion pass implements and the ones the
//! orchestrator exposes.

use crate::error::FusionResult;
use crate::fusion::FusionContext;
use crate::graph::{ComputeGraph, NodeId, NodeTypeIndex, OpDesc};
use crate::pattern::{FusionPattern, Mapping};

/// Result of one rewrite callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FusionOutcome {
    /// The mapping was rewritten into these nodes
    Fused(Vec<NodeId>),
    /// The pass declined this mapping; the graph is untouched
    NotChanged,
}

/// Result of running a pass over a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStatus {
    /// At least one fusion was applied
    Changed,
    /// Nothing was rewritten
    #[default]
    NotChanged,
}

impl RunStatus {
    /// Whether the graph was modified
    pub fn is_changed(self) -> bool {
        self == RunStatus::Changed
    }

    /// Combine the status of two consecutive runs
    pub fn merge(self, other: RunStatus) -> RunStatus {
        if self.is_changed() || other.is_changed() {
            RunStatus::Changed
        } else {
            RunStatus::NotChanged
        }
    }
}

/// A concrete fusion: which shapes to look for and how to rewrite them
///
/// # Example
///
/// ```
/// use graph_fusion::error::FusionResult;
/// use graph_fusion::fusion::FusionContext;
/// use graph_fusion::graph::ComputeGraph;
/// use graph_fusion::pattern::{FusionPattern, Mapping};
/// use graph_fusion::traits::{FusionOutcome, FusionPass};
///
/// struct CountRelu(usize);
///
/// impl FusionPass for CountRelu {
///     fn name(&self) -> &str {
///         "CountRelu"
///     }
///
///     fn define_patterns(&self) -> Vec<FusionPattern> {
///         vec![FusionPattern::new("relu").add_descriptor("relu", &["Relu"], 1, 1)]
///     }
///
///     fn fusion(
///         &mut self,
///         _graph: &mut ComputeGraph,
///         _mapping: &Mapping,
///         _ctx: &FusionContext<'_>,
///     ) -> FusionResult<FusionOutcome> {
///         self.0 += 1;
///         Ok(FusionOutcome::NotChanged)
///     }
/// }
/// ```
pub trait FusionPass {
    /// Name of the pass, used for statistics and logs
    fn name(&self) -> &str;

    /// Declare the patterns this pass fuses, in priority order
    ///
    /// Called once per runner; the result is built and cached.
    fn define_patterns(&self) -> Vec<FusionPattern>;

    /// Rewrite one matched subgraph
    ///
    /// # Arguments
    /// * `graph` - Graph being optimized
    /// * `mapping` - Descriptor → node bindings of the match
    /// * `ctx` - Pattern being applied and optional capability checker
    ///
    /// # Returns
    /// * `Ok(FusionOutcome::Fused(nodes))` - the nodes that replaced the match
    /// * `Ok(FusionOutcome::NotChanged)` - the pass declined
    /// * `Err(_)` - the rewrite failed; the whole run is aborted
    fn fusion(
        &mut self,
        graph: &mut ComputeGraph,
        mapping: &Mapping,
        ctx: &FusionContext<'_>,
    ) -> FusionResult<FusionOutcome>;
}

/// Object-safe entry point of a runnable pass
pub trait GraphPass {
    /// Name of the pass
    fn name(&self) -> &str;

    /// Run the pass over a graph
    ///
    /// A supplied type index is used to find candidates and is kept up to
    /// date with the nodes the pass creates.
    fn run(
        &mut self,
        graph: &mut ComputeGraph,
        index: Option<&mut NodeTypeIndex>,
    ) -> FusionResult<RunStatus>;
}

/// Backend capability query
pub trait OpsKernelInfoStore: Send + Sync {
    /// Whether the backend can execute a node described by `desc`
    fn check_supported(&self, desc: &OpDesc) -> bool;
}
