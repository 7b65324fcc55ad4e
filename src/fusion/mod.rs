//! Fusion orchestration
//!
//! - [`PatternFusionRunner`]: drives a [`FusionPass`](crate::traits::FusionPass)
//!   over a graph (build patterns once, match, rewrite, record provenance and
//!   statistics)
//! - [`FusionContext`]: what a rewrite callback sees besides the graph
//! - [`provenance`]: stream-label and data-dump bookkeeping on fused nodes
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use graph_fusion::fusion::PatternFusionRunner;
//! use graph_fusion::graph::{ComputeGraph, OpDesc};
//! use graph_fusion::statistics::FusionStatisticRecorder;
//! use graph_fusion::transformers::ConvActivationFusionPass;
//!
//! let mut graph = ComputeGraph::new("net");
//! let conv = graph.add_node(OpDesc::new("conv_0", "Conv")).unwrap();
//! let relu = graph.add_node(OpDesc::new("relu_0", "Relu")).unwrap();
//! graph.link(conv, 0, relu, 0).unwrap();
//!
//! let recorder = Arc::new(FusionStatisticRecorder::new());
//! let mut runner = PatternFusionRunner::new(ConvActivationFusionPass::new(), recorder);
//! let status = runner.run(&mut graph, None).unwrap();
//!
//! assert!(status.is_changed());
//! assert_eq!(graph.node_count(), 1);
//! ```

pub mod config;
pub mod provenance;
pub mod runner;

pub use config::{PassConfig, PassKind};
pub use provenance::{AnchorSnapshot, OriginRecord};
pub use runner::{PatternFusionRunner, RunCounts};

use crate::graph::{NodeId, OpDesc};
use crate::pattern::{get_matched_nodes_by_desc_name, get_node_from_mapping, FusionPattern, Mapping};
use crate::traits::OpsKernelInfoStore;

/// Read-only context handed to a rewrite callback
#[derive(Clone, Copy)]
pub struct FusionContext<'a> {
    pass_name: &'a str,
    pattern: &'a FusionPattern,
    checker: Option<&'a dyn OpsKernelInfoStore>,
}

impl<'a> FusionContext<'a> {
    /// Create a context for one pattern
    pub fn new(
        pass_name: &'a str,
        pattern: &'a FusionPattern,
        checker: Option<&'a dyn OpsKernelInfoStore>,
    ) -> Self {
        Self {
            pass_name,
            pattern,
            checker,
        }
    }

    /// Name of the running pass
    pub fn pass_name(&self) -> &str {
        self.pass_name
    }

    /// Pattern the mapping was matched against
    pub fn pattern(&self) -> &FusionPattern {
        self.pattern
    }

    /// Ask the capability checker whether `desc` can run
    ///
    /// Without a checker nothing is supported.
    pub fn check_op_supported(&self, desc: &OpDesc) -> bool {
        self.checker
            .map(|checker| checker.check_supported(desc))
            .unwrap_or(false)
    }

    /// Whether a capability checker is attached
    pub fn has_checker(&self) -> bool {
        self.checker.is_some()
    }

    /// First node bound to the descriptor named `id`
    pub fn node_from_mapping(&self, id: &str, mapping: &Mapping) -> Option<NodeId> {
        get_node_from_mapping(self.pattern, id, mapping)
    }

    /// Every node bound to the descriptor named `name`
    pub fn nodes_by_desc_name(&self, name: &str, mapping: &Mapping) -> Vec<NodeId> {
        get_matched_nodes_by_desc_name(self.pattern, name, mapping)
    }
}

impl std::fmt::Debug for FusionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionContext")
            .field("pass_name", &self.pass_name)
            .field("pattern", &self.pattern.name())
            .field("has_checker", &self.checker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConvOnly;

    impl OpsKernelInfoStore for ConvOnly {
        fn check_supported(&self, desc: &OpDesc) -> bool {
            desc.op_type == "Conv"
        }
    }

    #[test]
    fn test_check_op_supported() {
        let pattern = FusionPattern::new("p");
        let store = ConvOnly;

        let ctx = FusionContext::new("pass", &pattern, Some(&store));
        assert!(ctx.has_checker());
        assert!(ctx.check_op_supported(&OpDesc::new("c", "Conv")));
        assert!(!ctx.check_op_supported(&OpDesc::new("r", "Relu")));

        let ctx = FusionContext::new("pass", &pattern, None);
        assert!(!ctx.check_op_supported(&OpDesc::new("c", "Conv")));
    }
}
