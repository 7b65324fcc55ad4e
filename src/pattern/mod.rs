//! Fusion pattern declaration and matching
//!
//! This module provides the tools for describing subgraph shapes and finding
//! them in a [`ComputeGraph`](crate::graph::ComputeGraph).
//!
//! # Overview
//!
//! The pattern system works by:
//! 1. Declaring descriptors (accepted op types + repeat bounds) and the edges
//!    between them with a fluent [`FusionPattern`] builder
//! 2. Validating the declaration with [`FusionPattern::build`], which also
//!    resolves the single output descriptor
//! 3. Matching in reverse order (output → input) with [`PatternMatcher`]
//!
//! # Example
//!
//! ```
//! use graph_fusion::graph::{ComputeGraph, OpDesc};
//! use graph_fusion::pattern::{BranchKind, FusionPattern, PatternMatcher};
//!
//! let mut pattern = FusionPattern::new("ConvRelu")
//!     .add_descriptor("conv", &["Conv"], 1, 1)
//!     .add_descriptor("relu", &["Relu"], 1, 1)
//!     .set_outputs("conv", &["relu"], BranchKind::Serial)
//!     .set_head(&["conv"]);
//! pattern.build().unwrap();
//!
//! let mut graph = ComputeGraph::new("net");
//! let conv = graph.add_node(OpDesc::new("conv_0", "Conv")).unwrap();
//! let relu = graph.add_node(OpDesc::new("relu_0", "Relu")).unwrap();
//! graph.link(conv, 0, relu, 0).unwrap();
//!
//! let mappings = PatternMatcher::new(&graph, &pattern).match_all(None);
//! assert_eq!(mappings.len(), 1);
//! ```

pub mod builder;
pub mod descriptor;
pub mod matcher;

// Re-export main types
pub use builder::{FusionPattern, DEFAULT_OP_MAX_COUNT};
pub use descriptor::{BranchKind, DescId, Descriptor, SkipStatus};
pub use matcher::{
    check_stream_label, dump_mappings, get_matched_nodes_by_desc_name, get_node_from_mapping,
    Mapping, NodeList, PatternMatcher,
};
