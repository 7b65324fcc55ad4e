//! # Graph Fusion
//!
//! Declarative subgraph matching and fusion passes for operator graphs.
//!
//! This crate lets a pass describe the subgraph shapes it wants to rewrite,
//! finds every occurrence in a graph, hands each one to the pass, and keeps
//! provenance and statistics for the rewrites.
//!
//! ## Features
//!
//! - **Pattern Declaration**: fluent builder for descriptors, edges and heads
//! - **Pattern Matching**: deterministic output-to-input matching
//! - **Fusion Orchestration**: lazy pattern build, rewrite loop, stream-label
//!   and data-dump provenance on fused nodes
//! - **Statistics**: shared per-graph match/effect ledger
//!
//! ## Example
//!
//! ```
//! use graph_fusion::prelude::*;
//!
//! let mut graph = ComputeGraph::new("net").with_ids(1, 0);
//! let conv = graph.add_node(OpDesc::new("conv_0", "Conv")).unwrap();
//! let relu = graph.add_node(OpDesc::new("relu_0", "Relu")).unwrap();
//! graph.link(conv, 0, relu, 0).unwrap();
//!
//! let mut pipeline = FusionPipeline::default();
//! assert_eq!(pipeline.run(&mut graph).unwrap(), RunStatus::Changed);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// ============================================================================
// Module declarations
// ============================================================================

pub mod error;
pub mod fusion;
pub mod graph;
pub mod pattern;
pub mod statistics;
pub mod traits;
pub mod transform;
pub mod transformers;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use graph_fusion::prelude::*`
pub mod prelude {
    pub use crate::error::{FusionError, FusionResult, PatternError};
    pub use crate::fusion::{FusionContext, PassConfig, PassKind, PatternFusionRunner};
    pub use crate::graph::{AttrHolder, AttrValue, ComputeGraph, NodeId, NodeTypeIndex, OpDesc};
    pub use crate::pattern::{BranchKind, FusionPattern, Mapping, PatternMatcher};
    pub use crate::statistics::{FusionInfo, FusionStatisticRecorder};
    pub use crate::traits::{FusionOutcome, FusionPass, GraphPass, OpsKernelInfoStore, RunStatus};
    pub use crate::transform::fuse_nodes;
    pub use crate::transformers::FusionPipeline;
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{FusionError, FusionResult};
pub use traits::FusionPass;

// ============================================================================
// Version information
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
