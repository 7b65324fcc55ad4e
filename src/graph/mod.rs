//! Graph model the fusion engine operates on
//!
//! This module provides the core infrastructure for working with operator graphs:
//!
//! - [`ComputeGraph`]: arena of nodes with O(1) lookups by id and name
//! - [`NodeTypeIndex`]: op type → nodes, shared across passes of one graph
//! - [`AttrHolder`]: typed attribute access on nodes, descs and output anchors
//!
//! # Overview
//!
//! Every node has ordered input anchors (each fed by at most one producer
//! output anchor) and ordered output anchors (each feeding any number of
//! consumer input anchors). Edges are recorded on both ends.
//!
//! # Example
//!
//! ```
//! use graph_fusion::graph::{ComputeGraph, OpDesc};
//!
//! let mut graph = ComputeGraph::new("net");
//! let conv = graph.add_node(OpDesc::new("conv_0", "Conv")).unwrap();
//! let relu = graph.add_node(OpDesc::new("relu_0", "Relu")).unwrap();
//! graph.link(conv, 0, relu, 0).unwrap();
//!
//! assert_eq!(graph.in_data_nodes(relu), vec![conv]);
//! ```
//!
//! # Maps
//!
//! | Map | Description |
//! |-----|-------------|
//! | `NodeMap` | node id → node (insertion order preserved) |
//! | `NameMap` | node name → node id |
//! | `TypeMap` | op type → node ids |
//! | `AttrMap` | attribute key → value (insertion order preserved) |

pub mod accessors;
pub mod context;
pub mod maps;
pub mod mutators;
pub mod node;

// Re-export main types
pub use accessors::{
    AttrHolder, ATTR_DATA_DUMP_IS_MULTIOP, ATTR_DATA_DUMP_ORIGINAL_OP_NAMES,
    ATTR_DATA_DUMP_ORIGIN_NAME, ATTR_DATA_DUMP_ORIGIN_OUTPUT_INDEX, STREAM_LABEL,
};
pub use context::ComputeGraph;
pub use maps::{AttrMap, NameMap, NodeMap, NodeTypeIndex, TypeMap};
pub use node::{AttrValue, InAnchor, InputSlot, Node, NodeId, OpDesc, OutAnchor, OutputSlot};
