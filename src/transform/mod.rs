//! Graph rewriting helpers
//!
//! Building blocks rewrite callbacks use to replace matched nodes:
//!
//! - [`fuse::fuse_nodes`]: replace a node set with one node
//! - [`fuse::boundary`]: edges crossing a node set
//! - [`fuse::can_fuse`]: single-consumer adjacency check
//!
//! # Example
//!
//! ```
//! use graph_fusion::graph::{ComputeGraph, OpDesc};
//! use graph_fusion::transform::fuse_nodes;
//!
//! let mut graph = ComputeGraph::new("net");
//! let conv = graph.add_node(OpDesc::new("conv_0", "Conv")).unwrap();
//! let relu = graph.add_node(OpDesc::new("relu_0", "Relu")).unwrap();
//! let pool = graph.add_node(OpDesc::new("pool_0", "Pool")).unwrap();
//! graph.link(conv, 0, relu, 0).unwrap();
//! graph.link(relu, 0, pool, 0).unwrap();
//!
//! let fused = fuse_nodes(&mut graph, &[relu, conv], OpDesc::new("conv_relu", "Conv")).unwrap();
//! assert_eq!(graph.in_data_nodes(pool), vec![fused]);
//! ```

pub mod fuse;

pub use fuse::{boundary, can_fuse, fuse_nodes, Boundary};
