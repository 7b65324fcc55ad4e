//! Node, anchor and attribute types
//!
//! Nodes live in the [`ComputeGraph`](super::ComputeGraph) arena and are
//! addressed by [`NodeId`]. Edges are stored on both endpoints: every input
//! slot knows its producer, every output slot knows its consumers.

use std::fmt;

use smallvec::SmallVec;

use super::maps::AttrMap;

/// Stable handle of a node inside one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Raw index of the handle
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Reference to an output anchor (producer side of an edge)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutAnchor {
    /// Owning node
    pub node: NodeId,
    /// Output index on the owning node
    pub index: usize,
}

impl OutAnchor {
    /// Create an output anchor reference
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

/// Reference to an input anchor (consumer side of an edge)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InAnchor {
    /// Owning node
    pub node: NodeId,
    /// Input index on the owning node
    pub index: usize,
}

impl InAnchor {
    /// Create an input anchor reference
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

/// Attribute value stored on nodes, op descs and output anchors
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// String attribute
    Str(String),
    /// Boolean attribute
    Bool(bool),
    /// Integer attribute
    Int(i64),
    /// List of strings
    Strings(Vec<String>),
}

/// Input side of a node: at most one producer
#[derive(Debug, Clone, Default)]
pub struct InputSlot {
    /// Connected producer anchor, if any
    pub peer: Option<OutAnchor>,
}

/// Output side of a node: any number of consumers plus output-desc attributes
#[derive(Debug, Clone, Default)]
pub struct OutputSlot {
    /// Connected consumer anchors in connection order
    pub peers: SmallVec<[InAnchor; 4]>,
    /// Attributes of this output (data-dump provenance lives here)
    pub attrs: AttrMap,
}

/// Description of a node that does not exist in a graph yet
///
/// Rewrite callbacks build an `OpDesc`, optionally ask the capability
/// checker about it, then hand it to [`ComputeGraph::add_node`](super::ComputeGraph::add_node).
#[derive(Debug, Clone, Default)]
pub struct OpDesc {
    /// Unique node name
    pub name: String,
    /// Operator type
    pub op_type: String,
    /// Number of input anchors to pre-allocate
    pub input_count: usize,
    /// Number of output anchors to pre-allocate
    pub output_count: usize,
    /// Node attributes
    pub attrs: AttrMap,
}

impl OpDesc {
    /// Create a desc with no anchors
    pub fn new(name: impl Into<String>, op_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op_type: op_type.into(),
            ..Default::default()
        }
    }

    /// Pre-allocate input and output anchors
    pub fn with_anchors(mut self, inputs: usize, outputs: usize) -> Self {
        self.input_count = inputs;
        self.output_count = outputs;
        self
    }

    /// Attach an attribute
    pub fn with_attr(mut self, key: &str, value: AttrValue) -> Self {
        self.attrs.insert(key.to_string(), value);
        self
    }
}

/// A node of the compute graph
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) op_type: String,
    /// Node attributes
    pub attrs: AttrMap,
    pub(crate) inputs: Vec<InputSlot>,
    pub(crate) outputs: Vec<OutputSlot>,
}

impl Node {
    pub(crate) fn from_desc(id: NodeId, desc: OpDesc) -> Self {
        Self {
            id,
            name: desc.name,
            op_type: desc.op_type,
            attrs: desc.attrs,
            inputs: vec![InputSlot::default(); desc.input_count],
            outputs: vec![OutputSlot::default(); desc.output_count],
        }
    }

    /// Handle of this node
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Unique node name; change it through [`ComputeGraph::rename_node`](super::ComputeGraph::rename_node)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operator type
    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    /// All input slots, indexed by anchor index
    pub fn inputs(&self) -> &[InputSlot] {
        &self.inputs
    }

    /// All output slots, indexed by anchor index
    pub fn outputs(&self) -> &[OutputSlot] {
        &self.outputs
    }

    /// Output slot by index
    pub fn output(&self, index: usize) -> Option<&OutputSlot> {
        self.outputs.get(index)
    }

    /// Mutable output slot by index
    pub fn output_mut(&mut self, index: usize) -> Option<&mut OutputSlot> {
        self.outputs.get_mut(index)
    }

    /// Whether any input slot is connected
    pub fn has_inputs(&self) -> bool {
        self.inputs.iter().any(|s| s.peer.is_some())
    }

    /// Whether any output slot has a consumer
    pub fn has_outputs(&self) -> bool {
        self.outputs.iter().any(|s| !s.peers.is_empty())
    }

    /// Snapshot of this node as an `OpDesc` (no edges)
    pub fn to_desc(&self) -> OpDesc {
        OpDesc {
            name: self.name.clone(),
            op_type: self.op_type.clone(),
            input_count: self.inputs.len(),
            output_count: self.outputs.len(),
            attrs: self.attrs.clone(),
        }
    }
}
