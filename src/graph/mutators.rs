//! Graph mutation operations
//!
//! Methods for modifying the graph structure: adding and removing nodes and
//! edges, and redirecting consumers. Both endpoints of an edge are always
//! updated together.

use crate::error::{FusionError, FusionResult};

use super::context::ComputeGraph;
use super::node::{InAnchor, InputSlot, Node, NodeId, OpDesc, OutAnchor, OutputSlot};

impl ComputeGraph {
    // ========================================================================
    // Node mutation
    // ========================================================================

    /// Insert a new node built from `desc`
    ///
    /// Node names are unique within a graph.
    pub fn add_node(&mut self, desc: OpDesc) -> FusionResult<NodeId> {
        if self.names.contains_key(&desc.name) {
            return Err(FusionError::Graph(format!(
                "node name [{}] already exists",
                desc.name
            )));
        }

        let id = NodeId(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| FusionError::Graph("node id space exhausted".to_string()))?;

        self.names.insert(desc.name.clone(), id);
        self.nodes.insert(id, Node::from_desc(id, desc));
        Ok(id)
    }

    /// Remove a node and every edge touching it
    pub fn remove_node(&mut self, id: NodeId) -> FusionResult<Node> {
        let (inputs, outputs) = {
            let node = self.node(id).ok_or_else(|| FusionError::NodeNotFound(id.to_string()))?;
            let inputs: Vec<(OutAnchor, InAnchor)> = node
                .inputs
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.peer.map(|p| (p, InAnchor::new(id, i))))
                .collect();
            let outputs: Vec<(OutAnchor, InAnchor)> = node
                .outputs
                .iter()
                .enumerate()
                .flat_map(|(i, s)| s.peers.iter().map(move |p| (OutAnchor::new(id, i), *p)))
                .collect();
            (inputs, outputs)
        };

        // a self-loop shows up on both sides
        for (from, to) in inputs.into_iter().chain(outputs) {
            if self.peer_out_anchor(to) == Some(from) {
                self.remove_edge(from, to)?;
            }
        }

        let node = self
            .nodes
            .shift_remove(&id)
            .ok_or_else(|| FusionError::NodeNotFound(id.to_string()))?;
        self.names.remove(&node.name);
        Ok(node)
    }

    /// Rename a node, keeping name lookup in sync
    pub fn rename_node(&mut self, id: NodeId, name: impl Into<String>) -> FusionResult<()> {
        let name = name.into();
        if let Some(&existing) = self.names.get(&name) {
            if existing == id {
                return Ok(());
            }
            return Err(FusionError::Graph(format!("node name [{}] already exists", name)));
        }

        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| FusionError::NodeNotFound(id.to_string()))?;
        let old = std::mem::replace(&mut node.name, name.clone());
        self.names.remove(&old);
        self.names.insert(name, id);
        Ok(())
    }

    // ========================================================================
    // Edge mutation
    // ========================================================================

    /// Connect an output anchor to an input anchor
    ///
    /// Anchors are created on demand. An input anchor accepts one producer.
    pub fn add_edge(&mut self, from: OutAnchor, to: InAnchor) -> FusionResult<()> {
        if !self.contains(from.node) {
            return Err(FusionError::NodeNotFound(from.node.to_string()));
        }

        {
            let dst = self
                .node_mut(to.node)
                .ok_or_else(|| FusionError::NodeNotFound(to.node.to_string()))?;
            if dst.inputs.len() <= to.index {
                dst.inputs.resize_with(to.index + 1, InputSlot::default);
            }
            if let Some(existing) = dst.inputs[to.index].peer {
                return Err(FusionError::Graph(format!(
                    "input {} of [{}] is already fed by {}:{}",
                    to.index, dst.name, existing.node, existing.index
                )));
            }
            dst.inputs[to.index].peer = Some(from);
        }

        if let Some(src) = self.node_mut(from.node) {
            if src.outputs.len() <= from.index {
                src.outputs.resize_with(from.index + 1, OutputSlot::default);
            }
            src.outputs[from.index].peers.push(to);
        }
        Ok(())
    }

    /// Connect `src:src_index` to `dst:dst_index`
    pub fn link(
        &mut self,
        src: NodeId,
        src_index: usize,
        dst: NodeId,
        dst_index: usize,
    ) -> FusionResult<()> {
        self.add_edge(OutAnchor::new(src, src_index), InAnchor::new(dst, dst_index))
    }

    /// Disconnect an existing edge
    pub fn remove_edge(&mut self, from: OutAnchor, to: InAnchor) -> FusionResult<()> {
        let connected = self.peer_out_anchor(to) == Some(from);
        if !connected {
            return Err(FusionError::Graph(format!(
                "no edge {}:{} -> {}:{}",
                from.node, from.index, to.node, to.index
            )));
        }

        if let Some(slot) = self
            .node_mut(to.node)
            .and_then(|n| n.inputs.get_mut(to.index))
        {
            slot.peer = None;
        }
        if let Some(slot) = self
            .node_mut(from.node)
            .and_then(|n| n.outputs.get_mut(from.index))
        {
            slot.peers.retain(|p| *p != to);
        }
        Ok(())
    }

    /// Redirect every consumer of `from` to `to`
    ///
    /// Returns the number of redirected edges.
    pub fn move_consumers(&mut self, from: OutAnchor, to: OutAnchor) -> FusionResult<usize> {
        if !self.contains(to.node) {
            return Err(FusionError::NodeNotFound(to.node.to_string()));
        }
        let consumers: Vec<InAnchor> = self.peer_in_anchors(from).to_vec();
        for consumer in &consumers {
            self.remove_edge(from, *consumer)?;
            self.add_edge(to, *consumer)?;
        }
        Ok(consumers.len())
    }
}
