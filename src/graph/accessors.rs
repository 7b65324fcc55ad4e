//! Typed attribute accessors
//!
//! Nodes, op descs and output anchors all carry an [`AttrMap`]. The
//! [`AttrHolder`] trait gives them the same typed get/set helpers.

use super::maps::AttrMap;
use super::node::{AttrValue, Node, OpDesc, OutputSlot};

/// Stream affinity label; all nodes fused together must agree on it
pub const STREAM_LABEL: &str = "_stream_label";
/// Set on every node of a fusion that produced more than one node
pub const ATTR_DATA_DUMP_IS_MULTIOP: &str = "_datadump_is_multiop";
/// Names of the nodes a fused node was built from
pub const ATTR_DATA_DUMP_ORIGINAL_OP_NAMES: &str = "_datadump_original_op_names";
/// Output-anchor attr: name of the node that originally produced this output
pub const ATTR_DATA_DUMP_ORIGIN_NAME: &str = "_datadump_origin_name";
/// Output-anchor attr: output index on the original producer
pub const ATTR_DATA_DUMP_ORIGIN_OUTPUT_INDEX: &str = "_datadump_origin_output_index";

/// Anything that owns an attribute map
pub trait AttrHolder {
    /// Attribute map
    fn attrs(&self) -> &AttrMap;

    /// Mutable attribute map
    fn attrs_mut(&mut self) -> &mut AttrMap;

    /// Get attribute value as string
    fn get_str(&self, key: &str) -> Option<&str> {
        match self.attrs().get(key) {
            Some(AttrValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get attribute value as bool
    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.attrs().get(key) {
            Some(AttrValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Get attribute value as i64
    fn get_int(&self, key: &str) -> Option<i64> {
        match self.attrs().get(key) {
            Some(AttrValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Get attribute value as string list
    fn get_strings(&self, key: &str) -> Option<&[String]> {
        match self.attrs().get(key) {
            Some(AttrValue::Strings(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Set or update a string attribute
    fn set_str(&mut self, key: &str, value: impl Into<String>) {
        self.attrs_mut()
            .insert(key.to_string(), AttrValue::Str(value.into()));
    }

    /// Set or update a bool attribute
    fn set_bool(&mut self, key: &str, value: bool) {
        self.attrs_mut().insert(key.to_string(), AttrValue::Bool(value));
    }

    /// Set or update an int attribute
    fn set_int(&mut self, key: &str, value: i64) {
        self.attrs_mut().insert(key.to_string(), AttrValue::Int(value));
    }

    /// Set or update a string-list attribute
    fn set_strings(&mut self, key: &str, values: Vec<String>) {
        self.attrs_mut()
            .insert(key.to_string(), AttrValue::Strings(values));
    }

    /// Check if attribute is present
    fn has_attr(&self, key: &str) -> bool {
        self.attrs().contains_key(key)
    }

    /// Remove an attribute by key
    fn remove_attr(&mut self, key: &str) -> Option<AttrValue> {
        self.attrs_mut().shift_remove(key)
    }
}

impl AttrHolder for Node {
    fn attrs(&self) -> &AttrMap {
        &self.attrs
    }

    fn attrs_mut(&mut self) -> &mut AttrMap {
        &mut self.attrs
    }
}

impl AttrHolder for OpDesc {
    fn attrs(&self) -> &AttrMap {
        &self.attrs
    }

    fn attrs_mut(&mut self) -> &mut AttrMap {
        &mut self.attrs
    }
}

impl AttrHolder for OutputSlot {
    fn attrs(&self) -> &AttrMap {
        &self.attrs
    }

    fn attrs_mut(&mut self) -> &mut AttrMap {
        &mut self.attrs
    }
}
