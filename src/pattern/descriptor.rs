//! Node-shape descriptors
//!
//! A [`Descriptor`] declares which operator types one pattern position
//! accepts, how often it may repeat and how it connects to its neighbours.
//! Descriptors live in the arena of their [`FusionPattern`](super::FusionPattern)
//! and refer to each other by [`DescId`].

use std::fmt;

/// Index of a descriptor inside its pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescId(pub(crate) usize);

impl DescId {
    /// Raw arena index
    pub fn index(self) -> usize {
        self.0
    }
}

/// How a descriptor's outputs relate to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchKind {
    /// Not declared yet
    #[default]
    Default,
    /// Outputs form a single chain
    Serial,
    /// Outputs fan out to several branches
    Multi,
}

/// Whether a repeat index may be skipped on a multi-output branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipStatus {
    /// Index must be matched
    Disabled,
    /// Index may be skipped
    Available,
}

/// One node-shape declaration within a pattern
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub(crate) id: DescId,
    pub(crate) name: String,
    pub(crate) types: Vec<String>,
    pub(crate) repeat_min: i64,
    pub(crate) repeat_max: i64,
    pub(crate) repeat_current: i64,
    pub(crate) group_id: i64,
    pub(crate) branch: BranchKind,
    pub(crate) ignore_input_count: bool,
    pub(crate) ignore_output_count: bool,
    /// Every index in `[repeat_min, repeat_max)` may be skipped
    pub(crate) skip_available: bool,
    pub(crate) inputs: Vec<DescId>,
    pub(crate) outputs: Vec<DescId>,
}

impl Descriptor {
    pub(crate) fn new(
        id: DescId,
        name: &str,
        types: &[&str],
        repeat_min: i64,
        repeat_max: i64,
        group_id: i64,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
            repeat_min,
            repeat_max,
            repeat_current: 0,
            group_id,
            branch: BranchKind::Default,
            ignore_input_count: false,
            ignore_output_count: false,
            skip_available: false,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Arena index
    pub fn id(&self) -> DescId {
        self.id
    }

    /// Descriptor name, unique within the pattern
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accepted op types; empty means any type
    pub fn types(&self) -> &[String] {
        &self.types
    }

    /// Minimum number of occurrences
    pub fn repeat_min(&self) -> i64 {
        self.repeat_min
    }

    /// Maximum number of occurrences
    pub fn repeat_max(&self) -> i64 {
        self.repeat_max
    }

    /// Occurrences consumed so far by the current frontier walk
    pub fn repeat_current(&self) -> i64 {
        self.repeat_current
    }

    /// Group id
    pub fn group_id(&self) -> i64 {
        self.group_id
    }

    /// Output branch kind
    pub fn branch(&self) -> BranchKind {
        self.branch
    }

    /// Whether input count is ignored when matching
    pub fn ignore_input_count(&self) -> bool {
        self.ignore_input_count
    }

    /// Whether output count is ignored when matching
    pub fn ignore_output_count(&self) -> bool {
        self.ignore_output_count
    }

    /// Skip status of a repeat index, for indices in `[repeat_min, repeat_max)`
    pub fn skip_status(&self, index: i64) -> Option<SkipStatus> {
        if !self.has_skip_range() || index < self.repeat_min || index >= self.repeat_max {
            return None;
        }
        Some(if self.skip_available {
            SkipStatus::Available
        } else {
            SkipStatus::Disabled
        })
    }

    /// Whether the descriptor has any repeat index past its minimum
    pub fn has_skip_range(&self) -> bool {
        self.repeat_max > self.repeat_min
    }

    /// Predecessor descriptors in declaration order
    pub fn inputs(&self) -> &[DescId] {
        &self.inputs
    }

    /// Successor descriptors in declaration order
    pub fn outputs(&self) -> &[DescId] {
        &self.outputs
    }

    /// One descriptor may bind several input edges of the same node
    pub fn is_repeatable(&self) -> bool {
        self.repeat_max > 1
    }

    /// Zero occurrences are acceptable
    pub fn is_optional(&self) -> bool {
        self.repeat_min == 0
    }

    /// Check if a node of `op_type` fits this descriptor
    pub fn accepts(&self, op_type: &str) -> bool {
        self.types.is_empty() || self.types.iter().any(|t| t == op_type)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:?} repeat[{}..={}]",
            self.name, self.types, self.repeat_min, self.repeat_max
        )
    }
}
