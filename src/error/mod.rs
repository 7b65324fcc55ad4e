//! Error types for graph-fusion
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Main error type for pattern construction, graph surgery and fusion passes
#[derive(Error, Debug)]
pub enum FusionError {
    /// Pattern declaration was rejected by `build()`
    #[error("Invalid pattern [{pattern}]: {reason}")]
    InvalidPattern {
        /// Pattern name
        pattern: String,
        /// Why the pattern cannot be used
        reason: String,
    },

    /// A pass defined at least one pattern that failed to build
    #[error("Patterns of pass [{0}] are invalid")]
    PatternsInvalid(String),

    /// Graph model misuse (unknown node, occupied anchor, duplicate name)
    #[error("Graph error: {0}")]
    Graph(String),

    /// Node id does not exist in the graph
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Rewrite callback failed
    #[error("Fusion of pattern [{pattern}] in pass [{pass}] failed: {reason}")]
    FusionFailed {
        /// Pass name
        pass: String,
        /// Pattern name
        pattern: String,
        /// Failure reason reported by the pass
        reason: String,
    },

    /// Stream label could not be recorded on a fused node
    #[error("Failed to set stream label on fused node: {0}")]
    StreamLabel(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for fusion operations
pub type FusionResult<T> = Result<T, FusionError>;

/// A single malformed pattern declaration
///
/// These never abort the fluent builder chain; they are recorded on the
/// pattern and reported together by `FusionPattern::build`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// Descriptor name was empty
    #[error("descriptor name cannot be empty")]
    EmptyName,

    /// Negative `repeat_min`, or `repeat_min > repeat_max`
    #[error("invalid repeat range [{min}, {max}] for descriptor [{name}]")]
    InvalidRepeat {
        /// Descriptor name
        name: String,
        /// Declared minimum
        min: i64,
        /// Declared maximum
        max: i64,
    },

    /// Descriptor declared twice
    #[error("descriptor [{0}] already exists")]
    Duplicate(String),

    /// Reference to a descriptor that was never added
    #[error("descriptor [{0}] does not exist")]
    UnknownDescriptor(String),

    /// `set_outputs` called with a different branch kind than recorded
    #[error("descriptor [{name}] already has branch kind {current:?}, got {requested:?}")]
    BranchKindMismatch {
        /// Descriptor name
        name: String,
        /// Kind recorded by an earlier call
        current: crate::pattern::BranchKind,
        /// Kind requested by the rejected call
        requested: crate::pattern::BranchKind,
    },

    /// `set_head` called with no ids
    #[error("head list cannot be empty")]
    EmptyHead,

    /// A head descriptor may match more than one node
    #[error("head descriptor [{name}] has repeat_max {max}, cannot exceed 1")]
    HeadRepeatTooLarge {
        /// Descriptor name
        name: String,
        /// Declared maximum
        max: i64,
    },

    /// Sum of the heads' `repeat_min` exceeds 1
    #[error("sum of head repeat_min is {0}, cannot exceed 1")]
    HeadRepeatMinExceeded(i64),

    /// Checked arithmetic overflowed while validating
    #[error("arithmetic overflow while {0}")]
    Overflow(&'static str),
}
