//! Fusion pattern builder
//!
//! A [`FusionPattern`] is declared once with a fluent chain and then reused
//! for every graph the owning pass runs on:
//!
//! ```
//! use graph_fusion::pattern::{BranchKind, FusionPattern};
//!
//! let mut pattern = FusionPattern::new("ConvRelu")
//!     .add_descriptor("conv", &["Conv"], 1, 1)
//!     .add_descriptor("relu", &["Relu"], 1, 1)
//!     .set_outputs("conv", &["relu"], BranchKind::Serial)
//!     .set_head(&["conv"]);
//!
//! assert!(pattern.build().is_ok());
//! assert_eq!(pattern.output().unwrap().name(), "relu");
//! ```
//!
//! Malformed declarations never break the chain. Each one is logged and
//! recorded; `build()` rejects a pattern with any recorded error.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::{FusionError, FusionResult, PatternError};

use super::descriptor::{BranchKind, DescId, Descriptor};

/// Default upper bound on the number of nodes one pattern may fuse
pub const DEFAULT_OP_MAX_COUNT: i64 = 5;

/// Declarative description of a subgraph shape
#[derive(Debug, Clone)]
pub struct FusionPattern {
    name: String,
    op_max_count: i64,
    descs: Vec<Descriptor>,
    by_name: FxHashMap<String, DescId>,
    head: Vec<DescId>,
    explicit_output: Option<DescId>,
    output: Option<DescId>,
    error_count: i64,
    errors: Vec<PatternError>,
    built: bool,
}

impl FusionPattern {
    /// Create an empty pattern
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_max_count(name, DEFAULT_OP_MAX_COUNT)
    }

    /// Create an empty pattern with a declared maximum node count
    pub fn with_max_count(name: impl Into<String>, op_max_count: i64) -> Self {
        Self {
            name: name.into(),
            op_max_count,
            descs: Vec::new(),
            by_name: FxHashMap::default(),
            head: Vec::new(),
            explicit_output: None,
            output: None,
            error_count: 0,
            errors: Vec::new(),
            built: false,
        }
    }

    /// Record a declaration error
    ///
    /// Once the counter is saturated further errors are logged but no
    /// longer accumulated. Every caller returns right after recording.
    fn record_error(&mut self, error: PatternError) {
        warn!(pattern = %self.name, %error, "invalid pattern declaration");
        match self.error_count.checked_add(1) {
            Some(count) => {
                self.error_count = count;
                self.errors.push(error);
            }
            None => warn!(pattern = %self.name, "error counter overflow"),
        }
    }

    // ========================================================================
    // Declaration
    // ========================================================================

    /// Add a descriptor in group 0
    ///
    /// # Arguments
    /// * `name` - Unique descriptor name
    /// * `types` - Accepted op types, empty for any
    /// * `repeat_min` - Fewest occurrences accepted
    /// * `repeat_max` - Most occurrences accepted
    pub fn add_descriptor(self, name: &str, types: &[&str], repeat_min: i64, repeat_max: i64) -> Self {
        self.add_descriptor_in_group(name, types, repeat_min, repeat_max, 0)
    }

    /// Add a descriptor with an explicit group id
    pub fn add_descriptor_in_group(
        mut self,
        name: &str,
        types: &[&str],
        repeat_min: i64,
        repeat_max: i64,
        group_id: i64,
    ) -> Self {
        if name.is_empty() {
            self.record_error(PatternError::EmptyName);
            return self;
        }
        if repeat_min < 0 || repeat_min > repeat_max {
            self.record_error(PatternError::InvalidRepeat {
                name: name.to_string(),
                min: repeat_min,
                max: repeat_max,
            });
            return self;
        }
        if self.by_name.contains_key(name) {
            self.record_error(PatternError::Duplicate(name.to_string()));
            return self;
        }

        let id = DescId(self.descs.len());
        self.descs
            .push(Descriptor::new(id, name, types, repeat_min, repeat_max, group_id));
        self.by_name.insert(name.to_string(), id);
        self.built = false;
        self
    }

    /// Link `name` to each of `output_ids`, counting both node counts
    pub fn set_outputs(self, name: &str, output_ids: &[&str], branch: BranchKind) -> Self {
        self.set_outputs_with(name, output_ids, branch, false, false)
    }

    /// Link `name` to each of `output_ids`
    ///
    /// Self-links and already linked targets are skipped. The branch kind is recorded the first time a
    /// non-default kind is given; a later call with a different kind is
    /// rejected. Every id and the branch kind are validated before the
    /// pattern is touched, so a rejected call adds no edges.
    pub fn set_outputs_with(
        mut self,
        name: &str,
        output_ids: &[&str],
        branch: BranchKind,
        ignore_input_count: bool,
        ignore_output_count: bool,
    ) -> Self {
        if name.is_empty() {
            self.record_error(PatternError::EmptyName);
            return self;
        }
        let Some(id) = self.descriptor_id(name) else {
            self.record_error(PatternError::UnknownDescriptor(name.to_string()));
            return self;
        };

        let mut targets = Vec::with_capacity(output_ids.len());
        for output_id in output_ids {
            match self.descriptor_id(output_id) {
                Some(target) => targets.push(target),
                None => {
                    self.record_error(PatternError::UnknownDescriptor(output_id.to_string()));
                    return self;
                }
            }
        }

        let current = self.descs[id.0].branch;
        if current != BranchKind::Default && current != branch {
            self.record_error(PatternError::BranchKindMismatch {
                name: name.to_string(),
                current,
                requested: branch,
            });
            return self;
        }

        {
            let desc = &mut self.descs[id.0];
            desc.ignore_input_count = ignore_input_count;
            desc.ignore_output_count = ignore_output_count;
            if desc.branch == BranchKind::Default {
                desc.branch = branch;
            }
        }

        for target in targets {
            if target == id || self.descs[id.0].outputs.contains(&target) {
                continue;
            }
            self.descs[id.0].outputs.push(target);
            self.descs[target.0].inputs.push(id);
        }

        self.update_skip_status(id);
        self.built = false;
        self
    }

    /// Open skip ranges of same-typed predecessors on a multi-output branch
    fn update_skip_status(&mut self, id: DescId) {
        if self.descs[id.0].branch != BranchKind::Multi {
            return;
        }

        let types = self.descs[id.0].types.clone();
        let inputs = self.descs[id.0].inputs.clone();
        for input in inputs {
            let pred = &mut self.descs[input.0];
            if pred.types != types || !pred.ignore_output_count {
                continue;
            }
            if pred.has_skip_range() {
                pred.skip_available = true;
            }
        }
    }

    /// Declare the entry descriptors of the pattern
    ///
    /// A head cannot repeat, and at most one head may be mandatory. Every id
    /// is validated first; a rejected call leaves the head list untouched.
    pub fn set_head(mut self, head_ids: &[&str]) -> Self {
        if head_ids.is_empty() {
            self.record_error(PatternError::EmptyHead);
            return self;
        }

        let mut ids = Vec::with_capacity(head_ids.len());
        for head_id in head_ids {
            let Some(id) = self.descriptor_id(head_id) else {
                self.record_error(PatternError::UnknownDescriptor(head_id.to_string()));
                return self;
            };
            let max = self.descs[id.0].repeat_max;
            if max > 1 {
                self.record_error(PatternError::HeadRepeatTooLarge {
                    name: head_id.to_string(),
                    max,
                });
                return self;
            }
            ids.push(id);
        }

        let mut total_min: i64 = 0;
        for id in self.head.iter().chain(&ids) {
            match total_min.checked_add(self.descs[id.0].repeat_min) {
                Some(sum) => total_min = sum,
                None => {
                    self.record_error(PatternError::Overflow("summing head repeat_min"));
                    return self;
                }
            }
        }

        if total_min > 1 {
            self.record_error(PatternError::HeadRepeatMinExceeded(total_min));
            return self;
        }
        self.head.extend(ids);
        self
    }

    /// Designate the sink descriptor explicitly
    pub fn set_output(mut self, name: &str) -> Self {
        match self.descriptor_id(name) {
            Some(id) => {
                self.explicit_output = Some(id);
                self.built = false;
            }
            None => {
                self.record_error(PatternError::UnknownDescriptor(name.to_string()));
            }
        }
        self
    }

    // ========================================================================
    // Frontier
    // ========================================================================

    /// Matching frontier from a descriptor
    ///
    /// Contains the descriptor itself while it has repeat budget left and
    /// `include_self` is set, then every successor. Successors with
    /// `repeat_min == 0` are see-through: their own successors follow them.
    pub fn get_outputs(&self, id: DescId, include_self: bool) -> Vec<DescId> {
        let mut frontier = Vec::new();
        self.collect_outputs(id, include_self, &mut frontier);
        frontier
    }

    fn collect_outputs(&self, id: DescId, include_self: bool, frontier: &mut Vec<DescId>) {
        let Some(desc) = self.descs.get(id.0) else {
            return;
        };

        if include_self && desc.repeat_current < desc.repeat_max {
            frontier.push(id);
        }

        for &next in &desc.outputs {
            frontier.push(next);
            if self.descs[next.0].repeat_min == 0 {
                self.collect_outputs(next, false, frontier);
            }
        }
    }

    /// Consume one repeat of a descriptor; false once the budget is spent
    pub fn advance_repeat(&mut self, id: DescId) -> bool {
        match self.descs.get_mut(id.0) {
            Some(desc) if desc.repeat_current < desc.repeat_max => {
                desc.repeat_current += 1;
                true
            }
            _ => false,
        }
    }

    /// Reset every live repeat counter to zero
    pub fn reset_repeat_counters(&mut self) {
        for desc in &mut self.descs {
            desc.repeat_current = 0;
        }
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Validate the declaration and resolve the output descriptor
    ///
    /// Fails if any declaration error was recorded, the pattern is empty,
    /// the descriptor graph has a cycle, or there is not exactly one sink.
    pub fn build(&mut self) -> FusionResult<()> {
        if self.error_count > 0 {
            let reason = self
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(self.invalid(format!("{} declaration error(s): {}", self.error_count, reason)));
        }
        if self.descs.is_empty() {
            return Err(self.invalid("no descriptors".to_string()));
        }
        if self.has_cycle() {
            return Err(self.invalid("descriptor graph has a cycle".to_string()));
        }

        let output = match self.explicit_output {
            Some(id) if self.descs[id.0].outputs.is_empty() => id,
            Some(id) => {
                return Err(self.invalid(format!(
                    "output descriptor [{}] has successors",
                    self.descs[id.0].name
                )))
            }
            None => {
                let sinks: Vec<DescId> = self
                    .descs
                    .iter()
                    .filter(|d| d.outputs.is_empty())
                    .map(|d| d.id)
                    .collect();
                match sinks.as_slice() {
                    [single] => *single,
                    _ => {
                        return Err(self.invalid(format!(
                            "expected exactly one output descriptor, found {}",
                            sinks.len()
                        )))
                    }
                }
            }
        };

        self.output = Some(output);
        self.built = true;
        Ok(())
    }

    fn invalid(&self, reason: String) -> FusionError {
        FusionError::InvalidPattern {
            pattern: self.name.clone(),
            reason,
        }
    }

    /// Kahn's algorithm over successor edges
    fn has_cycle(&self) -> bool {
        let mut in_degree: Vec<usize> = self.descs.iter().map(|d| d.inputs.len()).collect();
        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut visited = 0;
        while let Some(i) = queue.pop_front() {
            visited += 1;
            for next in &self.descs[i].outputs {
                in_degree[next.0] -= 1;
                if in_degree[next.0] == 0 {
                    queue.push_back(next.0);
                }
            }
        }
        visited != self.descs.len()
    }

    /// Log the pattern at debug level
    pub fn dump(&self) {
        debug!(
            pattern = %self.name,
            built = self.built,
            descriptors = self.descs.len(),
            "pattern dump"
        );
        for desc in &self.descs {
            let inputs: Vec<&str> = desc.inputs.iter().map(|i| self.descs[i.0].name()).collect();
            debug!(pattern = %self.name, descriptor = %desc, ?inputs, "  descriptor");
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Pattern name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared maximum node count
    pub fn op_max_count(&self) -> i64 {
        self.op_max_count
    }

    /// Number of declaration errors recorded
    pub fn error_count(&self) -> i64 {
        self.error_count
    }

    /// Declaration errors recorded so far
    pub fn errors(&self) -> &[PatternError] {
        &self.errors
    }

    /// Whether `build()` succeeded since the last modification
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Look up a descriptor id by name
    pub fn descriptor_id(&self, name: &str) -> Option<DescId> {
        self.by_name.get(name).copied()
    }

    /// Look up a descriptor by name
    pub fn descriptor(&self, name: &str) -> Option<&Descriptor> {
        self.descriptor_id(name).map(|id| &self.descs[id.0])
    }

    /// Look up a descriptor by id
    pub fn get(&self, id: DescId) -> Option<&Descriptor> {
        self.descs.get(id.0)
    }

    /// All descriptors in declaration order
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descs
    }

    /// Head descriptors in declaration order
    pub fn head(&self) -> &[DescId] {
        &self.head
    }

    /// Output (sink) descriptor; available after a successful build
    pub fn output(&self) -> Option<&Descriptor> {
        self.output.and_then(|id| self.descs.get(id.0))
    }
}
