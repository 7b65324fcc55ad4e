//! Fusion statistics
//!
//! A shared ledger of how often each pass matched and how often it actually
//! rewrote the graph. Counts accumulate per `"{session}_{graph}"` key until
//! [`FusionStatisticRecorder::get_and_clear_fusion_info`] drains them.
//!
//! Whole-graph passes and buffer (localized) passes are kept in separate
//! tables.
//!
//! # Example
//!
//! ```
//! use graph_fusion::statistics::{FusionInfo, FusionStatisticRecorder};
//!
//! let recorder = FusionStatisticRecorder::new();
//! let info = FusionInfo::new(1, "g", "ConvRelu").with_match_times(3).with_effect_times(2);
//! recorder.update_graph_fusion(&info);
//!
//! let drained = recorder.get_and_clear_fusion_info("1_g");
//! assert_eq!(drained.graph_fusion["ConvRelu"].match_times(), 3);
//! assert!(recorder.get_and_clear_fusion_info("1_g").is_empty());
//! ```

use std::cell::RefCell;

use indexmap::IndexMap;
use parking_lot::ReentrantMutex;
use rustc_hash::FxHashMap;
use tracing::debug;

/// Match and effect counts of one pass on one graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FusionInfo {
    session_id: u64,
    graph_id: String,
    pass_name: String,
    match_times: u32,
    effect_times: u32,
}

impl FusionInfo {
    /// Create a zeroed record
    pub fn new(session_id: u64, graph_id: impl Into<String>, pass_name: impl Into<String>) -> Self {
        Self {
            session_id,
            graph_id: graph_id.into(),
            pass_name: pass_name.into(),
            match_times: 0,
            effect_times: 0,
        }
    }

    /// Set the match count
    pub fn with_match_times(mut self, times: u32) -> Self {
        self.match_times = times;
        self
    }

    /// Set the effect count
    pub fn with_effect_times(mut self, times: u32) -> Self {
        self.effect_times = times;
        self
    }

    /// Table key: `"{session}_{graph}"`
    pub fn key(&self) -> String {
        key(self.session_id, &self.graph_id)
    }

    /// Session id
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Graph id
    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    /// Pass name
    pub fn pass_name(&self) -> &str {
        &self.pass_name
    }

    /// Number of matches
    pub fn match_times(&self) -> u32 {
        self.match_times
    }

    /// Number of applied rewrites
    pub fn effect_times(&self) -> u32 {
        self.effect_times
    }

    /// Whether both counts are zero
    pub fn is_empty(&self) -> bool {
        self.match_times == 0 && self.effect_times == 0
    }
}

/// Build the table key for a session and graph
pub fn key(session_id: u64, graph_id: &str) -> String {
    format!("{}_{}", session_id, graph_id)
}

/// Per-pass records of one key
pub type PassInfoMap = IndexMap<String, FusionInfo>;

/// Both tables' entries for one key, as returned by a drain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainedFusionInfo {
    /// Whole-graph pass records
    pub graph_fusion: PassInfoMap,
    /// Buffer pass records
    pub buffer_fusion: PassInfoMap,
}

impl DrainedFusionInfo {
    /// Whether neither table had an entry
    pub fn is_empty(&self) -> bool {
        self.graph_fusion.is_empty() && self.buffer_fusion.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Table {
    Graph,
    Buffer,
}

#[derive(Debug, Clone, Copy)]
enum Counter {
    Match,
    Effect,
}

#[derive(Debug, Default)]
struct Tables {
    graph_fusion: FxHashMap<String, PassInfoMap>,
    buffer_fusion: FxHashMap<String, PassInfoMap>,
}

impl Tables {
    fn table_mut(&mut self, table: Table) -> &mut FxHashMap<String, PassInfoMap> {
        match table {
            Table::Graph => &mut self.graph_fusion,
            Table::Buffer => &mut self.buffer_fusion,
        }
    }
}

/// Shared match/effect ledger
///
/// Every operation takes the same re-entrant lock, so a drain is atomic with
/// respect to concurrent updates. Share it between passes through an `Arc`.
#[derive(Debug, Default)]
pub struct FusionStatisticRecorder {
    tables: ReentrantMutex<RefCell<Tables>>,
}

impl FusionStatisticRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self, table: Table, counter: Counter, info: &FusionInfo) {
        let delta = match counter {
            Counter::Match => info.match_times,
            Counter::Effect => info.effect_times,
        };
        if delta == 0 {
            return;
        }

        let guard = self.tables.lock();
        let mut tables = guard.borrow_mut();
        let entry = tables
            .table_mut(table)
            .entry(info.key())
            .or_default()
            .entry(info.pass_name.clone())
            .or_insert_with(|| FusionInfo::new(info.session_id, info.graph_id.clone(), info.pass_name.clone()));

        match counter {
            Counter::Match => entry.match_times = entry.match_times.saturating_add(delta),
            Counter::Effect => entry.effect_times = entry.effect_times.saturating_add(delta),
        }
        debug!(
            key = %info.key(),
            pass = %info.pass_name,
            table = ?table,
            counter = ?counter,
            delta,
            "fusion statistics updated"
        );
    }

    /// Add the match count of a whole-graph pass
    pub fn update_graph_fusion_match_times(&self, info: &FusionInfo) {
        self.add(Table::Graph, Counter::Match, info);
    }

    /// Add the effect count of a whole-graph pass
    pub fn update_graph_fusion_effect_times(&self, info: &FusionInfo) {
        self.add(Table::Graph, Counter::Effect, info);
    }

    /// Add the match count of a buffer pass
    pub fn update_buffer_fusion_match_times(&self, info: &FusionInfo) {
        self.add(Table::Buffer, Counter::Match, info);
    }

    /// Add the effect count of a buffer pass
    pub fn update_buffer_fusion_effect_times(&self, info: &FusionInfo) {
        self.add(Table::Buffer, Counter::Effect, info);
    }

    /// Add both counts of a whole-graph pass as one atomic update
    pub fn update_graph_fusion(&self, info: &FusionInfo) {
        let _guard = self.tables.lock();
        self.update_graph_fusion_match_times(info);
        self.update_graph_fusion_effect_times(info);
    }

    /// Add both counts of a buffer pass as one atomic update
    pub fn update_buffer_fusion(&self, info: &FusionInfo) {
        let _guard = self.tables.lock();
        self.update_buffer_fusion_match_times(info);
        self.update_buffer_fusion_effect_times(info);
    }

    /// Read both tables' entries for `key` and erase them
    pub fn get_and_clear_fusion_info(&self, key: &str) -> DrainedFusionInfo {
        let guard = self.tables.lock();
        let mut tables = guard.borrow_mut();
        DrainedFusionInfo {
            graph_fusion: tables.graph_fusion.remove(key).unwrap_or_default(),
            buffer_fusion: tables.buffer_fusion.remove(key).unwrap_or_default(),
        }
    }
}
