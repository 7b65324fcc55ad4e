//! Pass configuration

/// Which statistics table a pass reports into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassKind {
    /// Whole-graph fusion pass
    #[default]
    Graph,
    /// Localized buffer fusion pass
    Buffer,
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct PassConfig {
    /// Statistics table to report into
    pub kind: PassKind,
    /// Propagate stream labels and data-dump provenance onto fused nodes
    pub record_provenance: bool,
    /// Log every mapping before rewriting
    pub dump_mappings: bool,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            kind: PassKind::Graph,
            record_provenance: true,
            dump_mappings: false,
        }
    }
}

impl PassConfig {
    /// Plain graph fusion: no provenance bookkeeping
    pub fn plain() -> Self {
        Self {
            record_provenance: false,
            ..Self::default()
        }
    }

    /// Set the statistics table
    pub fn with_kind(mut self, kind: PassKind) -> Self {
        self.kind = kind;
        self
    }

    /// Enable or disable provenance propagation
    pub fn with_provenance(mut self, enabled: bool) -> Self {
        self.record_provenance = enabled;
        self
    }

    /// Enable or disable mapping dumps
    pub fn with_dump_mappings(mut self, enabled: bool) -> Self {
        self.dump_mappings = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PassConfig::default();
        assert_eq!(config.kind, PassKind::Graph);
        assert!(config.record_provenance);
        assert!(!config.dump_mappings);
        assert!(!PassConfig::plain().record_provenance);
    }

    #[test]
    fn test_builder_methods() {
        let config = PassConfig::default()
            .with_kind(PassKind::Buffer)
            .with_provenance(false)
            .with_dump_mappings(true);
        assert_eq!(config.kind, PassKind::Buffer);
        assert!(!config.record_provenance);
        assert!(config.dump_mappings);
    }
}
