//! Parser configuration (§6 "Configuration options").
//!
//! Mirrors the teacher's `ParserBuilder`/`ReaderBuilder` chainable-builder
//! pattern (`reader/builder.rs`), but the options here are the ones this
//! specification names rather than `quick-xml`'s trim/expand-empty-elements
//! knobs.

/// Immutable snapshot of parser options, applied before parsing starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    pub namespaces_enabled: bool,
    pub namespace_prefixes_enabled: bool,
    pub validation_enabled: bool,
    pub external_general_entities_enabled: bool,
    pub external_parameter_entities_enabled: bool,
    pub resolve_dtd_uris_enabled: bool,
    pub string_interning: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            namespaces_enabled: true,
            namespace_prefixes_enabled: false,
            validation_enabled: false,
            external_general_entities_enabled: true,
            external_parameter_entities_enabled: true,
            resolve_dtd_uris_enabled: true,
            string_interning: true,
        }
    }
}

impl ParserConfig {
    pub fn builder() -> ParserConfigBuilder {
        ParserConfigBuilder::new()
    }
}

/// Builder for [`ParserConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ParserConfigBuilder {
    config: ParserConfig,
}

impl ParserConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ParserConfig::default(),
        }
    }

    pub fn namespaces(mut self, enabled: bool) -> Self {
        self.config.namespaces_enabled = enabled;
        self
    }

    pub fn namespace_prefixes(mut self, enabled: bool) -> Self {
        self.config.namespace_prefixes_enabled = enabled;
        self
    }

    pub fn validation(mut self, enabled: bool) -> Self {
        self.config.validation_enabled = enabled;
        self
    }

    pub fn external_general_entities(mut self, enabled: bool) -> Self {
        self.config.external_general_entities_enabled = enabled;
        self
    }

    pub fn external_parameter_entities(mut self, enabled: bool) -> Self {
        self.config.external_parameter_entities_enabled = enabled;
        self
    }

    pub fn resolve_dtd_uris(mut self, enabled: bool) -> Self {
        self.config.resolve_dtd_uris_enabled = enabled;
        self
    }

    pub fn string_interning(mut self, enabled: bool) -> Self {
        self.config.string_interning = enabled;
        self
    }

    pub fn build(self) -> ParserConfig {
        self.config
    }
}

impl Default for ParserConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = ParserConfig::default();
        assert!(cfg.namespaces_enabled);
        assert!(!cfg.namespace_prefixes_enabled);
        assert!(!cfg.validation_enabled);
        assert!(cfg.external_general_entities_enabled);
        assert!(cfg.external_parameter_entities_enabled);
        assert!(cfg.resolve_dtd_uris_enabled);
        assert!(cfg.string_interning);
    }

    #[test]
    fn builder_overrides_individual_options() {
        let cfg = ParserConfig::builder()
            .validation(true)
            .namespace_prefixes(true)
            .build();
        assert!(cfg.validation_enabled);
        assert!(cfg.namespace_prefixes_enabled);
        assert!(cfg.namespaces_enabled);
    }
}
