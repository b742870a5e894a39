//! Traversal parameters for call analysis
//!
//! `AnalysisConfig` is immutable once built; use [`AnalysisConfig::builder`]
//! for fluent construction.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_DEPTH: usize = 5;
pub const DEFAULT_MAX_NODES: usize = 1000;

/// Packages skipped unless a caller overrides the list.
pub const DEFAULT_EXCLUDED_PACKAGES: &[&str] = &[
    "java.",
    "javax.",
    "kotlin.",
    "kotlinx.",
    "org.springframework.boot.",
    "org.springframework.context.annotation.",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub max_depth: usize,
    pub resolve_implementations: bool,
    pub track_events: bool,
    pub include_external_calls: bool,
    /// Prefixes; empty means every package.
    pub include_packages: Vec<String>,
    /// Prefixes; take precedence over `include_packages`.
    pub exclude_packages: Vec<String>,
    /// Ceiling on distinct method ids in one result.
    pub max_nodes: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            resolve_implementations: true,
            track_events: true,
            include_external_calls: false,
            include_packages: Vec::new(),
            exclude_packages: DEFAULT_EXCLUDED_PACKAGES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            max_nodes: DEFAULT_MAX_NODES,
        }
    }
}

impl AnalysisConfig {
    /// Create a builder for fluent configuration
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::new()
    }

    /// Whether a qualified name survives the package filters.
    pub fn allows(&self, qualified_name: &str) -> bool {
        if self
            .exclude_packages
            .iter()
            .any(|prefix| qualified_name.starts_with(prefix.as_str()))
        {
            return false;
        }
        self.include_packages.is_empty()
            || self
                .include_packages
                .iter()
                .any(|prefix| qualified_name.starts_with(prefix.as_str()))
    }
}

/// Builder for AnalysisConfig with fluent API
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl Default for AnalysisConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AnalysisConfig::default(),
        }
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    pub fn resolve_implementations(mut self, enabled: bool) -> Self {
        self.config.resolve_implementations = enabled;
        self
    }

    pub fn track_events(mut self, enabled: bool) -> Self {
        self.config.track_events = enabled;
        self
    }

    pub fn include_external_calls(mut self, enabled: bool) -> Self {
        self.config.include_external_calls = enabled;
        self
    }

    pub fn include_package(mut self, prefix: impl Into<String>) -> Self {
        self.config.include_packages.push(prefix.into());
        self
    }

    pub fn exclude_package(mut self, prefix: impl Into<String>) -> Self {
        self.config.exclude_packages.push(prefix.into());
        self
    }

    pub fn include_packages(mut self, prefixes: Vec<String>) -> Self {
        self.config.include_packages = prefixes;
        self
    }

    pub fn exclude_packages(mut self, prefixes: Vec<String>) -> Self {
        self.config.exclude_packages = prefixes;
        self
    }

    pub fn max_nodes(mut self, max_nodes: usize) -> Self {
        self.config.max_nodes = max_nodes;
        self
    }

    pub fn build(self) -> AnalysisConfig {
        self.config
    }
}
