//! User settings file (YAML or JSON).

use crate::analyzer::config::{AnalysisConfig, DEFAULT_MAX_DEPTH, DEFAULT_MAX_NODES};
use crate::export::TreeOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_depth: usize,
    pub max_nodes: usize,
    pub resolve_implementations: bool,
    #[serde(alias = "track_spring_events")]
    pub track_events: bool,
    pub include_external_calls: bool,
    #[serde(deserialize_with = "package_list")]
    pub include_packages: Vec<String>,
    /// `None` keeps the built-in exclusions.
    #[serde(deserialize_with = "optional_package_list")]
    pub exclude_packages: Option<Vec<String>>,
    pub show_async_badge: bool,
    pub show_transactional_badge: bool,
    pub show_http_method_badge: bool,
    pub auto_expand_tree: bool,
    pub auto_expand_levels: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_depth: DEFAULT_MAX_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
            resolve_implementations: true,
            track_events: true,
            include_external_calls: false,
            include_packages: Vec::new(),
            exclude_packages: None,
            show_async_badge: true,
            show_transactional_badge: true,
            show_http_method_badge: true,
            auto_expand_tree: true,
            auto_expand_levels: 2,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PackageList {
    List(Vec<String>),
    Joined(String),
}

impl PackageList {
    fn into_vec(self) -> Vec<String> {
        let raw = match self {
            PackageList::List(items) => items,
            PackageList::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        };
        raw.into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }
}

fn package_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(PackageList::deserialize(deserializer)?.into_vec())
}

fn optional_package_list<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<PackageList>::deserialize(deserializer)?.map(PackageList::into_vec))
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read settings {}", path.display()))?;
        Self::parse(&raw, path)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self> {
        let yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml" | "yml")
        );
        let settings = if yaml {
            serde_yaml_ng::from_str(raw)
                .with_context(|| format!("parse settings YAML {}", path.display()))?
        } else {
            serde_json::from_str(raw)
                .with_context(|| format!("parse settings JSON {}", path.display()))?
        };
        Ok(settings)
    }

    pub fn analysis_config(&self) -> AnalysisConfig {
        let mut builder = AnalysisConfig::builder()
            .max_depth(self.default_depth)
            .max_nodes(self.max_nodes)
            .resolve_implementations(self.resolve_implementations)
            .track_events(self.track_events)
            .include_external_calls(self.include_external_calls)
            .include_packages(self.include_packages.clone());
        if let Some(excludes) = &self.exclude_packages {
            builder = builder.exclude_packages(excludes.clone());
        }
        builder.build()
    }

    pub fn tree_options(&self) -> TreeOptions {
        TreeOptions {
            show_async_badge: self.show_async_badge,
            show_transactional_badge: self.show_transactional_badge,
            show_http_method_badge: self.show_http_method_badge,
            expand_levels: if self.auto_expand_tree {
                Some(self.auto_expand_levels)
            } else {
                None
            },
        }
    }
}
