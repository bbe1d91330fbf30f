//! Project configuration consumed by every phase.
//!
//! The configuration is read-only for the lifetime of a build. The host decides
//! where it comes from; the CLI loads it from a JSON file. The schema phase
//! copies it into the IR (`config`, `type_configs`, `scalar_config`,
//! `runtime_scalar_definitions`) so that validation queries can join on it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::diagnostics::PipelineError;

/// Where list operations land when no explicit `@allLists`/`@parentID` is given.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListTarget {
    All,
    #[default]
    Null,
}

impl ListTarget {
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            ListTarget::All => Some("all"),
            ListTarget::Null => None,
        }
    }
}

/// Default insert position for list mutations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListPosition {
    #[default]
    Append,
    Prepend,
}

impl ListPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListPosition::Append => "append",
            ListPosition::Prepend => "prepend",
        }
    }
}

/// Pagination strategy for `@paginate` fields without an explicit mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PaginateMode {
    #[default]
    Infinite,
    SinglePage,
}

impl PaginateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaginateMode::Infinite => "Infinite",
            PaginateMode::SinglePage => "SinglePage",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Infinite" => Some(PaginateMode::Infinite),
            "SinglePage" => Some(PaginateMode::SinglePage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FragmentMasking {
    #[default]
    Enable,
    Disable,
}

impl FragmentMasking {
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentMasking::Enable => "enable",
            FragmentMasking::Disable => "disable",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CachePolicy {
    #[default]
    CacheOrNetwork,
    CacheOnly,
    NetworkOnly,
    CacheAndNetwork,
    NoCache,
}

impl CachePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePolicy::CacheOrNetwork => "CacheOrNetwork",
            CachePolicy::CacheOnly => "CacheOnly",
            CachePolicy::NetworkOnly => "NetworkOnly",
            CachePolicy::CacheAndNetwork => "CacheAndNetwork",
            CachePolicy::NoCache => "NoCache",
        }
    }
}

/// Verbosity of the host's end-of-build summary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Quiet,
    ShortSummary,
    #[default]
    Summary,
    Full,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Quiet => "QUIET",
            LogLevel::ShortSummary => "SHORT_SUMMARY",
            LogLevel::Summary => "SUMMARY",
            LogLevel::Full => "FULL",
        }
    }

    /// Default `tracing` filter directive for this level.
    pub fn tracing_filter(&self) -> &'static str {
        match self {
            LogLevel::Quiet => "error",
            LogLevel::ShortSummary => "warn",
            LogLevel::Summary => "info",
            LogLevel::Full => "debug",
        }
    }
}

/// Per-type configuration (`typeConfig.<Name>`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TypeConfig {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub resolve_query: Option<String>,
}

/// Custom scalar configuration (`scalars.<Name>`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScalarConfig {
    /// Host-language type the scalar marshals to.
    #[serde(rename = "type")]
    pub host_type: String,
    #[serde(default)]
    pub input_types: Vec<String>,
}

/// Read-only project configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    pub project_root: PathBuf,
    pub schema_path: PathBuf,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub default_keys: Vec<String>,
    pub type_config: BTreeMap<String, TypeConfig>,
    pub scalars: BTreeMap<String, ScalarConfig>,
    /// Client-only scalar name -> server-valid scalar name.
    pub runtime_scalars: BTreeMap<String, String>,
    pub default_list_target: ListTarget,
    pub default_list_position: ListPosition,
    pub default_paginate_mode: PaginateMode,
    pub default_fragment_masking: FragmentMasking,
    pub default_cache_policy: CachePolicy,
    pub default_partial: bool,
    /// Milliseconds.
    pub default_lifetime: u64,
    pub cache_buffer_size: u32,
    pub suppress_pagination_deduplication: bool,
    pub persisted_queries_path: Option<PathBuf>,
    pub definitions_path: Option<PathBuf>,
    pub runtime_dir: Option<PathBuf>,
    pub log_level: LogLevel,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            schema_path: PathBuf::from("./schema.graphql"),
            include: vec!["src/**/*.{svelte,graphql,gql,ts,js,tsx,jsx}".to_string()],
            exclude: Vec::new(),
            default_keys: vec!["id".to_string()],
            type_config: BTreeMap::new(),
            scalars: BTreeMap::new(),
            runtime_scalars: BTreeMap::new(),
            default_list_target: ListTarget::default(),
            default_list_position: ListPosition::default(),
            default_paginate_mode: PaginateMode::default(),
            default_fragment_masking: FragmentMasking::default(),
            default_cache_policy: CachePolicy::default(),
            default_partial: false,
            default_lifetime: 2 * 24 * 60 * 60 * 1000,
            cache_buffer_size: 10,
            suppress_pagination_deduplication: false,
            persisted_queries_path: None,
            definitions_path: None,
            runtime_dir: None,
            log_level: LogLevel::default(),
        }
    }
}

impl ProjectConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Load a configuration from a JSON file.
    ///
    /// A relative `projectRoot` is resolved against the directory holding the file.
    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json_str(&text)?;
        if config.project_root.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.project_root = base.join(&config.project_root);
        }
        Ok(config)
    }

    /// Keys identifying records of `type_name`.
    pub fn keys_for(&self, type_name: &str) -> &[String] {
        match self.type_config.get(type_name) {
            Some(cfg) if !cfg.keys.is_empty() => &cfg.keys,
            _ => &self.default_keys,
        }
    }

    /// Absolute location of the schema file.
    pub fn schema_file(&self) -> PathBuf {
        if self.schema_path.is_absolute() {
            self.schema_path.clone()
        } else {
            self.project_root.join(&self.schema_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProjectConfig::default();
        assert_eq!(config.default_keys, vec!["id".to_string()]);
        assert_eq!(config.default_paginate_mode, PaginateMode::Infinite);
        assert_eq!(config.log_level, LogLevel::Summary);
    }

    #[test]
    fn test_parse_camel_case_json() {
        let config = ProjectConfig::from_json_str(
            r#"{
                "projectRoot": "/tmp/project",
                "defaultKeys": ["id"],
                "typeConfig": { "Ghost": { "keys": ["aka", "name"] } },
                "runtimeScalars": { "UserFromSession": "ID" },
                "scalars": { "DateTime": { "type": "Date", "inputTypes": ["Date"] } },
                "defaultPaginateMode": "SinglePage",
                "defaultListPosition": "prepend",
                "logLevel": "FULL"
            }"#,
        )
        .unwrap();

        assert_eq!(config.keys_for("Ghost"), &["aka".to_string(), "name".to_string()]);
        assert_eq!(config.keys_for("User"), &["id".to_string()]);
        assert_eq!(config.runtime_scalars.get("UserFromSession").map(String::as_str), Some("ID"));
        assert_eq!(config.scalars["DateTime"].host_type, "Date");
        assert_eq!(config.default_paginate_mode, PaginateMode::SinglePage);
        assert_eq!(config.default_list_position, ListPosition::Prepend);
        assert_eq!(config.log_level, LogLevel::Full);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = ProjectConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_empty_type_config_keys_fall_back_to_defaults() {
        let mut config = ProjectConfig::default();
        config.type_config.insert("User".to_string(), TypeConfig::default());
        assert_eq!(config.keys_for("User"), &["id".to_string()]);
    }

    #[test]
    fn test_log_level_filters() {
        assert_eq!(LogLevel::Quiet.tracing_filter(), "error");
        assert_eq!(LogLevel::Full.tracing_filter(), "debug");
    }
}
