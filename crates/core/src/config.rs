// crates/core/src/config.rs
//! TOML configuration: `$XDG_CONFIG_HOME/pickme/config.toml`.
//!
//! A missing file yields the defaults; a malformed or invalid file aborts
//! startup. The core consumes only the keys listed here; anything else in
//! the file is ignored so the CLI collaborator can extend it freely.

use crate::{expand_tilde, paths};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Validation(String),
}

/// Ranking weights for the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub git_recency: f64,
    pub git_frequency: f64,
    pub git_status: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            git_recency: 1.0,
            git_frequency: 0.5,
            git_status: 5.0,
        }
    }
}

/// A namespace maps either to a single path (search-root substitution) or to
/// a list of glob patterns (result filtering). Discriminated at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NamespaceValue {
    Path(String),
    Patterns(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcludeConfig {
    pub patterns: Vec<String>,
    /// When true (the default), VCS-ignored files are excluded from the index.
    #[serde(default = "default_true")]
    pub gitignored_files: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncludeConfig {
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    pub default: usize,
    /// Per-root overrides, keyed by the configured root string.
    #[serde(flatten)]
    pub per_root: BTreeMap<String, usize>,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            default: DEFAULT_MAX_DEPTH,
            per_root: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_files_per_root: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub roots: Vec<String>,
    /// Absolute paths never traversed, including by prefix.
    pub disabled: Vec<String>,
    pub include_hidden: bool,
    pub exclude: ExcludeConfig,
    pub include: IncludeConfig,
    pub depth: DepthConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// When false, search requests return empty results without querying.
    pub active: bool,
    pub weights: Weights,
    pub namespaces: BTreeMap<String, NamespaceValue>,
    /// Reserved for the CLI collaborator; parsed and carried, unused by core.
    pub priorities: BTreeMap<String, i64>,
    pub index: IndexConfig,
    pub daemon: DaemonConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            active: true,
            weights: Weights::default(),
            namespaces: BTreeMap::new(),
            priorities: BTreeMap::new(),
            index: IndexConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

pub const DEFAULT_MAX_DEPTH: usize = 10;

fn default_true() -> bool {
    true
}

impl Config {
    /// Load from the default location (`PICKME_CONFIG_PATH` override honored).
    /// A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        match paths::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate invariants the rest of the system assumes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("weights.git_recency", self.weights.git_recency),
            ("weights.git_frequency", self.weights.git_frequency),
            ("weights.git_status", self.weights.git_status),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{name} must be finite and >= 0, got {value}"
                )));
            }
        }
        for disabled in &self.index.disabled {
            if !disabled.starts_with('/') && !disabled.starts_with('~') {
                return Err(ConfigError::Validation(format!(
                    "index.disabled entries must be absolute paths, got {disabled:?}"
                )));
            }
        }
        Ok(())
    }

    /// Configured roots in declaration order, tilde-expanded.
    pub fn expanded_roots(&self) -> Vec<PathBuf> {
        self.index.roots.iter().map(|r| expand_tilde(r)).collect()
    }

    /// Disabled path prefixes, tilde-expanded.
    pub fn expanded_disabled(&self) -> Vec<PathBuf> {
        self.index
            .disabled
            .iter()
            .map(|d| expand_tilde(d))
            .collect()
    }

    /// Traversal depth for a configured root: per-root override, else default.
    pub fn depth_for_root(&self, root: &str) -> usize {
        self.index
            .depth
            .per_root
            .get(root)
            .copied()
            .unwrap_or(self.index.depth.default)
    }
}
