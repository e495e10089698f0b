//! Store configuration via `featuredb.toml`
//!
//! A data directory holds the database file next to a `featuredb.toml`.
//! On first open a commented default file is written; to change settings,
//! edit the file and reopen the store.

use serde::{Deserialize, Serialize};
use std::path::Path;

use featuredb_core::{FeatureDbError, FeatureDbResult, ModificationFlags, VisibilityFlags};

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "featuredb.toml";

/// Which backend a data directory uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// SQLite file with R*Tree spatial index
    Sqlite,
    /// Volatile quadtree and hash indices
    Memory,
}

/// SQLite connection tuning, under `[sqlite]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SqliteConfig {
    /// `PRAGMA journal_mode` value (default: "wal")
    #[serde(default = "default_journal_mode")]
    pub journal_mode: String,
    /// `PRAGMA synchronous` value (default: "normal")
    #[serde(default = "default_synchronous")]
    pub synchronous: String,
    /// Page cache size in KiB (default: 8192)
    #[serde(default = "default_cache_size_kib")]
    pub cache_size_kib: u32,
}

fn default_journal_mode() -> String {
    "wal".to_string()
}

fn default_synchronous() -> String {
    "normal".to_string()
}

fn default_cache_size_kib() -> u32 {
    8192
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            journal_mode: default_journal_mode(),
            synchronous: default_synchronous(),
            cache_size_kib: default_cache_size_kib(),
        }
    }
}

/// In-memory index tuning, under `[memory]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryConfig {
    /// Items per quadtree node before it splits (default: 100)
    #[serde(default = "default_node_capacity")]
    pub quadtree_node_capacity: usize,
    /// Maximum quadtree depth (default: 16)
    #[serde(default = "default_max_depth")]
    pub quadtree_max_depth: usize,
}

fn default_node_capacity() -> usize {
    100
}

fn default_max_depth() -> usize {
    16
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            quadtree_node_capacity: default_node_capacity(),
            quadtree_max_depth: default_max_depth(),
        }
    }
}

/// Query execution tuning, under `[query]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryConfig {
    /// Contributing sub-queries above which a paginated count is taken by
    /// walking the merged cursor instead of summing per-source counts
    /// (default: 1)
    #[serde(default = "default_count_fallback_threshold")]
    pub count_fallback_threshold: usize,
}

fn default_count_fallback_threshold() -> usize {
    1
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            count_fallback_threshold: default_count_fallback_threshold(),
        }
    }
}

/// Store configuration loaded from `featuredb.toml`.
///
/// # Example
///
/// ```toml
/// backend = "sqlite"
/// database = "features.sqlite"
/// read_only = false
///
/// [sqlite]
/// journal_mode = "wal"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureDbConfig {
    /// Backend: `"sqlite"` or `"memory"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Database file name, relative to the data directory.
    #[serde(default = "default_database")]
    pub database: String,
    /// Reject every content modification.
    #[serde(default)]
    pub read_only: bool,
    /// SQLite settings.
    #[serde(default)]
    pub sqlite: SqliteConfig,
    /// In-memory settings.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Query settings.
    #[serde(default)]
    pub query: QueryConfig,
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_database() -> String {
    "features.sqlite".to_string()
}

impl Default for FeatureDbConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database: default_database(),
            read_only: false,
            sqlite: SqliteConfig::default(),
            memory: MemoryConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

impl FeatureDbConfig {
    /// Parse the backend string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"sqlite"` or `"memory"`.
    pub fn backend_kind(&self) -> FeatureDbResult<BackendKind> {
        match self.backend.as_str() {
            "sqlite" => Ok(BackendKind::Sqlite),
            "memory" => Ok(BackendKind::Memory),
            other => Err(FeatureDbError::invalid_argument(format!(
                "Invalid backend '{}' in featuredb.toml. Expected \"sqlite\" or \"memory\".",
                other
            ))),
        }
    }

    /// Modifications a store opened with this config accepts.
    pub fn modification_flags(&self) -> ModificationFlags {
        if self.read_only {
            ModificationFlags::NONE
        } else {
            ModificationFlags::ALL
        }
    }

    /// Visibility settings a store opened with this config accepts.
    ///
    /// Visibility is presentation state and stays adjustable on read-only
    /// stores.
    pub fn visibility_flags(&self) -> VisibilityFlags {
        VisibilityFlags::ALL
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# featuredb configuration
#
# Backend: "sqlite" (default) or "memory"
#   "sqlite" = persistent store in `database`
#   "memory" = volatile store, contents are lost on dispose
backend = "sqlite"

# Database file, relative to this directory
database = "features.sqlite"

# Reject all content modifications (visibility stays adjustable)
read_only = false

[sqlite]
journal_mode = "wal"
synchronous = "normal"
cache_size_kib = 8192

[memory]
quadtree_node_capacity = 100
quadtree_max_depth = 16

[query]
# Paginated counts spanning more sub-queries than this walk the merged
# results instead of summing per-source counts
count_fallback_threshold = 1
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> FeatureDbResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FeatureDbError::storage(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: FeatureDbConfig = toml::from_str(&content).map_err(|e| {
            FeatureDbError::invalid_argument(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.backend_kind()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> FeatureDbResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                FeatureDbError::storage(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> FeatureDbResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| FeatureDbError::storage(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            FeatureDbError::storage(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
