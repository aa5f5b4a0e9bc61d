//! Configuration for the word indexer.

use crate::filter::AdmissionOptions;
use crate::IndexerError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which tokenizer turns file content into words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// Split on whitespace
    #[default]
    Delimiter,
    /// Unicode word pattern
    Regex,
}

/// Indexer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Walker threads used by the initial scan of a root
    #[serde(default = "default_scan_parallelism")]
    pub scan_parallelism: usize,

    /// Upper bound on change events processed concurrently
    #[serde(default = "default_index_workers")]
    pub index_workers: usize,

    /// Grace period before an ownerless fingerprint is evicted (ms)
    #[serde(default = "default_eviction_ttl_ms")]
    pub eviction_ttl_ms: u64,

    /// How long the last accepted event time of a path is remembered (ms)
    #[serde(default = "default_last_event_ttl_ms")]
    pub last_event_ttl_ms: u64,

    /// Tokenizer used for file content
    #[serde(default)]
    pub tokenizer: TokenizerKind,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory names excluded when a root is watched without explicit options
    #[serde(default)]
    pub excluded_dirs: Vec<String>,

    /// Allowed file extensions when a root is watched without explicit options
    #[serde(default)]
    pub extensions: Vec<String>,
}

fn default_scan_parallelism() -> usize {
    8
}

fn default_index_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_eviction_ttl_ms() -> u64 {
    30 * 60 * 1000 // 30 minutes
}

fn default_last_event_ttl_ms() -> u64 {
    5 * 60 * 1000 // 5 minutes
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            scan_parallelism: default_scan_parallelism(),
            index_workers: default_index_workers(),
            eviction_ttl_ms: default_eviction_ttl_ms(),
            last_event_ttl_ms: default_last_event_ttl_ms(),
            tokenizer: TokenizerKind::default(),
            log_level: default_log_level(),
            excluded_dirs: Vec::new(),
            extensions: Vec::new(),
        }
    }
}

impl IndexerConfig {
    /// Load configuration from the user config directory, falling back to defaults
    pub fn load() -> Self {
        let Some(config_path) = default_config_path() else {
            return Self::default();
        };

        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = ?config_path, "Failed to load config file: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, IndexerError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn eviction_ttl(&self) -> Duration {
        Duration::from_millis(self.eviction_ttl_ms)
    }

    pub fn last_event_ttl(&self) -> Duration {
        Duration::from_millis(self.last_event_ttl_ms)
    }

    /// Admission options built from the configured defaults
    pub fn admission_options(&self) -> AdmissionOptions {
        AdmissionOptions::new(self.excluded_dirs.iter().cloned(), self.extensions.iter().cloned())
    }
}

/// `<config_dir>/wordwatch/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("wordwatch").join("config.yaml"))
}
