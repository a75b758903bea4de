//! Configuration for a consistency check run.
//!
//! A [`CheckConfig`] can be built in code, from one of the presets, or loaded from a TOML
//! file in which every key is optional:
//!
//! ```toml
//! threads = 8
//! memory_limit_bytes = 268435456
//! large_index_threshold = 0.05
//!
//! [flags]
//! check_indexes = false
//! ```

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default cache budget: 512 MiB.
pub const DEFAULT_MEMORY_LIMIT_BYTES: u64 = 512 * 1024 * 1024;
/// Default fraction of an entity store an index must cover to be checked from the index side.
pub const DEFAULT_LARGE_INDEX_THRESHOLD: f64 = 0.05;
/// Default number of findings retained in memory; counts keep growing past it.
pub const DEFAULT_MAX_RETAINED_FINDINGS: usize = 10_000;

/// Errors raised while loading or validating a [`CheckConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read check config {path}: {source}")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The config file is not valid TOML for this schema.
    #[error("failed to parse check config{}: {source}", path.as_ref().map(|p| format!(" {}", p.display())).unwrap_or_default())]
    Parse {
        /// Path of the config file, when loaded from disk.
        path: Option<PathBuf>,
        /// Underlying parse error.
        source: toml::de::Error,
    },
    /// A value is out of its accepted range.
    #[error("invalid check config value for `{field}`: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Selects which phases of the check run.
///
/// Token and schema checks always run; everything else can be switched off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyFlags {
    /// Nodes, relationships, relationship groups and chain structure.
    pub check_structure: bool,
    /// Property chains and the property store.
    pub check_properties: bool,
    /// Node records against the label index.
    pub check_label_index: bool,
    /// Relationship records against the relationship type index.
    pub check_relationship_type_index: bool,
    /// Graph entities against value indexes and constraints.
    pub check_indexes: bool,
}

impl Default for ConsistencyFlags {
    fn default() -> Self {
        Self::all()
    }
}

impl ConsistencyFlags {
    /// Every phase enabled.
    pub const fn all() -> Self {
        Self {
            check_structure: true,
            check_properties: true,
            check_label_index: true,
            check_relationship_type_index: true,
            check_indexes: true,
        }
    }

    /// Only record structure; no property, token-index or value-index checking.
    pub const fn structure_only() -> Self {
        Self {
            check_structure: true,
            check_properties: false,
            check_label_index: false,
            check_relationship_type_index: false,
            check_indexes: false,
        }
    }
}

/// Configuration for one consistency check run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Worker threads; `None` uses the available parallelism.
    pub threads: Option<usize>,
    /// Upper bound for the cross-pass cache, in bytes.
    pub memory_limit_bytes: u64,
    /// Indexes whose entry count exceeds this fraction of the entity high id are checked
    /// from the index side.
    pub large_index_threshold: f64,
    /// Findings kept in memory for the result; the summary still counts all of them.
    pub max_retained_findings: usize,
    /// Enabled phases.
    pub flags: ConsistencyFlags,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            threads: None,
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
            large_index_threshold: DEFAULT_LARGE_INDEX_THRESHOLD,
            max_retained_findings: DEFAULT_MAX_RETAINED_FINDINGS,
            flags: ConsistencyFlags::all(),
        }
    }
}

impl CheckConfig {
    /// Structure-only check with default resources.
    pub fn structure_only() -> Self {
        Self {
            flags: ConsistencyFlags::structure_only(),
            ..Self::default()
        }
    }

    /// Returns a copy with a fixed worker count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Returns a copy with the given cache budget.
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    /// Loads and validates a config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: CheckConfig =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: Some(path.to_path_buf()),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a config from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: CheckConfig =
            toml::from_str(contents).map_err(|source| ConfigError::Parse { path: None, source })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == Some(0) {
            return Err(ConfigError::Invalid {
                field: "threads",
                reason: "must be at least 1".into(),
            });
        }
        if !(self.large_index_threshold > 0.0 && self.large_index_threshold <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "large_index_threshold",
                reason: format!("{} is outside (0, 1]", self.large_index_threshold),
            });
        }
        Ok(())
    }

    /// Worker count after resolving the default.
    pub fn effective_threads(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        })
    }
}
