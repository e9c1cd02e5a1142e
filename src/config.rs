//! Run configuration, loadable from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "SOMBRA_CHECK_CONFIG";

const DEFAULT_MEMORY_BUDGET: u64 = 512 * 1024 * 1024;
const DEFAULT_MAX_RETAINED: usize = 32;

/// How checking tasks are scheduled.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOrder {
    /// One task at a time, in task-list order.
    Sequential,
    /// A bounded pool of worker threads.
    #[default]
    MultiThreaded,
}

/// Options for one checking run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Track property and dynamic chain ownership and audit orphans.
    pub check_property_owners: bool,
    /// Task scheduling.
    pub execution_order: ExecutionOrder,
    /// Bytes available to projections and node slices.
    pub total_mapped_memory_budget: u64,
    /// Worker count for multi-threaded runs; defaults to available parallelism.
    pub worker_threads: Option<usize>,
    /// Inconsistencies kept verbatim in the summary.
    pub max_retained_findings: usize,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            check_property_owners: false,
            execution_order: ExecutionOrder::default(),
            total_mapped_memory_budget: DEFAULT_MEMORY_BUDGET,
            worker_threads: None,
            max_retained_findings: DEFAULT_MAX_RETAINED,
        }
    }
}

impl CheckConfig {
    /// Reads a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: CheckConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `explicit` if given, else the default path when it exists, else defaults.
    pub fn discover(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        match explicit.or_else(default_config_path) {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Rejects values no run can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == Some(0) {
            return Err(ConfigError::Invalid("worker_threads must be at least 1"));
        }
        Ok(())
    }

    /// Worker threads a multi-threaded run uses.
    pub fn workers(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        })
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read check config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`CheckConfig`].
    #[error("failed to parse check config {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid check config: {0}")]
    Invalid(&'static str),
}

/// `$SOMBRA_CHECK_CONFIG`, else `<config dir>/sombra/check.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|base| base.join("sombra").join("check.toml"))
}
