//! Ingestion configuration structures.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::constants::{DEFAULT_TARGET_FILE_ROWS, MAX_CONVERSION_THREADS};
use crate::error::{FloeError, FloeResult};

/// Main ingestion configuration.
///
/// # Example
///
/// ```rust
/// use floe_common::config::{IngestConfig, UnsupportedChangePolicy};
///
/// let config = IngestConfig::default();
/// assert!(config.lock.acquire_timeout.is_none());
/// assert_eq!(config.changes.unsupported_changes, UnsupportedChangePolicy::Reject);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Per-table lock configuration.
    #[serde(default)]
    pub lock: LockConfig,

    /// Record conversion and data file writer configuration.
    #[serde(default)]
    pub writer: WriterConfig,

    /// Change ingestion configuration.
    #[serde(default)]
    pub changes: ChangeConfig,
}

impl IngestConfig {
    /// Creates a new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a small configuration for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            lock: LockConfig {
                acquire_timeout: Some(Duration::from_secs(30)),
            },
            writer: WriterConfig {
                target_file_rows: 64,
                conversion_threads: 2,
            },
            changes: ChangeConfig::default(),
        }
    }

    /// Creates a builder for configuration.
    #[must_use]
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::new()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the file cannot be read and
    /// [`FloeError::InvalidConfig`] when it does not parse or validate.
    pub fn from_file(path: &Path) -> FloeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::InvalidConfig`] when the content does not parse
    /// or validate.
    pub fn from_toml(content: &str) -> FloeResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| FloeError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the file cannot be written.
    pub fn save(&self, path: &Path) -> FloeResult<()> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Converts configuration to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::InvalidConfig`] if serialization fails.
    pub fn to_toml(&self) -> FloeResult<String> {
        toml::to_string_pretty(self).map_err(|e| FloeError::InvalidConfig {
            message: e.to_string(),
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> FloeResult<()> {
        if self.writer.target_file_rows == 0 {
            return Err(FloeError::InvalidConfig {
                message: "writer.target_file_rows must be at least 1".to_string(),
            });
        }

        if self.writer.conversion_threads == 0
            || self.writer.conversion_threads > MAX_CONVERSION_THREADS
        {
            return Err(FloeError::InvalidConfig {
                message: format!(
                    "writer.conversion_threads must be between 1 and {MAX_CONVERSION_THREADS}"
                ),
            });
        }

        if self.lock.acquire_timeout == Some(Duration::ZERO) {
            return Err(FloeError::InvalidConfig {
                message: "lock.acquire_timeout must be positive when set".to_string(),
            });
        }

        Ok(())
    }
}

/// Per-table lock configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockConfig {
    /// Maximum time to wait for a table lock.
    ///
    /// Unset by default: a writer then waits as long as the current holder
    /// keeps the lock, including forever behind a stuck peer.
    #[serde(default, with = "humantime_serde")]
    pub acquire_timeout: Option<Duration>,
}

/// Record conversion and data file writer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Number of rows written to one data file before a new one is started.
    /// Default: 10000
    #[serde(default = "default_target_file_rows")]
    pub target_file_rows: usize,

    /// Number of threads converting records in parallel.
    /// Default: available parallelism
    #[serde(default = "default_conversion_threads")]
    pub conversion_threads: usize,
}

fn default_target_file_rows() -> usize {
    DEFAULT_TARGET_FILE_ROWS
}

fn default_conversion_threads() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
        .min(MAX_CONVERSION_THREADS)
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            target_file_rows: default_target_file_rows(),
            conversion_threads: default_conversion_threads(),
        }
    }
}

/// Handling of change kinds the ingestor cannot apply yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedChangePolicy {
    /// Fail the whole batch before anything is written.
    #[default]
    Reject,
    /// Drop the change with a warning and apply the rest of the batch.
    Skip,
}

impl fmt::Display for UnsupportedChangePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnsupportedChangePolicy::Reject => write!(f, "reject"),
            UnsupportedChangePolicy::Skip => write!(f, "skip"),
        }
    }
}

/// Change ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeConfig {
    /// What to do with update and delete changes.
    /// Default: reject
    #[serde(default)]
    pub unsupported_changes: UnsupportedChangePolicy,

    /// Commit change batches under the same per-table lock as appends.
    /// Default: true
    #[serde(default = "default_serialize_with_appends")]
    pub serialize_with_appends: bool,
}

fn default_serialize_with_appends() -> bool {
    true
}

impl Default for ChangeConfig {
    fn default() -> Self {
        Self {
            unsupported_changes: UnsupportedChangePolicy::default(),
            serialize_with_appends: default_serialize_with_appends(),
        }
    }
}

/// Builder for ingestion configuration.
#[derive(Debug, Default)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lock acquisition timeout.
    #[must_use]
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock.acquire_timeout = Some(timeout);
        self
    }

    /// Sets the number of rows per data file.
    #[must_use]
    pub fn target_file_rows(mut self, rows: usize) -> Self {
        self.config.writer.target_file_rows = rows;
        self
    }

    /// Sets the number of conversion threads.
    #[must_use]
    pub fn conversion_threads(mut self, threads: usize) -> Self {
        self.config.writer.conversion_threads = threads;
        self
    }

    /// Sets the handling of update and delete changes.
    #[must_use]
    pub fn unsupported_changes(mut self, policy: UnsupportedChangePolicy) -> Self {
        self.config.changes.unsupported_changes = policy;
        self
    }

    /// Sets whether change batches share the append lock.
    #[must_use]
    pub fn serialize_with_appends(mut self, enabled: bool) -> Self {
        self.config.changes.serialize_with_appends = enabled;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::InvalidConfig`] if validation fails.
    pub fn build(self) -> FloeResult<IngestConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
