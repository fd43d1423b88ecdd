//! Floe error types.
//!
//! Every failure in the append and change-ingestion paths is reported as a
//! [`FloeError`]. Callers that need to decide whether to retry should use
//! [`FloeError::kind`] rather than matching individual variants.

use std::fmt;
use thiserror::Error;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Unknown or unspecified error.
    Unknown = 0x0000,
    /// Internal error (bug).
    Internal = 0x0001,
    /// Operation not supported.
    NotSupported = 0x0002,
    /// Invalid argument provided.
    InvalidArgument = 0x0003,
    /// Invalid configuration.
    InvalidConfig = 0x0004,

    // Catalog errors (0x0100 - 0x01FF)
    /// Catalog could not be resolved.
    CatalogNotFound = 0x0100,
    /// Table not found.
    TableNotFound = 0x0101,
    /// Table already exists.
    TableAlreadyExists = 0x0102,
    /// Schema could not be parsed or is unusable.
    InvalidSchema = 0x0103,

    // Branch errors (0x0200 - 0x02FF)
    /// Branch already exists.
    BranchAlreadyExists = 0x0200,
    /// Branch not found.
    BranchNotFound = 0x0201,

    // Record errors (0x0300 - 0x03FF)
    /// A record could not be converted into a table row.
    ConversionFailed = 0x0300,
    /// A row could not be written into a data file.
    WriteFailed = 0x0301,
    /// General I/O error.
    Io = 0x0302,

    // Commit errors (0x0400 - 0x04FF)
    /// Transaction commit failed.
    CommitFailed = 0x0400,
    /// Transaction was invalidated by a concurrent metadata change.
    CommitConflict = 0x0401,

    // Lock errors (0x0500 - 0x05FF)
    /// Lock acquisition timed out.
    LockTimeout = 0x0500,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "Catalog",
            0x02 => "Branch",
            0x03 => "Record",
            0x04 => "Commit",
            0x05 => "Lock",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Coarse classification of a failure, as seen by a caller of the
/// append or change-ingestion paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself is unacceptable. Never retried.
    Validation,
    /// A record could not be decoded against the declared schema.
    Conversion,
    /// A converted row could not be written into a data file.
    Write,
    /// The table transaction failed to commit.
    Commit,
    /// The per-table lock could not be acquired in time.
    LockAcquisition,
    /// A bug or broken invariant.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conversion => "conversion",
            ErrorKind::Write => "write",
            ErrorKind::Commit => "commit",
            ErrorKind::LockAcquisition => "lock_acquisition",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// The main error type for Floe.
///
/// # Example
///
/// ```rust
/// use floe_common::error::{ErrorKind, FloeError, FloeResult};
///
/// fn load(table: &str) -> FloeResult<()> {
///     Err(FloeError::TableNotFound { table: table.to_string() })
/// }
///
/// assert_eq!(load("sales.orders").unwrap_err().kind(), ErrorKind::Validation);
/// ```
#[derive(Debug, Error)]
pub enum FloeError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Operation not supported.
    #[error("operation not supported: {operation}")]
    NotSupported {
        /// The unsupported operation.
        operation: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Catalog Errors
    // ==========================================================================
    /// The catalog named by a request is not registered.
    #[error("catalog '{catalog_id}' not found")]
    CatalogNotFound {
        /// The unknown catalog.
        catalog_id: String,
    },

    /// Table not found.
    #[error("table '{table}' not found")]
    TableNotFound {
        /// The missing table.
        table: String,
    },

    /// Table already exists.
    #[error("table '{table}' already exists")]
    TableAlreadyExists {
        /// The existing table.
        table: String,
    },

    /// Schema could not be parsed or is unusable.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Branch Errors
    // ==========================================================================
    /// Branch already exists.
    #[error("branch '{branch}' already exists on table '{table}'")]
    BranchAlreadyExists {
        /// The table.
        table: String,
        /// The existing branch.
        branch: String,
    },

    /// Branch not found.
    #[error("branch '{branch}' not found on table '{table}'")]
    BranchNotFound {
        /// The table.
        table: String,
        /// The missing branch.
        branch: String,
    },

    // ==========================================================================
    // Record Errors
    // ==========================================================================
    /// Record conversion failed.
    #[error("record conversion failed: {message}")]
    Conversion {
        /// Error message.
        message: String,
    },

    /// Data file write failed.
    #[error("data file write failed: {message}")]
    Write {
        /// Error message.
        message: String,
    },

    /// I/O error from the underlying system.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    // ==========================================================================
    // Commit Errors
    // ==========================================================================
    /// Transaction commit failed.
    #[error("commit to table '{table}' failed: {reason}")]
    CommitFailed {
        /// The table.
        table: String,
        /// Reason for failure.
        reason: String,
    },

    /// Transaction was invalidated by a concurrent change.
    #[error("commit to table '{table}' conflicted: {reason}")]
    CommitConflict {
        /// The table.
        table: String,
        /// Description of the conflict.
        reason: String,
    },

    // ==========================================================================
    // Lock Errors
    // ==========================================================================
    /// Lock acquisition timed out.
    #[error("timed out after {waited_ms}ms waiting for lock on {key}")]
    LockTimeout {
        /// The lock key, rendered.
        key: String,
        /// How long the caller waited.
        waited_ms: u64,
    },
}

impl FloeError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::NotSupported { .. } => ErrorCode::NotSupported,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::CatalogNotFound { .. } => ErrorCode::CatalogNotFound,
            Self::TableNotFound { .. } => ErrorCode::TableNotFound,
            Self::TableAlreadyExists { .. } => ErrorCode::TableAlreadyExists,
            Self::InvalidSchema { .. } => ErrorCode::InvalidSchema,
            Self::BranchAlreadyExists { .. } => ErrorCode::BranchAlreadyExists,
            Self::BranchNotFound { .. } => ErrorCode::BranchNotFound,
            Self::Conversion { .. } => ErrorCode::ConversionFailed,
            Self::Write { .. } => ErrorCode::WriteFailed,
            Self::Io { .. } => ErrorCode::Io,
            Self::CommitFailed { .. } => ErrorCode::CommitFailed,
            Self::CommitConflict { .. } => ErrorCode::CommitConflict,
            Self::LockTimeout { .. } => ErrorCode::LockTimeout,
        }
    }

    /// Classifies this error for the caller.
    ///
    /// A branch that vanishes between planning and commit is a commit
    /// failure, not a validation failure: the request was acceptable when it
    /// was planned.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotSupported { .. }
            | Self::InvalidArgument { .. }
            | Self::InvalidConfig { .. }
            | Self::CatalogNotFound { .. }
            | Self::TableNotFound { .. }
            | Self::TableAlreadyExists { .. }
            | Self::InvalidSchema { .. }
            | Self::BranchAlreadyExists { .. } => ErrorKind::Validation,
            Self::Conversion { .. } => ErrorKind::Conversion,
            Self::Write { .. } | Self::Io { .. } => ErrorKind::Write,
            Self::BranchNotFound { .. }
            | Self::CommitFailed { .. }
            | Self::CommitConflict { .. } => ErrorKind::Commit,
            Self::LockTimeout { .. } => ErrorKind::LockAcquisition,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Returns true if retrying the whole operation may succeed.
    ///
    /// Appends carrying an idempotency key are safe to retry after any of
    /// these errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Commit | ErrorKind::LockAcquisition)
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a record conversion error.
    #[must_use]
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion {
            message: message.into(),
        }
    }

    /// Creates a data file write error.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write {
            message: message.into(),
        }
    }

    /// Creates a commit failure for `table`.
    #[must_use]
    pub fn commit(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CommitFailed {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = FloeError::TableNotFound {
            table: "sales.orders".into(),
        };
        assert_eq!(err.code(), ErrorCode::TableNotFound);
        assert_eq!(err.code().category(), "Catalog");
        assert_eq!(ErrorCode::LockTimeout.as_u16(), 0x0500);
    }

    #[test]
    fn test_error_display() {
        let err = FloeError::BranchAlreadyExists {
            table: "sales.orders".into(),
            branch: "staging".into(),
        };
        assert_eq!(
            err.to_string(),
            "branch 'staging' already exists on table 'sales.orders'"
        );
    }

    #[test]
    fn test_kind_taxonomy() {
        assert_eq!(
            FloeError::invalid_argument("bad").kind(),
            ErrorKind::Validation
        );
        assert_eq!(FloeError::conversion("bad").kind(), ErrorKind::Conversion);
        assert_eq!(FloeError::write("disk").kind(), ErrorKind::Write);
        assert_eq!(FloeError::commit("t", "boom").kind(), ErrorKind::Commit);
        assert_eq!(
            FloeError::LockTimeout {
                key: "k".into(),
                waited_ms: 5
            }
            .kind(),
            ErrorKind::LockAcquisition
        );
    }

    #[test]
    fn test_retryable() {
        assert!(FloeError::commit("t", "boom").is_retryable());
        assert!(FloeError::CommitConflict {
            table: "t".into(),
            reason: "branch exists".into()
        }
        .is_retryable());
        assert!(!FloeError::conversion("bad").is_retryable());
        assert!(!FloeError::TableNotFound { table: "t".into() }.is_retryable());
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let floe_err: FloeError = io_err.into();
        assert_eq!(floe_err.code(), ErrorCode::Io);
        assert_eq!(floe_err.kind(), ErrorKind::Write);
    }
}
