//! Idempotency keys and the retention branches that record them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::constants::{IDEMPOTENCY_BRANCH_PREFIX, IDEMPOTENCY_RETENTION};
use crate::error::{FloeError, FloeResult};

/// Caller-supplied token identifying one logical batch.
///
/// The key is opaque: it is never parsed, only embedded verbatim in the
/// name of its [`RetentionBranch`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Creates a key.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::InvalidArgument`] for an empty key.
    pub fn new(key: impl Into<String>) -> FloeResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(FloeError::invalid_argument(
                "idempotency key must not be empty",
            ));
        }
        Ok(Self(key))
    }

    /// Returns the key as given by the caller.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the name of the branch that marks this batch as committed.
    #[must_use]
    pub fn branch_name(&self) -> String {
        format!("{IDEMPOTENCY_BRANCH_PREFIX}{}", self.0)
    }

    /// Returns the retention branch for this key.
    #[must_use]
    pub fn retention_branch(&self) -> RetentionBranch {
        RetentionBranch {
            name: self.branch_name(),
            max_ref_age: IDEMPOTENCY_RETENTION,
        }
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Branch created in the same transaction as an idempotent append.
///
/// Its existence on a table is the durable record that the batch was
/// committed. The table store expires it once `max_ref_age` has elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionBranch {
    name: String,
    max_ref_age: Duration,
}

impl RetentionBranch {
    /// Returns the branch name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the retention window.
    #[must_use]
    pub fn max_ref_age(&self) -> Duration {
        self.max_ref_age
    }

    /// Returns the retention window in milliseconds.
    #[must_use]
    pub fn max_ref_age_ms(&self) -> u64 {
        u64::try_from(self.max_ref_age.as_millis()).unwrap_or(u64::MAX)
    }
}
