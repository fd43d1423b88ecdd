//! System-wide constants for Floe.
//!
//! Some of these values are durable on-disk contracts: changing them breaks
//! idempotency detection for batches committed by older versions.

use std::time::Duration;

// =============================================================================
// Idempotency Branches
// =============================================================================

/// Prefix of the branch that marks a committed idempotent batch.
///
/// The full branch name is this prefix followed by the caller's idempotency
/// key, verbatim.
pub const IDEMPOTENCY_BRANCH_PREFIX: &str = "__peerdb-idem-";

/// Number of days an idempotency branch is retained after creation.
pub const IDEMPOTENCY_RETENTION_DAYS: u64 = 7;

/// Retention window of an idempotency branch.
pub const IDEMPOTENCY_RETENTION: Duration =
    Duration::from_secs(IDEMPOTENCY_RETENTION_DAYS * 24 * 60 * 60);

// =============================================================================
// Table Store
// =============================================================================

/// Name of the branch every table starts with.
pub const MAIN_BRANCH: &str = "main";

/// Separator used when rendering namespaces and table identifiers.
pub const NAMESPACE_SEPARATOR: char = '.';

// =============================================================================
// Writer Defaults
// =============================================================================

/// Default number of rows written into one data file before rolling over.
pub const DEFAULT_TARGET_FILE_ROWS: usize = 10_000;

/// Upper bound on the number of record conversion threads.
pub const MAX_CONVERSION_THREADS: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_is_seven_days_in_millis() {
        assert_eq!(IDEMPOTENCY_RETENTION.as_millis(), 604_800_000);
    }
}
