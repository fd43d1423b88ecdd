//! Branch options for change ingestion.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What to do when the target branch of a change batch already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConflictPolicy {
    /// Reject the request.
    #[default]
    Error,
    /// Leave the existing branch alone and report that nothing was applied.
    Ignore,
    /// Remove the existing branch, then create it afresh.
    Drop,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Error => write!(f, "ERROR"),
            ConflictPolicy::Ignore => write!(f, "IGNORE"),
            ConflictPolicy::Drop => write!(f, "DROP"),
        }
    }
}

/// Target branch of a change batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchOptions {
    /// Branch to create and append to.
    pub branch: String,
    /// Policy applied when `branch` already exists.
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

impl BranchOptions {
    /// Creates branch options.
    pub fn new(branch: impl Into<String>, conflict_policy: ConflictPolicy) -> Self {
        Self {
            branch: branch.into(),
            conflict_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_display() {
        assert_eq!(ConflictPolicy::Error.to_string(), "ERROR");
        assert_eq!(ConflictPolicy::Ignore.to_string(), "IGNORE");
        assert_eq!(ConflictPolicy::Drop.to_string(), "DROP");
    }
}
