//! Snapshots and branch references.
//!
//! A [`Snapshot`] is the complete, immutable state of a table after one
//! commit: the full list of live data files plus a link to its parent.
//! Branches are [`SnapshotRef`]s: named pointers to the head snapshot of an
//! independently advancing line of history.
//!
//! # Branch Expiry
//!
//! A ref created with a maximum age is expired by the store once that age
//! has elapsed since the ref was created. Advancing the branch does not
//! reset its age. Refs without a maximum age, including `main`, never
//! expire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::io::DataFile;

/// Snapshot identifier, unique within a table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SnapshotId(u64);

impl SnapshotId {
    /// Creates a new `SnapshotId` from a raw u64 value.
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotId({})", self.0)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counters describing what a snapshot changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// Data files added by this snapshot.
    pub added_files: u64,
    /// Rows added by this snapshot.
    pub added_records: u64,
    /// Data files live in this snapshot.
    pub total_files: u64,
    /// Rows live in this snapshot.
    pub total_records: u64,
}

/// Immutable state of a table after one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// This snapshot.
    pub snapshot_id: SnapshotId,
    /// The snapshot this one was derived from.
    pub parent_id: Option<SnapshotId>,
    /// Position of this snapshot in the table's commit order.
    pub sequence_number: u64,
    /// Commit time.
    pub timestamp_ms: u64,
    /// Every data file live in this snapshot.
    pub data_files: Arc<Vec<DataFile>>,
    /// What this snapshot changed.
    pub summary: SnapshotSummary,
}

impl Snapshot {
    /// Derives a snapshot that adds `added` to `parent`'s files.
    pub fn append(
        snapshot_id: SnapshotId,
        parent: Option<&Snapshot>,
        sequence_number: u64,
        timestamp_ms: u64,
        added: &[DataFile],
    ) -> Self {
        let mut data_files: Vec<DataFile> = parent
            .map(|p| p.data_files.as_ref().clone())
            .unwrap_or_default();
        data_files.extend_from_slice(added);

        let summary = SnapshotSummary {
            added_files: added.len() as u64,
            added_records: added.iter().map(|f| f.record_count).sum(),
            total_files: data_files.len() as u64,
            total_records: data_files.iter().map(|f| f.record_count).sum(),
        };

        Self {
            snapshot_id,
            parent_id: parent.map(|p| p.snapshot_id),
            sequence_number,
            timestamp_ms,
            data_files: Arc::new(data_files),
            summary,
        }
    }
}

/// A named branch pointing into the snapshot history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    /// Head of the branch; `None` for a branch of an empty table.
    pub snapshot_id: Option<SnapshotId>,
    /// Maximum age before the store expires the ref.
    pub max_ref_age_ms: Option<u64>,
    /// When the ref was created.
    pub created_at_ms: u64,
}

impl SnapshotRef {
    /// Creates a branch ref.
    pub fn branch(
        snapshot_id: Option<SnapshotId>,
        max_ref_age_ms: Option<u64>,
        created_at_ms: u64,
    ) -> Self {
        Self {
            snapshot_id,
            max_ref_age_ms,
            created_at_ms,
        }
    }

    /// Returns true once the ref has outlived its maximum age.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.max_ref_age_ms
            .map_or(false, |max_age| now_ms.saturating_sub(self.created_at_ms) > max_age)
    }
}
