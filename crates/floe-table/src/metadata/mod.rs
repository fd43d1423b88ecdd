//! Table metadata and how updates apply to it.
//!
//! [`TableMetadata`] is a value: applying a [`TableUpdate`] mutates a private
//! copy, and the store swaps the whole value in when a transaction commits.
//! The `main` ref is created with the table and can never be removed or
//! expired.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use floe_common::{FloeError, FloeResult, TableIdentifier, MAIN_BRANCH};

use crate::io::DataFile;
use crate::schema::Schema;
use crate::snapshot::{Snapshot, SnapshotId, SnapshotRef};
use crate::transaction::TableUpdate;

/// One committed transaction, as recorded in the commit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEntry {
    /// Metadata version produced by the commit.
    pub version: u64,
    /// Commit time.
    pub timestamp_ms: u64,
    /// Snapshots the commit produced, in order.
    pub snapshots: Vec<SnapshotId>,
    /// Short description of each applied update.
    pub operations: Vec<String>,
}

/// Complete state of a table at one metadata version.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    identifier: TableIdentifier,
    location: String,
    schema: Schema,
    snapshots: BTreeMap<SnapshotId, Arc<Snapshot>>,
    refs: BTreeMap<String, SnapshotRef>,
    last_sequence_number: u64,
    last_updated_ms: u64,
    version: u64,
    commit_log: Vec<CommitEntry>,
}

impl TableMetadata {
    /// Creates metadata for a new, empty table.
    pub fn new(identifier: TableIdentifier, location: String, schema: Schema, now_ms: u64) -> Self {
        let mut refs = BTreeMap::new();
        refs.insert(MAIN_BRANCH.to_string(), SnapshotRef::branch(None, None, now_ms));
        Self {
            identifier,
            location,
            schema,
            snapshots: BTreeMap::new(),
            refs,
            last_sequence_number: 0,
            last_updated_ms: now_ms,
            version: 0,
            commit_log: Vec::new(),
        }
    }

    /// Returns the table identifier.
    pub fn identifier(&self) -> &TableIdentifier {
        &self.identifier
    }

    /// Returns the base location of the table's files.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Returns the table schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns every named ref.
    pub fn refs(&self) -> &BTreeMap<String, SnapshotRef> {
        &self.refs
    }

    /// Returns the ref named `name`.
    pub fn snapshot_ref(&self, name: &str) -> Option<&SnapshotRef> {
        self.refs.get(name)
    }

    /// Returns true if a ref named `name` exists.
    pub fn has_ref(&self, name: &str) -> bool {
        self.refs.contains_key(name)
    }

    /// Returns the snapshot with the given id.
    pub fn snapshot(&self, id: SnapshotId) -> Option<&Arc<Snapshot>> {
        self.snapshots.get(&id)
    }

    /// Returns every snapshot, oldest first.
    pub fn snapshots(&self) -> impl Iterator<Item = &Arc<Snapshot>> {
        self.snapshots.values()
    }

    /// Returns the head snapshot of `branch`.
    pub fn branch_head(&self, branch: &str) -> Option<&Arc<Snapshot>> {
        self.refs
            .get(branch)
            .and_then(|r| r.snapshot_id)
            .and_then(|id| self.snapshots.get(&id))
    }

    /// Returns the head snapshot of `main`.
    pub fn current_snapshot(&self) -> Option<&Arc<Snapshot>> {
        self.branch_head(MAIN_BRANCH)
    }

    /// Returns the history of `branch`, newest first.
    pub fn ancestors(&self, branch: &str) -> Vec<Arc<Snapshot>> {
        let mut history = Vec::new();
        let mut next = self.branch_head(branch).cloned();
        while let Some(snapshot) = next {
            next = snapshot
                .parent_id
                .and_then(|id| self.snapshots.get(&id))
                .cloned();
            history.push(snapshot);
        }
        history
    }

    /// Returns the metadata version; bumped by every commit.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns the time of the last commit.
    pub fn last_updated_ms(&self) -> u64 {
        self.last_updated_ms
    }

    /// Returns the commit log, oldest first.
    pub fn commit_log(&self) -> &[CommitEntry] {
        &self.commit_log
    }

    /// Returns true if any ref has outlived its maximum age.
    pub fn has_expired_refs(&self, now_ms: u64) -> bool {
        self.refs
            .iter()
            .any(|(name, r)| name != MAIN_BRANCH && r.is_expired(now_ms))
    }

    /// Removes every ref that has outlived its maximum age and returns their
    /// names. `main` is never expired.
    pub fn expire_refs(&mut self, now_ms: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .refs
            .iter()
            .filter(|(name, r)| name.as_str() != MAIN_BRANCH && r.is_expired(now_ms))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &expired {
            self.refs.remove(name);
        }
        expired
    }

    /// Applies one update.
    ///
    /// # Errors
    ///
    /// - [`FloeError::BranchAlreadyExists`] when creating an existing ref.
    /// - [`FloeError::BranchNotFound`] when appending to or removing a
    ///   missing ref.
    /// - [`FloeError::InvalidArgument`] when removing `main`.
    pub fn apply(&mut self, update: &TableUpdate, now_ms: u64) -> FloeResult<Option<SnapshotId>> {
        match update {
            TableUpdate::AppendFiles { branch, files } => {
                self.append_files(branch, files, now_ms).map(Some)
            }
            TableUpdate::CreateBranch {
                name,
                max_ref_age_ms,
            } => self.create_branch(name, *max_ref_age_ms, now_ms).map(|()| None),
            TableUpdate::RemoveBranch { name } => self.remove_branch(name).map(|()| None),
        }
    }

    /// Bumps the version and records a commit of `updates`.
    pub(crate) fn record_commit(
        &mut self,
        updates: &[TableUpdate],
        snapshots: Vec<SnapshotId>,
        now_ms: u64,
    ) {
        self.version += 1;
        self.last_updated_ms = now_ms;
        self.commit_log.push(CommitEntry {
            version: self.version,
            timestamp_ms: now_ms,
            snapshots,
            operations: updates.iter().map(TableUpdate::describe).collect(),
        });
    }

    fn append_files(
        &mut self,
        branch: &str,
        files: &[DataFile],
        now_ms: u64,
    ) -> FloeResult<SnapshotId> {
        if !self.refs.contains_key(branch) {
            return Err(self.branch_not_found(branch));
        }

        self.last_sequence_number += 1;
        let snapshot_id = SnapshotId::new(self.last_sequence_number);
        let snapshot = Snapshot::append(
            snapshot_id,
            self.branch_head(branch).map(Arc::as_ref),
            self.last_sequence_number,
            now_ms,
            files,
        );
        self.snapshots.insert(snapshot_id, Arc::new(snapshot));

        if let Some(head) = self.refs.get_mut(branch) {
            head.snapshot_id = Some(snapshot_id);
        }
        Ok(snapshot_id)
    }

    fn create_branch(
        &mut self,
        name: &str,
        max_ref_age_ms: Option<u64>,
        now_ms: u64,
    ) -> FloeResult<()> {
        if self.refs.contains_key(name) {
            return Err(FloeError::BranchAlreadyExists {
                table: self.identifier.to_string(),
                branch: name.to_string(),
            });
        }
        let head = self.current_snapshot().map(|s| s.snapshot_id);
        self.refs.insert(
            name.to_string(),
            SnapshotRef::branch(head, max_ref_age_ms, now_ms),
        );
        Ok(())
    }

    fn remove_branch(&mut self, name: &str) -> FloeResult<()> {
        if name == MAIN_BRANCH {
            return Err(FloeError::invalid_argument("the main branch cannot be removed"));
        }
        match self.refs.remove(name) {
            Some(_) => Ok(()),
            None => Err(self.branch_not_found(name)),
        }
    }

    fn branch_not_found(&self, branch: &str) -> FloeError {
        FloeError::BranchNotFound {
            table: self.identifier.to_string(),
            branch: branch.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, FieldType};

    fn metadata() -> TableMetadata {
        let schema = Schema::new(vec![Field::required(1, "id", FieldType::Long)]).unwrap();
        TableMetadata::new(
            TableIdentifier::parse("db.events"),
            "mem://local/db/events".to_string(),
            schema,
            1_000,
        )
    }

    fn files(rows: &[u64]) -> Vec<DataFile> {
        rows.iter()
            .enumerate()
            .map(|(i, &n)| DataFile {
                path: format!("f{i}"),
                record_count: n,
                file_size_bytes: n,
            })
            .collect()
    }

    fn append(branch: &str, rows: &[u64]) -> TableUpdate {
        TableUpdate::AppendFiles {
            branch: branch.to_string(),
            files: files(rows),
        }
    }

    #[test]
    fn test_new_table_has_empty_main() {
        let meta = metadata();
        assert!(meta.has_ref(MAIN_BRANCH));
        assert!(meta.current_snapshot().is_none());
        assert_eq!(meta.version(), 0);
    }

    #[test]
    fn test_append_advances_branch() {
        let mut meta = metadata();
        meta.apply(&append(MAIN_BRANCH, &[10]), 2_000).unwrap();
        meta.apply(&append(MAIN_BRANCH, &[5]), 3_000).unwrap();

        let head = meta.current_snapshot().unwrap();
        assert_eq!(head.summary.total_records, 15);
        assert_eq!(meta.ancestors(MAIN_BRANCH).len(), 2);
    }

    #[test]
    fn test_empty_append_still_creates_snapshot() {
        let mut meta = metadata();
        let id = meta.apply(&append(MAIN_BRANCH, &[]), 2_000).unwrap();
        assert!(id.is_some());
        assert_eq!(meta.current_snapshot().unwrap().summary.total_files, 0);
    }

    #[test]
    fn test_branch_forks_from_main() {
        let mut meta = metadata();
        meta.apply(&append(MAIN_BRANCH, &[10]), 2_000).unwrap();
        meta.apply(
            &TableUpdate::CreateBranch {
                name: "audit".to_string(),
                max_ref_age_ms: None,
            },
            2_000,
        )
        .unwrap();
        meta.apply(&append("audit", &[3]), 3_000).unwrap();

        assert_eq!(meta.branch_head("audit").unwrap().summary.total_records, 13);
        assert_eq!(meta.current_snapshot().unwrap().summary.total_records, 10);
    }

    #[test]
    fn test_branch_errors() {
        let mut meta = metadata();
        let create = TableUpdate::CreateBranch {
            name: "b".to_string(),
            max_ref_age_ms: None,
        };
        meta.apply(&create, 0).unwrap();
        assert!(matches!(
            meta.apply(&create, 0),
            Err(FloeError::BranchAlreadyExists { .. })
        ));
        assert!(matches!(
            meta.apply(&TableUpdate::RemoveBranch { name: "nope".to_string() }, 0),
            Err(FloeError::BranchNotFound { .. })
        ));
        assert!(matches!(
            meta.apply(&append("nope", &[1]), 0),
            Err(FloeError::BranchNotFound { .. })
        ));
        assert!(meta
            .apply(
                &TableUpdate::RemoveBranch {
                    name: MAIN_BRANCH.to_string()
                },
                0
            )
            .is_err());
    }

    #[test]
    fn test_expire_refs_keeps_main() {
        let mut meta = metadata();
        meta.apply(
            &TableUpdate::CreateBranch {
                name: "short".to_string(),
                max_ref_age_ms: Some(500),
            },
            1_000,
        )
        .unwrap();

        assert!(!meta.has_expired_refs(1_500));
        assert!(meta.has_expired_refs(1_501));
        assert_eq!(meta.expire_refs(u64::MAX), vec!["short".to_string()]);
        assert!(meta.has_ref(MAIN_BRANCH));
        assert!(!meta.has_ref("short"));
    }
}
