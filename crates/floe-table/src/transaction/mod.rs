//! Transactions: batches of table updates committed atomically.
//!
//! A [`Transaction`] only records updates. Nothing is visible until
//! [`Table::commit`](crate::Table::commit) applies the whole batch to the
//! table's latest metadata in one step; if any update fails to apply, none
//! of them are.

use std::time::Duration;

use floe_common::{FloeResult, TableIdentifier, MAIN_BRANCH};

use crate::io::DataFile;
use crate::metadata::TableMetadata;

/// A single change to table metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableUpdate {
    /// Adds data files to a branch, producing a new snapshot.
    AppendFiles {
        /// Target branch.
        branch: String,
        /// Files to add.
        files: Vec<DataFile>,
    },
    /// Creates a branch at the current `main` head.
    CreateBranch {
        /// Branch name.
        name: String,
        /// Maximum age before the store expires the branch.
        max_ref_age_ms: Option<u64>,
    },
    /// Removes a branch ref. Snapshots are left in place.
    RemoveBranch {
        /// Branch name.
        name: String,
    },
}

impl TableUpdate {
    /// Short human-readable description, used in the commit log.
    pub fn describe(&self) -> String {
        match self {
            TableUpdate::AppendFiles { branch, files } => {
                let rows: u64 = files.iter().map(|f| f.record_count).sum();
                format!("append {} files ({rows} rows) to {branch}", files.len())
            }
            TableUpdate::CreateBranch {
                name,
                max_ref_age_ms: Some(age),
            } => format!("create branch {name} (max age {age}ms)"),
            TableUpdate::CreateBranch { name, .. } => format!("create branch {name}"),
            TableUpdate::RemoveBranch { name } => format!("remove branch {name}"),
        }
    }
}

/// An ordered batch of updates against one table.
#[derive(Debug, Clone)]
pub struct Transaction {
    table: TableIdentifier,
    base_version: u64,
    updates: Vec<TableUpdate>,
}

impl Transaction {
    /// Starts a transaction against the given metadata.
    pub fn new(base: &TableMetadata) -> Self {
        Self {
            table: base.identifier().clone(),
            base_version: base.version(),
            updates: Vec::new(),
        }
    }

    /// Returns the table this transaction targets.
    pub fn table(&self) -> &TableIdentifier {
        &self.table
    }

    /// Returns the metadata version the transaction was started from.
    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    /// Returns the recorded updates.
    pub fn updates(&self) -> &[TableUpdate] {
        &self.updates
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Appends files to `main`.
    pub fn append_files(&mut self, files: Vec<DataFile>) -> &mut Self {
        self.append_files_to_branch(MAIN_BRANCH, files)
    }

    /// Appends files to `branch`.
    pub fn append_files_to_branch(
        &mut self,
        branch: impl Into<String>,
        files: Vec<DataFile>,
    ) -> &mut Self {
        self.updates.push(TableUpdate::AppendFiles {
            branch: branch.into(),
            files,
        });
        self
    }

    /// Creates a branch, optionally expiring after `max_ref_age`.
    pub fn create_branch(
        &mut self,
        name: impl Into<String>,
        max_ref_age: Option<Duration>,
    ) -> &mut Self {
        self.updates.push(TableUpdate::CreateBranch {
            name: name.into(),
            max_ref_age_ms: max_ref_age.map(|age| u64::try_from(age.as_millis()).unwrap_or(u64::MAX)),
        });
        self
    }

    /// Removes a branch.
    pub fn remove_branch(&mut self, name: impl Into<String>) -> &mut Self {
        self.updates.push(TableUpdate::RemoveBranch { name: name.into() });
        self
    }

    /// Applies every update to `base` and returns the resulting metadata.
    ///
    /// # Errors
    ///
    /// Returns the first update's error; `base` is consumed either way.
    pub fn apply(&self, mut base: TableMetadata, now_ms: u64) -> FloeResult<TableMetadata> {
        let mut produced = Vec::new();
        for update in &self.updates {
            if let Some(snapshot_id) = base.apply(update, now_ms)? {
                produced.push(snapshot_id);
            }
        }
        base.record_commit(&self.updates, produced, now_ms);
        Ok(base)
    }
}
