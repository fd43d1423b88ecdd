//! Change ingestion onto optional named branches.
//!
//! When branch options are given, the existing branch is resolved against the
//! request's [`ConflictPolicy`] before anything is written:
//!
//! | branch exists | policy | action                                    |
//! |---------------|--------|-------------------------------------------|
//! | yes           | ERROR  | validation error, nothing changes         |
//! | yes           | IGNORE | return false, nothing changes             |
//! | yes           | DROP   | remove the branch in its own commit       |
//! | no            | any    | proceed                                   |
//!
//! Inserted records are then written like an append and committed in one
//! transaction that creates the branch (without a maximum age) and appends
//! the files to it. Without branch options the files go to `main`.
//!
//! When changes are serialized with appends, the DROP commit and the final
//! commit each run under the table lock on refreshed metadata, and the
//! branch is resolved again there. A branch removed in the meantime is no
//! longer dropped; one created in the meantime is handled by the policy as
//! if it had existed up front, discarding the written files.

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use floe_common::config::{ChangeConfig, UnsupportedChangePolicy};
use floe_common::{
    BranchOptions, ConflictPolicy, FloeError, FloeResult, LockKey, TableIdentity, MAIN_BRANCH,
};
use floe_lock::LockGuard;
use floe_table::{DataFile, Table};

use crate::context::IngestContext;
use crate::request::{InsertChangesRequest, RecordChange};

/// What to do about the target branch before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchAction {
    /// Create the branch with the new changes.
    Proceed,
    /// Leave the table alone and report nothing applied.
    Skip,
    /// Reject the request.
    Fail,
    /// Remove the existing branch first, then proceed.
    Replace,
}

/// Resolves an existing target branch against `policy`.
pub fn resolve_branch_conflict(exists: bool, policy: ConflictPolicy) -> BranchAction {
    match (exists, policy) {
        (false, _) => BranchAction::Proceed,
        (true, ConflictPolicy::Error) => BranchAction::Fail,
        (true, ConflictPolicy::Ignore) => BranchAction::Skip,
        (true, ConflictPolicy::Drop) => BranchAction::Replace,
    }
}

/// Applies insert, update, and delete changes to a table.
#[derive(Debug, Clone)]
pub struct ChangeIngestor {
    ctx: IngestContext,
    config: ChangeConfig,
}

impl ChangeIngestor {
    /// Creates an ingestor.
    pub fn new(ctx: IngestContext, config: ChangeConfig) -> Self {
        Self { ctx, config }
    }

    /// Returns the ingestor's configuration.
    pub fn config(&self) -> &ChangeConfig {
        &self.config
    }

    /// Handles a change request.
    ///
    /// # Errors
    ///
    /// See [`ChangeIngestor::apply_changes`].
    pub fn process(&self, request: &InsertChangesRequest) -> FloeResult<bool> {
        self.apply_changes(
            &request.table_info,
            &request.schema,
            &request.changes,
            request.branch_options.as_ref(),
        )
    }

    /// Applies `changes`, on the branch named by `branch` when given.
    ///
    /// Returns false only when the branch already exists and the policy is
    /// IGNORE; otherwise returns true once the changes are committed.
    ///
    /// # Errors
    ///
    /// - [`FloeError::BranchAlreadyExists`] for an existing branch under the
    ///   ERROR policy.
    /// - [`FloeError::NotSupported`] for update or delete changes when
    ///   unsupported changes are rejected.
    /// - [`FloeError::InvalidArgument`] for an empty branch name or `main`.
    /// - Conversion, write, lock, and commit errors as for appends.
    pub fn apply_changes(
        &self,
        table_info: &TableIdentity,
        schema: &str,
        changes: &[RecordChange],
        branch: Option<&BranchOptions>,
    ) -> FloeResult<bool> {
        if let Some(options) = branch {
            validate_branch_name(&options.branch)?;
        }
        let inserts = self.collect_inserts(changes)?;

        let mut table = self.ctx.load_table(table_info)?;
        let lock_key = table_info.lock_key();

        if let Some(options) = branch {
            match resolve_branch_conflict(table.has_ref(&options.branch), options.conflict_policy) {
                BranchAction::Proceed => {}
                BranchAction::Fail | BranchAction::Skip => {
                    return self.settle_branch(table.as_mut(), options).map(|_| false);
                }
                BranchAction::Replace => {
                    let _guard = self.lock(&lock_key)?;
                    self.refresh(table.as_mut())?;
                    self.settle_branch(table.as_mut(), options)?;
                }
            }
        }

        let files = self.ctx.write_data_files(table.as_ref(), schema, &inserts)?;

        let outcome = self.lock(&lock_key).and_then(|guard| {
            let committed = self.commit_locked(table.as_mut(), &files, branch);
            drop(guard);
            committed
        });
        match outcome {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.ctx.discard_files(table.as_ref(), &files);
                Ok(false)
            }
            Err(e) => {
                warn!("Change ingestion into {} failed: {}", table.name(), e);
                self.ctx.discard_files(table.as_ref(), &files);
                Err(e)
            }
        }
    }

    /// Extracts the insert records, applying the unsupported change policy
    /// to updates and deletes.
    fn collect_inserts(&self, changes: &[RecordChange]) -> FloeResult<Vec<Bytes>> {
        let mut inserts = Vec::with_capacity(changes.len());
        let mut skipped = 0usize;
        for change in changes {
            match change {
                RecordChange::Insert { record } => {
                    trace!("Inserting record of {} bytes", record.len());
                    inserts.push(record.clone());
                }
                RecordChange::Update { .. } | RecordChange::Delete { .. } => {
                    match self.config.unsupported_changes {
                        UnsupportedChangePolicy::Reject => {
                            return Err(FloeError::NotSupported {
                                operation: format!("{} changes", change.kind()),
                            })
                        }
                        UnsupportedChangePolicy::Skip => skipped += 1,
                    }
                }
            }
        }
        if skipped > 0 {
            warn!("Skipped {} update and delete changes", skipped);
        }
        Ok(inserts)
    }

    /// Takes the table lock when changes are serialized with appends.
    fn lock(&self, key: &LockKey) -> FloeResult<Option<LockGuard<'_>>> {
        if !self.config.serialize_with_appends {
            return Ok(None);
        }
        debug!("Will now acquire lock {}", key);
        self.ctx.locks.acquire(key).map(Some)
    }

    /// Moves the handle to the latest metadata when serialized; the caller
    /// holds the lock.
    fn refresh(&self, table: &mut dyn Table) -> FloeResult<()> {
        if self.config.serialize_with_appends {
            debug!("Will now refresh table {}", table.name());
            table.refresh()?;
        }
        Ok(())
    }

    /// Resolves the target branch against the handle's current refs and
    /// acts on it. Returns false if the changes must be skipped.
    fn settle_branch(&self, table: &mut dyn Table, options: &BranchOptions) -> FloeResult<bool> {
        let exists = table.has_ref(&options.branch);
        match resolve_branch_conflict(exists, options.conflict_policy) {
            BranchAction::Proceed => Ok(true),
            BranchAction::Fail => Err(FloeError::BranchAlreadyExists {
                table: table.name(),
                branch: options.branch.clone(),
            }),
            BranchAction::Skip => {
                info!(
                    "Branch {} already exists on {}, ignoring changes",
                    options.branch,
                    table.name()
                );
                Ok(false)
            }
            BranchAction::Replace => {
                let mut txn = table.new_transaction();
                txn.remove_branch(options.branch.clone());
                table.commit(txn)?;
                info!("Dropped existing branch {} on {}", options.branch, table.name());
                Ok(true)
            }
        }
    }

    /// Refreshes, settles the branch again, and commits the written files.
    /// Returns false if the branch settled to a skip.
    fn commit_locked(
        &self,
        table: &mut dyn Table,
        files: &[DataFile],
        branch: Option<&BranchOptions>,
    ) -> FloeResult<bool> {
        self.refresh(table)?;

        let txn = match branch {
            Some(options) => {
                if !self.settle_branch(table, options)? {
                    return Ok(false);
                }
                let mut txn = table.new_transaction();
                txn.create_branch(options.branch.clone(), None)
                    .append_files_to_branch(options.branch.clone(), files.to_vec());
                txn
            }
            None => {
                let mut txn = table.new_transaction();
                txn.append_files(files.to_vec());
                txn
            }
        };
        table.commit(txn)?;
        info!(
            "Committed {} files of changes to branch {} of {}",
            files.len(),
            branch.map_or(MAIN_BRANCH, |o| o.branch.as_str()),
            table.name()
        );
        Ok(true)
    }
}

fn validate_branch_name(branch: &str) -> FloeResult<()> {
    if branch.is_empty() {
        return Err(FloeError::invalid_argument("branch name must not be empty"));
    }
    if branch == MAIN_BRANCH {
        return Err(FloeError::invalid_argument(format!(
            "changes cannot target the '{MAIN_BRANCH}' branch through branch options"
        )));
    }
    Ok(())
}
