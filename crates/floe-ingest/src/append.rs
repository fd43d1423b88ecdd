//! Idempotent batch appends.
//!
//! # Protocol
//!
//! ```text
//!  load table ──▶ key branch exists? ──yes──▶ return true
//!                        │ no
//!                        ▼
//!              convert + write data files        (no lock held)
//!                        │
//!                        ▼
//!              acquire table lock ───────────────────────────┐
//!                        │                                    │
//!              refresh, key branch exists? ──yes──▶ discard   │ lock
//!                        │ no                       files,    │ held
//!                        ▼                          true      │
//!              one transaction: append files                  │
//!                + create retention branch, commit            │
//!                        │                                    │
//!              release lock ◀─────────────────────────────────┘
//! ```
//!
//! The pre-check skips the expensive write for batches already committed.
//! The check after the lock closes the window between the pre-check and the
//! lock, in which another writer may have committed the same batch. Because
//! the files and the retention branch land in one commit, a batch is either
//! fully visible with its branch or not at all.

use bytes::Bytes;
use tracing::{debug, info, warn};

use floe_common::{FloeResult, IdempotencyKey, TableIdentity};
use floe_table::Table;

use crate::context::IngestContext;
use crate::request::AppendRecordsRequest;

const NO_KEY: &str = "<not present>";

/// Appends batches of insert records, committing each idempotency key at
/// most once per table.
#[derive(Debug, Clone)]
pub struct AppendCoordinator {
    ctx: IngestContext,
}

impl AppendCoordinator {
    /// Creates a coordinator.
    pub fn new(ctx: IngestContext) -> Self {
        Self { ctx }
    }

    /// Handles an append request.
    ///
    /// # Errors
    ///
    /// See [`AppendCoordinator::append`]; an empty idempotency key is a
    /// validation error.
    pub fn process(&self, request: &AppendRecordsRequest) -> FloeResult<bool> {
        let key = request
            .idempotency_key
            .as_deref()
            .map(IdempotencyKey::new)
            .transpose()?;
        let records: Vec<Bytes> = request.records.iter().map(|r| r.record.clone()).collect();
        self.append(&request.table_info, &request.schema, &records, key.as_ref())
    }

    /// Appends `records` to the table and returns true once they are
    /// committed, either by this call or by an earlier call with the same
    /// `key`.
    ///
    /// # Errors
    ///
    /// - Validation errors for a malformed table identity, an unknown
    ///   catalog or table, or an unusable schema. Nothing is written.
    /// - Conversion and write errors, raised before the lock is taken.
    /// - [`FloeError::LockTimeout`](floe_common::FloeError::LockTimeout) if a
    ///   lock timeout is configured and expires.
    /// - Commit errors; the lock is released and nothing is committed.
    pub fn append(
        &self,
        table_info: &TableIdentity,
        schema: &str,
        records: &[Bytes],
        key: Option<&IdempotencyKey>,
    ) -> FloeResult<bool> {
        let mut table = self.ctx.load_table(table_info)?;

        if is_append_done(table.as_ref(), key) {
            return Ok(true);
        }

        let files = self.ctx.write_data_files(table.as_ref(), schema, records)?;
        info!(
            "Completed writing {} records into {} files for {}",
            files.iter().map(|f| f.record_count).sum::<u64>(),
            files.len(),
            table.name()
        );

        let key_label = key.map_or(NO_KEY, IdempotencyKey::as_str);
        let lock_key = table_info.lock_key();
        info!(
            "Will now acquire lock {} for {} (idempotency key {})",
            lock_key,
            table.name(),
            key_label
        );

        let outcome = match self.ctx.locks.acquire(&lock_key) {
            Ok(guard) => {
                info!("Acquired lock for {} (idempotency key {})", table.name(), key_label);
                let outcome = self.commit_locked(table.as_mut(), &files, key);
                drop(guard);
                info!("Released lock for {} (idempotency key {})", table.name(), key_label);
                outcome
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(Committed::Now) => Ok(true),
            Ok(Committed::Earlier) => {
                self.ctx.discard_files(table.as_ref(), &files);
                Ok(true)
            }
            Err(e) => {
                warn!(
                    "Append to {} (idempotency key {}) failed: {}",
                    table.name(),
                    key_label,
                    e
                );
                self.ctx.discard_files(table.as_ref(), &files);
                Err(e)
            }
        }
    }

    /// Runs the part of the protocol that needs the table lock.
    fn commit_locked(
        &self,
        table: &mut dyn Table,
        files: &[floe_table::DataFile],
        key: Option<&IdempotencyKey>,
    ) -> FloeResult<Committed> {
        debug!("Will now refresh table {}", table.name());
        table.refresh()?;
        if is_append_done(table, key) {
            return Ok(Committed::Earlier);
        }

        let mut txn = table.new_transaction();
        txn.append_files(files.to_vec());
        if let Some(key) = key {
            let branch = key.retention_branch();
            debug!("Will now create retention branch {} on {}", branch.name(), table.name());
            txn.create_branch(branch.name(), Some(branch.max_ref_age()));
        }

        info!("Will now commit {} files to {}", files.len(), table.name());
        table.commit(txn)?;
        info!("Committed transaction on {}", table.name());
        Ok(Committed::Now)
    }
}

/// How a batch came to be committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Committed {
    /// By this call.
    Now,
    /// By an earlier call with the same key.
    Earlier,
}

/// Returns true if the batch with `key` is already committed to `table`.
fn is_append_done(table: &dyn Table, key: Option<&IdempotencyKey>) -> bool {
    let Some(key) = key else {
        return false;
    };
    if table.has_ref(&key.branch_name()) {
        warn!(
            "Already committed work found on {} for idempotency key {}",
            table.name(),
            key.as_str()
        );
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{records, Harness, SCHEMA};
    use floe_common::{ErrorKind, FloeError, LockKey, TableIdentifier};
    use floe_lock::{LockGuard, LockManager, TableLockManager};
    use floe_table::{Catalog, MemoryCatalog, TableScan};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_append_without_key() {
        let h = Harness::new();
        let coordinator = AppendCoordinator::new(h.ctx.clone());

        assert!(coordinator.append(&h.table_info, SCHEMA, &records(0..10), None).unwrap());
        assert!(coordinator.append(&h.table_info, SCHEMA, &records(0..10), None).unwrap());

        let table = h.load();
        assert_eq!(TableScan::new(table.as_ref()).count().unwrap(), 20);
        assert_eq!(table.refs().len(), 1);
    }

    #[test]
    fn test_append_with_key_is_idempotent() {
        let h = Harness::new();
        let coordinator = AppendCoordinator::new(h.ctx.clone());
        let key = IdempotencyKey::new("batch-1").unwrap();

        assert!(coordinator
            .append(&h.table_info, SCHEMA, &records(0..10), Some(&key))
            .unwrap());
        assert!(coordinator
            .append(&h.table_info, SCHEMA, &records(0..10), Some(&key))
            .unwrap());

        let table = h.load();
        assert_eq!(TableScan::new(table.as_ref()).count().unwrap(), 10);
        assert!(table.has_ref("__peerdb-idem-batch-1"));
        assert_eq!(table.metadata().commit_log().len(), 1);
    }

    #[test]
    fn test_retention_branch_points_at_appended_snapshot() {
        let h = Harness::new();
        let coordinator = AppendCoordinator::new(h.ctx.clone());
        let key = IdempotencyKey::new("k").unwrap();
        coordinator
            .append(&h.table_info, SCHEMA, &records(0..3), Some(&key))
            .unwrap();

        let table = h.load();
        let branch = table.metadata().snapshot_ref(&key.branch_name()).unwrap();
        assert_eq!(branch.max_ref_age_ms, Some(7 * 24 * 60 * 60 * 1000));
        assert_eq!(
            branch.snapshot_id,
            table.metadata().current_snapshot().map(|s| s.snapshot_id)
        );
    }

    #[test]
    fn test_conversion_error_takes_no_lock() {
        let h = Harness::new();
        let coordinator = AppendCoordinator::new(h.ctx.clone());
        let bad = vec![Bytes::from_static(b"{\"id\":\"x\"}")];

        let err = coordinator.append(&h.table_info, SCHEMA, &bad, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conversion);
        assert_eq!(h.locks.stats().snapshot().acquisitions, 0);
        assert!(h.load().metadata().commit_log().is_empty());
    }

    #[test]
    fn test_unknown_table_and_catalog() {
        let h = Harness::new();
        let coordinator = AppendCoordinator::new(h.ctx.clone());

        let missing_table = TableIdentity::new("local", ["db"], "missing");
        let err = coordinator.append(&missing_table, SCHEMA, &records(0..1), None).unwrap_err();
        assert!(matches!(err, FloeError::TableNotFound { .. }));

        let missing_catalog = TableIdentity::new("nope", ["db"], "events");
        let err = coordinator.append(&missing_catalog, SCHEMA, &records(0..1), None).unwrap_err();
        assert!(matches!(err, FloeError::CatalogNotFound { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_empty_key_rejected() {
        let h = Harness::new();
        let coordinator = AppendCoordinator::new(h.ctx.clone());
        let request = AppendRecordsRequest {
            table_info: h.table_info.clone(),
            schema: SCHEMA.to_string(),
            records: Vec::new(),
            idempotency_key: Some(String::new()),
        };
        let err = coordinator.process(&request).unwrap_err();
        assert!(matches!(err, FloeError::InvalidArgument { .. }));
    }

    #[test]
    fn test_lock_released_after_commit() {
        let h = Harness::new();
        let coordinator = AppendCoordinator::new(h.ctx.clone());
        coordinator.append(&h.table_info, SCHEMA, &records(0..2), None).unwrap();

        assert!(!h.locks.is_locked(&h.table_info.lock_key()));
        let stats = h.locks.stats().snapshot();
        assert_eq!(stats.acquisitions, 1);
        assert_eq!(stats.releases, 1);
    }

    #[test]
    fn test_lock_timeout_discards_files() {
        let h = Harness::with_lock_timeout(Duration::from_millis(50));
        let coordinator = AppendCoordinator::new(h.ctx.clone());

        let _held = h.locks.acquire(&h.table_info.lock_key()).unwrap();
        let err = coordinator
            .append(&h.table_info, SCHEMA, &records(0..5), None)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::LockAcquisition);
        assert!(err.is_retryable());
        assert_eq!(h.file_io.file_count(), 0);
        assert!(h.load().metadata().commit_log().is_empty());
    }

    #[test]
    fn test_dotted_spelling_shares_the_table_lock() {
        let h = Harness::with_lock_timeout(Duration::from_millis(50));
        let coordinator = AppendCoordinator::new(h.ctx.clone());
        let dotted = TableIdentity::new("local", Vec::<String>::new(), "db.events");

        let held = h.locks.acquire(&h.table_info.lock_key()).unwrap();
        let err = coordinator
            .append(&dotted, SCHEMA, &records(0..5), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockAcquisition);
        assert!(h.load().metadata().commit_log().is_empty());
        drop(held);

        let key = IdempotencyKey::new("k1").unwrap();
        assert!(coordinator
            .append(&h.table_info, SCHEMA, &records(0..5), Some(&key))
            .unwrap());
        assert!(coordinator
            .append(&dotted, SCHEMA, &records(0..5), Some(&key))
            .unwrap());
        assert_eq!(h.load().metadata().commit_log().len(), 1);
    }

    /// Drops the table while granting the lock, so everything after the
    /// lock fails.
    struct DroppingLocks {
        inner: TableLockManager,
        catalog: Arc<MemoryCatalog>,
        table: TableIdentifier,
    }

    impl LockManager for DroppingLocks {
        fn acquire(&self, key: &LockKey) -> FloeResult<LockGuard<'_>> {
            self.catalog.drop_table(&self.table, false)?;
            self.inner.acquire(key)
        }
    }

    #[test]
    fn test_failure_under_lock_releases_lock() {
        let h = Harness::new();
        let locks = Arc::new(DroppingLocks {
            inner: TableLockManager::new(),
            catalog: Arc::clone(&h.catalog),
            table: h.table_info.identifier(),
        });
        let ctx = IngestContext {
            locks: Arc::clone(&locks) as Arc<dyn LockManager>,
            ..h.ctx.clone()
        };
        let coordinator = AppendCoordinator::new(ctx);

        let err = coordinator
            .append(&h.table_info, SCHEMA, &records(0..5), None)
            .unwrap_err();
        assert!(matches!(err, FloeError::TableNotFound { .. }));
        assert!(!locks.inner.is_locked(&h.table_info.lock_key()));
        assert_eq!(locks.inner.stats().snapshot().releases, 1);
        assert_eq!(h.file_io.file_count(), 0);
    }
}
