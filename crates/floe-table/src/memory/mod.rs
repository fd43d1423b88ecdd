//! In-memory catalog implementation.
//!
//! Each table's latest metadata sits behind one `RwLock`. Commits take the
//! write lock, apply the transaction to the latest metadata, and swap the
//! result in, so concurrent commits to one table are serialized by the store
//! itself. Handles keep an `Arc` of the metadata they read and never observe
//! a partially applied commit.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use floe_common::{FloeError, FloeResult, TableIdentifier};

use crate::catalog::{Catalog, Table};
use crate::clock::{Clock, SystemClock};
use crate::io::{FileIo, MemoryFileIo};
use crate::metadata::TableMetadata;
use crate::schema::Schema;
use crate::transaction::Transaction;

struct TableState {
    metadata: RwLock<Arc<TableMetadata>>,
    dropped: AtomicBool,
}

impl TableState {
    /// Returns the latest metadata after expiring outdated refs.
    fn latest(&self, now_ms: u64) -> Arc<TableMetadata> {
        {
            let current = self.metadata.read();
            if !current.has_expired_refs(now_ms) {
                return Arc::clone(&current);
            }
        }

        let mut current = self.metadata.write();
        if current.has_expired_refs(now_ms) {
            let mut next = TableMetadata::clone(&current);
            let expired = next.expire_refs(now_ms);
            debug!("Expired branch refs {:?} on {}", expired, next.identifier());
            *current = Arc::new(next);
        }
        Arc::clone(&current)
    }
}

/// Catalog holding every table in process memory.
pub struct MemoryCatalog {
    name: String,
    tables: DashMap<TableIdentifier, Arc<TableState>>,
    file_io: Arc<dyn FileIo>,
    clock: Arc<dyn Clock>,
}

impl MemoryCatalog {
    /// Creates an empty catalog on the system clock.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_clock(name, Arc::new(SystemClock))
    }

    /// Creates an empty catalog on the given clock.
    pub fn with_clock(name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self::with_file_io(name, Arc::new(MemoryFileIo::new()), clock)
    }

    /// Creates an empty catalog writing data files through `file_io`.
    pub fn with_file_io(
        name: impl Into<String>,
        file_io: Arc<dyn FileIo>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            tables: DashMap::new(),
            file_io,
            clock,
        }
    }

    /// Returns the number of tables.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    fn location_for(&self, identifier: &TableIdentifier) -> String {
        let mut location = format!("mem://{}", self.name);
        for segment in identifier.namespace() {
            location.push('/');
            location.push_str(segment);
        }
        location.push('/');
        location.push_str(identifier.name());
        location
    }

    fn state(&self, identifier: &TableIdentifier) -> FloeResult<Arc<TableState>> {
        self.tables
            .get(identifier)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| FloeError::TableNotFound {
                table: identifier.to_string(),
            })
    }

    fn handle(&self, state: Arc<TableState>) -> MemoryTable {
        let view = state.latest(self.clock.now_ms());
        MemoryTable {
            view,
            state,
            file_io: Arc::clone(&self.file_io),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl Catalog for MemoryCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_table(
        &self,
        identifier: &TableIdentifier,
        schema: Schema,
    ) -> FloeResult<Box<dyn Table>> {
        let state = match self.tables.entry(identifier.clone()) {
            Entry::Occupied(_) => {
                return Err(FloeError::TableAlreadyExists {
                    table: identifier.to_string(),
                })
            }
            Entry::Vacant(vacant) => {
                let metadata = TableMetadata::new(
                    identifier.clone(),
                    self.location_for(identifier),
                    schema,
                    self.clock.now_ms(),
                );
                let state = Arc::new(TableState {
                    metadata: RwLock::new(Arc::new(metadata)),
                    dropped: AtomicBool::new(false),
                });
                vacant.insert(Arc::clone(&state));
                state
            }
        };

        info!("Created table {} in catalog {}", identifier, self.name);
        Ok(Box::new(self.handle(state)))
    }

    fn load_table(&self, identifier: &TableIdentifier) -> FloeResult<Box<dyn Table>> {
        let state = self.state(identifier)?;
        Ok(Box::new(self.handle(state)))
    }

    fn drop_table(&self, identifier: &TableIdentifier, purge: bool) -> FloeResult<bool> {
        let Some((_, state)) = self.tables.remove(identifier) else {
            return Ok(false);
        };

        let metadata = {
            let current = state.metadata.write();
            state.dropped.store(true, Ordering::SeqCst);
            Arc::clone(&current)
        };

        if purge {
            let paths: BTreeSet<&str> = metadata
                .snapshots()
                .flat_map(|snapshot| snapshot.data_files.iter().map(|f| f.path.as_str()))
                .collect();
            let mut deleted = 0usize;
            for path in paths {
                if self.file_io.delete(path)? {
                    deleted += 1;
                }
            }
            info!(
                "Dropped table {} in catalog {} and purged {} data files",
                identifier, self.name, deleted
            );
        } else {
            info!("Dropped table {} in catalog {}", identifier, self.name);
        }
        Ok(true)
    }

    fn table_exists(&self, identifier: &TableIdentifier) -> bool {
        self.tables.contains_key(identifier)
    }

    fn list_tables(&self) -> Vec<TableIdentifier> {
        let mut tables: Vec<TableIdentifier> =
            self.tables.iter().map(|e| e.key().clone()).collect();
        tables.sort();
        tables
    }

    fn file_io(&self) -> Arc<dyn FileIo> {
        Arc::clone(&self.file_io)
    }
}

impl fmt::Debug for MemoryCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCatalog")
            .field("name", &self.name)
            .field("tables", &self.tables.len())
            .finish()
    }
}

/// Handle on a table of a [`MemoryCatalog`].
pub struct MemoryTable {
    view: Arc<TableMetadata>,
    state: Arc<TableState>,
    file_io: Arc<dyn FileIo>,
    clock: Arc<dyn Clock>,
}

impl MemoryTable {
    fn ensure_live(&self) -> FloeResult<()> {
        if self.state.dropped.load(Ordering::SeqCst) {
            return Err(FloeError::TableNotFound {
                table: self.view.identifier().to_string(),
            });
        }
        Ok(())
    }
}

impl Table for MemoryTable {
    fn identifier(&self) -> &TableIdentifier {
        self.view.identifier()
    }

    fn metadata(&self) -> &TableMetadata {
        &self.view
    }

    fn refresh(&mut self) -> FloeResult<()> {
        self.ensure_live()?;
        self.view = self.state.latest(self.clock.now_ms());
        Ok(())
    }

    fn commit(&mut self, txn: Transaction) -> FloeResult<()> {
        if txn.is_empty() {
            return Ok(());
        }
        if txn.table() != self.view.identifier() {
            return Err(FloeError::invalid_argument(format!(
                "transaction for '{}' committed to '{}'",
                txn.table(),
                self.view.identifier()
            )));
        }

        let now = self.clock.now_ms();
        let mut current = self.state.metadata.write();
        self.ensure_live()?;

        let mut base = TableMetadata::clone(&current);
        base.expire_refs(now);
        if txn.base_version() != base.version() {
            debug!(
                "Rebasing transaction on {} from version {} onto version {}",
                base.identifier(),
                txn.base_version(),
                base.version()
            );
        }

        let next = txn.apply(base, now).map_err(|e| FloeError::CommitConflict {
            table: self.view.identifier().to_string(),
            reason: e.to_string(),
        })?;

        debug!(
            "Committed {} updates to {} at version {}",
            txn.updates().len(),
            next.identifier(),
            next.version()
        );
        *current = Arc::new(next);
        self.view = Arc::clone(&current);
        Ok(())
    }

    fn file_io(&self) -> Arc<dyn FileIo> {
        Arc::clone(&self.file_io)
    }
}

impl fmt::Debug for MemoryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTable")
            .field("table", self.view.identifier())
            .field("version", &self.view.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::io::DataFile;
    use crate::schema::{Field, FieldType, Row, Value};
    use std::time::Duration;

    fn schema() -> Schema {
        Schema::new(vec![Field::required(1, "id", FieldType::Long)]).unwrap()
    }

    fn write_file(table: &dyn Table, path: &str, n: i64) -> DataFile {
        let rows = (0..n).map(|i| Row::new(vec![Value::Long(i)])).collect();
        table
            .file_io()
            .write_rows(&format!("{}/data/{path}", table.location()), rows)
            .unwrap()
    }

    #[test]
    fn test_create_and_load() {
        let catalog = MemoryCatalog::new("local");
        let id = TableIdentifier::parse("db.events");
        let table = catalog.create_table(&id, schema()).unwrap();
        assert_eq!(table.location(), "mem://local/db/events");

        assert!(catalog.table_exists(&id));
        assert!(matches!(
            catalog.create_table(&id, schema()).err().unwrap(),
            FloeError::TableAlreadyExists { .. }
        ));
        assert!(matches!(
            catalog.load_table(&TableIdentifier::parse("db.nope")).err().unwrap(),
            FloeError::TableNotFound { .. }
        ));
    }

    #[test]
    fn test_handles_are_isolated_until_refresh() {
        let catalog = MemoryCatalog::new("local");
        let id = TableIdentifier::parse("db.events");
        let mut writer = catalog.create_table(&id, schema()).unwrap();
        let mut reader = catalog.load_table(&id).unwrap();

        let file = write_file(writer.as_ref(), "a", 3);
        let mut txn = writer.new_transaction();
        txn.append_files(vec![file]).create_branch("tag", None);
        writer.commit(txn).unwrap();

        assert!(writer.has_ref("tag"));
        assert!(!reader.has_ref("tag"));
        reader.refresh().unwrap();
        assert!(reader.has_ref("tag"));
        assert_eq!(reader.metadata().version(), 1);
    }

    #[test]
    fn test_stale_handle_commit_rebases() {
        let catalog = MemoryCatalog::new("local");
        let id = TableIdentifier::parse("t");
        let mut a = catalog.create_table(&id, schema()).unwrap();
        let mut b = catalog.load_table(&id).unwrap();

        let mut txn = a.new_transaction();
        txn.append_files(vec![write_file(a.as_ref(), "a", 2)]);
        a.commit(txn).unwrap();

        let mut txn = b.new_transaction();
        txn.append_files(vec![write_file(b.as_ref(), "b", 5)]);
        b.commit(txn).unwrap();

        let head = b.metadata().current_snapshot().unwrap();
        assert_eq!(head.summary.total_records, 7);
        assert_eq!(b.metadata().version(), 2);
    }

    #[test]
    fn test_conflicting_branch_create_fails_whole_commit() {
        let catalog = MemoryCatalog::new("local");
        let id = TableIdentifier::parse("t");
        let mut a = catalog.create_table(&id, schema()).unwrap();
        let mut b = catalog.load_table(&id).unwrap();

        let mut txn = a.new_transaction();
        txn.create_branch("marker", None);
        a.commit(txn).unwrap();

        let mut txn = b.new_transaction();
        txn.append_files(vec![write_file(b.as_ref(), "b", 5)])
            .create_branch("marker", None);
        let err = b.commit(txn).unwrap_err();
        assert!(matches!(err, FloeError::CommitConflict { .. }));

        b.refresh().unwrap();
        assert!(b.metadata().current_snapshot().is_none());
        assert_eq!(b.metadata().commit_log().len(), 1);
    }

    #[test]
    fn test_refs_expire_on_clock() {
        let clock = Arc::new(ManualClock::new(1_000));
        let catalog = MemoryCatalog::with_clock("local", Arc::clone(&clock) as Arc<dyn Clock>);
        let id = TableIdentifier::parse("t");
        let mut table = catalog.create_table(&id, schema()).unwrap();

        let mut txn = table.new_transaction();
        txn.create_branch("short", Some(Duration::from_secs(60)));
        table.commit(txn).unwrap();

        clock.advance(Duration::from_secs(30));
        table.refresh().unwrap();
        assert!(table.has_ref("short"));

        clock.advance(Duration::from_secs(31));
        table.refresh().unwrap();
        assert!(!table.has_ref("short"));
        assert!(table.has_ref("main"));
    }

    #[test]
    fn test_drop_table() {
        let catalog = MemoryCatalog::new("local");
        let id = TableIdentifier::parse("t");
        let mut table = catalog.create_table(&id, schema()).unwrap();

        let file = write_file(table.as_ref(), "a", 1);
        let path = file.path.clone();
        let mut txn = table.new_transaction();
        txn.append_files(vec![file]);
        table.commit(txn).unwrap();

        assert!(catalog.drop_table(&id, true).unwrap());
        assert!(!catalog.drop_table(&id, true).unwrap());
        assert!(!catalog.file_io().exists(&path));
        assert!(matches!(
            table.refresh().unwrap_err(),
            FloeError::TableNotFound { .. }
        ));
    }

    #[test]
    fn test_drop_without_purge_keeps_files() {
        let catalog = MemoryCatalog::new("local");
        let id = TableIdentifier::parse("t");
        let mut table = catalog.create_table(&id, schema()).unwrap();
        let file = write_file(table.as_ref(), "a", 1);
        let path = file.path.clone();
        let mut txn = table.new_transaction();
        txn.append_files(vec![file]);
        table.commit(txn).unwrap();

        assert!(catalog.drop_table(&id, false).unwrap());
        assert!(catalog.file_io().exists(&path));
        assert_eq!(catalog.list_tables(), Vec::<TableIdentifier>::new());
    }
}
