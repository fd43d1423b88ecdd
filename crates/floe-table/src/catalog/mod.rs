//! Catalog and table contracts.
//!
//! Coordinators only ever see a table store through these traits:
//!
//! - [`CatalogLoader`] resolves a catalog id from a request.
//! - [`Catalog`] creates, loads and drops tables.
//! - [`Table`] is a handle pinned to one metadata version. It moves forward
//!   only through [`Table::refresh`] or its own [`Table::commit`].

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use floe_common::{FloeError, FloeResult, TableIdentifier};

use crate::io::FileIo;
use crate::metadata::TableMetadata;
use crate::schema::Schema;
use crate::snapshot::SnapshotRef;
use crate::transaction::Transaction;

/// A namespace of tables backed by one storage location.
pub trait Catalog: Send + Sync {
    /// Returns the catalog name.
    fn name(&self) -> &str;

    /// Creates an empty table.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::TableAlreadyExists`] if the identifier is taken.
    fn create_table(&self, identifier: &TableIdentifier, schema: Schema)
        -> FloeResult<Box<dyn Table>>;

    /// Loads a handle on the table's latest metadata.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::TableNotFound`] for an unknown identifier.
    fn load_table(&self, identifier: &TableIdentifier) -> FloeResult<Box<dyn Table>>;

    /// Drops a table, deleting its data files when `purge` is set. Returns
    /// false if the table did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if purging data files fails.
    fn drop_table(&self, identifier: &TableIdentifier, purge: bool) -> FloeResult<bool>;

    /// Returns true if the table exists.
    fn table_exists(&self, identifier: &TableIdentifier) -> bool;

    /// Returns every table identifier, sorted.
    fn list_tables(&self) -> Vec<TableIdentifier>;

    /// Returns the storage for the catalog's data files.
    fn file_io(&self) -> Arc<dyn FileIo>;
}

/// A handle on one table.
pub trait Table: Send {
    /// Returns the table identifier.
    fn identifier(&self) -> &TableIdentifier;

    /// Returns the metadata this handle currently reads.
    fn metadata(&self) -> &TableMetadata;

    /// Moves the handle to the table's latest metadata.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::TableNotFound`] if the table was dropped.
    fn refresh(&mut self) -> FloeResult<()>;

    /// Atomically applies `txn` to the table's latest metadata. On success
    /// the handle reads the committed metadata.
    ///
    /// # Errors
    ///
    /// - [`FloeError::CommitConflict`] if an update cannot apply to the
    ///   latest metadata, such as creating a branch that now exists.
    /// - [`FloeError::TableNotFound`] if the table was dropped.
    fn commit(&mut self, txn: Transaction) -> FloeResult<()>;

    /// Returns the storage for the table's data files.
    fn file_io(&self) -> Arc<dyn FileIo>;

    /// Returns the fully qualified table name.
    fn name(&self) -> String {
        self.identifier().to_string()
    }

    /// Returns the table schema.
    fn schema(&self) -> &Schema {
        self.metadata().schema()
    }

    /// Returns the base location of the table's files.
    fn location(&self) -> &str {
        self.metadata().location()
    }

    /// Returns every named ref.
    fn refs(&self) -> &BTreeMap<String, SnapshotRef> {
        self.metadata().refs()
    }

    /// Returns true if a ref named `name` exists.
    fn has_ref(&self, name: &str) -> bool {
        self.metadata().has_ref(name)
    }

    /// Starts a transaction based on the metadata this handle reads.
    fn new_transaction(&self) -> Transaction {
        Transaction::new(self.metadata())
    }
}

/// Resolves catalog ids to catalogs.
pub trait CatalogLoader: Send + Sync {
    /// Returns the catalog registered as `catalog_id`.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::CatalogNotFound`] for an unknown id.
    fn load_catalog(&self, catalog_id: &str) -> FloeResult<Arc<dyn Catalog>>;
}

/// Catalog loader over a fixed set of registered catalogs.
#[derive(Default)]
pub struct StaticCatalogLoader {
    catalogs: DashMap<String, Arc<dyn Catalog>>,
}

impl StaticCatalogLoader {
    /// Creates a loader with no catalogs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `catalog` under `catalog_id`, replacing any previous one.
    pub fn register(&self, catalog_id: impl Into<String>, catalog: Arc<dyn Catalog>) {
        self.catalogs.insert(catalog_id.into(), catalog);
    }

    /// Returns the registered catalog ids, sorted.
    pub fn catalog_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.catalogs.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl CatalogLoader for StaticCatalogLoader {
    fn load_catalog(&self, catalog_id: &str) -> FloeResult<Arc<dyn Catalog>> {
        self.catalogs
            .get(catalog_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| FloeError::CatalogNotFound {
                catalog_id: catalog_id.to_string(),
            })
    }
}

impl std::fmt::Debug for StaticCatalogLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCatalogLoader")
            .field("catalogs", &self.catalog_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCatalog;

    #[test]
    fn test_static_loader() {
        let loader = StaticCatalogLoader::new();
        loader.register("warehouse", Arc::new(MemoryCatalog::new("warehouse")));

        let catalog = loader.load_catalog("warehouse").unwrap();
        assert_eq!(catalog.name(), "warehouse");
        assert_eq!(loader.catalog_ids(), vec!["warehouse".to_string()]);

        let err = loader.load_catalog("missing").err().unwrap();
        assert!(matches!(err, FloeError::CatalogNotFound { .. }));
    }
}
