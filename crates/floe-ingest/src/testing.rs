//! Shared fixtures for unit tests.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use floe_common::TableIdentity;
use floe_lock::{LockManagerConfig, TableLockManager};
use floe_pipeline::{ConversionPool, JsonPipelineFactory};
use floe_table::{
    Catalog, MemoryCatalog, MemoryFileIo, Schema, StaticCatalogLoader, SystemClock, Table,
};

use crate::append::AppendCoordinator;
use crate::context::IngestContext;

pub(crate) const SCHEMA: &str =
    r#"{"type":"record","name":"events","fields":[{"name":"id","type":"long"}]}"#;

/// Encodes one `{"id": n}` record per value in `range`.
pub(crate) fn records(range: Range<i64>) -> Vec<Bytes> {
    range
        .map(|id| Bytes::from(format!(r#"{{"id":{id}}}"#)))
        .collect()
}

/// A `local` catalog holding the empty table `db.events`.
pub(crate) struct Harness {
    pub ctx: IngestContext,
    pub table_info: TableIdentity,
    pub locks: Arc<TableLockManager>,
    pub catalog: Arc<MemoryCatalog>,
    pub file_io: Arc<MemoryFileIo>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(TableLockManager::new())
    }

    pub fn with_lock_timeout(timeout: Duration) -> Self {
        Self::build(TableLockManager::with_config(LockManagerConfig {
            acquire_timeout: Some(timeout),
        }))
    }

    fn build(locks: TableLockManager) -> Self {
        let file_io = Arc::new(MemoryFileIo::new());
        let catalog = Arc::new(MemoryCatalog::with_file_io(
            "local",
            Arc::clone(&file_io) as _,
            Arc::new(SystemClock),
        ));
        let table_info = TableIdentity::new("local", ["db"], "events");
        catalog
            .create_table(
                &table_info.identifier(),
                Schema::from_avro_json(SCHEMA).unwrap(),
            )
            .unwrap();

        let loader = Arc::new(StaticCatalogLoader::new());
        loader.register("local", Arc::clone(&catalog) as _);
        let locks = Arc::new(locks);
        let ctx = IngestContext::new(
            loader,
            Arc::clone(&locks) as _,
            Arc::new(JsonPipelineFactory::new(4)),
            Arc::new(ConversionPool::new(2).unwrap()),
        );
        Self {
            ctx,
            table_info,
            locks,
            catalog,
            file_io,
        }
    }

    /// Loads a fresh handle on `db.events`.
    pub fn load(&self) -> Box<dyn Table> {
        self.catalog.load_table(&self.table_info.identifier()).unwrap()
    }

    /// Appends `{"id": n}` records without an idempotency key.
    pub fn append(&self, range: Range<i64>) {
        AppendCoordinator::new(self.ctx.clone())
            .append(&self.table_info, SCHEMA, &records(range), None)
            .unwrap();
    }
}
