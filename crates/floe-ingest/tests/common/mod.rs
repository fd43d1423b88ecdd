//! Shared setup for floe-ingest integration tests.

#![allow(dead_code)]

use std::ops::Range;
use std::sync::Arc;

use floe_common::config::IngestConfig;
use floe_common::IdempotencyKey;
use floe_ingest::{
    AppendRecordsRequest, CountRecordRequest, CreateTableRequest, IngestService, InsertRecord,
    TableInfo,
};
use floe_lock::TableLockManager;
use floe_pipeline::JsonPipelineFactory;
use floe_table::{Catalog, ManualClock, MemoryCatalog, MemoryFileIo, StaticCatalogLoader, Table};

pub const SCHEMA: &str = r#"{"type":"record","name":"events","fields":[
    {"name":"id","type":"long"},
    {"name":"payload","type":["null","string"],"default":null}
]}"#;

/// Start of the manual clock: 2024-01-01T00:00:00Z.
pub const EPOCH_MS: u64 = 1_704_067_200_000;

/// A service over one in-memory `local` catalog.
pub struct TestEnv {
    pub service: IngestService,
    pub catalog: Arc<MemoryCatalog>,
    pub file_io: Arc<MemoryFileIo>,
    pub locks: Arc<TableLockManager>,
    pub clock: Arc<ManualClock>,
}

impl TestEnv {
    pub fn new() -> Self {
        let file_io = Arc::new(MemoryFileIo::new());
        let clock = Arc::new(ManualClock::new(EPOCH_MS));
        let catalog = Arc::new(MemoryCatalog::with_file_io(
            "local",
            Arc::clone(&file_io) as _,
            Arc::clone(&clock) as _,
        ));
        let loader = Arc::new(StaticCatalogLoader::new());
        loader.register("local", Arc::clone(&catalog) as _);

        let config = IngestConfig::for_testing();
        let locks = Arc::new(TableLockManager::new());
        let service = IngestService::new(
            loader,
            Arc::clone(&locks) as _,
            Arc::new(JsonPipelineFactory::new(25)),
            &config,
        )
        .unwrap();

        Self {
            service,
            catalog,
            file_io,
            locks,
            clock,
        }
    }

    /// Creates `db.<name>` and returns its identity.
    pub fn create_table(&self, name: &str) -> TableInfo {
        let table_info = TableInfo::new("local", ["db"], name);
        self.service
            .create_table(&CreateTableRequest {
                table_info: table_info.clone(),
                schema: SCHEMA.to_string(),
            })
            .unwrap();
        table_info
    }

    pub fn load(&self, table_info: &TableInfo) -> Box<dyn Table> {
        self.catalog.load_table(&table_info.identifier()).unwrap()
    }

    pub fn count(&self, table_info: &TableInfo) -> u64 {
        self.service
            .count_records(&CountRecordRequest {
                table_info: table_info.clone(),
            })
            .unwrap()
    }
}

/// An append request for `{"id": n}` records, one per value in `ids`.
pub fn append_request(table_info: &TableInfo, ids: Range<i64>, key: Option<&str>) -> AppendRecordsRequest {
    AppendRecordsRequest {
        table_info: table_info.clone(),
        schema: SCHEMA.to_string(),
        records: ids
            .map(|id| InsertRecord::new(format!(r#"{{"id":{id},"payload":"row-{id}"}}"#)))
            .collect(),
        idempotency_key: key.map(str::to_string),
    }
}

pub fn branch_for(key: &str) -> String {
    IdempotencyKey::new(key).unwrap().branch_name()
}
