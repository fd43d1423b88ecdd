//! Request-level entry point.

use std::sync::Arc;

use tracing::{debug, info};

use floe_common::config::IngestConfig;
use floe_common::FloeResult;
use floe_lock::{LockManager, LockManagerConfig, TableLockManager};
use floe_pipeline::{ConversionPool, JsonPipelineFactory, PipelineFactory};
use floe_table::{CatalogLoader, Schema, TableScan};

use crate::append::AppendCoordinator;
use crate::changes::ChangeIngestor;
use crate::context::IngestContext;
use crate::request::{
    AppendRecordsRequest, CountRecordRequest, CreateTableRequest, DropTableRequest,
    IngestRequest, IngestResponse, InsertChangesRequest,
};

/// Handles every ingestion request against the catalogs of one loader.
#[derive(Debug, Clone)]
pub struct IngestService {
    ctx: IngestContext,
    appends: AppendCoordinator,
    changes: ChangeIngestor,
}

impl IngestService {
    /// Creates a service from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the conversion pool cannot
    /// be started.
    pub fn new(
        catalogs: Arc<dyn CatalogLoader>,
        locks: Arc<dyn LockManager>,
        pipelines: Arc<dyn PipelineFactory>,
        config: &IngestConfig,
    ) -> FloeResult<Self> {
        config.validate()?;
        let pool = Arc::new(ConversionPool::from_config(&config.writer)?);
        let ctx = IngestContext::new(catalogs, locks, pipelines, pool);
        Ok(Self {
            appends: AppendCoordinator::new(ctx.clone()),
            changes: ChangeIngestor::new(ctx.clone(), config.changes.clone()),
            ctx,
        })
    }

    /// Creates a service with the in-process lock manager and the JSON
    /// record pipeline, both configured from `config`.
    ///
    /// # Errors
    ///
    /// See [`IngestService::new`].
    pub fn from_config(catalogs: Arc<dyn CatalogLoader>, config: &IngestConfig) -> FloeResult<Self> {
        let locks = Arc::new(TableLockManager::with_config(LockManagerConfig::from(
            &config.lock,
        )));
        let pipelines = Arc::new(JsonPipelineFactory::from_config(&config.writer));
        Self::new(catalogs, locks, pipelines, config)
    }

    /// Returns the append coordinator.
    pub fn appends(&self) -> &AppendCoordinator {
        &self.appends
    }

    /// Returns the change ingestor.
    pub fn changes(&self) -> &ChangeIngestor {
        &self.changes
    }

    /// Creates a table from the request's Avro record schema and returns its
    /// fully qualified name.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed identity or schema, an
    /// unknown catalog, or an existing table.
    pub fn create_table(&self, request: &CreateTableRequest) -> FloeResult<String> {
        let info = &request.table_info;
        info.validate()?;
        let catalog = self.ctx.catalogs.load_catalog(&info.catalog_id)?;
        let schema = Schema::from_avro_json(&request.schema)?;

        info!("Will now create table {}", info);
        let table = catalog.create_table(&info.identifier(), schema)?;
        info!("Created table {}", info);
        Ok(table.name())
    }

    /// Drops a table; returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed identity or unknown
    /// catalog, or an error if purging fails.
    pub fn drop_table(&self, request: &DropTableRequest) -> FloeResult<bool> {
        let info = &request.table_info;
        info.validate()?;
        let catalog = self.ctx.catalogs.load_catalog(&info.catalog_id)?;
        catalog.drop_table(&info.identifier(), request.purge)
    }

    /// Appends a batch of records. See [`AppendCoordinator::append`].
    ///
    /// # Errors
    ///
    /// See [`AppendCoordinator::append`].
    pub fn append_records(&self, request: &AppendRecordsRequest) -> FloeResult<bool> {
        self.appends.process(request)
    }

    /// Applies changes. See [`ChangeIngestor::apply_changes`].
    ///
    /// # Errors
    ///
    /// See [`ChangeIngestor::apply_changes`].
    pub fn insert_changes(&self, request: &InsertChangesRequest) -> FloeResult<bool> {
        self.changes.process(request)
    }

    /// Counts the rows on the table's `main` branch by scanning every data
    /// file.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown table, or an error if a
    /// data file cannot be read.
    pub fn count_records(&self, request: &CountRecordRequest) -> FloeResult<u64> {
        let table = self.ctx.load_table(&request.table_info)?;
        debug!("Counting records of {} with schema {:?}", table.name(), table.schema());
        TableScan::new(table.as_ref()).count()
    }

    /// Dispatches any request.
    ///
    /// # Errors
    ///
    /// Returns the error of the operation the request names.
    pub fn handle(&self, request: &IngestRequest) -> FloeResult<IngestResponse> {
        debug!("Handling {} request for {}", request.op(), request.table_info());
        match request {
            IngestRequest::CreateTable(r) => self
                .create_table(r)
                .map(|table| IngestResponse::TableCreated { table }),
            IngestRequest::DropTable(r) => self
                .drop_table(r)
                .map(|dropped| IngestResponse::TableDropped { dropped }),
            IngestRequest::AppendRecords(r) => self
                .append_records(r)
                .map(|committed| IngestResponse::RecordsAppended { committed }),
            IngestRequest::InsertChanges(r) => self
                .insert_changes(r)
                .map(|applied| IngestResponse::ChangesInserted { applied }),
            IngestRequest::CountRecords(r) => self
                .count_records(r)
                .map(|count| IngestResponse::RecordCount { count }),
        }
    }
}
