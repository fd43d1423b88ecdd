//! Collaborators shared by the coordinators.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};

use floe_common::{FloeResult, TableIdentity};
use floe_lock::LockManager;
use floe_pipeline::{ConversionPool, PipelineFactory};
use floe_table::{CatalogLoader, DataFile, Table};

/// The collaborators a coordinator is built from.
#[derive(Clone)]
pub struct IngestContext {
    /// Resolves catalog ids.
    pub catalogs: Arc<dyn CatalogLoader>,
    /// Serializes commits per table.
    pub locks: Arc<dyn LockManager>,
    /// Opens record pipelines.
    pub pipelines: Arc<dyn PipelineFactory>,
    /// Converts records in parallel.
    pub pool: Arc<ConversionPool>,
}

impl IngestContext {
    /// Bundles the collaborators.
    pub fn new(
        catalogs: Arc<dyn CatalogLoader>,
        locks: Arc<dyn LockManager>,
        pipelines: Arc<dyn PipelineFactory>,
        pool: Arc<ConversionPool>,
    ) -> Self {
        Self {
            catalogs,
            locks,
            pipelines,
            pool,
        }
    }

    /// Validates `table_info` and loads the table it names.
    pub(crate) fn load_table(&self, table_info: &TableIdentity) -> FloeResult<Box<dyn Table>> {
        table_info.validate()?;
        let catalog = self.catalogs.load_catalog(&table_info.catalog_id)?;
        catalog.load_table(&table_info.identifier())
    }

    /// Converts and writes `records` into data files of `table`.
    pub(crate) fn write_data_files(
        &self,
        table: &dyn Table,
        schema: &str,
        records: &[Bytes],
    ) -> FloeResult<Vec<DataFile>> {
        let pipeline = self.pipelines.open(table, schema)?;
        info!("Will now write {} records to {}", records.len(), table.name());
        self.pool.write_records(pipeline, records)
    }

    /// Deletes data files that will never be committed.
    pub(crate) fn discard_files(&self, table: &dyn Table, files: &[DataFile]) {
        let file_io = table.file_io();
        for file in files {
            if let Err(e) = file_io.delete(&file.path) {
                warn!(
                    "Failed to delete uncommitted data file {} of {}: {}",
                    file.path,
                    table.name(),
                    e
                );
            }
        }
    }
}

impl fmt::Debug for IngestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestContext")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
