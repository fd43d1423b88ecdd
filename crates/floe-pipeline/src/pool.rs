//! Bounded record conversion pool.

use bytes::Bytes;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};

use floe_common::config::WriterConfig;
use floe_common::{FloeError, FloeResult, MAX_CONVERSION_THREADS};
use floe_table::{DataFile, Row};

use crate::pipeline::RecordPipeline;

/// Dedicated rayon pool that converts records in parallel.
///
/// Conversion fans out across the pool; the converted rows are then written
/// sequentially by the calling thread, so the pipeline's writer is never
/// shared.
pub struct ConversionPool {
    pool: ThreadPool,
}

impl ConversionPool {
    /// Creates a pool with `threads` workers.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::InvalidArgument`] for a thread count outside
    /// `1..=MAX_CONVERSION_THREADS`, or [`FloeError::Internal`] if the pool
    /// cannot be started.
    pub fn new(threads: usize) -> FloeResult<Self> {
        if threads == 0 || threads > MAX_CONVERSION_THREADS {
            return Err(FloeError::invalid_argument(format!(
                "conversion thread count must be between 1 and {MAX_CONVERSION_THREADS}, got {threads}"
            )));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("floe-convert-{i}"))
            .build()
            .map_err(|e| FloeError::internal(format!("failed to start conversion pool: {e}")))?;
        Ok(Self { pool })
    }

    /// Creates a pool sized from writer configuration.
    ///
    /// # Errors
    ///
    /// See [`ConversionPool::new`].
    pub fn from_config(config: &WriterConfig) -> FloeResult<Self> {
        Self::new(config.conversion_threads)
    }

    /// Returns the number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Converts every record, preserving input order.
    ///
    /// # Errors
    ///
    /// Returns a conversion error for the first failing record found.
    pub fn convert<F>(&self, records: &[Bytes], convert: F) -> FloeResult<Vec<Row>>
    where
        F: Fn(&[u8]) -> FloeResult<Row> + Sync,
    {
        self.pool
            .install(|| records.par_iter().map(|raw| convert(raw)).collect())
    }

    /// Converts `records` through `pipeline` and writes them into data files.
    ///
    /// On failure the pipeline is aborted, so no data file it wrote is left
    /// behind.
    ///
    /// # Errors
    ///
    /// Returns the conversion or write error that stopped the pipeline.
    pub fn write_records(
        &self,
        mut pipeline: Box<dyn RecordPipeline>,
        records: &[Bytes],
    ) -> FloeResult<Vec<DataFile>> {
        let rows = match self.convert(records, |raw| pipeline.convert(raw)) {
            Ok(rows) => rows,
            Err(e) => {
                pipeline.abort();
                return Err(e);
            }
        };
        debug!("Converted {} records", rows.len());

        for row in rows {
            if let Err(e) = pipeline.write(row) {
                warn!("Write failed, discarding data files: {}", e);
                pipeline.abort();
                return Err(e);
            }
        }
        pipeline.complete()
    }
}

impl std::fmt::Debug for ConversionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionPool")
            .field("threads", &self.threads())
            .finish()
    }
}
