//! Record pipeline contracts and the JSON implementation.

use std::fmt;

use floe_common::FloeResult;
use floe_table::{DataFile, Row, Schema, Table};

use crate::convert::JsonRecordConverter;
use crate::writer::RollingFileWriter;

/// Converts raw records of one request into data files of one table.
///
/// `convert` is called concurrently from the conversion pool; `write` and
/// `complete` are called from a single thread.
pub trait RecordPipeline: Send + Sync {
    /// Decodes one raw record into a table row.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::Conversion`](floe_common::FloeError::Conversion)
    /// if the record cannot be decoded.
    fn convert(&self, raw: &[u8]) -> FloeResult<Row>;

    /// Buffers a converted row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row does not fit the table or a data file
    /// cannot be written.
    fn write(&mut self, row: Row) -> FloeResult<()>;

    /// Finishes writing and returns the manifests of every data file.
    ///
    /// # Errors
    ///
    /// Returns an error if the last data file cannot be written.
    fn complete(self: Box<Self>) -> FloeResult<Vec<DataFile>>;

    /// Discards the pipeline and deletes any data file it wrote.
    fn abort(self: Box<Self>);
}

/// Opens record pipelines.
pub trait PipelineFactory: Send + Sync {
    /// Opens a pipeline writing into `table` for records encoded against
    /// `schema`, the request's schema text.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::InvalidSchema`](floe_common::FloeError::InvalidSchema)
    /// if the schema cannot be parsed or is incompatible with the table.
    fn open(&self, table: &dyn Table, schema: &str) -> FloeResult<Box<dyn RecordPipeline>>;
}

/// Pipeline decoding JSON records and writing rolling data files.
pub struct JsonRecordPipeline {
    converter: JsonRecordConverter,
    table_schema: Schema,
    writer: RollingFileWriter,
}

impl RecordPipeline for JsonRecordPipeline {
    fn convert(&self, raw: &[u8]) -> FloeResult<Row> {
        self.converter.convert(raw)
    }

    fn write(&mut self, row: Row) -> FloeResult<()> {
        row.validate(&self.table_schema)?;
        self.writer.write(row)
    }

    fn complete(self: Box<Self>) -> FloeResult<Vec<DataFile>> {
        self.writer.complete()
    }

    fn abort(self: Box<Self>) {
        self.writer.abort();
    }
}

impl fmt::Debug for JsonRecordPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRecordPipeline")
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

/// Factory for [`JsonRecordPipeline`]s.
#[derive(Debug, Clone)]
pub struct JsonPipelineFactory {
    target_file_rows: usize,
}

impl JsonPipelineFactory {
    /// Creates a factory whose writers roll every `target_file_rows` rows.
    pub fn new(target_file_rows: usize) -> Self {
        Self { target_file_rows }
    }

    /// Creates a factory from writer configuration.
    pub fn from_config(config: &floe_common::config::WriterConfig) -> Self {
        Self::new(config.target_file_rows)
    }
}

impl Default for JsonPipelineFactory {
    fn default() -> Self {
        Self::new(floe_common::DEFAULT_TARGET_FILE_ROWS)
    }
}

impl PipelineFactory for JsonPipelineFactory {
    fn open(&self, table: &dyn Table, schema: &str) -> FloeResult<Box<dyn RecordPipeline>> {
        let request_schema = Schema::from_avro_json(schema)?;
        let table_schema = table.schema().clone();
        let converter = JsonRecordConverter::new(&request_schema, &table_schema)?;
        let writer =
            RollingFileWriter::new(table.file_io(), table.location(), self.target_file_rows)?;
        Ok(Box::new(JsonRecordPipeline {
            converter,
            table_schema,
            writer,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_common::{FloeError, TableIdentifier};
    use floe_table::{Catalog, MemoryCatalog};

    const SCHEMA: &str = r#"{"type":"record","name":"r","fields":[
        {"name":"id","type":"long"},
        {"name":"note","type":["null","string"]}
    ]}"#;

    #[test]
    fn test_open_and_write() {
        let catalog = MemoryCatalog::new("local");
        let table = catalog
            .create_table(
                &TableIdentifier::parse("db.t"),
                Schema::from_avro_json(SCHEMA).unwrap(),
            )
            .unwrap();

        let factory = JsonPipelineFactory::new(2);
        let mut pipeline = factory.open(table.as_ref(), SCHEMA).unwrap();
        for i in 0..3 {
            let row = pipeline.convert(format!(r#"{{"id":{i}}}"#).as_bytes()).unwrap();
            pipeline.write(row).unwrap();
        }
        let files = pipeline.complete().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files.iter().map(|f| f.record_count).sum::<u64>(), 3);
    }

    #[test]
    fn test_open_rejects_bad_schema() {
        let catalog = MemoryCatalog::new("local");
        let table = catalog
            .create_table(
                &TableIdentifier::parse("t"),
                Schema::from_avro_json(SCHEMA).unwrap(),
            )
            .unwrap();

        let err = JsonPipelineFactory::default()
            .open(table.as_ref(), "{")
            .err()
            .unwrap();
        assert!(matches!(err, FloeError::InvalidSchema { .. }));
    }

    #[test]
    fn test_write_validates_rows() {
        let catalog = MemoryCatalog::new("local");
        let table = catalog
            .create_table(
                &TableIdentifier::parse("t"),
                Schema::from_avro_json(SCHEMA).unwrap(),
            )
            .unwrap();

        let mut pipeline = JsonPipelineFactory::default()
            .open(table.as_ref(), SCHEMA)
            .unwrap();
        let err = pipeline
            .write(Row::new(vec![floe_table::Value::Null, floe_table::Value::Null]))
            .unwrap_err();
        assert!(matches!(err, FloeError::Conversion { .. }));
        pipeline.abort();
    }
}
