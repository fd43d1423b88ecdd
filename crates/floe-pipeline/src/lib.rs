//! # floe-pipeline
//!
//! Turns raw wire-encoded records into data files of a table.
//!
//! A [`RecordPipeline`] is opened for one table and one request schema. It
//! converts each raw record into a table [`Row`](floe_table::Row), buffers
//! rows into data files, and returns the file manifests on completion.
//! Conversion is a pure function of the record, so a [`ConversionPool`]
//! fans it out across a bounded rayon pool and fans the rows back in to the
//! single writer.
//!
//! ```text
//!  raw records ──▶ ConversionPool ──▶ rows ──▶ RollingFileWriter ──▶ DataFiles
//!                  (N converters)               (one per pipeline)
//! ```
//!
//! The bundled [`JsonPipelineFactory`] decodes each record as a JSON object
//! against the request's Avro schema and projects it onto the table schema by
//! field name.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod convert;
pub mod pipeline;
pub mod pool;
pub mod writer;

pub use convert::JsonRecordConverter;
pub use pipeline::{JsonPipelineFactory, JsonRecordPipeline, PipelineFactory, RecordPipeline};
pub use pool::ConversionPool;
pub use writer::RollingFileWriter;
