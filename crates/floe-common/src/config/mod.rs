//! Configuration for Floe.
//!
//! This module provides the configuration structures for the ingestion
//! components.

mod ingest;

pub use ingest::{
    ChangeConfig, IngestConfig, IngestConfigBuilder, LockConfig, UnsupportedChangePolicy,
    WriterConfig,
};
