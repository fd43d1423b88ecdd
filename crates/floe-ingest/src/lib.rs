//! # floe-ingest
//!
//! Ingestion coordination for Floe tables.
//!
//! This crate turns requests into table commits:
//!
//! - **Appends**: [`AppendCoordinator`] writes a batch of records and
//!   commits it at most once per idempotency key, serialized per table by
//!   the lock manager
//! - **Changes**: [`ChangeIngestor`] applies row-level changes, optionally
//!   to a named branch with a conflict policy for existing branches
//! - **Service**: [`IngestService`] dispatches [`IngestRequest`]s and also
//!   creates, drops, and counts tables
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use floe_common::config::IngestConfig;
//! use floe_ingest::{CreateTableRequest, IngestService, TableInfo};
//! use floe_table::{MemoryCatalog, StaticCatalogLoader};
//!
//! let loader = Arc::new(StaticCatalogLoader::new());
//! loader.register("local", Arc::new(MemoryCatalog::new("local")));
//! let service = IngestService::from_config(loader, &IngestConfig::default()).unwrap();
//!
//! let name = service
//!     .create_table(&CreateTableRequest {
//!         table_info: TableInfo::new("local", ["sales"], "orders"),
//!         schema: r#"{"type":"record","name":"orders","fields":[{"name":"id","type":"long"}]}"#
//!             .to_string(),
//!     })
//!     .unwrap();
//! assert_eq!(name, "sales.orders");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod append;
pub mod changes;
pub mod context;
pub mod request;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use append::AppendCoordinator;
pub use changes::{resolve_branch_conflict, BranchAction, ChangeIngestor};
pub use context::IngestContext;
pub use request::{
    AppendRecordsRequest, CountRecordRequest, CreateTableRequest, DropTableRequest,
    IngestRequest, IngestResponse, InsertChangesRequest, InsertRecord, RecordChange, TableInfo,
};
pub use service::IngestService;
