//! # floe-table
//!
//! Snapshot-isolated, transactional table store for Floe.
//!
//! This crate defines the contract the ingestion coordinators rely on and
//! ships an in-memory implementation of it:
//!
//! - **Catalogs and tables**: [`Catalog`] resolves identifiers to [`Table`]
//!   handles. A handle reads from the snapshot it was loaded or last
//!   refreshed at, and commits [`Transaction`]s atomically.
//! - **Snapshots and branches**: every commit produces a new immutable
//!   [`Snapshot`]; named [`SnapshotRef`] branches point into the snapshot
//!   history and may carry a maximum age after which the store expires them.
//! - **Data files**: rows live in [`DataFile`]s written through [`FileIo`];
//!   transactions only ever reference them.
//! - **Scans**: [`TableScan`] reads every live row of a branch.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      CatalogLoader                        │
//! │                            │                              │
//! │                            ▼                              │
//! │                  ┌───────────────────┐                    │
//! │                  │      Catalog      │───────┐            │
//! │                  └───────────────────┘       │            │
//! │                            │                 ▼            │
//! │                            ▼          ┌─────────────┐     │
//! │   Transaction ───▶ ┌───────────────┐  │   FileIo    │     │
//! │                    │     Table     │─▶│ (data files)│     │
//! │                    └───────────────┘  └─────────────┘     │
//! │                            │                              │
//! │                            ▼                              │
//! │               TableMetadata (snapshots, refs)             │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use floe_common::TableIdentifier;
//! use floe_table::{Catalog, MemoryCatalog, Schema, TableScan};
//!
//! let catalog = MemoryCatalog::new("local");
//! let schema = Schema::from_avro_json(
//!     r#"{"type":"record","name":"orders","fields":[{"name":"id","type":"long"}]}"#,
//! ).unwrap();
//! let id = TableIdentifier::parse("sales.orders");
//!
//! let table = catalog.create_table(&id, schema).unwrap();
//! assert!(table.has_ref("main"));
//! assert_eq!(TableScan::new(table.as_ref()).count().unwrap(), 0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Clocks driving snapshot timestamps and branch expiry.
pub mod clock;

/// Table schemas, values, and rows.
pub mod schema;

/// Data files and the storage they are written to.
pub mod io;

/// Snapshots and branch references.
pub mod snapshot;

/// Table metadata and how updates apply to it.
pub mod metadata;

/// Transactions: batches of table updates committed atomically.
pub mod transaction;

/// Catalog and table contracts.
pub mod catalog;

/// In-memory catalog implementation.
pub mod memory;

/// Full table scans.
pub mod scan;

// Re-export commonly used types

pub use catalog::{Catalog, CatalogLoader, StaticCatalogLoader, Table};
pub use clock::{Clock, ManualClock, SystemClock};
pub use io::{DataFile, FileIo, MemoryFileIo};
pub use memory::{MemoryCatalog, MemoryTable};
pub use metadata::{CommitEntry, TableMetadata};
pub use scan::TableScan;
pub use schema::{Field, FieldType, Row, Schema, Value};
pub use snapshot::{Snapshot, SnapshotId, SnapshotRef, SnapshotSummary};
pub use transaction::{TableUpdate, Transaction};
