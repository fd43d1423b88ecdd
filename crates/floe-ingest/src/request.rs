//! Request and response types.
//!
//! Requests are plain serde types so they can arrive over any transport.
//! In their JSON form:
//!
//! - records are embedded as JSON values and kept as raw encoded bytes,
//! - the schema may be given either as Avro schema text or as the schema
//!   object itself,
//! - [`IngestRequest`] and [`IngestResponse`] are tagged by an `op` field.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use floe_common::{BranchOptions, TableIdentity};

/// Table a request targets.
pub type TableInfo = TableIdentity;

/// One record to insert, in its wire encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InsertRecord {
    /// Encoded record.
    #[serde(with = "raw_record")]
    pub record: Bytes,
}

impl InsertRecord {
    /// Wraps an encoded record.
    pub fn new(record: impl Into<Bytes>) -> Self {
        Self {
            record: record.into(),
        }
    }
}

/// One row-level change for change ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordChange {
    /// A new row.
    Insert {
        /// Encoded record.
        #[serde(with = "raw_record")]
        record: Bytes,
    },
    /// A new image of an existing row.
    Update {
        /// Encoded record.
        #[serde(with = "raw_record")]
        record: Bytes,
    },
    /// Removal of an existing row.
    Delete {
        /// Encoded record.
        #[serde(with = "raw_record")]
        record: Bytes,
    },
}

impl RecordChange {
    /// Returns the change kind as a lowercase word.
    pub fn kind(&self) -> &'static str {
        match self {
            RecordChange::Insert { .. } => "insert",
            RecordChange::Update { .. } => "update",
            RecordChange::Delete { .. } => "delete",
        }
    }
}

/// Appends a batch of records, at most once per idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendRecordsRequest {
    /// Target table.
    pub table_info: TableInfo,
    /// Avro schema the records are encoded against.
    #[serde(with = "schema_text")]
    pub schema: String,
    /// Records to append.
    pub records: Vec<InsertRecord>,
    /// Key identifying this batch across retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Applies row-level changes, optionally on a named branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertChangesRequest {
    /// Target table.
    pub table_info: TableInfo,
    /// Avro schema the records are encoded against.
    #[serde(with = "schema_text")]
    pub schema: String,
    /// Changes to apply.
    pub changes: Vec<RecordChange>,
    /// Branch to write to instead of `main`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_options: Option<BranchOptions>,
}

/// Counts the rows of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRecordRequest {
    /// Target table.
    pub table_info: TableInfo,
}

/// Creates a table from an Avro record schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTableRequest {
    /// Table to create.
    pub table_info: TableInfo,
    /// Avro record schema of the table.
    #[serde(with = "schema_text")]
    pub schema: String,
}

/// Drops a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropTableRequest {
    /// Table to drop.
    pub table_info: TableInfo,
    /// Whether to delete the table's data files.
    #[serde(default)]
    pub purge: bool,
}

/// Any request the service handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum IngestRequest {
    /// See [`CreateTableRequest`].
    CreateTable(CreateTableRequest),
    /// See [`DropTableRequest`].
    DropTable(DropTableRequest),
    /// See [`AppendRecordsRequest`].
    AppendRecords(AppendRecordsRequest),
    /// See [`InsertChangesRequest`].
    InsertChanges(InsertChangesRequest),
    /// See [`CountRecordRequest`].
    CountRecords(CountRecordRequest),
}

impl IngestRequest {
    /// Returns the request's table.
    pub fn table_info(&self) -> &TableInfo {
        match self {
            IngestRequest::CreateTable(r) => &r.table_info,
            IngestRequest::DropTable(r) => &r.table_info,
            IngestRequest::AppendRecords(r) => &r.table_info,
            IngestRequest::InsertChanges(r) => &r.table_info,
            IngestRequest::CountRecords(r) => &r.table_info,
        }
    }

    /// Returns the operation name, as used in the `op` tag.
    pub fn op(&self) -> &'static str {
        match self {
            IngestRequest::CreateTable(_) => "create_table",
            IngestRequest::DropTable(_) => "drop_table",
            IngestRequest::AppendRecords(_) => "append_records",
            IngestRequest::InsertChanges(_) => "insert_changes",
            IngestRequest::CountRecords(_) => "count_records",
        }
    }
}

/// Result of a handled request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum IngestResponse {
    /// The table was created.
    TableCreated {
        /// Fully qualified table name.
        table: String,
    },
    /// The drop request completed.
    TableDropped {
        /// False if the table did not exist.
        dropped: bool,
    },
    /// The append request completed.
    RecordsAppended {
        /// True once the batch is committed, by this call or an earlier one.
        committed: bool,
    },
    /// The change request completed.
    ChangesInserted {
        /// False if the target branch existed and was left alone.
        applied: bool,
    },
    /// Row count of the table.
    RecordCount {
        /// Number of rows.
        count: u64,
    },
}

/// Serde adapter storing a record as its JSON text while representing it as
/// an embedded JSON value.
mod raw_record {
    use bytes::Bytes;
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(record: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        let value: Value = serde_json::from_slice(record).map_err(S::Error::custom)?;
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let value = Value::deserialize(deserializer)?;
        serde_json::to_vec(&value)
            .map(Bytes::from)
            .map_err(D::Error::custom)
    }
}

/// Serde adapter accepting a schema as text or as an embedded JSON object.
mod schema_text {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(schema: &str, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(schema)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(text) => Ok(text),
            other => Ok(other.to_string()),
        }
    }
}
