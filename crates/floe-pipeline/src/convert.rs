//! JSON record decoding.
//!
//! Records are JSON objects keyed by field name. Values follow the Avro JSON
//! encoding for the supported primitives: numbers for numeric fields, strings
//! for `string`, and strings of code points `0..=255` for `bytes`.

use serde_json::{Map, Value as Json};

use floe_common::{FloeError, FloeResult};
use floe_table::{Field, FieldType, Row, Schema, Value};

/// Where a table column's value comes from.
#[derive(Debug, Clone)]
enum Source {
    /// The request field with this name.
    Field(String),
    /// The request schema has no such field; the column is always null.
    Absent,
}

/// Decodes JSON records written against a request schema into rows of a
/// table schema.
#[derive(Debug, Clone)]
pub struct JsonRecordConverter {
    columns: Vec<(Field, Source)>,
}

impl JsonRecordConverter {
    /// Builds the projection from `request` onto `table`.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::InvalidSchema`] if a request field has a type
    /// other than its table column, or if a required table column is not in
    /// the request schema.
    pub fn new(request: &Schema, table: &Schema) -> FloeResult<Self> {
        let mut columns = Vec::with_capacity(table.len());
        for column in table.fields() {
            let source = match request.field(&column.name) {
                Some((_, field)) if field.field_type != column.field_type => {
                    return Err(FloeError::InvalidSchema {
                        message: format!(
                            "field '{}' is {} in the request but {} in the table",
                            column.name, field.field_type, column.field_type
                        ),
                    })
                }
                Some((_, field)) => Source::Field(field.name.clone()),
                None if column.required => {
                    return Err(FloeError::InvalidSchema {
                        message: format!(
                            "required field '{}' is missing from the request schema",
                            column.name
                        ),
                    })
                }
                None => Source::Absent,
            };
            columns.push((column.clone(), source));
        }
        Ok(Self { columns })
    }

    /// Decodes one record.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::Conversion`] if the record is not a JSON object,
    /// a required value is missing or null, or a value does not fit its
    /// column type.
    pub fn convert(&self, raw: &[u8]) -> FloeResult<Row> {
        let json: Json = serde_json::from_slice(raw)
            .map_err(|e| FloeError::conversion(format!("record is not valid JSON: {e}")))?;
        let Json::Object(object) = json else {
            return Err(FloeError::conversion("record is not a JSON object"));
        };

        self.columns
            .iter()
            .map(|(column, source)| convert_column(&object, column, source))
            .collect::<FloeResult<Vec<_>>>()
            .map(Row::new)
    }
}

fn convert_column(object: &Map<String, Json>, column: &Field, source: &Source) -> FloeResult<Value> {
    let json = match source {
        Source::Field(name) => object.get(name).unwrap_or(&Json::Null),
        Source::Absent => &Json::Null,
    };
    if json.is_null() {
        if column.required {
            return Err(FloeError::conversion(format!(
                "required field '{}' is missing",
                column.name
            )));
        }
        return Ok(Value::Null);
    }

    let mismatch = || {
        FloeError::conversion(format!(
            "field '{}' expects {}, got {json}",
            column.name, column.field_type
        ))
    };

    match column.field_type {
        FieldType::Boolean => json.as_bool().map(Value::Boolean).ok_or_else(mismatch),
        FieldType::Int => json
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Value::Int)
            .ok_or_else(mismatch),
        FieldType::Long => json.as_i64().map(Value::Long).ok_or_else(mismatch),
        FieldType::Float => json.as_f64().map(|v| Value::Float(v as f32)).ok_or_else(mismatch),
        FieldType::Double => json.as_f64().map(Value::Double).ok_or_else(mismatch),
        FieldType::String => json
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(mismatch),
        FieldType::Bytes => json
            .as_str()
            .and_then(|s| s.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect())
            .map(Value::Bytes)
            .ok_or_else(mismatch),
    }
}
