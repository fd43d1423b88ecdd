//! Table schemas, values, and rows.
//!
//! Schemas arrive in requests as Avro record schemas in their JSON form.
//! Only the subset the ingestion path produces is accepted: primitive field
//! types, optionally wrapped in a `["null", T]` union to make the field
//! nullable. Logical type annotations are ignored and the underlying
//! primitive is used.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashSet;
use std::fmt;

use floe_common::{FloeError, FloeResult};

/// Type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// true or false.
    Boolean,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// UTF-8 string.
    String,
    /// Arbitrary bytes.
    Bytes,
}

impl FieldType {
    /// Parses an Avro primitive type name.
    pub fn from_avro(name: &str) -> Option<Self> {
        match name {
            "boolean" => Some(Self::Boolean),
            "int" => Some(Self::Int),
            "long" => Some(Self::Long),
            "float" => Some(Self::Float),
            "double" => Some(Self::Double),
            "string" => Some(Self::String),
            "bytes" => Some(Self::Bytes),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Boolean => "boolean",
            FieldType::Int => "int",
            FieldType::Long => "long",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Position-independent field id, starting at 1.
    pub id: i32,
    /// Column name.
    pub name: String,
    /// Column type.
    pub field_type: FieldType,
    /// Whether null is rejected.
    pub required: bool,
}

impl Field {
    /// Creates a required field.
    pub fn required(id: i32, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id,
            name: name.into(),
            field_type,
            required: true,
        }
    }

    /// Creates a nullable field.
    pub fn optional(id: i32, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id,
            name: name.into(),
            field_type,
            required: false,
        }
    }
}

/// Ordered set of uniquely named fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Creates a schema.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::InvalidSchema`] for an empty field list or a
    /// duplicate field name.
    pub fn new(fields: Vec<Field>) -> FloeResult<Self> {
        if fields.is_empty() {
            return Err(FloeError::InvalidSchema {
                message: "schema has no fields".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(FloeError::InvalidSchema {
                    message: format!("duplicate field '{}'", field.name),
                });
            }
        }
        Ok(Self { fields })
    }

    /// Parses an Avro record schema in JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::InvalidSchema`] if the text is not JSON, is not a
    /// record schema, or uses a type outside the supported subset.
    pub fn from_avro_json(text: &str) -> FloeResult<Self> {
        let json: Json = serde_json::from_str(text).map_err(|e| FloeError::InvalidSchema {
            message: format!("schema is not valid JSON: {e}"),
        })?;

        if json.get("type").and_then(Json::as_str) != Some("record") {
            return Err(invalid("top-level schema must be a record"));
        }
        let Some(fields) = json.get("fields").and_then(Json::as_array) else {
            return Err(invalid("record schema has no 'fields' array"));
        };

        let mut parsed = Vec::with_capacity(fields.len());
        for (position, field) in fields.iter().enumerate() {
            let Some(name) = field.get("name").and_then(Json::as_str) else {
                return Err(invalid(format!("field {position} has no name")));
            };
            let Some(avro_type) = field.get("type") else {
                return Err(invalid(format!("field '{name}' has no type")));
            };
            let (field_type, required) = parse_avro_type(name, avro_type)?;
            let id = i32::try_from(position + 1)
                .map_err(|_| invalid("record schema has too many fields"))?;
            parsed.push(Field {
                id,
                name: name.to_string(),
                field_type,
                required,
            });
        }

        Self::new(parsed)
    }

    /// Returns the fields in order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema has no fields. Never true for a schema
    /// built through [`Schema::new`].
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Looks up a field and its position by name.
    pub fn field(&self, name: &str) -> Option<(usize, &Field)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, field)| field.name == name)
    }
}

fn invalid(message: impl Into<String>) -> FloeError {
    FloeError::InvalidSchema {
        message: message.into(),
    }
}

fn parse_avro_type(field: &str, avro_type: &Json) -> FloeResult<(FieldType, bool)> {
    match avro_type {
        Json::String(name) => FieldType::from_avro(name)
            .map(|t| (t, true))
            .ok_or_else(|| invalid(format!("field '{field}' has unsupported type '{name}'"))),
        Json::Object(inner) => match inner.get("type") {
            Some(nested) => parse_avro_type(field, nested),
            None => Err(invalid(format!("field '{field}' has a type object without 'type'"))),
        },
        Json::Array(branches) => {
            let non_null: Vec<&Json> = branches
                .iter()
                .filter(|branch| branch.as_str() != Some("null"))
                .collect();
            let has_null = non_null.len() < branches.len();
            match (has_null, non_null.as_slice()) {
                (true, [only]) => parse_avro_type(field, only).map(|(t, _)| (t, false)),
                (false, [only]) => parse_avro_type(field, only),
                _ => Err(invalid(format!(
                    "field '{field}' uses a union other than [\"null\", T]"
                ))),
            }
        }
        other => Err(invalid(format!("field '{field}' has malformed type {other}"))),
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// String value.
    String(String),
    /// Byte value.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the type of a non-null value.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(FieldType::Boolean),
            Value::Int(_) => Some(FieldType::Int),
            Value::Long(_) => Some(FieldType::Long),
            Value::Float(_) => Some(FieldType::Float),
            Value::Double(_) => Some(FieldType::Double),
            Value::String(_) => Some(FieldType::String),
            Value::Bytes(_) => Some(FieldType::Bytes),
        }
    }

    /// Approximate encoded size in bytes.
    pub fn estimated_size(&self) -> usize {
        match self {
            Value::Null => 1,
            Value::Boolean(_) => 1,
            Value::Int(_) | Value::Float(_) => 4,
            Value::Long(_) | Value::Double(_) => 8,
            Value::String(s) => s.len(),
            Value::Bytes(b) => b.len(),
        }
    }
}

/// One table row, with values in schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row(Vec<Value>);

impl Row {
    /// Creates a row.
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Returns the values.
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Returns the value at `position`.
    pub fn get(&self, position: usize) -> Option<&Value> {
        self.0.get(position)
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the row has no values.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Approximate encoded size in bytes.
    pub fn estimated_size(&self) -> usize {
        self.0.iter().map(Value::estimated_size).sum()
    }

    /// Checks the row against `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::Conversion`] on an arity mismatch, a null in a
    /// required column, or a value of the wrong type.
    pub fn validate(&self, schema: &Schema) -> FloeResult<()> {
        if self.0.len() != schema.len() {
            return Err(FloeError::conversion(format!(
                "row has {} values, schema has {} fields",
                self.0.len(),
                schema.len()
            )));
        }
        for (value, field) in self.0.iter().zip(schema.fields()) {
            match value.field_type() {
                None if field.required => {
                    return Err(FloeError::conversion(format!(
                        "required field '{}' is null",
                        field.name
                    )))
                }
                Some(actual) if actual != field.field_type => {
                    return Err(FloeError::conversion(format!(
                        "field '{}' expects {}, got {}",
                        field.name, field.field_type, actual
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS: &str = r#"{
        "type": "record",
        "name": "orders",
        "fields": [
            {"name": "id", "type": "long"},
            {"name": "customer", "type": ["null", "string"]},
            {"name": "amount", "type": {"type": "double"}},
            {"name": "placed_at", "type": {"type": "long", "logicalType": "timestamp-micros"}}
        ]
    }"#;

    #[test]
    fn test_from_avro_json() {
        let schema = Schema::from_avro_json(ORDERS).unwrap();
        assert_eq!(schema.len(), 4);

        let (pos, id) = schema.field("id").unwrap();
        assert_eq!(pos, 0);
        assert_eq!(id.id, 1);
        assert!(id.required);
        assert_eq!(id.field_type, FieldType::Long);

        let (_, customer) = schema.field("customer").unwrap();
        assert!(!customer.required);
        assert_eq!(customer.field_type, FieldType::String);

        let (_, placed_at) = schema.field("placed_at").unwrap();
        assert_eq!(placed_at.field_type, FieldType::Long);
    }

    #[test]
    fn test_rejects_unsupported_schemas() {
        assert!(Schema::from_avro_json("not json").is_err());
        assert!(Schema::from_avro_json(r#"{"type":"enum","symbols":["A"]}"#).is_err());
        assert!(Schema::from_avro_json(
            r#"{"type":"record","name":"t","fields":[{"name":"m","type":"map"}]}"#
        )
        .is_err());
        assert!(Schema::from_avro_json(
            r#"{"type":"record","name":"t","fields":[{"name":"u","type":["int","string"]}]}"#
        )
        .is_err());
        assert!(Schema::from_avro_json(r#"{"type":"record","name":"t","fields":[]}"#).is_err());
    }

    #[test]
    fn test_duplicate_fields_rejected() {
        let err = Schema::new(vec![
            Field::required(1, "id", FieldType::Long),
            Field::optional(2, "id", FieldType::String),
        ])
        .unwrap_err();
        assert!(matches!(err, FloeError::InvalidSchema { .. }));
    }

    #[test]
    fn test_row_validate() {
        let schema = Schema::new(vec![
            Field::required(1, "id", FieldType::Long),
            Field::optional(2, "name", FieldType::String),
        ])
        .unwrap();

        assert!(Row::new(vec![Value::Long(1), Value::Null])
            .validate(&schema)
            .is_ok());
        assert!(Row::new(vec![Value::Null, Value::Null])
            .validate(&schema)
            .is_err());
        assert!(Row::new(vec![Value::Int(1), Value::Null])
            .validate(&schema)
            .is_err());
        assert!(Row::new(vec![Value::Long(1)]).validate(&schema).is_err());
    }
}
