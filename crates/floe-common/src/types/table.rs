//! Table identity types.
//!
//! A [`TableIdentity`] names a table across catalogs. Inside one catalog the
//! table is addressed by its [`TableIdentifier`], and writers serialize on
//! its [`LockKey`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::NAMESPACE_SEPARATOR;
use crate::error::{FloeError, FloeResult};

/// Fully qualified identity of a table, as supplied by a request.
///
/// # Example
///
/// ```rust
/// use floe_common::types::TableIdentity;
///
/// let table = TableIdentity::new("local", ["sales", "eu"], "orders");
/// assert_eq!(table.identifier().to_string(), "sales.eu.orders");
/// assert_eq!(table.to_string(), "local:sales.eu.orders");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableIdentity {
    /// Catalog that owns the table.
    pub catalog_id: String,
    /// Namespace segments, outermost first.
    #[serde(default)]
    pub namespace: Vec<String>,
    /// Table name within the namespace.
    pub table_name: String,
}

impl TableIdentity {
    /// Creates a new table identity.
    pub fn new<I, S>(catalog_id: impl Into<String>, namespace: I, table_name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            catalog_id: catalog_id.into(),
            namespace: namespace.into_iter().map(Into::into).collect(),
            table_name: table_name.into(),
        }
    }

    /// Checks that every component is present.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::InvalidArgument`] when the catalog id, the table
    /// name, or any namespace segment is empty.
    pub fn validate(&self) -> FloeResult<()> {
        if self.catalog_id.trim().is_empty() {
            return Err(FloeError::invalid_argument("catalog id must not be empty"));
        }
        if self.table_name.trim().is_empty() {
            return Err(FloeError::invalid_argument("table name must not be empty"));
        }
        if self.namespace.iter().any(|segment| segment.trim().is_empty()) {
            return Err(FloeError::invalid_argument(format!(
                "namespace of table '{}' contains an empty segment",
                self.table_name
            )));
        }
        Ok(())
    }

    /// Returns the identifier of this table inside its catalog.
    ///
    /// When no namespace is given the table name is parsed as a dotted
    /// identifier, so `"sales.orders"` names table `orders` in `sales`.
    #[must_use]
    pub fn identifier(&self) -> TableIdentifier {
        if self.namespace.is_empty() {
            TableIdentifier::parse(&self.table_name)
        } else {
            TableIdentifier::new(self.namespace.clone(), self.table_name.clone())
        }
    }

    /// Returns the key writers to this table serialize on.
    ///
    /// The key is built from the resolved [`identifier`](Self::identifier),
    /// so every spelling of one table shares a key.
    #[must_use]
    pub fn lock_key(&self) -> LockKey {
        let TableIdentifier { namespace, name } = self.identifier();
        LockKey {
            catalog_id: self.catalog_id.clone(),
            namespace,
            table_name: name,
        }
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.catalog_id, self.identifier())
    }
}

/// Identifier of a table inside one catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableIdentifier {
    namespace: Vec<String>,
    name: String,
}

impl TableIdentifier {
    /// Creates an identifier from a namespace and a name.
    pub fn new(namespace: Vec<String>, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }

    /// Parses a dotted identifier; the last segment is the table name.
    #[must_use]
    pub fn parse(dotted: &str) -> Self {
        let mut segments: Vec<String> = dotted
            .split(NAMESPACE_SEPARATOR)
            .map(str::to_string)
            .collect();
        // split always yields at least one segment
        let name = segments.pop().unwrap_or_default();
        Self {
            namespace: segments,
            name,
        }
    }

    /// Returns the namespace segments.
    #[must_use]
    pub fn namespace(&self) -> &[String] {
        &self.namespace
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.namespace {
            write!(f, "{segment}{NAMESPACE_SEPARATOR}")?;
        }
        f.write_str(&self.name)
    }
}

/// Serialization domain for writers of one table.
///
/// Two requests that resolve to the same table produce equal keys, however
/// the table name was spelled.
/// The key is only ever compared for lock purposes, never used to look
/// anything up in the table store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey {
    catalog_id: String,
    namespace: Vec<String>,
    table_name: String,
}

impl LockKey {
    /// Returns the catalog component.
    #[must_use]
    pub fn catalog_id(&self) -> &str {
        &self.catalog_id
    }

    /// Returns the namespace component.
    #[must_use]
    pub fn namespace(&self) -> &[String] {
        &self.namespace
    }

    /// Returns the table name component.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, [{}], {})",
            self.catalog_id,
            self.namespace.join(", "),
            self.table_name
        )
    }
}
