//! Data files and the storage they are written to.
//!
//! A [`DataFile`] is the manifest entry for one immutable file of rows.
//! Transactions reference data files by manifest; the rows themselves are
//! only touched by writers and scans through a [`FileIo`].

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use floe_common::{FloeError, FloeResult};
use serde::{Deserialize, Serialize};

use crate::schema::Row;

/// Manifest entry describing one written data file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataFile {
    /// Location of the file.
    pub path: String,
    /// Number of rows in the file.
    pub record_count: u64,
    /// Approximate size of the file in bytes.
    pub file_size_bytes: u64,
}

/// Storage for data files.
pub trait FileIo: Send + Sync + fmt::Debug {
    /// Writes `rows` as a new file at `path` and returns its manifest.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::Write`] if the file cannot be written, including
    /// when `path` already exists.
    fn write_rows(&self, path: &str, rows: Vec<Row>) -> FloeResult<DataFile>;

    /// Reads every row of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be read.
    fn read_rows(&self, path: &str) -> FloeResult<Arc<Vec<Row>>>;

    /// Deletes the file at `path`; returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be deleted.
    fn delete(&self, path: &str) -> FloeResult<bool>;

    /// Returns true if a file exists at `path`.
    fn exists(&self, path: &str) -> bool;
}

/// Data files kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryFileIo {
    files: DashMap<String, Arc<Vec<Row>>>,
}

impl MemoryFileIo {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

impl FileIo for MemoryFileIo {
    fn write_rows(&self, path: &str, rows: Vec<Row>) -> FloeResult<DataFile> {
        let record_count = rows.len() as u64;
        let file_size_bytes = rows.iter().map(Row::estimated_size).sum::<usize>() as u64;

        match self.files.entry(path.to_string()) {
            Entry::Occupied(_) => Err(FloeError::write(format!("file '{path}' already exists"))),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(rows));
                Ok(DataFile {
                    path: path.to_string(),
                    record_count,
                    file_size_bytes,
                })
            }
        }
    }

    fn read_rows(&self, path: &str) -> FloeResult<Arc<Vec<Row>>> {
        self.files
            .get(path)
            .map(|rows| Arc::clone(rows.value()))
            .ok_or_else(|| FloeError::internal(format!("data file '{path}' does not exist")))
    }

    fn delete(&self, path: &str) -> FloeResult<bool> {
        Ok(self.files.remove(path).is_some())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Value;

    fn rows(n: i64) -> Vec<Row> {
        (0..n).map(|i| Row::new(vec![Value::Long(i)])).collect()
    }

    #[test]
    fn test_write_and_read() {
        let io = MemoryFileIo::new();
        let file = io.write_rows("mem://t/data/a.dat", rows(3)).unwrap();

        assert_eq!(file.record_count, 3);
        assert_eq!(file.file_size_bytes, 24);
        assert!(io.exists("mem://t/data/a.dat"));
        assert_eq!(io.read_rows("mem://t/data/a.dat").unwrap().len(), 3);
    }

    #[test]
    fn test_files_are_immutable() {
        let io = MemoryFileIo::new();
        io.write_rows("p", rows(1)).unwrap();
        let err = io.write_rows("p", rows(2)).unwrap_err();
        assert!(matches!(err, FloeError::Write { .. }));
        assert_eq!(io.read_rows("p").unwrap().len(), 1);
    }

    #[test]
    fn test_delete() {
        let io = MemoryFileIo::new();
        io.write_rows("p", rows(1)).unwrap();
        assert!(io.delete("p").unwrap());
        assert!(!io.delete("p").unwrap());
        assert_eq!(io.file_count(), 0);
        assert!(io.read_rows("p").is_err());
    }
}
