//! Full table scans.

use std::sync::Arc;

use floe_common::{FloeError, FloeResult, MAIN_BRANCH};
use tracing::trace;

use crate::catalog::Table;
use crate::io::DataFile;
use crate::schema::Row;

/// A scan of every live row on one branch of a table.
///
/// The scan reads the snapshot the table handle currently points at; refresh
/// the handle first to scan the latest data.
pub struct TableScan<'a> {
    table: &'a dyn Table,
    branch: String,
}

impl<'a> TableScan<'a> {
    /// Creates a scan of `main`.
    pub fn new(table: &'a dyn Table) -> Self {
        Self {
            table,
            branch: MAIN_BRANCH.to_string(),
        }
    }

    /// Scans `branch` instead of `main`.
    #[must_use]
    pub fn use_ref(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Returns the data files the scan will read.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::BranchNotFound`] if the branch does not exist.
    pub fn plan_files(&self) -> FloeResult<Vec<DataFile>> {
        let metadata = self.table.metadata();
        if !metadata.has_ref(&self.branch) {
            return Err(FloeError::BranchNotFound {
                table: self.table.name(),
                branch: self.branch.clone(),
            });
        }
        Ok(metadata
            .branch_head(&self.branch)
            .map(|snapshot| snapshot.data_files.as_ref().clone())
            .unwrap_or_default())
    }

    /// Reads every row.
    ///
    /// # Errors
    ///
    /// Returns an error if the branch is missing or a data file cannot be
    /// read.
    pub fn rows(&self) -> FloeResult<Vec<Row>> {
        let file_io = self.table.file_io();
        let mut rows = Vec::new();
        for file in self.plan_files()? {
            let contents: Arc<Vec<Row>> = file_io.read_rows(&file.path)?;
            rows.extend(contents.iter().cloned());
        }
        Ok(rows)
    }

    /// Counts every row by reading each data file.
    ///
    /// # Errors
    ///
    /// Returns an error if the branch is missing or a data file cannot be
    /// read.
    pub fn count(&self) -> FloeResult<u64> {
        let file_io = self.table.file_io();
        let mut count = 0u64;
        for file in self.plan_files()? {
            let rows = file_io.read_rows(&file.path)?.len() as u64;
            trace!("Scanned data file {} ({} rows)", file.path, rows);
            count += rows;
        }
        Ok(count)
    }
}
