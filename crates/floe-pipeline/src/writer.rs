//! Rolling data file writer.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use floe_common::{FloeError, FloeResult};
use floe_table::{DataFile, FileIo, Row};

/// Buffers rows and rolls them into a new data file every
/// `target_file_rows` rows.
///
/// Files are named `{location}/data/{writer-uuid}-{sequence}.dat`, so two
/// writers on the same table never collide.
#[derive(Debug)]
pub struct RollingFileWriter {
    file_io: Arc<dyn FileIo>,
    data_dir: String,
    writer_id: Uuid,
    target_file_rows: usize,
    buffer: Vec<Row>,
    written: Vec<DataFile>,
}

impl RollingFileWriter {
    /// Creates a writer for the table at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::InvalidArgument`] if `target_file_rows` is zero.
    pub fn new(
        file_io: Arc<dyn FileIo>,
        location: &str,
        target_file_rows: usize,
    ) -> FloeResult<Self> {
        if target_file_rows == 0 {
            return Err(FloeError::invalid_argument(
                "target_file_rows must be greater than 0",
            ));
        }
        Ok(Self {
            file_io,
            data_dir: format!("{}/data", location.trim_end_matches('/')),
            writer_id: Uuid::new_v4(),
            target_file_rows,
            buffer: Vec::with_capacity(target_file_rows.min(1024)),
            written: Vec::new(),
        })
    }

    /// Buffers a row, rolling to a new file when the buffer is full.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::Write`] if a full buffer cannot be flushed.
    pub fn write(&mut self, row: Row) -> FloeResult<()> {
        self.buffer.push(row);
        if self.buffer.len() >= self.target_file_rows {
            self.flush()?;
        }
        Ok(())
    }

    /// Returns the number of files written so far.
    pub fn files_written(&self) -> usize {
        self.written.len()
    }

    /// Returns the number of rows waiting for the next file.
    pub fn buffered_rows(&self) -> usize {
        self.buffer.len()
    }

    /// Flushes buffered rows and returns every file written.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::Write`] if the last file cannot be written.
    pub fn complete(mut self) -> FloeResult<Vec<DataFile>> {
        self.flush()?;
        let files = std::mem::take(&mut self.written);
        debug!(
            "Completed {} data files ({} rows) in {}",
            files.len(),
            files.iter().map(|f| f.record_count).sum::<u64>(),
            self.data_dir
        );
        Ok(files)
    }

    /// Deletes every file written so far and drops buffered rows. Returns
    /// the number of deleted files.
    pub fn abort(mut self) -> usize {
        self.buffer.clear();
        let mut deleted = 0;
        for file in std::mem::take(&mut self.written) {
            match self.file_io.delete(&file.path) {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to delete aborted data file {}: {}", file.path, e),
            }
        }
        deleted
    }

    fn flush(&mut self) -> FloeResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let path = format!(
            "{}/{}-{:05}.dat",
            self.data_dir,
            self.writer_id,
            self.written.len()
        );
        let rows = std::mem::take(&mut self.buffer);
        let file = self.file_io.write_rows(&path, rows)?;
        debug!("Wrote data file {} ({} rows)", file.path, file.record_count);
        self.written.push(file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_table::{MemoryFileIo, Value};

    fn row(i: i64) -> Row {
        Row::new(vec![Value::Long(i)])
    }

    #[test]
    fn test_rolls_files() {
        let io = Arc::new(MemoryFileIo::new());
        let mut writer = RollingFileWriter::new(io.clone(), "mem://c/t/", 4).unwrap();
        for i in 0..10 {
            writer.write(row(i)).unwrap();
        }
        assert_eq!(writer.files_written(), 2);
        assert_eq!(writer.buffered_rows(), 2);

        let files = writer.complete().unwrap();
        let counts: Vec<u64> = files.iter().map(|f| f.record_count).collect();
        assert_eq!(counts, vec![4, 4, 2]);
        assert!(files.iter().all(|f| f.path.starts_with("mem://c/t/data/")));
        assert_eq!(io.file_count(), 3);
    }

    #[test]
    fn test_empty_writer_produces_no_files() {
        let io = Arc::new(MemoryFileIo::new());
        let writer = RollingFileWriter::new(io.clone(), "mem://c/t", 4).unwrap();
        assert!(writer.complete().unwrap().is_empty());
        assert_eq!(io.file_count(), 0);
    }

    #[test]
    fn test_abort_deletes_written_files() {
        let io = Arc::new(MemoryFileIo::new());
        let mut writer = RollingFileWriter::new(io.clone(), "mem://c/t", 2).unwrap();
        for i in 0..5 {
            writer.write(row(i)).unwrap();
        }
        assert_eq!(writer.abort(), 2);
        assert_eq!(io.file_count(), 0);
    }

    #[test]
    fn test_zero_target_rejected() {
        let io = Arc::new(MemoryFileIo::new());
        assert!(RollingFileWriter::new(io, "mem://c/t", 0).is_err());
    }
}
