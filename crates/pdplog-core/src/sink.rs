//! Buffered CSV sink. Owns the log file for the whole session.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::MIN_BUFFER_CAPACITY;
use crate::error::{LoggerError, Result};
use crate::models::LogRecord;

/// Writes records through an in-memory buffer. Data reaches the file when the
/// buffer fills or the sink is closed, never per record.
#[derive(Debug)]
pub struct BufferedLogSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    records: u64,
}

impl BufferedLogSink {
    /// Create (or truncate) `path` behind the default 8 KiB buffer.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_capacity(path, MIN_BUFFER_CAPACITY)
    }

    /// Like [`open`](Self::open); capacities below 8 KiB are raised to it.
    pub fn open_with_capacity(path: &Path, capacity: usize) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        Self::from_options(&options, path, capacity)
    }

    /// Create `path`, failing with `AlreadyExists` instead of touching an
    /// existing file.
    pub fn create_new_with_capacity(path: &Path, capacity: usize) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        Self::from_options(&options, path, capacity)
    }

    fn from_options(options: &OpenOptions, path: &Path, capacity: usize) -> Result<Self> {
        let file = options.open(path).map_err(|source| LoggerError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        let capacity = capacity.max(MIN_BUFFER_CAPACITY);
        debug!(path = %path.display(), capacity, "log sink opened");

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::with_capacity(capacity, file)),
            records: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Records accepted since the sink was opened.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Append one record. A failed write releases the file before returning.
    pub fn append(&mut self, record: &LogRecord) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(LoggerError::SinkClosed)?;
        if let Err(source) = writer.write_all(record.as_bytes()) {
            self.release();
            return Err(LoggerError::Write {
                path: self.path.clone(),
                source,
            });
        }
        self.records += 1;
        Ok(())
    }

    /// Flush buffered records and release the file. Closing a closed sink
    /// does nothing. The file handle is released even when the flush fails.
    pub fn close(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let result = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .and_then(|file| file.sync_all());

        match result {
            Ok(()) => {
                debug!(path = %self.path.display(), records = self.records, "log sink closed");
                Ok(())
            }
            Err(source) => Err(LoggerError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Drop the writer without reporting flush errors.
    fn release(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

impl Drop for BufferedLogSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("log sink dropped with unflushed data: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::RecordEncoder;
    use crate::models::Reading;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn record(values: Vec<f64>) -> LogRecord {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        RecordEncoder::default().encode(ts, &Reading::from(values))
    }

    #[test]
    fn buffers_until_close() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("log.csv");
        let mut sink = BufferedLogSink::open(&path).unwrap();

        sink.append(&record(vec![1.0, 2.0])).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        sink.close().unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "\"2024-01-01:12:00:00\",\"1.0\",\"2.0\"\n");
        assert_eq!(sink.records(), 1);
    }

    #[test]
    fn full_buffer_reaches_disk_before_close() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("log.csv");
        let mut sink = BufferedLogSink::open(&path).unwrap();

        let rec = record(vec![0.5; 16]);
        let needed = MIN_BUFFER_CAPACITY / rec.as_str().len() + 2;
        for _ in 0..needed {
            sink.append(&rec).unwrap();
        }
        let on_disk = std::fs::metadata(&path).unwrap().len();
        assert!(on_disk > 0, "a full buffer should have been written out");
        sink.close().unwrap();
    }

    #[test]
    fn open_truncates_existing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("log.csv");
        std::fs::write(&path, "stale\n").unwrap();

        let mut sink = BufferedLogSink::open(&path).unwrap();
        sink.close().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn create_new_leaves_existing_file_alone() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("log.csv");
        std::fs::write(&path, "earlier session\n").unwrap();

        match BufferedLogSink::create_new_with_capacity(&path, MIN_BUFFER_CAPACITY) {
            Err(LoggerError::Write { source, .. }) => {
                assert_eq!(source.kind(), std::io::ErrorKind::AlreadyExists)
            }
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "earlier session\n");
    }

    #[test]
    fn append_after_close_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut sink = BufferedLogSink::open(&tmp.path().join("log.csv")).unwrap();
        sink.close().unwrap();
        assert!(!sink.is_open());
        assert!(matches!(
            sink.append(&record(vec![1.0])),
            Err(LoggerError::SinkClosed)
        ));
    }

    #[test]
    fn close_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let mut sink = BufferedLogSink::open(&tmp.path().join("log.csv")).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
    }

    #[test]
    fn open_in_missing_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let err = BufferedLogSink::open(&tmp.path().join("missing/log.csv")).unwrap_err();
        assert!(matches!(err, LoggerError::Write { .. }));
    }

    #[test]
    fn drop_flushes_pending_records() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("log.csv");
        {
            let mut sink = BufferedLogSink::open(&path).unwrap();
            sink.append(&record(vec![3.0])).unwrap();
        }
        assert!(std::fs::read_to_string(&path).unwrap().ends_with("\"3.0\"\n"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn flush_failure_still_releases_file() {
        // Every write to /dev/full fails with ENOSPC.
        let mut sink = BufferedLogSink::open(Path::new("/dev/full")).unwrap();
        sink.append(&record(vec![1.0])).unwrap();
        assert!(matches!(sink.close(), Err(LoggerError::Write { .. })));
        assert!(!sink.is_open());
        sink.close().unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn write_failure_closes_sink() {
        let mut sink = BufferedLogSink::open(Path::new("/dev/full")).unwrap();
        let big = record(vec![1.0; MIN_BUFFER_CAPACITY]);
        assert!(matches!(sink.append(&big), Err(LoggerError::Write { .. })));
        assert!(!sink.is_open());
        assert!(matches!(sink.append(&big), Err(LoggerError::SinkClosed)));
    }
}
