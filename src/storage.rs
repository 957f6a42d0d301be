//! # Session Log
//!
//! Durable, append-only CSV log of every accepted record.
//!
//! Each connection session writes to its own file under the log directory:
//!
//! ```text
//! Saved_Data/Data_Log_2024-07-24_T_14_03_59.csv
//! ```
//!
//! Rows hold the record's fields exactly as received, never the transformed
//! values. Every row is flushed before the next record is processed; an I/O
//! failure is reported to the caller and the session carries on.

use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::protocol::record::RawRecord;

/// Session identifier format (local time of session start)
pub const SESSION_ID_FORMAT: &str = "%Y-%m-%d_T_%H_%M_%S";

/// Destination for accepted records
#[cfg_attr(test, mockall::automock)]
pub trait RecordSink: Send {
    /// Append one record as one row.
    fn append_record(&mut self, record: &RawRecord) -> io::Result<()>;
}

/// Builds a session id from the session start time.
#[must_use]
pub fn session_id(started: DateTime<Local>) -> String {
    started.format(SESSION_ID_FORMAT).to_string()
}

/// File name of the log for `session_id`
#[must_use]
pub fn session_file_name(session_id: &str) -> String {
    format!("Data_Log_{}.csv", session_id)
}

/// CSV log for one session
pub struct CsvSessionLog {
    writer: csv::Writer<File>,
    path: PathBuf,
}

impl std::fmt::Debug for CsvSessionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSessionLog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CsvSessionLog {
    /// Open (or reopen) the log for `session_id` under `log_dir`.
    ///
    /// Creates the directory if needed. An existing file is appended to, never
    /// truncated.
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be created.
    pub fn open(log_dir: impl AsRef<Path>, session_id: &str) -> io::Result<Self> {
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;

        let path = log_dir.join(session_file_name(session_id));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Necessary)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);

        info!("Session log opened at {}", path.display());
        Ok(Self { writer, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for CsvSessionLog {
    fn append_record(&mut self, record: &RawRecord) -> io::Result<()> {
        self.writer.write_record(record.fields()).map_err(io::Error::from)?;
        self.writer.flush()
    }
}
