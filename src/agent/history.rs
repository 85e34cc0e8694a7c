//! Append-only interaction history
//!
//! Every query is recorded with its generated code, success flag and
//! captured output. Writes are best-effort: a failure is reported as a
//! warning and never reaches the caller.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::metrics::HISTORY_WRITES;

/// One logged unit of (query, generated code, execution outcome)
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRecord {
    pub id: String,
    pub query: String,
    pub code: String,
    pub success: bool,
    pub output_log: String,
    pub timestamp: DateTime<Utc>,
}

impl InteractionRecord {
    pub fn new(
        query: impl Into<String>,
        code: impl Into<String>,
        success: bool,
        output_log: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            query: query.into(),
            code: code.into(),
            success,
            output_log: output_log.into(),
            timestamp: Utc::now(),
        }
    }

    /// Text form appended to the log
    pub fn render(&self) -> String {
        format!(
            "--- Interaction {} ---\ntimestamp: {}\nquery: {}\ncode:\n{}\nsuccess: {}\noutput:\n{}\n\n",
            self.id,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.query,
            self.code,
            self.success,
            self.output_log
        )
    }
}

/// Appends interaction records to a log file
#[derive(Debug, Clone)]
pub struct InteractionLogger {
    path: PathBuf,
}

impl InteractionLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one interaction
    pub fn log(&self, query: &str, code: &str, success: bool, output_log: &str) {
        self.append(&InteractionRecord::new(query, code, success, output_log));
    }

    /// Append a prepared record. Returns whether the write succeeded.
    pub fn append(&self, record: &InteractionRecord) -> bool {
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(record.render().as_bytes()));

        match result {
            Ok(()) => {
                debug!(path = %self.path.display(), id = %record.id, "Interaction recorded");
                HISTORY_WRITES.with_label_values(&["written"]).inc();
                true
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to write to history log");
                HISTORY_WRITES.with_label_values(&["failed"]).inc();
                false
            }
        }
    }
}
