//! Incremental projection of pipeline status updates into a log file.
//!
//! The tracker keeps a high-water-mark timestamp. Each flush asks the store
//! only for records strictly newer than the mark, appends them to the
//! status log oldest first, and then moves the mark to the newest
//! timestamp written. Records are therefore written at most once per run
//! and the log stays sorted, provided the pipeline never inserts a record
//! older than one already emitted.
//!
//! The mark lives in memory. A restart truncates the log and starts from
//! the beginning of the store again.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use monitor_core::models::StatusRecord;
use monitor_core::store::Store;

use crate::error::{MonitorError, Result};

pub const STATUS_LOG_HEADER: &str = "timestamp,message";

pub struct StatusTracker {
    path: PathBuf,
    cursor: Option<f64>,
    emitted: u64,
}

impl StatusTracker {
    /// Truncate (or create) the status log and write its header.
    pub fn write_header(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| MonitorError::write(&path, e))?;
        }
        let mut file = File::create(&path).map_err(|e| MonitorError::write(&path, e))?;
        writeln!(file, "{}", STATUS_LOG_HEADER).map_err(|e| MonitorError::write(&path, e))?;

        Ok(Self {
            path,
            cursor: None,
            emitted: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Timestamp of the newest record written so far.
    pub fn cursor(&self) -> Option<f64> {
        self.cursor
    }

    /// Records written since the header.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Append every status record newer than the cursor. Returns how many
    /// were written.
    ///
    /// The cursor only moves after the batch is on disk, so a failed write
    /// is retried in full on the next flush.
    pub async fn flush_new<S: Store + ?Sized>(&mut self, store: &S) -> Result<usize> {
        let mut batch = store
            .statuses_after(self.cursor)
            .await
            .map_err(MonitorError::Store)?;

        if let Some(cursor) = self.cursor {
            batch.retain(|s| s.timestamp > cursor);
        }
        batch.sort_by(|a, b| {
            a.timestamp
                .total_cmp(&b.timestamp)
                .then_with(|| a.message.cmp(&b.message))
        });
        batch.dedup_by(|a, b| a.timestamp == b.timestamp && a.message == b.message);

        let Some(newest) = batch.last().map(|s| s.timestamp) else {
            return Ok(0);
        };

        let mut out = String::new();
        for status in &batch {
            out.push_str(&format_status_line(status));
            out.push('\n');
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| MonitorError::write(&self.path, e))?;
        file.write_all(out.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| MonitorError::write(&self.path, e))?;

        for status in &batch {
            tracing::info!(timestamp = status.timestamp, "New status update: {}", status.message);
        }

        self.cursor = Some(newest);
        self.emitted += batch.len() as u64;
        Ok(batch.len())
    }
}

/// One `timestamp,message` line, quoting the message when it contains a
/// comma, a quote, or a line break.
pub fn format_status_line(status: &StatusRecord) -> String {
    format!("{},{}", status.timestamp, quote_field(&status.message))
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
