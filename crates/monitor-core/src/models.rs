//! Core data models shared by the sampler, the statistics engine, and the
//! HTTP surface.

use serde::{Deserialize, Serialize};

/// Name of the trailing column that carries elapsed seconds in every series.
pub const ELAPSED_COLUMN: &str = "elapsed";

/// Collections tracked by default, in header order.
pub const DEFAULT_COLLECTIONS: [&str; 5] = ["files", "chunks", "candidates", "clones", "statusUpdates"];

/// Collection holding [`StatusRecord`]s.
pub const STATUS_COLLECTION: &str = "statusUpdates";

/// Collection holding [`CloneRecord`]s.
pub const CLONES_COLLECTION: &str = "clones";

/// A free-text progress message written by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Seconds since the Unix epoch, as written by the pipeline.
    pub timestamp: f64,
    pub message: String,
}

/// One location of a detected clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneInstance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub start_line: i64,
    pub end_line: i64,
}

impl CloneInstance {
    /// Number of lines spanned, as `endLine - startLine`.
    pub fn size(&self) -> i64 {
        self.end_line - self.start_line
    }
}

/// A clone class as stored by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CloneRecord {
    #[serde(default)]
    pub instances: Vec<CloneInstance>,
}

/// Clone records read from the store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloneScan {
    pub records: Vec<CloneRecord>,
    /// Stored rows skipped because their instance list could not be decoded.
    pub malformed: usize,
}

/// One row of the time series: a count per tracked collection plus the
/// elapsed seconds at which the counts were taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    /// Counts, in the order of [`Series::columns`].
    pub values: Vec<u64>,
    /// Whole seconds since sampling started.
    pub elapsed: u64,
}

/// An ordered sequence of [`Sample`]s sharing one column schema.
///
/// `columns` lists the collection columns only; the elapsed column is
/// implicit and always last on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct Series {
    pub columns: Vec<String>,
    pub rows: Vec<Sample>,
}

impl Series {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Index of a collection column, if the schema contains it.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// `(elapsed, value)` pairs for one column, in row order.
    pub fn points(&self, name: &str) -> Option<Vec<(u64, u64)>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| (row.elapsed, row.values[idx]))
                .collect(),
        )
    }

    /// Largest value seen in a column; 0 for an empty series or unknown column.
    pub fn max_of(&self, name: &str) -> u64 {
        match self.column_index(name) {
            Some(idx) => self.rows.iter().map(|r| r.values[idx]).max().unwrap_or(0),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Most recent sample, if any.
    pub fn last(&self) -> Option<&Sample> {
        self.rows.last()
    }
}
