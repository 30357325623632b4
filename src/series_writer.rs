//! Append-only writer for the sampled time series.
//!
//! The file is a header row of collection names followed by `elapsed`,
//! then one row per tick. The writer only exists after the header has been
//! written ([`TimeSeriesWriter::write_header`] truncates the file), so rows
//! can never precede the header.
//!
//! Every append opens the file, writes one complete line, and closes it
//! again. Counts are gathered from the store before the file is touched: a
//! store failure loses the tick but never leaves a partial row.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use monitor_core::models::{Sample, ELAPSED_COLUMN};
use monitor_core::store::Store;

use crate::error::{MonitorError, Result};

pub struct TimeSeriesWriter {
    path: PathBuf,
    schema: Vec<String>,
    last_elapsed: Option<u64>,
    rows: u64,
}

impl TimeSeriesWriter {
    /// Truncate (or create) the series file and write the header.
    pub fn write_header(path: impl Into<PathBuf>, schema: &[String]) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| MonitorError::write(&path, e))?;
        }

        let mut header = schema.join(",");
        header.push(',');
        header.push_str(ELAPSED_COLUMN);
        header.push('\n');

        let mut file = File::create(&path).map_err(|e| MonitorError::write(&path, e))?;
        file.write_all(header.as_bytes())
            .map_err(|e| MonitorError::write(&path, e))?;

        tracing::info!(path = %path.display(), columns = %header.trim_end(), "series header written");

        Ok(Self {
            path,
            schema: schema.to_vec(),
            last_elapsed: None,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    /// Data rows written since the header.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Count every collection in the schema and append the row.
    pub async fn append<S: Store + ?Sized>(&mut self, store: &S, elapsed: u64) -> Result<Sample> {
        let mut values = Vec::with_capacity(self.schema.len());
        for collection in &self.schema {
            let n = store.count(collection).await.map_err(MonitorError::Store)?;
            values.push(n);
        }
        let sample = Sample { values, elapsed };
        self.append_sample(&sample)?;
        Ok(sample)
    }

    /// Append an already-resolved sample.
    pub fn append_sample(&mut self, sample: &Sample) -> Result<()> {
        debug_assert_eq!(sample.values.len(), self.schema.len());
        if let Some(previous) = self.last_elapsed {
            if sample.elapsed < previous {
                return Err(MonitorError::NonMonotonicElapsed {
                    previous,
                    elapsed: sample.elapsed,
                });
            }
        }

        let mut line = sample
            .values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        line.push(',');
        line.push_str(&sample.elapsed.to_string());
        line.push('\n');

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| MonitorError::write(&self.path, e))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| MonitorError::write(&self.path, e))?;

        self.last_elapsed = Some(sample.elapsed);
        self.rows += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_core::store::memory::InMemoryStore;

    fn schema() -> Vec<String> {
        vec!["files".to_string(), "clones".to_string()]
    }

    #[test]
    fn test_header_truncates_existing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("data.csv");
        std::fs::write(&path, "stale,rows\n1,2\n").unwrap();

        let writer = TimeSeriesWriter::write_header(&path, &schema()).unwrap();
        assert_eq!(writer.rows(), 0);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "files,clones,elapsed\n"
        );
    }

    #[tokio::test]
    async fn test_append_counts_in_header_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("out").join("data.csv");
        let store = InMemoryStore::new();
        store.set_count("files", 12);

        let mut writer = TimeSeriesWriter::write_header(&path, &schema()).unwrap();
        writer.append(&store, 0).await.unwrap();
        store.set_count("files", 20);
        store.push_clone(Default::default());
        let sample = writer.append(&store, 1).await.unwrap();
        assert_eq!(sample.values, vec![20, 1]);

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "files,clones,elapsed\n12,0,0\n20,1,1\n"
        );
        assert_eq!(writer.rows(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_writes_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("data.csv");
        let store = InMemoryStore::new();

        let mut writer = TimeSeriesWriter::write_header(&path, &schema()).unwrap();
        store.set_available(false);
        let err = writer.append(&store, 0).await.unwrap_err();
        assert!(err.is_store_failure());
        assert_eq!(writer.rows(), 0);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "files,clones,elapsed\n"
        );
    }

    #[test]
    fn test_elapsed_must_not_go_backwards() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut writer =
            TimeSeriesWriter::write_header(tmp.path().join("data.csv"), &schema()).unwrap();
        let at = |elapsed| Sample {
            values: vec![0, 0],
            elapsed,
        };

        writer.append_sample(&at(5)).unwrap();
        writer.append_sample(&at(5)).unwrap();
        let err = writer.append_sample(&at(4)).unwrap_err();
        assert!(matches!(
            err,
            MonitorError::NonMonotonicElapsed {
                previous: 5,
                elapsed: 4
            }
        ));
        assert_eq!(writer.rows(), 2);
    }

    #[test]
    fn test_unwritable_path_is_a_write_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("data.csv");
        let mut writer = TimeSeriesWriter::write_header(&path, &schema()).unwrap();
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let err = writer
            .append_sample(&Sample {
                values: vec![1, 1],
                elapsed: 0,
            })
            .unwrap_err();
        assert!(matches!(err, MonitorError::WriteFailure { .. }));
        assert!(!err.is_store_failure());
    }
}
