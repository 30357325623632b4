//! In-memory [`Store`] implementation for tests and local experiments.
//!
//! Plain collections are tracked as counters; status updates and clones
//! keep their documents so range queries and clone sizing behave like the
//! SQLite backend. An availability switch simulates the store going away
//! mid-run.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{CloneRecord, CloneScan, StatusRecord, CLONES_COLLECTION, STATUS_COLLECTION};

use super::Store;

/// In-memory store for testing.
pub struct InMemoryStore {
    counts: RwLock<BTreeMap<String, u64>>,
    statuses: RwLock<Vec<StatusRecord>>,
    clones: RwLock<Vec<CloneRecord>>,
    available: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            counts: RwLock::new(BTreeMap::new()),
            statuses: RwLock::new(Vec::new()),
            clones: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Set the document count of a plain collection.
    pub fn set_count(&self, collection: &str, n: u64) {
        self.counts
            .write()
            .unwrap()
            .insert(collection.to_string(), n);
    }

    pub fn push_status(&self, timestamp: f64, message: &str) {
        self.statuses.write().unwrap().push(StatusRecord {
            timestamp,
            message: message.to_string(),
        });
    }

    pub fn push_clone(&self, record: CloneRecord) {
        self.clones.write().unwrap().push(record);
    }

    /// While unavailable, every query fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            bail!("in-memory store is unavailable");
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn count(&self, collection: &str) -> Result<u64> {
        self.check_available()?;
        let n = match collection {
            STATUS_COLLECTION => self.statuses.read().unwrap().len() as u64,
            CLONES_COLLECTION => self.clones.read().unwrap().len() as u64,
            other => self.counts.read().unwrap().get(other).copied().unwrap_or(0),
        };
        Ok(n)
    }

    async fn statuses_after(&self, after: Option<f64>) -> Result<Vec<StatusRecord>> {
        self.check_available()?;
        let mut out: Vec<StatusRecord> = self
            .statuses
            .read()
            .unwrap()
            .iter()
            .filter(|s| after.map_or(true, |cursor| s.timestamp > cursor))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Ok(out)
    }

    async fn latest_statuses(&self, limit: usize) -> Result<Vec<StatusRecord>> {
        self.check_available()?;
        let mut out = self.statuses.read().unwrap().clone();
        out.sort_by(|a, b| b.timestamp.total_cmp(&a.timestamp));
        out.truncate(limit);
        Ok(out)
    }

    async fn clones(&self) -> Result<CloneScan> {
        self.check_available()?;
        Ok(CloneScan {
            records: self.clones.read().unwrap().clone(),
            malformed: 0,
        })
    }

    async fn collection_names(&self) -> Result<Vec<String>> {
        self.check_available()?;
        let mut names: Vec<String> = self.counts.read().unwrap().keys().cloned().collect();
        if !self.statuses.read().unwrap().is_empty() {
            names.push(STATUS_COLLECTION.to_string());
        }
        if !self.clones.read().unwrap().is_empty() {
            names.push(CLONES_COLLECTION.to_string());
        }
        names.sort();
        names.dedup();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::collection_counts;

    #[tokio::test]
    async fn test_statuses_after_is_strict_and_sorted() {
        let store = InMemoryStore::new();
        store.push_status(3.0, "c");
        store.push_status(1.0, "a");
        store.push_status(2.0, "b");

        let all = store.statuses_after(None).await.unwrap();
        let ts: Vec<f64> = all.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![1.0, 2.0, 3.0]);

        let newer = store.statuses_after(Some(2.0)).await.unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].message, "c");
    }

    #[tokio::test]
    async fn test_latest_statuses_newest_first() {
        let store = InMemoryStore::new();
        for i in 0..15 {
            store.push_status(i as f64, &format!("m{}", i));
        }
        let latest = store.latest_statuses(10).await.unwrap();
        assert_eq!(latest.len(), 10);
        assert_eq!(latest[0].message, "m14");
        assert_eq!(latest[9].message, "m5");
    }

    #[tokio::test]
    async fn test_counts_and_unavailable() {
        let store = InMemoryStore::new();
        store.set_count("files", 4);
        store.push_clone(CloneRecord::default());
        assert_eq!(store.count("files").await.unwrap(), 4);
        assert_eq!(store.count("clones").await.unwrap(), 1);
        assert_eq!(store.count("chunks").await.unwrap(), 0);

        let counts = collection_counts(&store).await.unwrap();
        assert_eq!(
            counts,
            vec![("clones".to_string(), 1), ("files".to_string(), 4)]
        );

        store.set_available(false);
        assert!(store.count("files").await.is_err());
        store.set_available(true);
        assert!(store.count("files").await.is_ok());
    }
}
