//! Storage abstraction for Clone Monitor.
//!
//! The [`Store`] trait is the whole query surface the sampler and the
//! statistics engine need from the pipeline's backing store: a count per
//! named collection, a timestamp range query over status updates, and a
//! full scan of clone records. Any document store that can answer those
//! questions can back the monitor.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CloneScan, StatusRecord};

/// Read-only view of the pipeline's backing store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`count`](Store::count) | Current number of documents in a collection |
/// | [`statuses_after`](Store::statuses_after) | Status records newer than a cursor, oldest first |
/// | [`latest_statuses`](Store::latest_statuses) | Newest status records, newest first |
/// | [`clones`](Store::clones) | Every clone record |
/// | [`collection_names`](Store::collection_names) | Names of all collections present |
#[async_trait]
pub trait Store: Send + Sync {
    /// Number of documents in `collection`. A collection that does not
    /// exist yet counts as 0.
    async fn count(&self, collection: &str) -> Result<u64>;

    /// Status records with `timestamp > after`, sorted ascending by
    /// timestamp. `None` returns every record.
    async fn statuses_after(&self, after: Option<f64>) -> Result<Vec<StatusRecord>>;

    /// At most `limit` status records, newest first.
    async fn latest_statuses(&self, limit: usize) -> Result<Vec<StatusRecord>>;

    /// All clone records, in storage order. Records that cannot be decoded
    /// are skipped and counted in [`CloneScan::malformed`].
    async fn clones(&self) -> Result<CloneScan>;

    /// Names of the collections currently present, sorted.
    async fn collection_names(&self) -> Result<Vec<String>>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn count(&self, collection: &str) -> Result<u64> {
        (**self).count(collection).await
    }

    async fn statuses_after(&self, after: Option<f64>) -> Result<Vec<StatusRecord>> {
        (**self).statuses_after(after).await
    }

    async fn latest_statuses(&self, limit: usize) -> Result<Vec<StatusRecord>> {
        (**self).latest_statuses(limit).await
    }

    async fn clones(&self) -> Result<CloneScan> {
        (**self).clones().await
    }

    async fn collection_names(&self) -> Result<Vec<String>> {
        (**self).collection_names().await
    }
}

/// Every collection name with its current document count, sorted by name.
pub async fn collection_counts<S: Store + ?Sized>(store: &S) -> Result<Vec<(String, u64)>> {
    let mut counts = Vec::new();
    for name in store.collection_names().await? {
        let n = store.count(&name).await?;
        counts.push((name, n));
    }
    Ok(counts)
}
