//! One-shot views of the store: document counts per collection and the most
//! recent status updates.

use anyhow::Result;

use monitor_core::models::StatusRecord;
use monitor_core::store::{collection_counts, Store};

use crate::config::Config;
use crate::db;

/// Print every collection with its document count.
pub async fn run_contents(config: &Config) -> Result<()> {
    let store = db::connect_for_read(&config.store).await?;
    let counts = collection_counts(&store).await?;
    store.pool().close().await;

    println!("{:<24} {:>10}", "COLLECTION", "DOCUMENTS");
    println!("{}", "-".repeat(35));
    for (name, n) in &counts {
        println!("{:<24} {:>10}", name, n);
    }
    if counts.is_empty() {
        println!("(no collections yet)");
    }
    Ok(())
}

/// Print the newest `limit` status updates, newest first.
pub async fn run_status(config: &Config, limit: Option<usize>) -> Result<()> {
    let limit = limit.unwrap_or(config.stats.status_limit);
    let store = db::connect_for_read(&config.store).await?;
    let statuses = store.latest_statuses(limit).await?;
    store.pool().close().await;

    if statuses.is_empty() {
        println!("No status updates yet.");
        return Ok(());
    }
    for status in &statuses {
        println!("{}", format_status(status));
    }
    Ok(())
}

fn format_status(status: &StatusRecord) -> String {
    format!("{}  {}", format_ts_iso(status.timestamp), status.message)
}

/// Render a Unix timestamp (seconds, possibly fractional) in UTC.
pub fn format_ts_iso(ts: f64) -> String {
    let secs = ts.floor() as i64;
    let nanos = ((ts - ts.floor()) * 1e9) as u32;
    chrono::DateTime::from_timestamp(secs, nanos)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}
