//! SQLite-backed [`Store`] implementation.
//!
//! Each pipeline collection is a table of the same name. Status updates
//! live in `statusUpdates(timestamp REAL, message TEXT)`; clone records in
//! `clones(instances TEXT)` with the instance list as a JSON array. A
//! collection whose table does not exist yet counts as empty, the same way
//! a document store treats an unknown collection.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use monitor_core::models::{
    CloneInstance, CloneRecord, CloneScan, StatusRecord, CLONES_COLLECTION, STATUS_COLLECTION,
};
use monitor_core::store::Store;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

/// Quote a table name for interpolation into SQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn status_from_row(row: &sqlx::sqlite::SqliteRow) -> StatusRecord {
    StatusRecord {
        timestamp: row.get("timestamp"),
        message: row.get("message"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn count(&self, collection: &str) -> Result<u64> {
        if !self.table_exists(collection).await? {
            return Ok(0);
        }
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(collection)))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count collection '{}'", collection))?;
        Ok(n.max(0) as u64)
    }

    async fn statuses_after(&self, after: Option<f64>) -> Result<Vec<StatusRecord>> {
        if !self.table_exists(STATUS_COLLECTION).await? {
            return Ok(Vec::new());
        }
        let rows = match after {
            Some(cursor) => {
                sqlx::query(
                    r#"SELECT timestamp, message FROM "statusUpdates"
                       WHERE timestamp > ? ORDER BY timestamp ASC, rowid ASC"#,
                )
                .bind(cursor)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"SELECT timestamp, message FROM "statusUpdates"
                       ORDER BY timestamp ASC, rowid ASC"#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.iter().map(status_from_row).collect())
    }

    async fn latest_statuses(&self, limit: usize) -> Result<Vec<StatusRecord>> {
        if !self.table_exists(STATUS_COLLECTION).await? {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"SELECT timestamp, message FROM "statusUpdates"
               ORDER BY timestamp DESC, rowid DESC LIMIT ?"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(status_from_row).collect())
    }

    async fn clones(&self) -> Result<CloneScan> {
        if !self.table_exists(CLONES_COLLECTION).await? {
            return Ok(CloneScan::default());
        }
        let rows = sqlx::query(r#"SELECT rowid AS row_id, instances FROM "clones" ORDER BY rowid"#)
            .fetch_all(&self.pool)
            .await?;

        let mut scan = CloneScan {
            records: Vec::with_capacity(rows.len()),
            malformed: 0,
        };
        for row in &rows {
            let rowid: i64 = row.get("row_id");
            let raw: String = row.get("instances");
            match serde_json::from_str::<Vec<CloneInstance>>(&raw) {
                Ok(instances) => scan.records.push(CloneRecord { instances }),
                Err(e) => {
                    tracing::warn!(row = rowid, error = %e, "skipping clone with malformed instances");
                    scan.malformed += 1;
                }
            }
        }
        Ok(scan)
    }

    async fn collection_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }
}
