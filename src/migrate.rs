//! Local schema setup for the pipeline's store.
//!
//! The pipeline owns its database; `monitor init` exists so the monitor can
//! be run and demonstrated against an empty store that has the expected
//! layout. Every statement is `IF NOT EXISTS`, so running it against a live
//! pipeline database is harmless.

use anyhow::Result;
use sqlx::SqlitePool;

use monitor_core::models::{CLONES_COLLECTION, STATUS_COLLECTION};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::quote_ident;

/// Create the configured collections in `<host>/<name>.sqlite`, creating
/// the file if needed.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::open_pool(&config.store.db_path(), true).await?;

    let mut collections = config.sampler.collections.clone();
    for required in [STATUS_COLLECTION, CLONES_COLLECTION] {
        if !collections.iter().any(|c| c == required) {
            collections.push(required.to_string());
        }
    }
    create_collections(&pool, &collections).await?;

    pool.close().await;
    Ok(())
}

/// Create one table per collection.
pub async fn create_collections(pool: &SqlitePool, collections: &[String]) -> Result<()> {
    for name in collections {
        let table = quote_ident(name);
        let ddl = match name.as_str() {
            STATUS_COLLECTION => format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY,
                    timestamp REAL NOT NULL,
                    message TEXT NOT NULL
                )",
                table
            ),
            CLONES_COLLECTION => format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY,
                    instances TEXT NOT NULL DEFAULT '[]'
                )",
                table
            ),
            _ => format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY,
                    doc TEXT NOT NULL DEFAULT '{{}}'
                )",
                table
            ),
        };
        sqlx::query(&ddl).execute(pool).await?;
    }

    if collections.iter().any(|c| c == STATUS_COLLECTION) {
        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_status_updates_timestamp ON "statusUpdates"(timestamp)"#,
        )
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::db::{Connector, SqliteConnector};
    use monitor_core::store::Store;

    #[tokio::test]
    async fn test_init_is_idempotent_and_connectable() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.store = StoreConfig {
            host: tmp.path().join("db").display().to_string(),
            name: "cloneDetector".to_string(),
            retry_backoff_ms: 1,
        };

        run_migrations(&config).await.unwrap();
        run_migrations(&config).await.unwrap();

        let store = SqliteConnector::new(&config.store).connect().await.unwrap();
        let names = store.collection_names().await.unwrap();
        assert_eq!(
            names,
            vec!["candidates", "chunks", "clones", "files", "statusUpdates"]
        );
    }
}
