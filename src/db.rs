//! Connection management for the pipeline's backing store.
//!
//! The pipeline and the monitor start independently, so the store may not
//! exist yet when the monitor comes up. [`connect_with_retry`] keeps
//! attempting a [`Connector`] with a fixed backoff until it succeeds, the
//! [`RetryPolicy`] runs out of attempts, or the caller cancels.
//!
//! # SQLite
//!
//! [`SqliteConnector`] opens `<host>/<name>.sqlite`. It never creates the
//! file: a missing database means the pipeline has not started yet, which
//! is a failed attempt. A successful open is probed with `SELECT 1` before
//! the handle is handed out.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio_util::sync::CancellationToken;

use monitor_core::store::Store;

use crate::config::StoreConfig;
use crate::error::{MonitorError, Result};
use crate::sqlite_store::SqliteStore;

/// How often and how many times to attempt a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded(backoff: Duration) -> Self {
        Self {
            backoff,
            max_attempts: None,
        }
    }

    pub fn bounded(backoff: Duration, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts: Some(max_attempts.max(1)),
        }
    }
}

/// Something that can produce a fresh store handle.
///
/// Connecting must be idempotent: calling it again simply yields another
/// handle.
#[async_trait]
pub trait Connector: Send + Sync {
    type Handle: Store + 'static;

    /// Host the store lives on, for logging.
    fn host(&self) -> &str;

    /// Database name, for logging.
    fn database(&self) -> &str;

    /// Make a single connection attempt.
    async fn connect(&self) -> anyhow::Result<Self::Handle>;
}

/// Connect, retrying with a fixed backoff.
///
/// Each failure is logged at warn level. Returns
/// [`MonitorError::ConnectionUnavailable`] once a bounded policy is
/// exhausted and [`MonitorError::ConnectionCancelled`] if `cancel` fires
/// first.
pub async fn connect_with_retry<C: Connector>(
    connector: &C,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<C::Handle> {
    let mut attempts: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(MonitorError::ConnectionCancelled);
        }
        attempts += 1;

        match connector.connect().await {
            Ok(handle) => {
                tracing::info!(
                    host = connector.host(),
                    database = connector.database(),
                    attempts,
                    "Connected to store at {} and using database '{}'",
                    connector.host(),
                    connector.database()
                );
                return Ok(handle);
            }
            Err(err) => {
                if policy.max_attempts.is_some_and(|max| attempts >= max) {
                    return Err(MonitorError::ConnectionUnavailable {
                        attempts,
                        source: err,
                    });
                }
                tracing::warn!(
                    host = connector.host(),
                    database = connector.database(),
                    attempt = attempts,
                    error = %format!("{:#}", err),
                    "store not ready, retrying in {:?}",
                    policy.backoff
                );
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(MonitorError::ConnectionCancelled),
            _ = tokio::time::sleep(policy.backoff) => {}
        }
    }
}

/// Connects to `<host>/<name>.sqlite` without creating it.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    host: String,
    name: String,
    path: PathBuf,
}

impl SqliteConnector {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            host: config.host.clone(),
            name: config.name.clone(),
            path: config.db_path(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    type Handle = SqliteStore;

    fn host(&self) -> &str {
        &self.host
    }

    fn database(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> anyhow::Result<SqliteStore> {
        if !self.path.exists() {
            bail!("database file {} does not exist yet", self.path.display());
        }
        let pool = open_pool(&self.path, false).await?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .with_context(|| format!("database {} did not answer", self.path.display()))?;
        Ok(SqliteStore::new(pool))
    }
}

/// Connect for a one-off read (CLI commands, HTTP handlers): a few quick
/// attempts, then [`MonitorError::ConnectionUnavailable`].
pub async fn connect_for_read(config: &StoreConfig) -> Result<SqliteStore> {
    let policy = RetryPolicy::bounded(config.retry_backoff(), READ_ATTEMPTS);
    connect_with_retry(
        &SqliteConnector::new(config),
        &policy,
        &CancellationToken::new(),
    )
    .await
}

const READ_ATTEMPTS: u32 = 3;

/// Open a pool on a SQLite file.
///
/// `create` is only used by `monitor init`; the sampler never creates the
/// pipeline's database.
pub async fn open_pool(path: &Path, create: bool) -> anyhow::Result<SqlitePool> {
    if create {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(create)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_core::store::memory::InMemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Fails a fixed number of times, then hands out the same store.
    struct FlakyConnector {
        failures: u32,
        attempts: AtomicU32,
        store: Arc<InMemoryStore>,
    }

    impl FlakyConnector {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                attempts: AtomicU32::new(0),
                store: Arc::new(InMemoryStore::new()),
            }
        }
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        type Handle = Arc<InMemoryStore>;

        fn host(&self) -> &str {
            "memory"
        }

        fn database(&self) -> &str {
            "test"
        }

        async fn connect(&self) -> anyhow::Result<Arc<InMemoryStore>> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                bail!("attempt {} refused", n);
            }
            Ok(self.store.clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_ready() {
        let connector = FlakyConnector::new(3);
        let policy = RetryPolicy::unbounded(Duration::from_secs(1));
        let start = tokio::time::Instant::now();

        connect_with_retry(&connector, &policy, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
        // One backoff per failure.
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_policy_gives_up() {
        let connector = FlakyConnector::new(10);
        let policy = RetryPolicy::bounded(Duration::from_millis(10), 2);

        let err = connect_with_retry(&connector, &policy, &CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            MonitorError::ConnectionUnavailable { attempts: 2, .. }
        ));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_retrying() {
        let connector = FlakyConnector::new(u32::MAX);
        let policy = RetryPolicy::unbounded(Duration::from_secs(1));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            canceller.cancel();
        });

        let err = connect_with_retry(&connector, &policy, &cancel)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, MonitorError::ConnectionCancelled));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_sqlite_connector_missing_file_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = StoreConfig {
            host: tmp.path().display().to_string(),
            name: "absent".to_string(),
            retry_backoff_ms: 1,
        };
        let connector = SqliteConnector::new(&config);
        assert!(connector.connect().await.is_err());
        assert!(!connector.path().exists());
    }
}
