//! Error taxonomy for the sampler.
//!
//! Commands and the binary work with `anyhow::Result`; the sampling loop
//! needs to tell the failure kinds apart to decide between retrying,
//! reconnecting, and giving up, so the components it drives return
//! [`MonitorError`].

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Error, Debug)]
pub enum MonitorError {
    /// The store could not be reached and the retry policy ran out.
    #[error("store unavailable after {attempts} attempt(s): {source}")]
    ConnectionUnavailable {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// Shutdown was requested while waiting for the store.
    #[error("connection attempt cancelled")]
    ConnectionCancelled,

    /// A query against a connected store failed.
    #[error("store query failed: {0:#}")]
    Store(#[source] anyhow::Error),

    /// A sink file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A row would have moved the series backwards in time.
    #[error("elapsed time went backwards: {elapsed}s after {previous}s")]
    NonMonotonicElapsed { previous: u64, elapsed: u64 },
}

impl MonitorError {
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MonitorError::WriteFailure {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure points at the store rather than the local sinks.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            MonitorError::Store(_) | MonitorError::ConnectionUnavailable { .. }
        )
    }
}
