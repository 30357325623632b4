//! The sampling loop.
//!
//! A [`SamplingLoop`] is either **Connecting** (waiting for the store) or
//! **Sampling**. It starts in Connecting, with both sink files already
//! truncated and headed, so readers see an empty series rather than stale
//! data from a previous run. Once the store answers, every tick:
//!
//! 1. computes the whole seconds elapsed since sampling started,
//! 2. appends one row of collection counts to the series,
//! 3. appends any new status updates to the status log.
//!
//! Ticks run back to back on one task with a fixed sleep in between, so
//! the effective period is the interval plus the tick's own work. A failed
//! tick is logged and skipped. Store failures and write failures are
//! counted separately: enough store failures in a row send the loop back to
//! Connecting, and enough write failures without a successful write in
//! between end it.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use monitor_core::models::Sample;

use crate::config::{Config, SamplerConfig};
use crate::db::{connect_with_retry, Connector, RetryPolicy, SqliteConnector};
use crate::error::{MonitorError, Result};
use crate::series_writer::TimeSeriesWriter;
use crate::status_tracker::StatusTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Connecting,
    Sampling,
}

/// What one successful tick produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub sample: Sample,
    pub new_statuses: usize,
}

pub struct SamplingLoop<C: Connector> {
    connector: C,
    policy: RetryPolicy,
    interval: Duration,
    max_consecutive_failures: u32,
    writer: TimeSeriesWriter,
    tracker: StatusTracker,
    store: Option<C::Handle>,
    started: Option<Instant>,
    connections: u32,
    /// Failed store calls since the last successful one.
    store_failures: u32,
    /// Failed sink writes since the last successful one.
    write_failures: u32,
}

impl<C: Connector> SamplingLoop<C> {
    /// Reset both sink files and build a loop in the Connecting state.
    pub fn new(config: &SamplerConfig, policy: RetryPolicy, connector: C) -> Result<Self> {
        let writer = TimeSeriesWriter::write_header(&config.series_path, &config.collections)?;
        let tracker = StatusTracker::write_header(&config.status_log_path)?;
        Ok(Self {
            connector,
            policy,
            interval: config.interval(),
            max_consecutive_failures: config.max_consecutive_failures,
            writer,
            tracker,
            store: None,
            started: None,
            connections: 0,
            store_failures: 0,
            write_failures: 0,
        })
    }

    pub fn state(&self) -> LoopState {
        if self.store.is_some() {
            LoopState::Sampling
        } else {
            LoopState::Connecting
        }
    }

    /// Number of Connecting → Sampling transitions so far.
    pub fn connections(&self) -> u32 {
        self.connections
    }

    pub fn writer(&self) -> &TimeSeriesWriter {
        &self.writer
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    /// Wait for the store and move to Sampling.
    ///
    /// The sampling clock starts at the first successful connection and is
    /// kept across reconnects, so elapsed time never restarts within a run.
    pub async fn connect(&mut self, cancel: &CancellationToken) -> Result<()> {
        let handle = connect_with_retry(&self.connector, &self.policy, cancel).await?;
        self.store = Some(handle);
        self.started.get_or_insert_with(Instant::now);
        self.connections += 1;
        self.store_failures = 0;
        Ok(())
    }

    /// Sample now.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let elapsed = self
            .started
            .map(|s| s.elapsed().as_secs())
            .unwrap_or_default();
        self.tick_at(elapsed).await
    }

    /// Sample with an explicit elapsed time.
    pub async fn tick_at(&mut self, elapsed: u64) -> Result<TickReport> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| MonitorError::Store(anyhow::anyhow!("not connected to the store")))?;

        let sample = self.writer.append(store, elapsed).await?;
        self.store_failures = 0;
        self.write_failures = 0;
        let new_statuses = self.tracker.flush_new(store).await?;

        tracing::debug!(
            elapsed,
            rows = self.writer.rows(),
            new_statuses,
            "sample written"
        );
        Ok(TickReport {
            sample,
            new_statuses,
        })
    }

    /// Account for a failed tick. Returns the error if the loop should stop.
    ///
    /// Every store call in a tick precedes its write, so a write failure
    /// also means the store answered.
    fn record_failure(&mut self, err: MonitorError) -> Result<()> {
        let limit = self.max_consecutive_failures;

        if err.is_store_failure() {
            self.store_failures += 1;
            tracing::error!(
                store_failures = self.store_failures,
                "sampling tick failed: {}",
                err
            );
            if limit > 0 && self.store_failures >= limit {
                tracing::warn!(
                    failures = self.store_failures,
                    "store keeps failing, reconnecting"
                );
                self.store = None;
                self.store_failures = 0;
            }
            return Ok(());
        }

        self.store_failures = 0;
        self.write_failures += 1;
        tracing::error!(
            write_failures = self.write_failures,
            "sampling tick failed: {}",
            err
        );
        if limit > 0 && self.write_failures >= limit {
            return Err(err);
        }
        Ok(())
    }

    /// Run until cancelled.
    ///
    /// Returns `Ok(())` on cancellation and an error only when writing the
    /// sinks fails persistently.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            series = %self.writer.path().display(),
            status_log = %self.tracker.path().display(),
            "sampler starting"
        );

        loop {
            if self.state() == LoopState::Connecting {
                match self.connect(&cancel).await {
                    Ok(()) => tracing::info!(connections = self.connections, "sampling"),
                    Err(MonitorError::ConnectionCancelled) => break,
                    Err(err) => return Err(err),
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            if let Err(err) = self.tick().await {
                self.record_failure(err)?;
            }
        }

        tracing::info!(rows = self.writer.rows(), "sampler stopped");
        Ok(())
    }
}

/// Sample the configured SQLite store until `cancel` fires.
pub async fn run_sampler(config: &Config, cancel: CancellationToken) -> anyhow::Result<()> {
    let connector = SqliteConnector::new(&config.store);
    let policy = RetryPolicy::unbounded(config.store.retry_backoff());
    let mut sampler = SamplingLoop::new(&config.sampler, policy, connector)?;
    sampler.run(cancel).await?;
    Ok(())
}
