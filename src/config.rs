//! Configuration loading.
//!
//! Settings come from an optional TOML file and are then overlaid with the
//! environment variables the monitor has always honoured:
//!
//! | Variable | Setting | Default |
//! |----------|---------|---------|
//! | `DBHOST` | `store.host` | `.` |
//! | `DBNAME` | `store.name` | `cloneDetector` |
//! | `SAMPLE_INTERVAL` | `sampler.interval_secs` | `1` |
//!
//! A missing config file is not an error: every section has defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use monitor_core::models::{DEFAULT_COLLECTIONS, ELAPSED_COLUMN};
use monitor_core::stats::PhaseTable;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory that holds the pipeline's database.
    #[serde(default = "default_host")]
    pub host: String,
    /// Database name; the file is `<host>/<name>.sqlite`.
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            name: default_db_name(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl StoreConfig {
    pub fn db_path(&self) -> PathBuf {
        Path::new(&self.host).join(format!("{}.sqlite", self.name))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn default_host() -> String {
    ".".to_string()
}
fn default_db_name() -> String {
    "cloneDetector".to_string()
}
fn default_retry_backoff_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct SamplerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_series_path")]
    pub series_path: PathBuf,
    #[serde(default = "default_status_log_path")]
    pub status_log_path: PathBuf,
    /// Collections to count, in column order.
    #[serde(default = "default_collections")]
    pub collections: Vec<String>,
    /// Consecutive failed ticks before reconnecting (store failures) or
    /// giving up (write failures). 0 disables both.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            series_path: default_series_path(),
            status_log_path: default_status_log_path(),
            collections: default_collections(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_interval_secs() -> u64 {
    1
}
fn default_series_path() -> PathBuf {
    PathBuf::from("data.csv")
}
fn default_status_log_path() -> PathBuf {
    PathBuf::from("status.csv")
}
fn default_collections() -> Vec<String> {
    DEFAULT_COLLECTIONS.iter().map(|s| s.to_string()).collect()
}
fn default_max_consecutive_failures() -> u32 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    #[serde(default = "default_phase_column")]
    pub phase_column: String,
    #[serde(default = "default_files_column")]
    pub files_column: String,
    #[serde(default = "default_phases")]
    pub phases: BTreeMap<String, u64>,
    #[serde(default = "default_status_limit")]
    pub status_limit: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            phase_column: default_phase_column(),
            files_column: default_files_column(),
            phases: default_phases(),
            status_limit: default_status_limit(),
        }
    }
}

impl StatsConfig {
    pub fn phase_table(&self) -> PhaseTable {
        PhaseTable {
            phase_column: self.phase_column.clone(),
            files_column: self.files_column.clone(),
            phases: self.phases.clone(),
        }
    }
}

fn default_phase_column() -> String {
    PhaseTable::default().phase_column
}
fn default_files_column() -> String {
    PhaseTable::default().files_column
}
fn default_phases() -> BTreeMap<String, u64> {
    PhaseTable::default().phases
}
fn default_status_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:7003".to_string()
}

/// Load the config file (if present), apply environment overrides, and
/// validate the result.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Overlay `DBHOST`, `DBNAME`, and `SAMPLE_INTERVAL` using `lookup`.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("DBHOST") {
        config.store.host = host;
    }
    if let Some(name) = lookup("DBNAME") {
        config.store.name = name;
    }
    if let Some(interval) = lookup("SAMPLE_INTERVAL") {
        config.sampler.interval_secs = interval
            .trim()
            .parse()
            .with_context(|| format!("SAMPLE_INTERVAL must be whole seconds, got '{}'", interval))?;
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<()> {
    if config.store.name.trim().is_empty() {
        anyhow::bail!("store.name must not be empty");
    }

    // Elapsed is stored in whole seconds; shorter ticks could repeat a value.
    if config.sampler.interval_secs == 0 {
        anyhow::bail!("sampler.interval_secs must be >= 1");
    }

    if config.sampler.collections.is_empty() {
        anyhow::bail!("sampler.collections must not be empty");
    }
    let mut seen = HashSet::new();
    for name in &config.sampler.collections {
        if name.trim().is_empty() || name.contains(',') {
            anyhow::bail!("invalid collection name: '{}'", name);
        }
        if name == ELAPSED_COLUMN {
            anyhow::bail!("'{}' is reserved for the elapsed-time column", ELAPSED_COLUMN);
        }
        if !seen.insert(name.as_str()) {
            anyhow::bail!("duplicate collection: '{}'", name);
        }
    }

    config
        .server
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("server.bind is not a socket address: '{}'", config.server.bind))?;

    Ok(())
}
