//! Pipeline statistics from the sampled series.
//!
//! Reads the series file the sampler is writing (it may be mid-write, see
//! [`monitor_core::series`]), fetches the clone records from the store, and
//! runs the [`StatisticsEngine`]. Used by `monitor stats` and `GET /stats`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use monitor_core::models::CloneScan;
use monitor_core::series::{parse_series, LoadedSeries, RowAnomaly};
use monitor_core::stats::{DerivedStats, StatisticsEngine};
use monitor_core::store::Store;

use crate::config::Config;
use crate::db;

/// Derived statistics plus the series rows that could not be used.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub series_path: PathBuf,
    #[serde(flatten)]
    pub stats: DerivedStats,
    pub anomalies: Vec<RowAnomaly>,
}

/// Read the series file.
///
/// `Ok(None)` when the file is absent, empty, or has no data rows yet.
pub fn read_series(path: &Path) -> Result<Option<LoadedSeries>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read series file {}", path.display()))
        }
    };

    let loaded = parse_series(&text)
        .with_context(|| format!("Malformed series file {}", path.display()))?;
    Ok(loaded.filter(|l| !l.series.is_empty()))
}

/// Summarize a loaded series against the store's clone records.
pub fn build_report(config: &Config, loaded: LoadedSeries, clones: &CloneScan) -> StatsReport {
    let engine = StatisticsEngine::new(config.stats.phase_table());
    let stats = engine.summarize(&loaded.series, clones);

    if !loaded.anomalies.is_empty() {
        tracing::warn!(count = loaded.anomalies.len(), "skipped malformed series rows");
    }
    if stats.clone_size.without_instances > 0 {
        tracing::warn!(
            count = stats.clone_size.without_instances,
            "clone records without instances left out of the average size"
        );
    }
    if stats.clone_size.malformed > 0 {
        tracing::warn!(
            count = stats.clone_size.malformed,
            "clone records with malformed instances left out of the average size"
        );
    }

    StatsReport {
        series_path: config.sampler.series_path.clone(),
        stats,
        anomalies: loaded.anomalies,
    }
}

/// Load the series and, if it has data, summarize it using `store`.
pub async fn compute_report<S: Store + ?Sized>(config: &Config, store: &S) -> Result<Option<StatsReport>> {
    let Some(loaded) = read_series(&config.sampler.series_path)? else {
        return Ok(None);
    };
    let clones = store.clones().await.context("Failed to fetch clone records")?;
    Ok(Some(build_report(config, loaded, &clones)))
}

/// Run the stats command: summarize the series and print it.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let Some(loaded) = read_series(&config.sampler.series_path)? else {
        if json {
            println!("{}", serde_json::json!({ "status": "no data yet" }));
        } else {
            println!(
                "No data yet in {} (is `monitor sample` running?)",
                config.sampler.series_path.display()
            );
        }
        return Ok(());
    };

    let store = db::connect_for_read(&config.store).await?;
    let clones = store.clones().await.context("Failed to fetch clone records")?;
    let report = build_report(config, loaded, &clones);
    store.pool().close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &StatsReport) {
    let stats = &report.stats;

    println!("Clone Monitor: Pipeline Stats");
    println!("=============================");
    println!();
    println!("  Series:      {}", report.series_path.display());
    println!("  Samples:     {}", stats.samples);
    if let Some(elapsed) = stats.latest_elapsed {
        println!("  Elapsed:     {}", format_elapsed(elapsed));
    }

    if !stats.latest.is_empty() {
        println!();
        println!("  {:<16} {:>10} {:>10} {:>12}", "COLLECTION", "LATEST", "PER FILE", "LAST RATE/s");
        println!("  {}", "-".repeat(51));
        for (column, latest) in &stats.latest {
            let per_file = stats
                .per_file
                .get(column)
                .map(|r| format!("{:.2}", r))
                .unwrap_or_else(|| "-".to_string());
            let rate = stats
                .rates
                .get(column)
                .and_then(|curve| curve.last())
                .map(|p| format!("{:.2}", p.rate))
                .unwrap_or_else(|| "-".to_string());
            println!("  {:<16} {:>10} {:>10} {:>12}", column, latest, per_file, rate);
        }
    }

    let clone_size = &stats.clone_size;
    println!();
    println!(
        "  Avg clone:   {:.1} lines over {} clone(s)",
        clone_size.average, clone_size.sized
    );
    if clone_size.without_instances > 0 {
        println!("  Unsized:     {} clone(s) without instances", clone_size.without_instances);
    }
    if clone_size.malformed > 0 {
        println!("  Malformed:   {} clone(s) with unreadable instances", clone_size.malformed);
    }

    if !report.anomalies.is_empty() {
        println!();
        println!("  Skipped rows:");
        for anomaly in &report.anomalies {
            println!("    line {}: {}", anomaly.line, anomaly.reason);
        }
    }
    println!();
}

/// Format whole seconds as e.g. "1h 02m 05s".
fn format_elapsed(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_core::models::{CloneInstance, CloneRecord};
    use monitor_core::store::memory::InMemoryStore;

    fn config_with_series(tmp: &tempfile::TempDir, contents: Option<&str>) -> Config {
        let mut config = Config::default();
        config.sampler.series_path = tmp.path().join("data.csv");
        if let Some(text) = contents {
            std::fs::write(&config.sampler.series_path, text).unwrap();
        }
        config
    }

    #[test]
    fn test_no_data_yet() {
        let tmp = tempfile::TempDir::new().unwrap();
        let absent = config_with_series(&tmp, None);
        assert!(read_series(&absent.sampler.series_path).unwrap().is_none());

        let empty = config_with_series(&tmp, Some(""));
        assert!(read_series(&empty.sampler.series_path).unwrap().is_none());

        let header_only = config_with_series(&tmp, Some("files,clones,elapsed\n"));
        assert!(read_series(&header_only.sampler.series_path).unwrap().is_none());

        let partial = config_with_series(&tmp, Some("files,clones,elapsed\n3,1"));
        assert!(read_series(&partial.sampler.series_path).unwrap().is_none());
    }

    #[test]
    fn test_bad_header_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = config_with_series(&tmp, Some("files,clones\n1,2\n"));
        assert!(read_series(&config.sampler.series_path).is_err());
    }

    #[tokio::test]
    async fn test_compute_report() {
        let tmp = tempfile::TempDir::new().unwrap();
        let series = "\
files,chunks,candidates,clones,statusUpdates,elapsed
4,0,0,0,2,1
8,0,0,0,2,2
8,40,0,0,3,3
8,100,0,0,3,5
8,100,10,3,6,6
8,100,oops,3,6,7
";
        let config = config_with_series(&tmp, Some(series));
        let store = InMemoryStore::new();
        for (start, end) in [(1, 11), (5, 20)] {
            store.push_clone(CloneRecord {
                instances: vec![CloneInstance {
                    file_name: Some("A.java".to_string()),
                    start_line: start,
                    end_line: end,
                }],
            });
        }
        store.push_clone(CloneRecord::default());

        let report = compute_report(&config, &store).await.unwrap().unwrap();
        let stats = &report.stats;
        assert_eq!(stats.samples, 5);
        assert_eq!(stats.latest_elapsed, Some(6));
        assert_eq!(stats.latest["chunks"], 100);
        // Phase 3 chunks max / phase 2 files max.
        assert_eq!(stats.per_file["chunks"], 12.5);
        assert_eq!(stats.rates["chunks"].len(), 1);
        assert_eq!(stats.rates["chunks"][0].rate, 30.0);
        assert_eq!(stats.clone_size.average, 12.5);
        assert_eq!(stats.clone_size.without_instances, 1);
        assert_eq!(stats.clone_size.malformed, 0);
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].line, 7);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["samples"], 5);
        assert_eq!(json["anomalies"][0]["reason"]["kind"], "not_numeric");
    }

    #[test]
    fn test_report_counts_malformed_clones() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = config_with_series(&tmp, Some("files,clones,elapsed\n2,1,1\n"));
        let loaded = read_series(&config.sampler.series_path).unwrap().unwrap();
        let scan = CloneScan {
            records: vec![CloneRecord {
                instances: vec![CloneInstance {
                    file_name: None,
                    start_line: 10,
                    end_line: 25,
                }],
            }],
            malformed: 1,
        };

        let report = build_report(&config, loaded, &scan);
        assert_eq!(report.stats.clone_size.average, 15.0);
        assert_eq!(report.stats.clone_size.sized, 1);
        assert_eq!(report.stats.clone_size.malformed, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["clone_size"]["malformed"], 1);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(5), "5s");
        assert_eq!(format_elapsed(65), "1m 05s");
        assert_eq!(format_elapsed(3725), "1h 02m 05s");
    }
}
