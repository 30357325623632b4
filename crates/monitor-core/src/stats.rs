//! Derived statistics over a sampled series.
//!
//! Everything here is pure: the caller materializes a [`Series`] (usually
//! via [`crate::series::parse_series`]) and fetches clone records from the
//! store, and the engine turns them into per-file ratios, rate-of-change
//! curves, and the average clone size.
//!
//! # Phases
//!
//! The pipeline runs in phases, and the series mixes rows sampled during
//! all of them. A designated column (by default `statusUpdates`) acts as
//! the phase code. Each metric is associated with the phase in which it
//! grows, and statistics for a metric only look at the rows of its phase;
//! mixing phases yields meaningless ratios. The association is a
//! [`PhaseTable`] supplied by configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{CloneRecord, CloneScan, Sample, Series};

/// Metric-to-phase association used to filter rows before computing
/// statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTable {
    /// Column whose value is the phase code of a row.
    pub phase_column: String,
    /// Column used as the denominator of per-file ratios.
    pub files_column: String,
    /// Metric column name to phase code.
    pub phases: BTreeMap<String, u64>,
}

impl Default for PhaseTable {
    fn default() -> Self {
        let phases = [("files", 2), ("chunks", 3), ("candidates", 6), ("clones", 6)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            phase_column: "statusUpdates".to_string(),
            files_column: "files".to_string(),
            phases,
        }
    }
}

/// Rate of change between two consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatePoint {
    /// Elapsed seconds of the later sample.
    pub elapsed: u64,
    /// `Δvalue / Δelapsed`, in units per second.
    pub rate: f64,
}

/// Average clone size plus the records that could not be sized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct CloneSizeSummary {
    /// Mean of `endLine - startLine` over the first instance of each sized record.
    pub average: f64,
    /// Records that contributed to the average.
    pub sized: usize,
    /// Records with no instances; skipped.
    pub without_instances: usize,
    /// Stored records whose instances could not be decoded; skipped.
    pub malformed: usize,
}

/// Everything the presentation layer shows, recomputed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct DerivedStats {
    pub samples: usize,
    pub latest_elapsed: Option<u64>,
    /// Latest value of every column.
    pub latest: BTreeMap<String, u64>,
    /// Metric per file, keyed by metric.
    pub per_file: BTreeMap<String, f64>,
    /// Rate-of-change curve, keyed by metric.
    pub rates: BTreeMap<String, Vec<RatePoint>>,
    pub clone_size: CloneSizeSummary,
}

/// `numerator / denominator`, or 0 when the denominator is 0.
pub fn ratio_of_maxima(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Discrete derivative of `(elapsed, value)` points.
///
/// The first point has no predecessor and produces no rate; a pair with no
/// time between them is skipped as well. The output therefore has at most
/// `points.len() - 1` entries.
pub fn derivative(points: &[(u64, u64)]) -> Vec<RatePoint> {
    points
        .windows(2)
        .filter_map(|w| {
            let (t0, v0) = w[0];
            let (t1, v1) = w[1];
            if t1 <= t0 {
                return None;
            }
            let dv = v1 as f64 - v0 as f64;
            let dt = (t1 - t0) as f64;
            Some(RatePoint {
                elapsed: t1,
                rate: dv / dt,
            })
        })
        .collect()
}

/// Average size of the first instance of each clone record.
///
/// Returns an average of 0 when no record can be sized. Records with an
/// empty instance list are counted in
/// [`CloneSizeSummary::without_instances`] rather than treated as size 0.
pub fn average_clone_size(records: &[CloneRecord]) -> CloneSizeSummary {
    let mut total: i64 = 0;
    let mut summary = CloneSizeSummary::default();
    for record in records {
        match record.instances.first() {
            Some(first) => {
                total += first.size();
                summary.sized += 1;
            }
            None => summary.without_instances += 1,
        }
    }
    if summary.sized > 0 {
        summary.average = total as f64 / summary.sized as f64;
    }
    summary
}

/// Stateless statistics over a [`Series`], parameterized by a [`PhaseTable`].
#[derive(Debug, Clone, Default)]
pub struct StatisticsEngine {
    table: PhaseTable,
}

impl StatisticsEngine {
    pub fn new(table: PhaseTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &PhaseTable {
        &self.table
    }

    /// Rows sampled during `metric`'s phase.
    ///
    /// A metric without a phase entry, or a series without the phase
    /// column, is returned unfiltered.
    pub fn filter_by_phase(&self, series: &Series, metric: &str) -> Series {
        let code = self.table.phases.get(metric).copied();
        let phase_idx = series.column_index(&self.table.phase_column);
        let rows: Vec<Sample> = match (code, phase_idx) {
            (Some(code), Some(idx)) => series
                .rows
                .iter()
                .filter(|r| r.values[idx] == code)
                .cloned()
                .collect(),
            _ => series.rows.clone(),
        };
        Series {
            columns: series.columns.clone(),
            rows,
        }
    }

    /// Phase-filtered maximum of `metric` divided by the phase-filtered
    /// maximum of the files column. 0 when there are no files.
    pub fn per_file_ratio(&self, series: &Series, metric: &str) -> f64 {
        let numerator = self.filter_by_phase(series, metric).max_of(metric);
        let files = &self.table.files_column;
        let denominator = self.filter_by_phase(series, files).max_of(files);
        ratio_of_maxima(numerator, denominator)
    }

    /// Rate-of-change curve of `metric` over its phase's rows. Empty when
    /// the column is unknown.
    pub fn rate_of(&self, series: &Series, metric: &str) -> Vec<RatePoint> {
        self.filter_by_phase(series, metric)
            .points(metric)
            .map(|points| derivative(&points))
            .unwrap_or_default()
    }

    /// Compute every derived statistic for the metrics in the phase table
    /// that the series actually has.
    pub fn summarize(&self, series: &Series, clones: &CloneScan) -> DerivedStats {
        let mut stats = DerivedStats {
            samples: series.len(),
            latest_elapsed: series.last().map(|s| s.elapsed),
            clone_size: CloneSizeSummary {
                malformed: clones.malformed,
                ..average_clone_size(&clones.records)
            },
            ..Default::default()
        };

        if let Some(last) = series.last() {
            for (column, value) in series.columns.iter().zip(&last.values) {
                stats.latest.insert(column.clone(), *value);
            }
        }

        for metric in self.table.phases.keys() {
            if series.column_index(metric).is_none() {
                continue;
            }
            if *metric != self.table.files_column {
                stats
                    .per_file
                    .insert(metric.clone(), self.per_file_ratio(series, metric));
            }
            stats
                .rates
                .insert(metric.clone(), self.rate_of(series, metric));
        }

        stats
    }
}
