//! Parsing of the persisted time-series file.
//!
//! The sampler writes a header row followed by one comma-separated row per
//! tick, with the elapsed seconds as the last column. Readers run
//! concurrently with the writer, so the text handed to [`parse_series`] may
//! end in the middle of a row: a final line without a terminating newline is
//! treated as an in-flight write and ignored.
//!
//! Rows that cannot be read (wrong number of fields, a non-numeric value, an
//! elapsed time going backwards) are skipped and reported as
//! [`RowAnomaly`]s instead of being coerced to zero.

use serde::Serialize;
use thiserror::Error;

use crate::models::{Sample, Series, ELAPSED_COLUMN};

/// Why a series row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyReason {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("column '{column}' is not a non-negative integer: '{value}'")]
    NotNumeric { column: String, value: String },
    #[error("elapsed went backwards: {elapsed} after {previous}")]
    ElapsedRegressed { previous: u64, elapsed: u64 },
}

/// A skipped row, by 1-based line number in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowAnomaly {
    pub line: usize,
    pub reason: AnomalyReason,
}

/// Errors that make the whole file unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeriesError {
    #[error("series header must end with 'elapsed', found '{0}'")]
    MissingElapsedColumn(String),
    #[error("series header has no collection columns")]
    NoColumns,
}

/// A parsed series together with the rows that had to be skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct LoadedSeries {
    pub series: Series,
    pub anomalies: Vec<RowAnomaly>,
}

/// Parse series text. Returns `Ok(None)` when there is no complete header
/// line yet.
pub fn parse_series(text: &str) -> Result<Option<LoadedSeries>, SeriesError> {
    let mut complete: Vec<&str> = text.split('\n').collect();
    // The piece after the last '\n' is either empty or a partial row.
    complete.pop();

    let mut lines = complete
        .into_iter()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end_matches('\r')));

    let header = loop {
        match lines.next() {
            Some((_, l)) if l.trim().is_empty() => continue,
            Some((_, l)) => break l,
            None => return Ok(None),
        }
    };

    let mut columns: Vec<String> = header.split(',').map(|c| c.trim().to_string()).collect();
    match columns.last() {
        Some(last) if last == ELAPSED_COLUMN => {
            columns.pop();
        }
        _ => return Err(SeriesError::MissingElapsedColumn(header.to_string())),
    }
    if columns.is_empty() {
        return Err(SeriesError::NoColumns);
    }

    let mut loaded = LoadedSeries {
        series: Series::new(columns),
        anomalies: Vec::new(),
    };
    let width = loaded.series.columns.len() + 1;

    for (line, raw) in lines {
        if raw.trim().is_empty() {
            continue;
        }
        match parse_row(&loaded.series, raw, width) {
            Ok(sample) => {
                if let Some(prev) = loaded.series.last() {
                    if sample.elapsed < prev.elapsed {
                        loaded.anomalies.push(RowAnomaly {
                            line,
                            reason: AnomalyReason::ElapsedRegressed {
                                previous: prev.elapsed,
                                elapsed: sample.elapsed,
                            },
                        });
                        continue;
                    }
                }
                loaded.series.rows.push(sample);
            }
            Err(reason) => loaded.anomalies.push(RowAnomaly { line, reason }),
        }
    }

    Ok(Some(loaded))
}

fn parse_row(series: &Series, raw: &str, width: usize) -> Result<Sample, AnomalyReason> {
    let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
    if fields.len() != width {
        return Err(AnomalyReason::FieldCount {
            expected: width,
            found: fields.len(),
        });
    }

    let mut values = Vec::with_capacity(width - 1);
    for (i, field) in fields.iter().enumerate() {
        let column = series
            .columns
            .get(i)
            .map(String::as_str)
            .unwrap_or(ELAPSED_COLUMN);
        let v = field
            .parse::<u64>()
            .map_err(|_| AnomalyReason::NotNumeric {
                column: column.to_string(),
                value: field.to_string(),
            })?;
        values.push(v);
    }
    let elapsed = values.pop().unwrap_or_default();

    Ok(Sample { values, elapsed })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_header_only() {
        assert_eq!(parse_series("").unwrap(), None);
        // Header still being written.
        assert_eq!(parse_series("files,chunks,ela").unwrap(), None);

        let loaded = parse_series("files,chunks,elapsed\n").unwrap().unwrap();
        assert!(loaded.series.is_empty());
        assert_eq!(loaded.series.columns, vec!["files", "chunks"]);
    }

    #[test]
    fn test_rows_and_partial_tail() {
        let text = "files,clones,elapsed\n1,0,0\n4,2,1\n9,3";
        let loaded = parse_series(text).unwrap().unwrap();
        assert_eq!(loaded.series.len(), 2);
        assert_eq!(
            loaded.series.rows[1],
            Sample {
                values: vec![4, 2],
                elapsed: 1
            }
        );
        assert!(loaded.anomalies.is_empty());
    }

    #[test]
    fn test_malformed_rows_are_reported_not_zeroed() {
        let text = "files,clones,elapsed\n1,0,0\n2,x,1\n3,4\n5,6,2\n7,8,1\n";
        let loaded = parse_series(text).unwrap().unwrap();
        assert_eq!(loaded.series.len(), 2);
        assert_eq!(loaded.anomalies.len(), 3);
        assert_eq!(loaded.anomalies[0].line, 3);
        assert_eq!(
            loaded.anomalies[0].reason,
            AnomalyReason::NotNumeric {
                column: "clones".to_string(),
                value: "x".to_string()
            }
        );
        assert_eq!(
            loaded.anomalies[1].reason,
            AnomalyReason::FieldCount {
                expected: 3,
                found: 2
            }
        );
        assert_eq!(
            loaded.anomalies[2].reason,
            AnomalyReason::ElapsedRegressed {
                previous: 2,
                elapsed: 1
            }
        );
    }

    #[test]
    fn test_header_without_elapsed_is_rejected() {
        let err = parse_series("files,chunks\n1,2\n").unwrap_err();
        assert!(matches!(err, SeriesError::MissingElapsedColumn(_)));
        assert_eq!(parse_series("elapsed\n").unwrap_err(), SeriesError::NoColumns);
    }

    #[test]
    fn test_crlf_line_endings() {
        let loaded = parse_series("files,elapsed\r\n3,0\r\n").unwrap().unwrap();
        assert_eq!(loaded.series.rows[0].values, vec![3]);
    }
}
