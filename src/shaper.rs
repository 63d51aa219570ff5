//! Result Shaper - percentile floors, floor filtering and sort order
//!
//! All operations take the row set by reference and return new vectors;
//! the fetched rows are never reordered in place.

use crate::error::{Result, SqiError};
use crate::rows::{MetricColumn, QueryResultRow};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_SEARCHES_PERCENTILE: f64 = 0.90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    SqiAscending,
    SearchesDescending,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::SqiAscending => "sqi_ascending",
            SortMode::SearchesDescending => "searches_descending",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = SqiError;

    /// Accepts the mode names and the dashboard's selector labels.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sqi_ascending" | "By SQI (Ascending)" => Ok(SortMode::SqiAscending),
            "searches_descending" | "By Searches (Descending)" => Ok(SortMode::SearchesDescending),
            other => Err(SqiError::InvalidSortMode(other.to_string())),
        }
    }
}

/// Value at `percentile` of `column`, linearly interpolated between order
/// statistics.
pub fn searches_floor(rows: &[QueryResultRow], column: MetricColumn, percentile: f64) -> Result<f64> {
    let values: Vec<f64> = rows.iter().map(|row| row.value(column)).collect();
    percentile_of(&values, percentile)
}

/// Interpolated percentile of raw column values; NaNs are skipped.
pub fn percentile_of(values: &[f64], percentile: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&percentile) {
        return Err(SqiError::InvalidPercentile(percentile));
    }
    let mut values: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if values.is_empty() {
        return Err(SqiError::EmptyInput);
    }

    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let rank = percentile * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Ok(values[lower] + fraction * (values[upper] - values[lower]))
}

/// Minimum searches a query needs to be listed: the floor rounded to a
/// whole count, ties to even.
pub fn min_searches(floor: f64) -> f64 {
    floor.round_ties_even()
}

/// Same as [`searches_floor`] with the column given by name.
pub fn searches_floor_by_name(rows: &[QueryResultRow], column: &str, percentile: f64) -> Result<f64> {
    searches_floor(rows, column.parse()?, percentile)
}

/// Rows whose `column` value is at least `threshold`, original order kept.
pub fn filter_by_floor(rows: &[QueryResultRow], column: MetricColumn, threshold: f64) -> Vec<QueryResultRow> {
    rows.iter()
        .filter(|row| row.value(column) >= threshold)
        .cloned()
        .collect()
}

/// Stable sort by the selected mode.
pub fn sort_rows(rows: &[QueryResultRow], mode: SortMode) -> Vec<QueryResultRow> {
    let mut sorted = rows.to_vec();
    match mode {
        SortMode::SqiAscending => sorted.sort_by(|a, b| {
            a.query_sqi_score
                .partial_cmp(&b.query_sqi_score)
                .unwrap_or(Ordering::Equal)
        }),
        SortMode::SearchesDescending => sorted.sort_by(|a, b| b.total_searches.cmp(&a.total_searches)),
    }
    sorted
}

/// Same as [`sort_rows`] with the mode given by name.
pub fn sort_rows_by_name(rows: &[QueryResultRow], mode: &str) -> Result<Vec<QueryResultRow>> {
    Ok(sort_rows(rows, mode.parse()?))
}
