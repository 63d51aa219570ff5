//! Query-level SQI rows as shown in the results table

use crate::error::{Result, SqiError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Digits both SQI scores are rounded to before display and comparison.
pub const SCORE_PRECISION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PerformanceLabel {
    #[serde(rename = "Below Average")]
    BelowAverage,
    #[serde(rename = "Average")]
    Average,
    #[serde(rename = "Above Average")]
    AboveAverage,
}

impl PerformanceLabel {
    /// Compare the query score to the experience average at display precision.
    pub fn classify(query_sqi_score: f64, experience_avg_sqi: f64) -> Self {
        let query = round_to(query_sqi_score, SCORE_PRECISION);
        let average = round_to(experience_avg_sqi, SCORE_PRECISION);
        if query < average {
            PerformanceLabel::BelowAverage
        } else if query == average {
            PerformanceLabel::Average
        } else {
            PerformanceLabel::AboveAverage
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceLabel::BelowAverage => "Below Average",
            PerformanceLabel::Average => "Average",
            PerformanceLabel::AboveAverage => "Above Average",
        }
    }
}

impl fmt::Display for PerformanceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round half away from zero.
pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResultRow {
    pub query_text: String,
    pub business_id: String,
    pub business_name: String,
    pub experience_key: String,
    pub experience_avg_sqi: f64,
    pub query_sqi_score: f64,
    pub total_searches: u64,
    pub performance_label: PerformanceLabel,
}

impl QueryResultRow {
    /// Build a row from raw warehouse values. Scores are stored rounded and
    /// the label is derived from the rounded values.
    pub fn new(
        query_text: impl Into<String>,
        business_id: impl Into<String>,
        business_name: impl Into<String>,
        experience_key: impl Into<String>,
        experience_avg_sqi: f64,
        query_sqi_score: f64,
        total_searches: u64,
    ) -> Self {
        let experience_avg_sqi = round_to(experience_avg_sqi, SCORE_PRECISION);
        let query_sqi_score = round_to(query_sqi_score, SCORE_PRECISION);
        Self {
            query_text: query_text.into(),
            business_id: business_id.into(),
            business_name: business_name.into(),
            experience_key: experience_key.into(),
            experience_avg_sqi,
            query_sqi_score,
            total_searches,
            performance_label: PerformanceLabel::classify(query_sqi_score, experience_avg_sqi),
        }
    }

    pub fn value(&self, column: MetricColumn) -> f64 {
        match column {
            MetricColumn::TotalSearches => self.total_searches as f64,
            MetricColumn::QuerySqiScore => self.query_sqi_score,
            MetricColumn::ExperienceAvgSqi => self.experience_avg_sqi,
        }
    }
}

/// Numeric columns of [`QueryResultRow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricColumn {
    TotalSearches,
    QuerySqiScore,
    ExperienceAvgSqi,
}

impl MetricColumn {
    pub fn name(&self) -> &'static str {
        match self {
            MetricColumn::TotalSearches => "total_searches",
            MetricColumn::QuerySqiScore => "query_sqi_score",
            MetricColumn::ExperienceAvgSqi => "experience_avg_sqi",
        }
    }
}

impl FromStr for MetricColumn {
    type Err = SqiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "total_searches" => Ok(MetricColumn::TotalSearches),
            "query_sqi_score" => Ok(MetricColumn::QuerySqiScore),
            "experience_avg_sqi" | "monthly_experience_avg_sqi" => Ok(MetricColumn::ExperienceAvgSqi),
            other => Err(SqiError::UnknownColumn(other.to_string())),
        }
    }
}
