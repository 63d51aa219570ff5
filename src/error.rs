use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqiError {
    #[error("No data for this period: percentile requested over an empty table")]
    EmptyInput,

    #[error("Invalid sort mode: {0} (expected sqi_ascending or searches_descending)")]
    InvalidSortMode(String),

    #[error("Invalid percentile: {0} (must be within 0.0..=1.0)")]
    InvalidPercentile(f64),

    #[error("Invalid lookback: {0} days (must be within 0..={})", crate::query::MAX_LOOKBACK_DAYS)]
    InvalidLookback(i64),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Invalid SQL: {0}")]
    InvalidSql(String),

    #[error("Warehouse error: {message}\n--- query ---\n{query}")]
    Warehouse { query: String, message: String },

    #[error("Search API error: {0}")]
    SearchApi(String),

    #[error("Unexpected search response shape at {path}: {message}")]
    ResponseShape { path: String, message: String },

    #[error("Missing search API key for business {0}")]
    MissingCredential(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::error::PolarsError> for SqiError {
    fn from(err: polars::error::PolarsError) -> Self {
        SqiError::Polars(err.to_string())
    }
}

impl SqiError {
    pub(crate) fn warehouse(query: impl Into<String>, message: impl Into<String>) -> Self {
        SqiError::Warehouse {
            query: query.into(),
            message: message.into(),
        }
    }

    pub(crate) fn shape(path: impl Into<String>, message: impl Into<String>) -> Self {
        SqiError::ResponseShape {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for the conditions the dashboard shows as "no data" instead of a failure.
    pub fn is_no_data(&self) -> bool {
        matches!(self, SqiError::EmptyInput)
    }
}

pub type Result<T> = std::result::Result<T, SqiError>;
