//! Query Builder - SQI warehouse statements
//!
//! Statements are rendered from fixed templates with positional `?`
//! placeholders. Values travel separately as bindings and are only inlined,
//! quoted, by [`BoundQuery::display_sql`] for people to read or paste.

mod templates;

pub use templates::{QueryBuilder, WarehouseTables};

use crate::error::{Result, SqiError};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlparser::dialect::SnowflakeDialect;
use sqlparser::parser::Parser;

pub const MAX_LOOKBACK_DAYS: i64 = 30;
pub const DEFAULT_LOOKBACK_DAYS: i64 = 14;

/// Output columns of the query-level statement.
pub mod columns {
    pub const QUERY: &str = "query";
    pub const BUSINESS_ID: &str = "business_id";
    pub const BUSINESS_NAME: &str = "business_name";
    pub const EXPERIENCE_KEY: &str = "experience_key";
    pub const EXPERIENCE_AVG_SQI: &str = "monthly_experience_avg_sqi";
    pub const QUERY_SQI_SCORE: &str = "query_sqi_score";
    pub const TOTAL_SEARCHES: &str = "total_searches";
    pub const PERFORMANCE: &str = "performance";
    pub const API_KEY: &str = "api_key";
}

/// Trailing number of days metrics are aggregated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookbackWindow {
    days: u32,
}

impl LookbackWindow {
    pub fn new(days: i64) -> Result<Self> {
        if !(0..=MAX_LOOKBACK_DAYS).contains(&days) {
            return Err(SqiError::InvalidLookback(days));
        }
        Ok(Self { days: days as u32 })
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    /// First event date included in the window.
    pub fn start_date(&self, today: NaiveDate) -> NaiveDate {
        today - Duration::days(i64::from(self.days))
    }
}

impl Default for LookbackWindow {
    fn default() -> Self {
        Self {
            days: DEFAULT_LOOKBACK_DAYS as u32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum BindValue {
    Text(String),
    Integer(i64),
}

impl BindValue {
    /// Snowflake SQL API binding type.
    pub fn snowflake_type(&self) -> &'static str {
        match self {
            BindValue::Text(_) => "TEXT",
            BindValue::Integer(_) => "FIXED",
        }
    }

    /// Bindings are always sent as strings.
    pub fn wire_value(&self) -> String {
        match self {
            BindValue::Text(s) => s.clone(),
            BindValue::Integer(i) => i.to_string(),
        }
    }

    pub fn sql_literal(&self) -> String {
        match self {
            BindValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            BindValue::Integer(i) => i.to_string(),
        }
    }
}

/// A statement plus the values for its `?` placeholders, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundQuery {
    pub sql: String,
    pub params: Vec<BindValue>,
}

impl BoundQuery {
    pub fn new(sql: impl Into<String>, params: Vec<BindValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn placeholder_count(&self) -> usize {
        placeholder_positions(&self.sql).len()
    }

    /// Statement with every placeholder replaced by its quoted literal.
    pub fn display_sql(&self) -> String {
        let positions = placeholder_positions(&self.sql);
        let mut out = String::with_capacity(self.sql.len() + 16 * self.params.len());
        let mut last = 0;
        for (pos, param) in positions.iter().zip(self.params.iter()) {
            out.push_str(&self.sql[last..*pos]);
            out.push_str(&param.sql_literal());
            last = pos + 1;
        }
        out.push_str(&self.sql[last..]);
        out
    }
}

/// Byte offsets of `?` outside single-quoted literals.
fn placeholder_positions(sql: &str) -> Vec<usize> {
    let mut in_literal = false;
    sql.char_indices()
        .filter_map(|(idx, c)| match c {
            '\'' => {
                in_literal = !in_literal;
                None
            }
            '?' if !in_literal => Some(idx),
            _ => None,
        })
        .collect()
}

/// Parse a statement under the Snowflake dialect.
pub fn validate_sql(sql: &str) -> Result<()> {
    let statements = Parser::parse_sql(&SnowflakeDialect {}, sql)
        .map_err(|e| SqiError::InvalidSql(e.to_string()))?;
    if statements.len() != 1 {
        return Err(SqiError::InvalidSql(format!(
            "expected a single statement, found {}",
            statements.len()
        )));
    }
    Ok(())
}
