//! Warehouse Table - column-oriented result with lowercased column names

use crate::error::{Result, SqiError};
use crate::query::columns;
use crate::rows::QueryResultRow;
use polars::prelude::*;
use serde_json::Value;
use tracing::warn;

/// Logical column type used when converting wire rows into a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Boolean,
    Text,
}

#[derive(Debug, Clone)]
pub struct WarehouseTable {
    frame: DataFrame,
}

impl WarehouseTable {
    /// Wrap a frame, lowercasing its column names.
    pub fn new(frame: DataFrame) -> Result<Self> {
        let series: Vec<Series> = frame
            .get_columns()
            .iter()
            .map(|s| {
                let mut s = s.clone();
                let lowered = s.name().to_lowercase();
                s.rename(&lowered);
                s
            })
            .collect();
        Ok(Self {
            frame: DataFrame::new(series)?,
        })
    }

    /// Build a frame from row-major wire data. Cells arrive as JSON strings
    /// or nulls and are parsed according to `kind`.
    pub fn from_wire(columns: &[(String, ColumnKind)], data: &[Vec<Value>]) -> Result<Self> {
        if columns.is_empty() {
            return Err(SqiError::Polars("Result set has no columns".to_string()));
        }

        let mut series_vec = Vec::with_capacity(columns.len());
        for (col_idx, (name, kind)) in columns.iter().enumerate() {
            let cells = data.iter().map(|row| row.get(col_idx).unwrap_or(&Value::Null));
            let series = match kind {
                ColumnKind::Integer => {
                    let values: Vec<Option<i64>> = cells
                        .map(|v| match v {
                            Value::String(s) => s.trim().parse::<i64>().ok(),
                            other => other.as_i64(),
                        })
                        .collect();
                    Series::new(name, values)
                }
                ColumnKind::Float => {
                    let values: Vec<Option<f64>> = cells
                        .map(|v| match v {
                            Value::String(s) => s.trim().parse::<f64>().ok(),
                            other => other.as_f64(),
                        })
                        .collect();
                    Series::new(name, values)
                }
                ColumnKind::Boolean => {
                    let values: Vec<Option<bool>> = cells
                        .map(|v| match v {
                            Value::String(s) => match s.trim() {
                                "true" | "TRUE" | "1" => Some(true),
                                "false" | "FALSE" | "0" => Some(false),
                                _ => None,
                            },
                            other => other.as_bool(),
                        })
                        .collect();
                    Series::new(name, values)
                }
                ColumnKind::Text => {
                    let values: Vec<Option<String>> = cells
                        .map(|v| match v {
                            Value::Null => None,
                            Value::String(s) => Some(s.clone()),
                            other => Some(other.to_string()),
                        })
                        .collect();
                    Series::new(name, values)
                }
            };
            series_vec.push(series);
        }

        Self::new(DataFrame::new(series_vec)?)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// All values of a column, in row order.
    pub fn column_values(&self, name: &str) -> Result<Vec<Value>> {
        let series = self.column(name)?;
        (0..series.len()).map(|idx| cell_to_json(series, idx)).collect()
    }

    /// Non-null numeric values of a column, in row order.
    pub fn numeric_values(&self, name: &str) -> Result<Vec<f64>> {
        let series = self.column(name)?;
        let mut values = Vec::with_capacity(series.len());
        for idx in 0..series.len() {
            if let Some(v) = cell_to_f64(series, idx)? {
                values.push(v);
            }
        }
        Ok(values)
    }

    pub fn first_f64(&self, name: &str) -> Result<Option<f64>> {
        let series = self.column(name)?;
        if series.is_empty() {
            return Ok(None);
        }
        cell_to_f64(series, 0)
    }

    pub fn first_string(&self, name: &str) -> Result<Option<String>> {
        let series = self.column(name)?;
        if series.is_empty() {
            return Ok(None);
        }
        cell_to_string(series, 0)
    }

    /// Decode the query-level statement's output. Rows without a score are
    /// dropped; the performance label is always recomputed from the
    /// rounded scores.
    pub fn to_rows(&self) -> Result<Vec<QueryResultRow>> {
        let query = self.column(columns::QUERY)?;
        let business_id = self.column(columns::BUSINESS_ID)?;
        let business_name = self.column(columns::BUSINESS_NAME)?;
        let experience_key = self.column(columns::EXPERIENCE_KEY)?;
        let experience_avg = self.column(columns::EXPERIENCE_AVG_SQI)?;
        let query_sqi = self.column(columns::QUERY_SQI_SCORE)?;
        let total_searches = self.column(columns::TOTAL_SEARCHES)?;

        let mut rows = Vec::with_capacity(self.height());
        for idx in 0..self.height() {
            let (Some(avg), Some(score)) = (cell_to_f64(experience_avg, idx)?, cell_to_f64(query_sqi, idx)?) else {
                warn!("Dropping result row {} without an SQI score", idx);
                continue;
            };
            let searches = cell_to_f64(total_searches, idx)?.unwrap_or(0.0);

            rows.push(QueryResultRow::new(
                cell_to_string(query, idx)?.unwrap_or_default(),
                cell_to_string(business_id, idx)?.unwrap_or_default(),
                cell_to_string(business_name, idx)?.unwrap_or_default(),
                cell_to_string(experience_key, idx)?.unwrap_or_default(),
                avg,
                score,
                searches.max(0.0).round() as u64,
            ));
        }
        Ok(rows)
    }

    fn column(&self, name: &str) -> Result<&Series> {
        self.frame
            .column(name)
            .map_err(|_| SqiError::UnknownColumn(name.to_string()))
    }
}

fn cell_to_f64(series: &Series, idx: usize) -> Result<Option<f64>> {
    let value = series.get(idx)?;
    Ok(match value {
        AnyValue::Null => None,
        AnyValue::Float64(f) => Some(f),
        AnyValue::Float32(f) => Some(f as f64),
        AnyValue::Int64(i) => Some(i as f64),
        AnyValue::Int32(i) => Some(i as f64),
        AnyValue::Int16(i) => Some(i as f64),
        AnyValue::Int8(i) => Some(i as f64),
        AnyValue::UInt64(u) => Some(u as f64),
        AnyValue::UInt32(u) => Some(u as f64),
        AnyValue::UInt16(u) => Some(u as f64),
        AnyValue::UInt8(u) => Some(u as f64),
        AnyValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn cell_to_string(series: &Series, idx: usize) -> Result<Option<String>> {
    let value = series.get(idx)?;
    Ok(match value {
        AnyValue::Null => None,
        AnyValue::String(s) => Some(s.to_string()),
        other => Some(other.to_string()),
    })
}

fn cell_to_json(series: &Series, idx: usize) -> Result<Value> {
    let value = series.get(idx)?;
    Ok(match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::Int8(i) => Value::Number(i.into()),
        AnyValue::Int16(i) => Value::Number(i.into()),
        AnyValue::Int32(i) => Value::Number(i.into()),
        AnyValue::Int64(i) => Value::Number(i.into()),
        AnyValue::UInt8(u) => Value::Number(u.into()),
        AnyValue::UInt16(u) => Value::Number(u.into()),
        AnyValue::UInt32(u) => Value::Number(u.into()),
        AnyValue::UInt64(u) => Value::Number(u.into()),
        AnyValue::Float32(f) => serde_json::Number::from_f64(f as f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        AnyValue::Float64(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        other => Value::String(other.to_string()),
    })
}
