//! Snowflake Warehouse
//!
//! Talks to the Snowflake SQL REST API (`/api/v2/statements`). Values are
//! sent as positional bindings, never spliced into the statement text.

use crate::config::SnowflakeConfig;
use crate::error::{Result, SqiError};
use crate::query::BoundQuery;
use crate::warehouse::table::{ColumnKind, WarehouseTable};
use crate::warehouse::Warehouse;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const STATEMENTS_PATH: &str = "/api/v2/statements";
const MAX_POLLS: usize = 600;

pub struct SnowflakeWarehouse {
    config: SnowflakeConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
    warehouse: &'a str,
    role: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    bindings: BTreeMap<String, Binding>,
}

#[derive(Debug, Serialize)]
struct Binding {
    #[serde(rename = "type")]
    kind: &'static str,
    value: String,
}

/// Body of a 200 response (first partition) or a partition fetch.
#[derive(Debug, Deserialize)]
struct ResultSet {
    #[serde(rename = "statementHandle")]
    statement_handle: Option<String>,
    #[serde(rename = "resultSetMetaData")]
    metadata: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ResultSetMetaData {
    #[serde(rename = "numRows")]
    num_rows: Option<u64>,
    #[serde(rename = "rowType", default)]
    row_type: Vec<RowType>,
    #[serde(rename = "partitionInfo", default)]
    partition_info: Vec<PartitionInfo>,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
    #[serde(rename = "type")]
    column_type: String,
    scale: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PartitionInfo {
    #[serde(rename = "rowCount")]
    row_count: Option<u64>,
}

/// Body of a 202 (still running) or an error response.
#[derive(Debug, Deserialize)]
struct StatementStatus {
    #[serde(rename = "statementHandle")]
    statement_handle: Option<String>,
    #[serde(rename = "statementStatusUrl")]
    statement_status_url: Option<String>,
    message: Option<String>,
    code: Option<String>,
    #[serde(rename = "sqlState")]
    sql_state: Option<String>,
}

impl StatementStatus {
    /// Where to poll a running statement: the status URL when given,
    /// otherwise the statement path built from the handle.
    fn poll_path(&self) -> Option<String> {
        self.statement_status_url
            .clone()
            .or_else(|| {
                self.statement_handle
                    .as_ref()
                    .map(|h| format!("{}/{}", STATEMENTS_PATH, h))
            })
    }
}

impl RowType {
    fn kind(&self) -> ColumnKind {
        match self.column_type.to_lowercase().as_str() {
            "fixed" if self.scale.unwrap_or(0) == 0 => ColumnKind::Integer,
            "fixed" | "real" | "float" | "double" | "number" => ColumnKind::Float,
            "boolean" => ColumnKind::Boolean,
            _ => ColumnKind::Text,
        }
    }
}

impl SnowflakeWarehouse {
    pub fn new(config: SnowflakeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs + 30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { config, client })
    }

    fn base_url(&self) -> &str {
        self.config.account_url.trim_end_matches('/')
    }

    fn absolute_url(&self, path_or_url: String) -> String {
        if path_or_url.starts_with("http") {
            path_or_url
        } else {
            format!("{}{}", self.base_url(), path_or_url)
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.config.token)
            .header("X-Snowflake-Authorization-Token-Type", &self.config.token_type)
            .header("Accept", "application/json")
            .header("User-Agent", concat!("sqi-explorer/", env!("CARGO_PKG_VERSION")))
    }

    fn bindings(query: &BoundQuery) -> BTreeMap<String, Binding> {
        query
            .params
            .iter()
            .enumerate()
            .map(|(idx, param)| {
                (
                    (idx + 1).to_string(),
                    Binding {
                        kind: param.snowflake_type(),
                        value: param.wire_value(),
                    },
                )
            })
            .collect()
    }

    async fn submit(&self, query: &BoundQuery, display_sql: &str) -> Result<ResultSet> {
        let url = format!("{}{}", self.base_url(), STATEMENTS_PATH);
        let body = StatementRequest {
            statement: &query.sql,
            timeout: self.config.timeout_secs,
            database: self.config.database.as_deref(),
            schema: self.config.schema.as_deref(),
            warehouse: &self.config.warehouse,
            role: &self.config.role,
            bindings: Self::bindings(query),
        };

        let request_id = uuid::Uuid::new_v4().to_string();
        let response = self
            .request(self.client.post(&url))
            .query(&[("requestId", request_id.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| SqiError::warehouse(display_sql, format!("Failed to submit statement: {}", e)))?;

        self.read_statement_response(response, display_sql).await
    }

    /// Turn a statement response into a result set, polling while the
    /// statement is still running.
    async fn read_statement_response(&self, response: reqwest::Response, display_sql: &str) -> Result<ResultSet> {
        let start = Instant::now();
        let mut response = response;
        let mut polls = 0;

        loop {
            let status = response.status();
            if status == StatusCode::OK {
                return response
                    .json::<ResultSet>()
                    .await
                    .map_err(|e| SqiError::warehouse(display_sql, format!("Failed to parse result set: {}", e)));
            }

            let text = response.text().await.unwrap_or_default();
            let parsed: Option<StatementStatus> = serde_json::from_str(&text).ok();

            if status != StatusCode::ACCEPTED {
                let detail = parsed
                    .map(|s| {
                        format!(
                            "{} (code: {}, sqlState: {}, handle: {})",
                            s.message.unwrap_or_default(),
                            s.code.unwrap_or_default(),
                            s.sql_state.unwrap_or_default(),
                            s.statement_handle.unwrap_or_default()
                        )
                    })
                    .unwrap_or(text);
                return Err(SqiError::warehouse(
                    display_sql,
                    format!("Statement failed with status {}: {}", status, detail),
                ));
            }

            let status_url = parsed
                .as_ref()
                .and_then(StatementStatus::poll_path)
                .map(|path| self.absolute_url(path))
                .ok_or_else(|| SqiError::warehouse(display_sql, "Statement accepted without a status URL"))?;

            polls += 1;
            if polls > MAX_POLLS || start.elapsed() > Duration::from_secs(self.config.timeout_secs) {
                return Err(SqiError::warehouse(
                    display_sql,
                    format!("Statement still running after {}s", start.elapsed().as_secs()),
                ));
            }

            debug!("Statement still running, polling {} ({})", status_url, polls);
            let delay_ms = (100 * polls.min(10)) as u64;
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;

            response = self
                .request(self.client.get(&status_url))
                .send()
                .await
                .map_err(|e| SqiError::warehouse(display_sql, format!("Failed to poll statement: {}", e)))?;
        }
    }

    async fn fetch_partition(&self, handle: &str, partition: usize, display_sql: &str) -> Result<Vec<Vec<serde_json::Value>>> {
        let url = format!("{}{}/{}", self.base_url(), STATEMENTS_PATH, handle);
        let response = self
            .request(self.client.get(&url))
            .query(&[("partition", partition.to_string())])
            .send()
            .await
            .map_err(|e| SqiError::warehouse(display_sql, format!("Failed to fetch partition {}: {}", partition, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SqiError::warehouse(
                display_sql,
                format!("Partition {} fetch failed with status {}: {}", partition, status, text),
            ));
        }

        let part: ResultSet = response
            .json()
            .await
            .map_err(|e| SqiError::warehouse(display_sql, format!("Failed to parse partition {}: {}", partition, e)))?;
        Ok(part.data)
    }
}

#[async_trait]
impl Warehouse for SnowflakeWarehouse {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    async fn execute(&self, query: &BoundQuery) -> Result<WarehouseTable> {
        let start = Instant::now();
        let display_sql = query.display_sql();
        info!("Submitting statement to Snowflake ({} bindings)", query.params.len());
        debug!("{}", display_sql);

        let first = self.submit(query, &display_sql).await?;
        let metadata = first
            .metadata
            .ok_or_else(|| SqiError::warehouse(&display_sql, "Result set has no metadata"))?;

        let mut data = first.data;
        if metadata.partition_info.len() > 1 {
            let handle = first
                .statement_handle
                .ok_or_else(|| SqiError::warehouse(&display_sql, "Partitioned result without a statement handle"))?;
            for (partition, info) in metadata.partition_info.iter().enumerate().skip(1) {
                debug!("Fetching partition {} ({:?} rows)", partition, info.row_count);
                data.extend(self.fetch_partition(&handle, partition, &display_sql).await?);
            }
        }

        if let Some(expected) = metadata.num_rows {
            if expected != data.len() as u64 {
                return Err(SqiError::warehouse(
                    &display_sql,
                    format!("Expected {} rows, received {}", expected, data.len()),
                ));
            }
        }

        let columns: Vec<(String, ColumnKind)> = metadata
            .row_type
            .iter()
            .map(|col| (col.name.clone(), col.kind()))
            .collect();
        let table = WarehouseTable::from_wire(&columns, &data)
            .map_err(|e| SqiError::warehouse(&display_sql, e.to_string()))?;

        info!(
            "Snowflake returned {} rows in {}ms",
            table.height(),
            start.elapsed().as_millis()
        );
        Ok(table)
    }
}
