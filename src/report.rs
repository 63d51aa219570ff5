//! SQI Report Pipeline
//!
//! catalog check → query builder → warehouse → row decode → floor, filter,
//! sort → headline metrics. Also the search preview for one query.

use crate::catalog::Catalog;
use crate::error::{Result, SqiError};
use crate::query::{columns, LookbackWindow, QueryBuilder};
use crate::rows::{round_to, MetricColumn, QueryResultRow, SCORE_PRECISION};
use crate::search::{flatten_response, render_entity_card, union_fields, SearchClient, DEFAULT_CHAR_LIMIT};
use crate::shaper::{filter_by_floor, min_searches, percentile_of, sort_rows, SortMode, DEFAULT_SEARCHES_PERCENTILE};
use crate::warehouse::Warehouse;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use tracing::info;

const DEFAULT_ENTITY_FIELD: &str = "name";
const DEFAULT_LINK_FIELD: &str = "htmlTitle";

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRequest {
    pub business_name: String,
    pub experience_key: String,
    pub lookback: LookbackWindow,
    pub percentile: f64,
    pub sort_mode: SortMode,
}

impl ReportRequest {
    pub fn new(business_name: impl Into<String>, experience_key: impl Into<String>) -> Self {
        Self {
            business_name: business_name.into(),
            experience_key: experience_key.into(),
            lookback: LookbackWindow::default(),
            percentile: DEFAULT_SEARCHES_PERCENTILE,
            sort_mode: SortMode::default(),
        }
    }

    pub fn with_lookback(mut self, lookback: LookbackWindow) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn with_percentile(mut self, percentile: f64) -> Self {
        self.percentile = percentile;
        self
    }

    pub fn with_sort_mode(mut self, sort_mode: SortMode) -> Self {
        self.sort_mode = sort_mode;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SqiReport {
    pub business_name: String,
    pub business_id: String,
    pub experience_key: String,
    pub lookback_days: u32,
    pub percentile: f64,
    pub sort_mode: SortMode,
    /// Minimum total searches a query needs to be listed.
    pub searches_floor: u64,
    pub experience_avg_sqi: f64,
    pub global_avg_sqi: Option<f64>,
    /// Rows fetched before the floor was applied.
    pub total_queries: usize,
    pub rows: Vec<QueryResultRow>,
    pub display_sql: String,
    pub generated_at: DateTime<Utc>,
}

pub struct SqiPipeline<'a> {
    catalog: &'a Catalog,
    builder: &'a QueryBuilder,
    warehouse: &'a dyn Warehouse,
}

impl<'a> SqiPipeline<'a> {
    pub fn new(catalog: &'a Catalog, builder: &'a QueryBuilder, warehouse: &'a dyn Warehouse) -> Self {
        Self {
            catalog,
            builder,
            warehouse,
        }
    }

    /// Display SQL of the query-level statement, without running it.
    pub fn query_sql(&self, request: &ReportRequest) -> Result<String> {
        self.catalog
            .validate_selection(&request.business_name, &request.experience_key)?;
        Ok(self
            .builder
            .build_query_sql(&request.business_name, &request.experience_key, request.lookback)
            .display_sql())
    }

    /// Fails with `EmptyInput` when the window holds no data.
    pub async fn report(&self, request: &ReportRequest) -> Result<SqiReport> {
        if !(0.0..=1.0).contains(&request.percentile) {
            return Err(SqiError::InvalidPercentile(request.percentile));
        }
        let business = self
            .catalog
            .validate_selection(&request.business_name, &request.experience_key)?;

        let query = self
            .builder
            .build_query_sql(&request.business_name, &request.experience_key, request.lookback);
        let table = self.warehouse.execute(&query).await?;
        let decode_error = |e: SqiError| SqiError::warehouse(query.display_sql(), e.to_string());
        let rows = table.to_rows().map_err(decode_error)?;
        // Rows without a score still count towards the floor.
        let searches = table
            .numeric_values(columns::TOTAL_SEARCHES)
            .map_err(decode_error)?;
        info!(
            "Fetched {} queries for {} / {} over {} days",
            rows.len(),
            request.business_name,
            request.experience_key,
            request.lookback.days()
        );

        let floor = percentile_of(&searches, request.percentile)?;
        if rows.is_empty() {
            return Err(SqiError::EmptyInput);
        }
        let threshold = min_searches(floor);
        let retained = filter_by_floor(&rows, MetricColumn::TotalSearches, threshold);
        let shaped = sort_rows(&retained, request.sort_mode);
        info!(
            "Searches floor {} at p{:.2}: {} of {} queries retained",
            threshold,
            request.percentile,
            shaped.len(),
            rows.len()
        );

        // Same value on every row: the experience's monthly average.
        let experience_avg_sqi = rows[0].experience_avg_sqi;

        let global = self
            .warehouse
            .execute(&self.builder.build_global_query_sql(request.lookback))
            .await?;
        let global_avg_sqi = global
            .first_f64(columns::QUERY_SQI_SCORE)?
            .map(|v| round_to(v, SCORE_PRECISION));

        Ok(SqiReport {
            business_name: business.business_name.clone(),
            business_id: business.business_id.clone(),
            experience_key: request.experience_key.clone(),
            lookback_days: request.lookback.days(),
            percentile: request.percentile,
            sort_mode: request.sort_mode,
            searches_floor: threshold as u64,
            experience_avg_sqi,
            global_avg_sqi,
            total_queries: rows.len(),
            rows: shaped,
            display_sql: query.display_sql(),
            generated_at: Utc::now(),
        })
    }
}

impl fmt::Display for SqiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} / {} (last {} days)",
            self.business_name, self.experience_key, self.lookback_days
        )?;
        writeln!(f, "Avg. Experience SQI: {:.2}", self.experience_avg_sqi)?;
        match self.global_avg_sqi {
            Some(global) => writeln!(f, "Global SQI average:  {:.2}", global)?,
            None => writeln!(f, "Global SQI average:  n/a")?,
        }
        writeln!(
            f,
            "Min. searches: {} (p{:.2}), showing {} of {} queries, sorted {}",
            self.searches_floor,
            self.percentile,
            self.rows.len(),
            self.total_queries,
            self.sort_mode
        )?;
        writeln!(f)?;

        let width = self
            .rows
            .iter()
            .map(|r| r.query_text.chars().count())
            .max()
            .unwrap_or(0)
            .max("query".len());
        writeln!(
            f,
            "{:<width$}  {:>9}  {:>8}  {}",
            "query",
            "sqi",
            "searches",
            "performance",
            width = width
        )?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<width$}  {:>9.2}  {:>8}  {}",
                row.query_text,
                row.query_sqi_score,
                row.total_searches,
                row.performance_label,
                width = width
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PreviewRequest {
    pub query_text: String,
    pub experience_key: String,
    /// Entity fields to show; `None` picks `name` when available.
    pub entity_fields: Option<Vec<String>>,
    /// Link fields to show; `None` picks `htmlTitle` when available.
    pub link_fields: Option<Vec<String>>,
    pub char_limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerticalPreview {
    pub vertical_id: String,
    pub is_links: bool,
    pub cards: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPreview {
    pub query_text: String,
    pub experience_key: String,
    /// Fields available on entity verticals.
    pub entity_fields: BTreeSet<String>,
    /// Fields available on the Links vertical.
    pub link_fields: BTreeSet<String>,
    pub selected_entity_fields: Vec<String>,
    pub selected_link_fields: Vec<String>,
    pub verticals: Vec<VerticalPreview>,
}

impl SearchPreview {
    pub fn has_entity_results(&self) -> bool {
        !self.entity_fields.is_empty()
    }
}

pub async fn preview(client: &dyn SearchClient, request: &PreviewRequest) -> Result<SearchPreview> {
    let raw = client.search(&request.query_text, &request.experience_key).await?;
    build_preview(&raw, request)
}

/// Cards and field lists for an already fetched response.
pub fn build_preview(raw: &Value, request: &PreviewRequest) -> Result<SearchPreview> {
    let verticals = flatten_response(raw)?;

    let entity_fields = union_fields(verticals.iter().filter(|v| !v.is_links()).map(|v| v.field_names()));
    let link_fields = union_fields(verticals.iter().filter(|v| v.is_links()).map(|v| v.field_names()));

    let selected_entity_fields = select_fields(&request.entity_fields, &entity_fields, DEFAULT_ENTITY_FIELD);
    let selected_link_fields = select_fields(&request.link_fields, &link_fields, DEFAULT_LINK_FIELD);
    let char_limit = request.char_limit.unwrap_or(DEFAULT_CHAR_LIMIT);

    let verticals: Vec<VerticalPreview> = verticals
        .iter()
        .map(|vertical| {
            let selected = if vertical.is_links() {
                &selected_link_fields
            } else {
                &selected_entity_fields
            };
            VerticalPreview {
                vertical_id: vertical.vertical_id.clone(),
                is_links: vertical.is_links(),
                cards: vertical
                    .display_fields()
                    .iter()
                    .map(|fields| render_entity_card(fields, selected.as_slice(), char_limit))
                    .collect(),
            }
        })
        .collect();

    info!(
        "Preview for '{}': {} verticals, {} entity fields, {} link fields",
        request.query_text,
        verticals.len(),
        entity_fields.len(),
        link_fields.len()
    );

    Ok(SearchPreview {
        query_text: request.query_text.clone(),
        experience_key: request.experience_key.clone(),
        entity_fields,
        link_fields,
        selected_entity_fields,
        selected_link_fields,
        verticals,
    })
}

fn select_fields(requested: &Option<Vec<String>>, available: &BTreeSet<String>, default: &str) -> Vec<String> {
    match requested {
        Some(fields) => fields.clone(),
        None if available.contains(default) => vec![default.to_string()],
        None => Vec::new(),
    }
}

impl fmt::Display for SearchPreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Results for \"{}\" ({})", self.query_text, self.experience_key)?;
        if !self.has_entity_results() {
            writeln!(f, "No results found for this query.")?;
        }
        for vertical in &self.verticals {
            writeln!(f)?;
            writeln!(f, "== Vertical: {} ==", title_case(&vertical.vertical_id))?;
            for card in &vertical.cards {
                writeln!(f)?;
                writeln!(f, "{}", card)?;
            }
        }
        Ok(())
    }
}

fn title_case(id: &str) -> String {
    id.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
