use async_trait::async_trait;
use polars::prelude::*;
use serde_json::{json, Value};
use sqi_explorer::credentials::{CredentialResolver, WarehouseCredentials};
use sqi_explorer::query::BindValue;
use sqi_explorer::report::{preview, PreviewRequest};
use sqi_explorer::search::{SearchClient, ELLIPSIS};
use sqi_explorer::warehouse::{Warehouse, WarehouseTable};
use sqi_explorer::{
    BoundQuery, Catalog, LookbackWindow, PerformanceLabel, QueryBuilder, ReportRequest, SortMode, SqiError,
    SqiPipeline,
};
use std::sync::Mutex;

const CATALOG_CSV: &str = "\
BUSINESS_ID,BUSINESS_NAME,EXPERIENCE_KEY
101,Acme Corp,search-en
202,Globex,help-center
";

/// Answers the query-level statement with a fixed frame and anything else
/// with a one-row global average.
struct FixtureWarehouse {
    query_level: DataFrame,
    global_avg: Option<f64>,
    executed: Mutex<Vec<BoundQuery>>,
}

impl FixtureWarehouse {
    fn new(query_level: DataFrame, global_avg: Option<f64>) -> Self {
        Self {
            query_level,
            global_avg,
            executed: Mutex::new(Vec::new()),
        }
    }

    fn executed(&self) -> Vec<BoundQuery> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for FixtureWarehouse {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn execute(&self, query: &BoundQuery) -> sqi_explorer::Result<WarehouseTable> {
        self.executed.lock().unwrap().push(query.clone());
        if query.sql.contains("group by") {
            WarehouseTable::new(self.query_level.clone())
        } else if query.sql.contains("api_key") {
            WarehouseTable::new(df!["API_KEY" => ["key-101"]]?)
        } else {
            let values: Vec<Option<f64>> = vec![self.global_avg];
            WarehouseTable::new(df!["QUERY_SQI_SCORE" => values]?)
        }
    }
}

fn acme_frame(searches: &[i64], scores: &[f64]) -> DataFrame {
    let n = searches.len();
    let queries: Vec<String> = (0..n).map(|i| format!("query {}", i)).collect();
    df![
        "QUERY" => queries,
        "BUSINESS_ID" => vec!["101"; n],
        "BUSINESS_NAME" => vec!["Acme Corp"; n],
        "EXPERIENCE_KEY" => vec!["search-en"; n],
        "MONTHLY_EXPERIENCE_AVG_SQI" => vec![3.0; n],
        "QUERY_SQI_SCORE" => scores.to_vec(),
        "TOTAL_SEARCHES" => searches.to_vec(),
    ]
    .unwrap()
}

fn catalog() -> Catalog {
    Catalog::from_reader(CATALOG_CSV.as_bytes()).unwrap()
}

#[tokio::test]
async fn test_end_to_end_report() {
    let catalog = catalog();
    assert_eq!(catalog.experiences_for("Acme Corp").unwrap(), vec!["search-en"]);

    let warehouse = FixtureWarehouse::new(acme_frame(&[10, 50, 90], &[2.0, 3.0, 4.0]), Some(3.2468));
    let builder = QueryBuilder::default();
    let pipeline = SqiPipeline::new(&catalog, &builder, &warehouse);

    let request = ReportRequest::new("Acme Corp", "search-en")
        .with_lookback(LookbackWindow::new(14).unwrap())
        .with_percentile(0.5)
        .with_sort_mode(SortMode::SearchesDescending);
    let report = pipeline.report(&request).await.unwrap();

    assert_eq!(report.searches_floor, 50);
    let searches: Vec<u64> = report.rows.iter().map(|r| r.total_searches).collect();
    assert_eq!(searches, vec![90, 50]);
    assert_eq!(report.total_queries, 3);
    assert_eq!(report.experience_avg_sqi, 3.0);
    assert_eq!(report.global_avg_sqi, Some(3.25));
    assert_eq!(report.business_id, "101");
    assert_eq!(report.rows[0].performance_label, PerformanceLabel::AboveAverage);
    assert_eq!(report.rows[1].performance_label, PerformanceLabel::Average);
    assert!(report.display_sql.contains("'Acme Corp'"));

    let executed = warehouse.executed();
    assert_eq!(executed.len(), 2);
    assert_eq!(
        executed[0].params,
        vec![
            BindValue::Integer(-14),
            BindValue::Text("Acme Corp".to_string()),
            BindValue::Text("search-en".to_string()),
        ]
    );
    assert_eq!(executed[1].params, vec![BindValue::Integer(-14)]);
}

#[tokio::test]
async fn test_report_sorted_by_sqi() {
    let catalog = catalog();
    let warehouse = FixtureWarehouse::new(acme_frame(&[40, 80, 60, 20], &[3.5, 1.25, 3.5, 0.5]), None);
    let builder = QueryBuilder::default();
    let pipeline = SqiPipeline::new(&catalog, &builder, &warehouse);

    let request = ReportRequest::new("Acme Corp", "search-en").with_percentile(0.0);
    let report = pipeline.report(&request).await.unwrap();

    let scores: Vec<f64> = report.rows.iter().map(|r| r.query_sqi_score).collect();
    assert_eq!(scores, vec![0.5, 1.25, 3.5, 3.5]);
    let queries: Vec<&str> = report.rows.iter().map(|r| r.query_text.as_str()).collect();
    assert_eq!(queries, vec!["query 3", "query 1", "query 0", "query 2"]);
    assert_eq!(report.global_avg_sqi, None);

    let text = report.to_string();
    assert!(text.contains("Avg. Experience SQI: 3.00"));
    assert!(text.contains("Global SQI average:  n/a"));
}

#[tokio::test]
async fn test_empty_window_is_no_data() {
    let catalog = catalog();
    let warehouse = FixtureWarehouse::new(acme_frame(&[], &[]), Some(3.0));
    let builder = QueryBuilder::default();
    let pipeline = SqiPipeline::new(&catalog, &builder, &warehouse);

    let err = pipeline
        .report(&ReportRequest::new("Acme Corp", "search-en"))
        .await
        .unwrap_err();
    assert!(err.is_no_data());
    assert_eq!(warehouse.executed().len(), 1);
}

#[tokio::test]
async fn test_selection_outside_catalog_never_reaches_warehouse() {
    let catalog = catalog();
    let warehouse = FixtureWarehouse::new(acme_frame(&[1], &[1.0]), None);
    let builder = QueryBuilder::default();
    let pipeline = SqiPipeline::new(&catalog, &builder, &warehouse);

    let err = pipeline
        .report(&ReportRequest::new("Acme Corp", "help-center"))
        .await
        .unwrap_err();
    assert!(matches!(err, SqiError::Catalog(_)));

    let err = pipeline
        .report(&ReportRequest::new("Acme Corp", "search-en").with_percentile(2.0))
        .await
        .unwrap_err();
    assert!(matches!(err, SqiError::InvalidPercentile(_)));
    assert!(warehouse.executed().is_empty());
}

#[tokio::test]
async fn test_api_key_from_warehouse() {
    let warehouse = FixtureWarehouse::new(acme_frame(&[1], &[1.0]), None);
    let builder = QueryBuilder::default();
    let key = WarehouseCredentials::new(&warehouse, &builder)
        .api_key_for("101")
        .await
        .unwrap();
    assert_eq!(key.expose(), "key-101");
    assert_eq!(warehouse.executed()[0].params, vec![BindValue::Text("101".to_string())]);
}

struct FixtureSearch {
    response: Value,
}

#[async_trait]
impl SearchClient for FixtureSearch {
    async fn search(&self, query_text: &str, experience_key: &str) -> sqi_explorer::Result<Value> {
        assert_eq!(experience_key, "search-en");
        if query_text == "broken" {
            return Err(SqiError::SearchApi("Search failed with status 500".to_string()));
        }
        Ok(self.response.clone())
    }
}

fn search_fixture() -> FixtureSearch {
    FixtureSearch {
        response: json!({
            "response": {
                "businessId": 101,
                "modules": [
                    {
                        "verticalConfigId": "locations",
                        "results": [
                            {"data": {"name": "Acme Downtown", "description": "d".repeat(600)}},
                            {"data": {"name": "Acme Uptown", "description": "Open late"}}
                        ]
                    },
                    {
                        "verticalConfigId": "faqs",
                        "results": [
                            {"data": {"question": "Do you ship?", "name": "Shipping"}}
                        ]
                    },
                    {
                        "verticalConfigId": "links",
                        "results": [
                            {"htmlTitle": "Acme | Store hours", "htmlSnippet": "Hours for every store"}
                        ]
                    }
                ]
            }
        }),
    }
}

#[tokio::test]
async fn test_preview_default_fields() {
    let request = PreviewRequest {
        query_text: "store hours".to_string(),
        experience_key: "search-en".to_string(),
        ..PreviewRequest::default()
    };
    let result = preview(&search_fixture(), &request).await.unwrap();

    let entity_fields: Vec<&str> = result.entity_fields.iter().map(String::as_str).collect();
    assert_eq!(entity_fields, vec!["description", "name", "question"]);
    let link_fields: Vec<&str> = result.link_fields.iter().map(String::as_str).collect();
    assert_eq!(link_fields, vec!["htmlSnippet", "htmlTitle"]);
    assert_eq!(result.selected_entity_fields, vec!["name"]);
    assert_eq!(result.selected_link_fields, vec!["htmlTitle"]);

    assert_eq!(result.verticals.len(), 3);
    assert_eq!(result.verticals[0].cards, vec!["### Acme Downtown", "### Acme Uptown"]);
    assert_eq!(result.verticals[1].cards, vec!["### Shipping"]);
    assert!(result.verticals[2].is_links);
    assert_eq!(result.verticals[2].cards, vec!["### Acme | Store hours"]);
}

#[tokio::test]
async fn test_preview_selected_fields_are_truncated() {
    let request = PreviewRequest {
        query_text: "store hours".to_string(),
        experience_key: "search-en".to_string(),
        entity_fields: Some(vec!["name".to_string(), "description".to_string()]),
        link_fields: Some(vec!["htmlSnippet".to_string()]),
        char_limit: Some(500),
    };
    let result = preview(&search_fixture(), &request).await.unwrap();

    let card = &result.verticals[0].cards[0];
    assert!(card.starts_with("### Acme Downtown\n\n"));
    assert!(card.ends_with(&format!("{}{}", "d".repeat(500), ELLIPSIS)));
    // faqs entity has no description: rendered as an empty paragraph
    assert_eq!(result.verticals[1].cards[0], "### Shipping\n\n");
    assert_eq!(result.verticals[2].cards[0], "### Hours for every store");

    let text = result.to_string();
    assert!(text.contains("== Vertical: Locations =="));
    assert!(text.contains("== Vertical: Links =="));
}

#[tokio::test]
async fn test_preview_propagates_search_errors() {
    let request = PreviewRequest {
        query_text: "broken".to_string(),
        experience_key: "search-en".to_string(),
        ..PreviewRequest::default()
    };
    let err = preview(&search_fixture(), &request).await.unwrap_err();
    assert!(matches!(err, SqiError::SearchApi(_)));
}

#[tokio::test]
async fn test_half_floor_rounds_to_even() {
    let catalog = catalog();
    let warehouse = FixtureWarehouse::new(acme_frame(&[50, 51], &[2.0, 3.0]), None);
    let builder = QueryBuilder::default();
    let pipeline = SqiPipeline::new(&catalog, &builder, &warehouse);

    let request = ReportRequest::new("Acme Corp", "search-en")
        .with_percentile(0.5)
        .with_sort_mode(SortMode::SearchesDescending);
    let report = pipeline.report(&request).await.unwrap();

    assert_eq!(report.searches_floor, 50);
    let searches: Vec<u64> = report.rows.iter().map(|r| r.total_searches).collect();
    assert_eq!(searches, vec![51, 50]);
}

#[tokio::test]
async fn test_unscored_queries_count_towards_floor() {
    let catalog = catalog();
    let scores: Vec<Option<f64>> = vec![None, Some(3.0), Some(4.0)];
    let frame = df![
        "QUERY" => ["unscored", "returns", "store hours"],
        "BUSINESS_ID" => ["101", "101", "101"],
        "BUSINESS_NAME" => ["Acme Corp", "Acme Corp", "Acme Corp"],
        "EXPERIENCE_KEY" => ["search-en", "search-en", "search-en"],
        "MONTHLY_EXPERIENCE_AVG_SQI" => [3.0, 3.0, 3.0],
        "QUERY_SQI_SCORE" => scores,
        "TOTAL_SEARCHES" => [10i64, 50, 90],
    ]
    .unwrap();
    let warehouse = FixtureWarehouse::new(frame, None);
    let builder = QueryBuilder::default();
    let pipeline = SqiPipeline::new(&catalog, &builder, &warehouse);

    let request = ReportRequest::new("Acme Corp", "search-en").with_percentile(0.5);
    let report = pipeline.report(&request).await.unwrap();

    // floor over [10, 50, 90], not [50, 90]
    assert_eq!(report.searches_floor, 50);
    assert_eq!(report.total_queries, 2);
    let queries: Vec<&str> = report.rows.iter().map(|r| r.query_text.as_str()).collect();
    assert_eq!(queries, vec!["returns", "store hours"]);
}

#[tokio::test]
async fn test_malformed_result_reports_the_query() {
    let catalog = catalog();
    let frame = df![
        "QUERY" => ["store hours"],
        "QUERY_SQI_SCORE" => [3.0],
    ]
    .unwrap();
    let warehouse = FixtureWarehouse::new(frame, None);
    let builder = QueryBuilder::default();
    let pipeline = SqiPipeline::new(&catalog, &builder, &warehouse);

    let err = pipeline
        .report(&ReportRequest::new("Acme Corp", "search-en"))
        .await
        .unwrap_err();
    match err {
        SqiError::Warehouse { query, message } => {
            assert!(query.contains("a.business_name = 'Acme Corp'"));
            assert!(message.contains("Unknown column"));
        }
        other => panic!("unexpected error: {}", other),
    }
}
