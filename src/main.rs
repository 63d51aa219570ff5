use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sqi_explorer::config::{SnowflakeConfig, SqiConfig};
use sqi_explorer::credentials::{ApiKey, CredentialResolver, StaticCredentials, WarehouseCredentials};
use sqi_explorer::query::{validate_sql, DEFAULT_LOOKBACK_DAYS};
use sqi_explorer::report::build_preview;
use sqi_explorer::search::{redact_business_id, HttpSearchClient, SearchClient};
use sqi_explorer::shaper::DEFAULT_SEARCHES_PERCENTILE;
use sqi_explorer::warehouse::SnowflakeWarehouse;
use sqi_explorer::{Catalog, LookbackWindow, PreviewRequest, QueryBuilder, ReportRequest, SortMode, SqiPipeline};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const NO_DATA_MESSAGE: &str = "No data found for this lookback period. Please select a different period.";

#[derive(Parser)]
#[command(name = "sqi")]
#[command(about = "Search Quality Index explorer: query-level SQI without writing SQL")]
struct Cli {
    /// Business/experience catalog CSV (defaults to SQI_CATALOG_PATH)
    #[arg(long, global = true, env = "SQI_CATALOG_PATH")]
    catalog: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List catalog businesses
    Businesses,

    /// List a business's experience keys
    Experiences {
        #[arg(short, long)]
        business: String,
    },

    /// Print the SQL a report would run
    Sql {
        #[command(flatten)]
        selection: Selection,

        /// Print the warehouse-wide average query instead
        #[arg(long)]
        global: bool,
    },

    /// Query-level SQI table with headline metrics
    Report {
        #[command(flatten)]
        selection: Selection,

        #[command(flatten)]
        shaping: Shaping,
    },

    /// Preview live search results for one query
    Preview {
        #[command(flatten)]
        selection: Selection,

        /// Query to search; defaults to the first row of the report
        #[arg(short, long)]
        query: Option<String>,

        /// Entity fields to show on cards (comma separated)
        #[arg(long, value_delimiter = ',')]
        fields: Option<Vec<String>>,

        /// Link fields to show on cards (comma separated)
        #[arg(long, value_delimiter = ',')]
        link_fields: Option<Vec<String>>,

        /// Max characters per field; 0 disables truncation
        #[arg(long)]
        char_limit: Option<i64>,

        /// Also print the raw API response
        #[arg(long)]
        raw: bool,

        #[command(flatten)]
        shaping: Shaping,
    },
}

#[derive(Args)]
struct Selection {
    #[arg(short, long)]
    business: String,

    #[arg(short, long)]
    experience: String,

    /// Lookback period in days (0-30)
    #[arg(short, long, env = "SQI_LOOKBACK_DAYS", default_value_t = DEFAULT_LOOKBACK_DAYS)]
    lookback: i64,
}

#[derive(Args)]
struct Shaping {
    /// Min. searches threshold as a percentile of total searches
    #[arg(short, long, default_value_t = DEFAULT_SEARCHES_PERCENTILE)]
    percentile: f64,

    /// sqi_ascending or searches_descending
    #[arg(short, long, default_value_t = SortMode::SqiAscending)]
    sort: SortMode,
}

impl Selection {
    fn request(&self, shaping: Option<&Shaping>) -> Result<ReportRequest> {
        let mut request = ReportRequest::new(&self.business, &self.experience)
            .with_lookback(LookbackWindow::new(self.lookback)?);
        if let Some(shaping) = shaping {
            request = request.with_percentile(shaping.percentile).with_sort_mode(shaping.sort);
        }
        Ok(request)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SqiConfig::from_env()?;
    let catalog_path = cli.catalog.clone().unwrap_or_else(|| config.catalog_path.clone());
    let catalog = Catalog::load(&catalog_path)
        .with_context(|| format!("Failed to load catalog {}", catalog_path.display()))?;
    let builder = QueryBuilder::new(config.tables.clone());

    match &cli.command {
        Command::Businesses => {
            let businesses = catalog.list_businesses();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&businesses)?);
            } else {
                businesses.iter().for_each(|b| println!("{}", b));
            }
        }

        Command::Experiences { business } => {
            let experiences = catalog.experiences_for(business)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&experiences)?);
            } else {
                experiences.iter().for_each(|e| println!("{}", e));
            }
        }

        Command::Sql { selection, global } => {
            let request = selection.request(None)?;
            catalog.validate_selection(&request.business_name, &request.experience_key)?;
            let query = if *global {
                builder.build_global_query_sql(request.lookback)
            } else {
                builder.build_query_sql(&request.business_name, &request.experience_key, request.lookback)
            };
            validate_sql(&query.sql)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&query)?);
            } else {
                println!("{};", query.display_sql());
            }
        }

        Command::Report { selection, shaping } => {
            let request = selection.request(Some(shaping))?;
            let warehouse = connect_warehouse()?;
            let pipeline = SqiPipeline::new(&catalog, &builder, &warehouse);

            match pipeline.report(&request).await {
                Ok(report) if cli.json => println!("{}", serde_json::to_string_pretty(&report)?),
                Ok(report) => print!("{}", report),
                Err(e) if e.is_no_data() => println!("{}", NO_DATA_MESSAGE),
                Err(e) => return Err(e).context("Failed to build SQI report"),
            }
        }

        Command::Preview {
            selection,
            query,
            fields,
            link_fields,
            char_limit,
            raw,
            shaping,
        } => {
            let request = selection.request(Some(shaping))?;
            let business = catalog.validate_selection(&request.business_name, &request.experience_key)?;

            let query_text = match query {
                Some(query) => query.clone(),
                None => {
                    let warehouse = connect_warehouse()?;
                    let pipeline = SqiPipeline::new(&catalog, &builder, &warehouse);
                    match pipeline.report(&request).await {
                        Ok(report) => match report.rows.first() {
                            Some(row) => row.query_text.clone(),
                            None => {
                                println!("No queries meet the minimum searches threshold.");
                                return Ok(());
                            }
                        },
                        Err(e) if e.is_no_data() => {
                            println!("{}", NO_DATA_MESSAGE);
                            return Ok(());
                        }
                        Err(e) => return Err(e).context("Failed to pick a query to preview"),
                    }
                }
            };

            let api_key = resolve_api_key(&config, &builder, &business.business_id).await?;
            let client = HttpSearchClient::new(config.search.clone(), api_key)?;

            let preview_request = PreviewRequest {
                query_text,
                experience_key: request.experience_key.clone(),
                entity_fields: fields.clone(),
                link_fields: link_fields.clone(),
                char_limit: Some(char_limit.unwrap_or(config.card_char_limit)),
            };
            let response = client
                .search(&preview_request.query_text, &preview_request.experience_key)
                .await?;
            let result = build_preview(&response, &preview_request)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", result);
            }

            if *raw {
                println!("\n=== Full API Response ===");
                println!("{}", serde_json::to_string_pretty(&redact_business_id(&response))?);
            }
        }
    }

    Ok(())
}

fn connect_warehouse() -> Result<SnowflakeWarehouse> {
    let config = SnowflakeConfig::from_env().context("Snowflake credentials are required for this command")?;
    info!("Connecting to Snowflake at {}", config.account_url);
    Ok(SnowflakeWarehouse::new(config)?)
}

async fn resolve_api_key(config: &SqiConfig, builder: &QueryBuilder, business_id: &str) -> Result<ApiKey> {
    if let Some(key) = config.search.api_key.clone().and_then(ApiKey::new) {
        return Ok(StaticCredentials::new(Some(key)).api_key_for(business_id).await?);
    }
    let warehouse = connect_warehouse()?;
    let key = WarehouseCredentials::new(&warehouse, builder)
        .api_key_for(business_id)
        .await?;
    Ok(key)
}
