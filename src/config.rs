//! Configuration from environment variables (optionally via `.env`)

use crate::error::{Result, SqiError};
use crate::query::WarehouseTables;
use crate::search::card::DEFAULT_CHAR_LIMIT;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct SqiConfig {
    pub catalog_path: PathBuf,
    pub tables: WarehouseTables,
    pub search: SearchConfig,
    pub card_char_limit: i64,
}

#[derive(Debug, Clone)]
pub struct SnowflakeConfig {
    /// e.g. `https://tw61901.us-east-1.snowflakecomputing.com`
    pub account_url: String,
    pub token: String,
    /// `KEYPAIR_JWT` or `OAUTH`
    pub token_type: String,
    pub warehouse: String,
    pub role: String,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub base_url: String,
    /// Versioning date sent as `v`.
    pub api_version: String,
    /// Experience configuration label, e.g. `PRODUCTION` or `STAGING`.
    pub version_label: String,
    pub locale: String,
    /// Overrides the per-business key lookup when set.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://liveapi.yext.com/v2/accounts/me/answers/query".to_string(),
            api_version: "20190101".to_string(),
            version_label: "PRODUCTION".to_string(),
            locale: "en".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl SqiConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = WarehouseTables::default();
        let tables = WarehouseTables {
            sqi_results: env_or("SQI_TABLE_RESULTS", &defaults.sqi_results),
            searches: env_or("SQI_TABLE_SEARCHES", &defaults.searches),
            accounts: env_or("SQI_TABLE_ACCOUNTS", &defaults.accounts),
            monthly_experience_sqi: env_or("SQI_TABLE_MONTHLY", &defaults.monthly_experience_sqi),
            api_keys: env_or("SQI_TABLE_API_KEYS", &defaults.api_keys),
        };

        Ok(Self {
            catalog_path: PathBuf::from(env_or("SQI_CATALOG_PATH", "sqi_business_experience.csv")),
            tables,
            search: SearchConfig::from_env()?,
            card_char_limit: env_parse("SQI_CARD_CHAR_LIMIT", DEFAULT_CHAR_LIMIT)?,
        })
    }
}

impl SnowflakeConfig {
    /// Requires `SNOWFLAKE_ACCOUNT_URL` and `SNOWFLAKE_TOKEN`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            account_url: env_required("SNOWFLAKE_ACCOUNT_URL")?,
            token: env_required("SNOWFLAKE_TOKEN")?,
            token_type: env_or("SNOWFLAKE_TOKEN_TYPE", "KEYPAIR_JWT"),
            warehouse: env_or("SNOWFLAKE_WAREHOUSE", "HUMAN_WH"),
            role: env_or("SNOWFLAKE_ROLE", "EVERYONE"),
            database: env_optional("SNOWFLAKE_DATABASE"),
            schema: env_optional("SNOWFLAKE_SCHEMA"),
            timeout_secs: env_parse("SNOWFLAKE_TIMEOUT_SECS", 300)?,
        })
    }
}

impl SearchConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            base_url: env_or("SQI_SEARCH_BASE_URL", &defaults.base_url),
            api_version: env_or("SQI_SEARCH_API_VERSION", &defaults.api_version),
            version_label: env_or("SQI_SEARCH_VERSION", &defaults.version_label),
            locale: env_or("SQI_SEARCH_LOCALE", &defaults.locale),
            api_key: env_optional("SQI_SEARCH_API_KEY"),
            timeout_secs: env_parse("SQI_SEARCH_TIMEOUT_SECS", defaults.timeout_secs)?,
        })
    }
}

fn env_optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

fn env_required(name: &str) -> Result<String> {
    env_optional(name).ok_or_else(|| SqiError::Config(format!("{} is not set", name)))
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env_optional(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| SqiError::Config(format!("{} has an invalid value: {}", name, raw))),
        None => Ok(default),
    }
}
