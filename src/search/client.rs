//! Search Client - one universal-search request per call

use crate::config::SearchConfig;
use crate::credentials::ApiKey;
use crate::error::{Result, SqiError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Raw universal-search JSON for `query_text` against an experience.
    async fn search(&self, query_text: &str, experience_key: &str) -> Result<Value>;
}

pub struct HttpSearchClient {
    config: SearchConfig,
    api_key: ApiKey,
    client: Client,
}

impl HttpSearchClient {
    pub fn new(config: SearchConfig, api_key: ApiKey) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    fn query_params<'a>(&'a self, query_text: &'a str, experience_key: &'a str) -> [(&'static str, &'a str); 6] {
        [
            ("input", query_text),
            ("experienceKey", experience_key),
            ("api_key", self.api_key.expose()),
            ("v", self.config.api_version.as_str()),
            ("version", self.config.version_label.as_str()),
            ("locale", self.config.locale.as_str()),
        ]
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(&self, query_text: &str, experience_key: &str) -> Result<Value> {
        info!("Searching '{}' on experience {}", query_text, experience_key);

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&self.query_params(query_text, experience_key))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SqiError::SearchApi(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SqiError::SearchApi(format!(
                "Search failed with status {}: {}",
                status, text
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SqiError::SearchApi(format!("Failed to parse response: {}", e)))?;
        debug!("Search response received for '{}'", query_text);
        Ok(body)
    }
}
