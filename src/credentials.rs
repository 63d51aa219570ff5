//! Credentials - search API key per business

use crate::error::{Result, SqiError};
use crate::query::{columns, QueryBuilder};
use crate::warehouse::Warehouse;
use async_trait::async_trait;
use std::fmt;
use tracing::info;

/// Non-empty API key. Debug output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Fails with `MissingCredential` when the business has no key.
    async fn api_key_for(&self, business_id: &str) -> Result<ApiKey>;
}

/// One key for every business, typically from `SQI_SEARCH_API_KEY`.
pub struct StaticCredentials {
    key: Option<ApiKey>,
}

impl StaticCredentials {
    pub fn new(key: Option<ApiKey>) -> Self {
        Self { key }
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentials {
    async fn api_key_for(&self, business_id: &str) -> Result<ApiKey> {
        self.key
            .clone()
            .ok_or_else(|| SqiError::MissingCredential(business_id.to_string()))
    }
}

/// Looks the key up in the warehouse key table.
pub struct WarehouseCredentials<'a> {
    warehouse: &'a dyn Warehouse,
    builder: &'a QueryBuilder,
}

impl<'a> WarehouseCredentials<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, builder: &'a QueryBuilder) -> Self {
        Self { warehouse, builder }
    }
}

#[async_trait]
impl<'a> CredentialResolver for WarehouseCredentials<'a> {
    async fn api_key_for(&self, business_id: &str) -> Result<ApiKey> {
        let query = self.builder.build_api_key_query(business_id);
        let table = self.warehouse.execute(&query).await?;
        let key = table
            .first_string(columns::API_KEY)?
            .and_then(ApiKey::new)
            .ok_or_else(|| SqiError::MissingCredential(business_id.to_string()))?;
        info!("Resolved search API key for business {}", business_id);
        Ok(key)
    }
}
