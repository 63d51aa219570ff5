//! Warehouse - executes bound statements and hands back tables

pub mod snowflake;
pub mod table;

pub use snowflake::SnowflakeWarehouse;
pub use table::{ColumnKind, WarehouseTable};

use crate::error::Result;
use crate::query::BoundQuery;
use async_trait::async_trait;

/// Anything that can run a [`BoundQuery`] and return its rows.
///
/// Failures surface as `SqiError::Warehouse` carrying the display SQL of the
/// failing statement.
#[async_trait]
pub trait Warehouse: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, query: &BoundQuery) -> Result<WarehouseTable>;
}
