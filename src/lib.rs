pub mod catalog;
pub mod config;
pub mod credentials;
pub mod error;
pub mod query;
pub mod report;
pub mod rows;
pub mod search;
pub mod shaper;
pub mod warehouse;

pub use catalog::{BusinessRecord, Catalog};
pub use error::{Result, SqiError};
pub use query::{BoundQuery, LookbackWindow, QueryBuilder};
pub use report::{PreviewRequest, ReportRequest, SearchPreview, SqiPipeline, SqiReport};
pub use rows::{MetricColumn, PerformanceLabel, QueryResultRow};
pub use shaper::SortMode;
