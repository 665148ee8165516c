pub mod compare;
pub mod etl;
pub mod flatten;
pub mod messages_pipeline;
pub mod paginator;
pub mod reconcile;
pub mod report;
pub mod tabular;

pub use crate::domain::model::{FlatRecord, Record, TransformResult};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
pub use etl::EtlEngine;
pub use flatten::{flatten, flatten_all, unflatten};
pub use messages_pipeline::MessagesPipeline;
pub use paginator::PaginatedFetcher;
pub use reconcile::{align, ReconcileOptions, Reconciler, ReconciliationReport};
pub use report::{BatchOutcome, DeliveryMode, ReportRetriever, RetrievedReport};
pub use tabular::{CsvLoader, TabularExporter};
