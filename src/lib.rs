pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{HarvestConfig, LocalStorage};

pub use adapters::{authorize, ApiClient, FileCredentialStore};
pub use core::{
    EtlEngine, MessagesPipeline, PaginatedFetcher, ReconcileOptions, Reconciler, ReportRetriever,
};
pub use utils::error::{HarvestError, Result};
