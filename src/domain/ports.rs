use crate::domain::model::{FlatRecord, MessagePage, Record, TransformResult};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn api_base(&self) -> &str;
    fn output_path(&self) -> &str;
    fn token_path(&self) -> &str;
    fn key_delimiter(&self) -> &str;
}

/// Holds the bearer token between authorization and authenticated calls.
pub trait CredentialStore: Send + Sync {
    fn read_token(&self) -> Result<String>;
    fn write_token(&self, token: &str) -> Result<()>;
}

/// One bounded call against the paginated messages listing.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch_page(&self, start_row: u64, max_rows: u64) -> Result<MessagePage>;
}

/// Reads an exported tabular file back into flat records.
pub trait TabularLoader {
    fn load(&self, path: &Path) -> Result<Vec<FlatRecord>>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<Record>>;
    async fn transform(&self, data: Vec<Record>) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}
