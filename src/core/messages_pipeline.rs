use crate::core::flatten::flatten_all;
use crate::core::paginator::PaginatedFetcher;
use crate::core::tabular::TabularExporter;
use crate::domain::model::{Record, TransformResult};
use crate::domain::ports::{MessageSource, Pipeline, Storage};
use crate::utils::error::Result;

/// Pages through `/messages` and saves the collection as JSON and CSV.
pub struct MessagesPipeline<S: Storage, M: MessageSource> {
    storage: S,
    fetcher: PaginatedFetcher<M>,
    page_size: u64,
    key_delimiter: String,
    exporter: TabularExporter,
    timestamp: Option<String>,
}

impl<S: Storage, M: MessageSource> MessagesPipeline<S, M> {
    pub fn new(storage: S, fetcher: PaginatedFetcher<M>, page_size: u64) -> Self {
        Self {
            storage,
            fetcher,
            page_size,
            key_delimiter: ".".to_string(),
            exporter: TabularExporter::default(),
            timestamp: None,
        }
    }

    pub fn with_key_delimiter(mut self, delimiter: &str) -> Self {
        self.key_delimiter = delimiter.to_string();
        self
    }

    pub fn with_exporter(mut self, exporter: TabularExporter) -> Self {
        self.exporter = exporter;
        self
    }

    /// Fixes the `YYYYmmdd-HHMM` part of the output names.
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    fn output_stem(&self) -> String {
        let timestamp = self
            .timestamp
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format("%Y%m%d-%H%M").to_string());
        format!("messages_{}", timestamp)
    }
}

#[async_trait::async_trait]
impl<S: Storage, M: MessageSource> Pipeline for MessagesPipeline<S, M> {
    async fn extract(&self) -> Result<Vec<Record>> {
        self.fetcher.fetch_all(self.page_size).await
    }

    async fn transform(&self, data: Vec<Record>) -> Result<TransformResult> {
        let flat_records = flatten_all(&data, &self.key_delimiter);
        let csv_output = self.exporter.to_csv_string(&flat_records)?;

        Ok(TransformResult {
            records: data,
            flat_records,
            csv_output,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let stem = self.output_stem();
        let json_name = format!("{}.json", stem);
        let csv_name = format!("{}.csv", stem);

        let json_data = serde_json::to_vec_pretty(&result.records)?;
        tracing::debug!("Writing {} ({} bytes)", json_name, json_data.len());
        self.storage.write_file(&json_name, &json_data).await?;

        tracing::debug!("Writing {} ({} bytes)", csv_name, result.csv_output.len());
        self.storage
            .write_file(&csv_name, result.csv_output.as_bytes())
            .await?;

        Ok(json_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::MessagePage;
    use crate::utils::error::HarvestError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                HarvestError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    struct FixedMessages(Vec<Record>);

    #[async_trait]
    impl MessageSource for FixedMessages {
        async fn fetch_page(&self, start_row: u64, max_rows: u64) -> Result<MessagePage> {
            let start = (start_row - 1) as usize;
            let end = (start + max_rows as usize).min(self.0.len());
            Ok(MessagePage {
                total: self.0.len() as u64,
                messages: self.0[start.min(end)..end].to_vec(),
            })
        }
    }

    fn messages(count: u64) -> Vec<Record> {
        (1..=count)
            .map(|n| {
                Record::from_value(json!({
                    "header": {"id": format!("m{}", n), "type": "p1"},
                    "data": {"article": {"doi": format!("10.1/{}", n)}}
                }))
                .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_messages_pipeline_writes_json_and_csv() {
        let storage = MockStorage::new();
        let fetcher = PaginatedFetcher::new(FixedMessages(messages(3)));
        let pipeline =
            MessagesPipeline::new(storage.clone(), fetcher, 2).with_timestamp("20220301-1200");

        let records = pipeline.extract().await.unwrap();
        assert_eq!(records.len(), 3);

        let result = pipeline.transform(records).await.unwrap();
        assert_eq!(result.flat_records[0].get("data.article.doi"), Some(&json!("10.1/1")));

        let output = pipeline.load(result).await.unwrap();
        assert_eq!(output, "messages_20220301-1200.json");

        let json_data = storage.get_file("messages_20220301-1200.json").await.unwrap();
        let saved: Vec<Record> = serde_json::from_slice(&json_data).unwrap();
        assert_eq!(saved, messages(3));

        let csv_data = storage.get_file("messages_20220301-1200.csv").await.unwrap();
        let csv = String::from_utf8(csv_data).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "header.id,header.type,data.article.doi");
        assert_eq!(lines[3], "m3,p1,10.1/3");
    }

    #[tokio::test]
    async fn test_messages_pipeline_custom_delimiter() {
        let storage = MockStorage::new();
        let fetcher = PaginatedFetcher::new(FixedMessages(messages(1)));
        let pipeline = MessagesPipeline::new(storage.clone(), fetcher, 50)
            .with_key_delimiter("_")
            .with_exporter(TabularExporter::new(b';'))
            .with_timestamp("t");

        let records = pipeline.extract().await.unwrap();
        let result = pipeline.transform(records).await.unwrap();

        assert!(result
            .csv_output
            .starts_with("header_id;header_type;data_article_doi"));
    }
}
