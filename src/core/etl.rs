use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use std::time::Instant;
use tracing::Instrument;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<String> {
        let started = Instant::now();
        tracing::info!("🚀 Starting ETL process...");

        // Extract
        let raw_data = self
            .pipeline
            .extract()
            .instrument(tracing::info_span!("extract"))
            .await?;
        tracing::info!("📥 Extracted {} records", raw_data.len());

        // Transform
        let transformed = self
            .pipeline
            .transform(raw_data)
            .instrument(tracing::info_span!("transform"))
            .await?;
        tracing::info!(
            "🔧 Transformed {} records ({} bytes of CSV)",
            transformed.flat_records.len(),
            transformed.csv_output.len()
        );

        // Load
        let output_path = self
            .pipeline
            .load(transformed)
            .instrument(tracing::info_span!("load"))
            .await?;
        tracing::info!(
            "✅ Output saved to: {} ({:.2?})",
            output_path,
            started.elapsed()
        );

        Ok(output_path)
    }
}
