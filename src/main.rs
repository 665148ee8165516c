use clap::Parser;
use oas_harvest::config::Command;
use oas_harvest::core::TabularExporter;
use oas_harvest::domain::model::DateRange;
use oas_harvest::domain::ports::ConfigProvider;
use oas_harvest::utils::error::{ErrorSeverity, Result};
use oas_harvest::utils::logger;
use oas_harvest::utils::validation::{validate_iso_month, Validate};
use oas_harvest::{
    authorize, ApiClient, CliConfig, EtlEngine, FileCredentialStore, HarvestConfig, LocalStorage,
    MessagesPipeline, PaginatedFetcher, ReportRetriever,
};
use std::path::Path;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    let config = match cli.load_harvest_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    // 初始化日誌
    if let Err(e) = logger::init_logger(
        config.logging.format,
        cli.verbose,
        config.logging.level.as_deref(),
        config.logging.directory.as_deref().map(Path::new),
    ) {
        eprintln!("⚠️ Logging setup failed: {}", e);
    }

    tracing::info!("Starting oas-harvest CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    match run(&cli.command, &config).await {
        Ok(()) => {
            tracing::info!("✅ Completed successfully!");
        }
        Err(e) => {
            tracing::error!(
                "❌ Run failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }
}

async fn run(command: &Command, config: &HarvestConfig) -> Result<()> {
    let api = ApiClient::from_config(config, FileCredentialStore::new(config.token_path()))?;

    match command {
        Command::Authorize => {
            let (email, password) = config.credentials()?;
            authorize(&api, email, password).await?;
            println!("✅ Token stored at {}", config.token_path());
        }
        Command::Report { format, from, to } => {
            let range = DateRange::parse(from.as_deref(), to.as_deref())?;
            let report = ReportRetriever::from_config(&api, config)
                .retrieve_report(*format, range)
                .await?;
            println!("📁 Report saved to: {}", report.path.display());
            if let Some(csv_path) = &report.csv_path {
                println!("📁 CSV saved to: {}", csv_path.display());
            }
        }
        Command::Monthly { format, start, end } => {
            let start = validate_iso_month("start", start)?;
            let end = validate_iso_month("end", end)?;
            let outcome = ReportRetriever::from_config(&api, config)
                .retrieve_monthly(*format, start, end)
                .await?;

            for report in &outcome.reports {
                println!("📁 Report saved to: {}", report.path.display());
            }
            for failure in &outcome.failures {
                eprintln!("❌ {}: {}", failure.range, failure.error.user_friendly_message());
            }
            outcome.ensure_complete()?;
        }
        Command::Messages { .. } => {
            let delimiter = config.key_delimiter();
            let fetcher = PaginatedFetcher::new(api)
                .with_concurrency(config.messages.concurrency)
                .with_identity_field(config.messages.identity_field.clone(), delimiter);
            let storage = LocalStorage::new(config.output_path());
            let exporter = TabularExporter::new(config.csv_delimiter_byte())
                .with_sample_window(config.output.sample_window);

            let pipeline = MessagesPipeline::new(storage.clone(), fetcher, config.messages.page_size)
                .with_key_delimiter(delimiter)
                .with_exporter(exporter);

            let output = EtlEngine::new(pipeline).run().await?;
            println!(
                "📁 Messages saved to: {}",
                storage.base_path().join(output).display()
            );
        }
    }

    Ok(())
}
