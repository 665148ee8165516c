pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::domain::model::ReportFormat;
#[cfg(feature = "cli")]
use crate::utils::logger::LogFormat;
#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

pub use cli::LocalStorage;
pub use toml_config::HarvestConfig;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "oas-harvest")]
#[command(about = "Harvest reports and messages from the OA Switchboard API")]
pub struct CliConfig {
    /// Path to TOML configuration file (defaults to ./harvest.toml when present)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the output directory from the config
    #[arg(long)]
    pub output_path: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Console log style, overriding `[logging] format`
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Obtain a bearer token and store it at the configured token path
    Authorize,

    /// Download one bulk report, optionally filtered by date range
    Report {
        #[arg(long, value_enum, default_value_t = ReportFormat::Excel)]
        format: ReportFormat,

        /// Start date, YYYY-MM-DD (requires --to)
        #[arg(long)]
        from: Option<String>,

        /// End date, YYYY-MM-DD (requires --from)
        #[arg(long)]
        to: Option<String>,
    },

    /// Download reports in consecutive one-month batches
    Monthly {
        #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
        format: ReportFormat,

        /// First month, YYYY-MM or YYYY-MM-DD
        #[arg(long)]
        start: String,

        /// Last boundary, YYYY-MM or YYYY-MM-DD
        #[arg(long)]
        end: String,
    },

    /// Page through /messages and save them as JSON and CSV
    Messages {
        /// Rows per request (1-50)
        #[arg(long)]
        page_size: Option<u64>,
    },
}

#[cfg(feature = "cli")]
impl CliConfig {
    const DEFAULT_CONFIG_PATH: &'static str = "harvest.toml";

    /// Explicit path must exist; the default path is optional.
    pub fn load_harvest_config(&self) -> crate::utils::error::Result<HarvestConfig> {
        let mut config = match &self.config {
            Some(path) => HarvestConfig::from_file(path)?,
            None if std::path::Path::new(Self::DEFAULT_CONFIG_PATH).exists() => {
                HarvestConfig::from_file(Self::DEFAULT_CONFIG_PATH)?
            }
            None => {
                tracing::debug!("No configuration file found, using defaults");
                HarvestConfig::default()
            }
        };

        if let Some(output_path) = &self.output_path {
            config.output.directory = output_path.clone();
        }

        if let Some(format) = self.log_format {
            config.logging.format = format;
        }

        if let Command::Messages {
            page_size: Some(page_size),
        } = &self.command
        {
            config.messages.page_size = *page_size;
        }

        Ok(config)
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_flag_overrides_config() {
        let cli = CliConfig::try_parse_from(["oas-harvest", "--log-format", "json", "messages"])
            .unwrap();
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        let config = cli.load_harvest_config().unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        assert!(CliConfig::try_parse_from(["oas-harvest", "--log-format", "xml", "authorize"])
            .is_err());
    }

    #[test]
    fn test_messages_page_size_override() {
        let cli =
            CliConfig::try_parse_from(["oas-harvest", "messages", "--page-size", "20"]).unwrap();
        let config = cli.load_harvest_config().unwrap();
        assert_eq!(config.messages.page_size, 20);
        assert_eq!(config.logging.format, LogFormat::Text);
    }
}
