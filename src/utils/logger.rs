use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOGFILE_SUFFIX: &str = "harvest.log";

/// Console output style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_filter(verbose: bool, level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("oas_harvest=debug,info")
        } else {
            EnvFilter::new(format!("oas_harvest={}", level.unwrap_or("info")))
        }
    })
}

/// `<dir>/<YYYY-MM-DD>_harvest.log`
pub fn log_file_name(dir: &Path, date: chrono::NaiveDate) -> std::path::PathBuf {
    dir.join(format!("{}_{}", date.format("%Y-%m-%d"), LOGFILE_SUFFIX))
}

/// Console logger, plus an appending daily file when `log_dir` is set.
pub fn init_cli_logger(verbose: bool, level: Option<&str>, log_dir: Option<&Path>) -> Result<()> {
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    // 檔案日誌：每天一個檔案，附加寫入
    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = log_file_name(dir, chrono::Local::now().date_naive());
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(default_filter(verbose, level))
        .with(console)
        .with(file_layer)
        .init();

    Ok(())
}

/// Machine-readable variant for scheduled runs.
pub fn init_json_logger(verbose: bool, level: Option<&str>) {
    tracing_subscriber::registry()
        .with(default_filter(verbose, level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .json(),
        )
        .init();
}

/// Picks the console style; the daily file only applies to `Text`.
pub fn init_logger(
    format: LogFormat,
    verbose: bool,
    level: Option<&str>,
    log_dir: Option<&Path>,
) -> Result<()> {
    match format {
        LogFormat::Text => init_cli_logger(verbose, level, log_dir),
        LogFormat::Json => {
            if log_dir.is_some() {
                eprintln!("⚠️ JSON logging writes to stdout only, ignoring log directory");
            }
            init_json_logger(verbose, level);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name() {
        let date = chrono::NaiveDate::from_ymd_opt(2023, 2, 8).unwrap();
        let path = log_file_name(Path::new("logs"), date);
        assert_eq!(path, Path::new("logs").join("2023-02-08_harvest.log"));
    }

    #[test]
    fn test_log_format_from_toml() {
        #[derive(Deserialize)]
        struct Section {
            format: LogFormat,
        }

        let section: Section = toml::from_str(r#"format = "json""#).unwrap();
        assert_eq!(section.format, LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }
}
