use crate::domain::ports::ConfigProvider;
use crate::utils::error::{HarvestError, Result};
use crate::utils::logger::LogFormat;
use crate::utils::retry::RetryPolicy;
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.oaswitchboard.org/v2";
/// Remote-enforced ceiling for `maxrows`.
pub const MAX_PAGE_SIZE: u64 = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base")]
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_token_path")]
    pub token_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: String,
    /// Joins nested keys when flattening (`data.article.doi`).
    #[serde(default = "default_key_delimiter")]
    pub key_delimiter: String,
    #[serde(default = "default_csv_delimiter")]
    pub csv_delimiter: char,
    /// Records scanned for extra columns; `None` scans all.
    pub sample_window: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Flattened path that must be unique across pages, e.g. `header.id`.
    pub identity_field: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub directory: Option<String>,
    pub level: Option<String>,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_token_path() -> String {
    "./token.txt".to_string()
}

fn default_output_directory() -> String {
    "./output".to_string()
}

fn default_key_delimiter() -> String {
    ".".to_string()
}

fn default_csv_delimiter() -> char {
    ','
}

fn default_page_size() -> u64 {
    MAX_PAGE_SIZE
}

fn default_concurrency() -> usize {
    1
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
            timeout_seconds: default_timeout_seconds(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            email: None,
            password: None,
            token_path: default_token_path(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            key_delimiter: default_key_delimiter(),
            csv_delimiter: default_csv_delimiter(),
            sample_window: None,
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            concurrency: default_concurrency(),
            identity_field: None,
        }
    }
}

impl HarvestConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(HarvestError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| HarvestError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${OAS_PASSWORD})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| HarvestError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("api.base_url", &self.api.base_url)?;
        validation::validate_range("api.timeout_seconds", self.api.timeout_seconds, 1, 600)?;
        validation::validate_range("api.retry_attempts", self.api.retry_attempts, 1, 10)?;
        validation::validate_path("auth.token_path", &self.auth.token_path)?;
        validation::validate_path("output.directory", &self.output.directory)?;
        validation::validate_non_empty_string("output.key_delimiter", &self.output.key_delimiter)?;
        validation::validate_range("messages.page_size", self.messages.page_size, 1, MAX_PAGE_SIZE)?;
        validation::validate_range("messages.concurrency", self.messages.concurrency, 1, 16)?;

        if !self.output.csv_delimiter.is_ascii() {
            return Err(HarvestError::InvalidConfigValueError {
                field: "output.csv_delimiter".to_string(),
                value: self.output.csv_delimiter.to_string(),
                reason: "CSV delimiter must be a single ASCII character".to_string(),
            });
        }

        if let Some(window) = self.output.sample_window {
            validation::validate_range("output.sample_window", window, 1, usize::MAX)?;
        }

        Ok(())
    }

    /// Credentials for `POST /authorize`; both must be configured.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let email = self
            .auth
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty() && !e.starts_with("${"))
            .ok_or_else(|| HarvestError::MissingConfigError {
                field: "auth.email".to_string(),
            })?;
        let password = self
            .auth
            .password
            .as_deref()
            .filter(|p| !p.is_empty() && !p.starts_with("${"))
            .ok_or_else(|| HarvestError::MissingConfigError {
                field: "auth.password".to_string(),
            })?;
        Ok((email, password))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let base = Duration::from_millis(self.api.retry_delay_ms);
        RetryPolicy::new(self.api.retry_attempts, base, base * 32)
    }

    pub fn csv_delimiter_byte(&self) -> u8 {
        u8::try_from(u32::from(self.output.csv_delimiter)).unwrap_or(b',')
    }
}

impl ConfigProvider for HarvestConfig {
    fn api_base(&self) -> &str {
        self.api.base_url.trim_end_matches('/')
    }

    fn output_path(&self) -> &str {
        &self.output.directory
    }

    fn token_path(&self) -> &str {
        &self.auth.token_path
    }

    fn key_delimiter(&self) -> &str {
        &self.output.key_delimiter
    }
}

impl Validate for HarvestConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_toml_config() {
        let toml_content = r#"
[api]
base_url = "https://api.example.com/v2/"
timeout_seconds = 45
retry_attempts = 4

[auth]
email = "harvester@example.org"
password = "secret"
token_path = "./tmp/token.txt"

[output]
directory = "./reports"
key_delimiter = "_"
csv_delimiter = ";"

[messages]
page_size = 25
identity_field = "header.id"

[logging]
format = "json"
"#;

        let config = HarvestConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.api_base(), "https://api.example.com/v2");
        assert_eq!(config.request_timeout(), Duration::from_secs(45));
        assert_eq!(config.retry_policy().max_attempts(), 4);
        assert_eq!(config.output_path(), "./reports");
        assert_eq!(config.key_delimiter(), "_");
        assert_eq!(config.csv_delimiter_byte(), b';');
        assert_eq!(config.messages.page_size, 25);
        assert_eq!(config.messages.concurrency, 1);
        assert_eq!(config.messages.identity_field.as_deref(), Some("header.id"));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.credentials().unwrap(),
            ("harvester@example.org", "secret")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = HarvestConfig::from_toml_str("").unwrap();
        assert_eq!(config.api_base(), DEFAULT_API_BASE);
        assert_eq!(config.token_path(), "./token.txt");
        assert_eq!(config.output_path(), "./output");
        assert_eq!(config.messages.page_size, MAX_PAGE_SIZE);
        assert!(config.validate().is_ok());
        assert!(matches!(
            config.credentials(),
            Err(HarvestError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("OAS_HARVEST_TEST_EMAIL", "env@example.org");

        let toml_content = r#"
[auth]
email = "${OAS_HARVEST_TEST_EMAIL}"
password = "${OAS_HARVEST_TEST_UNSET_PASSWORD}"
"#;

        let config = HarvestConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.auth.email.as_deref(), Some("env@example.org"));
        // 未設定的變數保持原樣，視為缺少
        assert!(matches!(
            config.credentials(),
            Err(HarvestError::MissingConfigError { field }) if field == "auth.password"
        ));

        std::env::remove_var("OAS_HARVEST_TEST_EMAIL");
    }

    #[test]
    fn test_config_validation_rejects_oversized_page() {
        let config = HarvestConfig::from_toml_str(
            r#"
[messages]
page_size = 100
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = HarvestConfig::from_toml_str(
            r#"
[api]
base_url = "invalid-url"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[output]\ndirectory = \"./file-test\"\n")
            .unwrap();

        let config = HarvestConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.output_path(), "./file-test");
    }
}
