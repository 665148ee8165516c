use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    #[error("Authentication failed at {endpoint} ({}): {reason}", display_status(.status))]
    Authentication {
        endpoint: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Transport failure at {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Remote returned {status} {reason} for {endpoint}")]
    RemoteStatus {
        endpoint: String,
        status: u16,
        reason: String,
    },

    #[error("Remote count drift: {message}")]
    RemoteCountDrift { message: String },

    #[error("Empty payload from {endpoint}: response carried neither an attachment nor a download URL")]
    EmptyPayload { endpoint: String },

    #[error("Invalid response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },

    #[error("{failed} of {total} monthly report batches failed")]
    PartialBatchFailure { failed: usize, total: usize },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

fn display_status(status: &Option<u16>) -> String {
    status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "no status".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Auth,
    Network,
    Remote,
    Data,
    Config,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl HarvestError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::ProcessingError {
            message: message.into(),
        }
    }

    pub fn invalid_response(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Precondition { .. } => ErrorCategory::Input,
            Self::Authentication { .. } => ErrorCategory::Auth,
            Self::Transport { .. } => ErrorCategory::Network,
            Self::RemoteStatus { .. }
            | Self::RemoteCountDrift { .. }
            | Self::EmptyPayload { .. }
            | Self::InvalidResponse { .. }
            | Self::PartialBatchFailure { .. } => ErrorCategory::Remote,
            Self::CsvError(_) | Self::SerializationError(_) | Self::ProcessingError { .. } => {
                ErrorCategory::Data
            }
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Config,
            Self::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::PartialBatchFailure { .. } => ErrorSeverity::Medium,
            Self::Transport { .. } => ErrorSeverity::Medium,
            Self::RemoteStatus { status, .. } if *status >= 500 => ErrorSeverity::Medium,
            Self::IoError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// 是否值得重試 (連線層錯誤、5xx、429)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::RemoteStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Input => "Check the date range: both --from and --to are required, formatted YYYY-MM-DD",
            ErrorCategory::Auth => "Run `oas-harvest authorize` to refresh the token and check the credentials",
            ErrorCategory::Network => "Check network connectivity to the API and try again",
            ErrorCategory::Remote => match self {
                Self::RemoteCountDrift { .. } => {
                    "The remote collection changed while paging; restart the fetch from the beginning"
                }
                Self::PartialBatchFailure { .. } => {
                    "Re-run the failed months individually with `oas-harvest report --from --to`"
                }
                _ => "Inspect the logged response and retry later",
            },
            ErrorCategory::Data => "Inspect the downloaded payload; it may not match the expected schema",
            ErrorCategory::Config => "Fix the configuration file and run again",
            ErrorCategory::System => "Check file permissions and free disk space",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Precondition { message } => format!("Invalid input: {}", message),
            Self::Authentication { .. } => "Not authorized by the API".to_string(),
            Self::Transport { endpoint, .. } => format!("Could not reach {}", endpoint),
            Self::EmptyPayload { .. } => "The API returned no report data".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
