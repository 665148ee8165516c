use crate::adapters::http::{stream_to_file, ApiClient};
use crate::config::HarvestConfig;
use crate::core::flatten::flatten_all;
use crate::core::tabular::TabularExporter;
use crate::domain::model::{DateRange, Record, ReportFormat};
use crate::domain::ports::{ConfigProvider, CredentialStore};
use crate::utils::error::{HarvestError, Result};
use chrono::NaiveDate;
use reqwest::header::CONTENT_DISPOSITION;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// How the report body reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Attachment streamed in the `/report` response itself.
    Inline,
    /// `/report` answered with a URL that was fetched separately.
    Redirect,
}

#[derive(Debug, Clone)]
pub struct RetrievedReport {
    pub path: PathBuf,
    /// Derived CSV for structured formats.
    pub csv_path: Option<PathBuf>,
    pub delivery: DeliveryMode,
    pub bytes: u64,
    pub range: Option<DateRange>,
}

#[derive(Debug)]
pub struct BatchFailure {
    pub range: DateRange,
    pub error: HarvestError,
}

/// Result of a monthly run; a failed month does not stop later months.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub reports: Vec<RetrievedReport>,
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.reports.len() + self.failures.len()
    }

    pub fn ensure_complete(self) -> Result<Vec<RetrievedReport>> {
        if self.failures.is_empty() {
            Ok(self.reports)
        } else {
            Err(HarvestError::PartialBatchFailure {
                failed: self.failures.len(),
                total: self.total(),
            })
        }
    }
}

#[derive(Debug, Serialize)]
struct ReportRequest {
    state: Option<String>,
    pio: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<String>,
}

impl ReportRequest {
    fn new(range: Option<&DateRange>) -> Self {
        Self {
            state: None,
            pio: false,
            from: range.map(|r| r.from.format("%Y-%m-%d").to_string()),
            to: range.map(|r| r.to.format("%Y-%m-%d").to_string()),
        }
    }
}

pub struct ReportRetriever<'a, C: CredentialStore> {
    api: &'a ApiClient<C>,
    output_dir: PathBuf,
    key_delimiter: String,
    exporter: TabularExporter,
}

impl<'a, C: CredentialStore> ReportRetriever<'a, C> {
    pub fn new(api: &'a ApiClient<C>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            api,
            output_dir: output_dir.into(),
            key_delimiter: ".".to_string(),
            exporter: TabularExporter::default(),
        }
    }

    pub fn from_config(api: &'a ApiClient<C>, config: &HarvestConfig) -> Self {
        Self {
            api,
            output_dir: PathBuf::from(config.output_path()),
            key_delimiter: config.key_delimiter().to_string(),
            exporter: TabularExporter::new(config.csv_delimiter_byte())
                .with_sample_window(config.output.sample_window),
        }
    }

    pub fn with_key_delimiter(mut self, delimiter: &str) -> Self {
        self.key_delimiter = delimiter.to_string();
        self
    }

    pub async fn retrieve_report(
        &self,
        format: ReportFormat,
        range: Option<DateRange>,
    ) -> Result<RetrievedReport> {
        let endpoint = self.api.endpoint("report");
        let body = ReportRequest::new(range.as_ref());
        tracing::info!(
            "📡 Starting /report request for type {}{}",
            format,
            range.map(|r| format!(" ({})", r)).unwrap_or_default()
        );

        let response = self
            .api
            .send(&endpoint, |client| {
                Ok(client
                    .post(&endpoint)
                    .query(&[("type", format.query_value())])
                    .headers(self.api.auth_headers(format.accept_header())?)
                    .json(&body))
            })
            .await?;

        let disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .map(|value| value.to_str().unwrap_or_default().to_string());

        let (path, bytes, delivery) = match disposition {
            Some(header) => {
                tracing::debug!("Downloading file from content-disposition");
                let filename = parse_content_disposition(&header)
                    .and_then(|name| safe_filename(&name))
                    .unwrap_or_else(|| default_filename(format));
                let path = self.report_path(&filename, range.as_ref());
                let bytes = stream_to_file(&endpoint, response, &path).await?;
                (path, bytes, DeliveryMode::Inline)
            }
            None => {
                let text = response
                    .text()
                    .await
                    .map_err(|source| HarvestError::Transport {
                        endpoint: endpoint.clone(),
                        source,
                    })?;
                let location = parse_redirect_location(&endpoint, &text)?;

                tracing::debug!("Downloading file from content URL {}", location);
                let filename = filename_from_url(&location)
                    .and_then(|name| safe_filename(&name))
                    .unwrap_or_else(|| default_filename(format));
                let path = self.report_path(&filename, range.as_ref());
                let download = self.api.get_unauthenticated(location.as_str()).await?;
                let bytes = stream_to_file(location.as_str(), download, &path).await?;
                (path, bytes, DeliveryMode::Redirect)
            }
        };

        tracing::info!("📁 Downloaded report to {} ({} bytes)", path.display(), bytes);

        let csv_path = if format.is_structured() {
            Some(self.convert_to_csv(&path).await?)
        } else {
            None
        };

        Ok(RetrievedReport {
            path,
            csv_path,
            delivery,
            bytes,
            range,
        })
    }

    /// One report per calendar month between `start` and `end`.
    pub async fn retrieve_monthly(
        &self,
        format: ReportFormat,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BatchOutcome> {
        tracing::info!("## START MONTHLY PROCESSING from {} until {}", start, end);
        let ranges = DateRange::monthly(start, end)?;
        if ranges.is_empty() {
            tracing::warn!("⚠️ {} to {} spans less than one month, nothing to fetch", start, end);
        }

        let mut outcome = BatchOutcome::default();
        for range in ranges {
            tracing::info!("Processing messages from: {} until: {}", range.from, range.to);
            match self.retrieve_report(format, Some(range)).await {
                Ok(report) => outcome.reports.push(report),
                Err(error) => {
                    tracing::error!("❌ Monthly batch {} failed: {}", range, error);
                    outcome.failures.push(BatchFailure { range, error });
                }
            }
        }

        tracing::info!(
            "📊 Monthly processing finished: {} succeeded, {} failed",
            outcome.reports.len(),
            outcome.failures.len()
        );
        Ok(outcome)
    }

    fn report_path(&self, filename: &str, range: Option<&DateRange>) -> PathBuf {
        self.output_dir.join(report_filename(filename, range))
    }

    async fn convert_to_csv(&self, path: &Path) -> Result<PathBuf> {
        tracing::info!("🔧 Converting json file to CSV");
        let content = tokio::fs::read(path).await?;
        let payload: serde_json::Value = serde_json::from_slice(&content)?;

        let items = match payload {
            serde_json::Value::Array(items) => items,
            _ => {
                return Err(HarvestError::invalid_response(
                    path.display().to_string(),
                    "report payload is not a JSON array",
                ))
            }
        };

        let total = items.len();
        let records: Vec<Record> = items.into_iter().filter_map(Record::from_value).collect();
        if records.len() < total {
            tracing::warn!(
                "⚠️ Skipped {} non-object item(s) in {}",
                total - records.len(),
                path.display()
            );
        }

        let flat = flatten_all(&records, &self.key_delimiter);
        let csv_path = path.with_extension("csv");
        self.exporter.write_csv_file(&flat, &csv_path)?;
        tracing::info!("✅ File converted: {}", csv_path.display());
        Ok(csv_path)
    }
}

fn default_filename(format: ReportFormat) -> String {
    format!("report.{}", format.extension())
}

/// Safe name, with `_from_to` inserted before the extension.
pub fn report_filename(filename: &str, range: Option<&DateRange>) -> String {
    let filename = safe_filename(filename).unwrap_or_else(|| "report".to_string());
    let Some(range) = range else {
        return filename;
    };

    let path = Path::new(&filename);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("report");
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}{}.{}", stem, range.filename_suffix(), ext),
        None => format!("{}{}", stem, range.filename_suffix()),
    }
}

/// File name from a `Content-Disposition` value. The RFC 5987 `filename*`
/// parameter wins over `filename`; quoted values may contain `;`.
pub fn parse_content_disposition(header: &str) -> Option<String> {
    let params = disposition_params(header);
    let param = |key: &str| {
        params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    };

    param("filename*")
        .and_then(|value| {
            // charset'language'percent-encoded
            let (_, encoded) = value.split_once("''")?;
            urlencoding::decode(encoded).ok().map(|name| name.into_owned())
        })
        .or_else(|| param("filename").map(str::to_string))
        .filter(|name| !name.is_empty())
}

/// `key=value` pairs after the disposition type, keys lowercased.
fn disposition_params(header: &str) -> Vec<(String, String)> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = header.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => quoted = !quoted,
            '\\' if quoted => current.extend(chars.next()),
            ';' if !quoted => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    parts.push(current);

    parts
        .iter()
        .filter_map(|part| part.split_once('='))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect()
}

/// The body of a redirect-mode response: a bare URL or a JSON string.
fn parse_redirect_location(endpoint: &str, body: &str) -> Result<Url> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        tracing::error!("❌ No data in the response from {}", endpoint);
        return Err(HarvestError::EmptyPayload {
            endpoint: endpoint.to_string(),
        });
    }

    let candidate = if trimmed.starts_with('"') {
        serde_json::from_str::<String>(trimmed)?
    } else {
        trimmed.to_string()
    };

    Url::parse(&candidate).map_err(|e| {
        HarvestError::invalid_response(endpoint, format!("expected a download URL: {}", e))
    })
}

fn filename_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment).ok()?;
    Some(decoded.into_owned())
}

/// Last path segment of a server-supplied name, with characters that are
/// invalid on common filesystems replaced. `None` when nothing usable is left.
pub fn safe_filename(name: &str) -> Option<String> {
    let segment = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = segment
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    // 不產生隱藏檔
    let cleaned = cleaned.trim().trim_start_matches('.');
    is_safe_filename_segment(cleaned).then(|| cleaned.to_string())
}

/// Exactly one normal path component.
fn is_safe_filename_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
