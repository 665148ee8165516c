//! Thin wrapper over `reqwest` for the OA Switchboard API.
//!
//! Every call gets the configured timeout and goes through the retry
//! policy. 401/403 become [`HarvestError::Authentication`] and are never
//! retried; other non-2xx statuses become [`HarvestError::RemoteStatus`].

use crate::config::HarvestConfig;
use crate::domain::model::MessagePage;
use crate::domain::ports::{ConfigProvider, CredentialStore, MessageSource};
use crate::utils::error::{HarvestError, Result};
use crate::utils::retry::{RetryDecision, RetryPolicy};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

pub struct ApiClient<C: CredentialStore> {
    client: Client,
    base_url: String,
    credentials: C,
    retry: RetryPolicy,
}

impl<C: CredentialStore> ApiClient<C> {
    pub fn new(
        base_url: &str,
        credentials: C,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HarvestError::ConfigError {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            retry,
        })
    }

    pub fn from_config(config: &HarvestConfig, credentials: C) -> Result<Self> {
        Self::new(
            config.api_base(),
            credentials,
            config.request_timeout(),
            config.retry_policy(),
        )
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn credentials(&self) -> &C {
        &self.credentials
    }

    /// Headers for an authenticated call; the token is re-read every time.
    pub fn auth_headers(&self, accept: &str) -> Result<HeaderMap> {
        let token = self.credentials.read_token()?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_str(accept).map_err(|e| HarvestError::processing(e.to_string()))?,
        );
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            HarvestError::Authentication {
                endpoint: self.base_url.clone(),
                status: None,
                reason: "stored token is not a valid header value".to_string(),
            }
        })?;
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Sends a request built by `build`, retrying transient failures.
    pub async fn send<F>(&self, endpoint: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> Result<RequestBuilder>,
    {
        let mut attempt = 1;
        loop {
            let outcome = match build(&self.client) {
                Ok(request) => self.execute_once(endpoint, request).await,
                Err(e) => Err(e),
            };

            let err = match outcome {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            match self.retry.should_retry(&err, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    tracing::warn!(
                        "⚠️ Attempt {} for {} failed ({}), retrying in {:?}",
                        attempt,
                        endpoint,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    tracing::error!(endpoint = %endpoint, attempt, %reason, "❌ Request failed: {}", err);
                    return Err(err);
                }
            }
        }
    }

    async fn execute_once(&self, endpoint: &str, request: RequestBuilder) -> Result<Response> {
        tracing::debug!("Making API request to: {}", endpoint);
        let response = request.send().await.map_err(|source| HarvestError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;

        let status = response.status();
        tracing::debug!("API response status: {}", status);
        if status.is_success() {
            return Ok(response);
        }

        let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
        let body = response.text().await.unwrap_or_default();
        if !body.is_empty() {
            tracing::debug!("Response body from {}: {}", endpoint, body);
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(HarvestError::Authentication {
                endpoint: endpoint.to_string(),
                status: Some(status.as_u16()),
                reason,
            });
        }

        Err(HarvestError::RemoteStatus {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            reason,
        })
    }

    /// Plain GET without the bearer token, for pre-signed download URLs.
    pub async fn get_unauthenticated(&self, url: &str) -> Result<Response> {
        self.send(url, |client| Ok(client.get(url))).await
    }
}

/// Streams a response body into `path`, returning the bytes written.
pub async fn stream_to_file(endpoint: &str, mut response: Response, path: &Path) -> Result<u64> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|source| HarvestError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    tracing::debug!("Streamed {} bytes to {}", written, path.display());
    Ok(written)
}

#[async_trait]
impl<C: CredentialStore> MessageSource for ApiClient<C> {
    async fn fetch_page(&self, start_row: u64, max_rows: u64) -> Result<MessagePage> {
        let endpoint = self.endpoint("messages");
        let response = self
            .send(&endpoint, |client| {
                Ok(client
                    .get(&endpoint)
                    .headers(self.auth_headers("application/json")?)
                    .query(&[("startrow", start_row), ("maxrows", max_rows)]))
            })
            .await?;

        let body: serde_json::Value = response.json().await.map_err(|e| {
            HarvestError::invalid_response(&endpoint, format!("body is not JSON: {}", e))
        })?;

        serde_json::from_value(body).map_err(|e| {
            tracing::error!(
                "❌ Invalid page at startrow={} maxrows={}: {}",
                start_row,
                max_rows,
                e
            );
            HarvestError::invalid_response(
                &endpoint,
                format!("expected {{total, messages}} page: {}", e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::credentials::StaticToken;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer) -> ApiClient<StaticToken> {
        ApiClient::new(
            &server.base_url(),
            StaticToken::new("test-token"),
            Duration::from_secs(5),
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_page_sends_bearer_and_paging_params() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/messages")
                .query_param("startrow", "51")
                .query_param("maxrows", "50")
                .header("Authorization", "Bearer test-token");
            then.status(200).json_body(serde_json::json!({
                "total": 120,
                "messages": [{"header": {"id": 51}}]
            }));
        });

        let page = client_for(&server).fetch_page(51, 50).await.unwrap();

        api_mock.assert();
        assert_eq!(page.total, 120);
        assert_eq!(page.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_page_rejects_page_without_total() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/messages");
            then.status(200)
                .json_body(serde_json::json!({"messages": []}));
        });

        let err = client_for(&server).fetch_page(1, 1).await.unwrap_err();
        assert!(matches!(err, HarvestError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET).path("/messages");
            then.status(401).json_body(serde_json::json!({"message": "expired"}));
        });

        let err = client_for(&server).fetch_page(1, 1).await.unwrap_err();

        api_mock.assert_hits(1);
        assert!(matches!(
            err,
            HarvestError::Authentication {
                status: Some(401),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_until_exhausted() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET).path("/messages");
            then.status(503);
        });

        let err = client_for(&server).fetch_page(1, 1).await.unwrap_err();

        api_mock.assert_hits(3);
        assert!(matches!(err, HarvestError::RemoteStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET).path("/messages");
            then.status(400);
        });

        let err = client_for(&server).fetch_page(1, 1).await.unwrap_err();

        api_mock.assert_hits(1);
        assert!(matches!(err, HarvestError::RemoteStatus { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_stream_to_file_writes_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/files/report.xlsx");
            then.status(200).body("spreadsheet-bytes");
        });
        let temp_dir = tempfile::TempDir::new().unwrap();
        let target = temp_dir.path().join("out").join("report.xlsx");

        let client = client_for(&server);
        let url = server.url("/files/report.xlsx");
        let response = client.get_unauthenticated(&url).await.unwrap();
        let written = stream_to_file(&url, response, &target).await.unwrap();

        assert_eq!(written, 17);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "spreadsheet-bytes");
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let client = ApiClient::new(
            "https://api.example.com/v2/",
            StaticToken::new("t"),
            Duration::from_secs(1),
            RetryPolicy::no_retry(),
        )
        .unwrap();
        assert_eq!(client.endpoint("/report"), "https://api.example.com/v2/report");
    }
}
