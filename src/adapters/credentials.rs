use crate::adapters::http::ApiClient;
use crate::domain::ports::CredentialStore;
use crate::utils::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Bearer token kept in a plain file, read back before every call.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn read_token(&self) -> Result<String> {
        let token = std::fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => HarvestError::Authentication {
                endpoint: self.path.display().to_string(),
                status: None,
                reason: "no stored token, authorize first".to_string(),
            },
            _ => HarvestError::IoError(e),
        })?;

        let token = token.trim();
        if token.is_empty() {
            return Err(HarvestError::Authentication {
                endpoint: self.path.display().to_string(),
                status: None,
                reason: "stored token is empty".to_string(),
            });
        }
        Ok(token.to_string())
    }

    fn write_token(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token)?;
        tracing::debug!("Token written to {}", self.path.display());
        Ok(())
    }
}

/// In-memory store, for a token injected from the environment or tests.
#[derive(Debug, Default)]
pub struct StaticToken {
    token: Mutex<Option<String>>,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl CredentialStore for StaticToken {
    fn read_token(&self) -> Result<String> {
        self.token
            .lock()
            .map_err(|_| HarvestError::processing("token lock poisoned"))?
            .clone()
            .ok_or_else(|| HarvestError::Authentication {
                endpoint: "memory".to_string(),
                status: None,
                reason: "no token available".to_string(),
            })
    }

    fn write_token(&self, token: &str) -> Result<()> {
        *self
            .token
            .lock()
            .map_err(|_| HarvestError::processing("token lock poisoned"))? = Some(token.to_string());
        Ok(())
    }
}

#[derive(Serialize)]
struct AuthorizeRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthorizeResponse {
    token: String,
}

/// `POST /authorize` and persist the returned token.
pub async fn authorize<C: CredentialStore>(
    api: &ApiClient<C>,
    email: &str,
    password: &str,
) -> Result<()> {
    let endpoint = api.endpoint("authorize");
    tracing::info!("🔐 Performing auth request");

    let response = api
        .send(&endpoint, |client| {
            Ok(client
                .post(&endpoint)
                .json(&AuthorizeRequest { email, password }))
        })
        .await
        .map_err(|e| match e {
            HarvestError::RemoteStatus {
                endpoint,
                status,
                reason,
            } => HarvestError::Authentication {
                endpoint,
                status: Some(status),
                reason,
            },
            other => other,
        })?;

    let body: AuthorizeResponse = response.json().await.map_err(|e| {
        tracing::error!("❌ Authorize response from {} has no token: {}", endpoint, e);
        HarvestError::Authentication {
            endpoint: endpoint.clone(),
            status: None,
            reason: format!("response carried no token: {}", e),
        }
    })?;

    api.credentials().write_token(&body.token)?;
    tracing::info!("✅ Authorized, token stored");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::retry::RetryPolicy;
    use httpmock::prelude::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(temp_dir.path().join("auth").join("token.txt"));

        assert!(matches!(
            store.read_token(),
            Err(HarvestError::Authentication { .. })
        ));

        store.write_token("abc.def.ghi").unwrap();
        assert_eq!(store.read_token().unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_file_store_rejects_blank_token() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(temp_dir.path().join("token.txt"));
        store.write_token("  \n").unwrap();
        assert!(store.read_token().is_err());
    }

    #[tokio::test]
    async fn test_authorize_stores_token() {
        let server = MockServer::start();
        let auth_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/authorize")
                .json_body(serde_json::json!({"email": "a@b.org", "password": "pw"}));
            then.status(200)
                .json_body(serde_json::json!({"token": "jwt-token"}));
        });

        let api = ApiClient::new(
            &server.base_url(),
            StaticToken::empty(),
            Duration::from_secs(5),
            RetryPolicy::no_retry(),
        )
        .unwrap();

        authorize(&api, "a@b.org", "pw").await.unwrap();

        auth_mock.assert();
        assert_eq!(api.credentials().read_token().unwrap(), "jwt-token");
    }

    #[tokio::test]
    async fn test_authorize_rejected_credentials() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/authorize");
            then.status(400).json_body(serde_json::json!({"message": "bad"}));
        });

        let api = ApiClient::new(
            &server.base_url(),
            StaticToken::empty(),
            Duration::from_secs(5),
            RetryPolicy::no_retry(),
        )
        .unwrap();

        let err = authorize(&api, "a@b.org", "wrong").await.unwrap_err();
        assert!(matches!(
            err,
            HarvestError::Authentication {
                status: Some(400),
                ..
            }
        ));
        assert!(api.credentials().read_token().is_err());
    }
}
