//! Session lookup API client.
//!
//! Metadata is fetched per round event and lives only for the orchestration
//! step that fetched it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SessionApiConfig;
use crate::error::{AppError, Result};

/// Federated configuration attached to a session
#[derive(Debug, Clone, Deserialize)]
pub struct FederatedInfo {
    pub input_columns: Vec<String>,
    pub output_columns: Vec<String>,
}

/// Session metadata returned by the session lookup API
#[derive(Debug, Clone, Deserialize)]
pub struct SessionMetadata {
    pub federated_info: FederatedInfo,
}

#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Fetch metadata for a session using the token as bearer credential.
    /// Any non-2xx response is an error.
    async fn fetch_session(&self, session_id: u64, token: &str) -> Result<SessionMetadata>;
}

/// HTTP implementation over the control-plane server API.
pub struct HttpSessionApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSessionApi {
    pub fn new(config: &SessionApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn fetch_session(&self, session_id: u64, token: &str) -> Result<SessionMetadata> {
        let url = format!("{}/v2/get-federated-session/{}", self.base_url, session_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::SessionApi {
                session_id,
                status: status.as_u16(),
            });
        }

        let metadata = response.json::<SessionMetadata>().await?;
        Ok(metadata)
    }
}
