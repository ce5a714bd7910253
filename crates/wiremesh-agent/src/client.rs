//! Coordinator client
//!
//! [`SyncClient`] is the seam the reconciler talks through; [`HttpSyncClient`]
//! is the reqwest implementation used in production.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use wiremesh_types::{HostSettings, HostState};

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};

/// Exchanges state reports for settings documents
#[async_trait]
pub trait SyncClient: Send + Sync {
    /// Report local state and receive the desired settings
    async fn synchronize(&self, report: &HostState) -> Result<HostSettings>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// HTTP client for the `/hosts/self` endpoints
pub struct HttpSyncClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpSyncClient {
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("wiremesh-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    /// Desired settings without reporting state
    pub async fn fetch_settings(&self) -> Result<HostSettings> {
        let response = self
            .request(reqwest::Method::GET, "/hosts/self/settings")
            .send()
            .await?;
        handle_response(response).await
    }

    /// Report state without fetching settings
    pub async fn report_state(&self, report: &HostState) -> Result<HostState> {
        let response = self
            .request(reqwest::Method::POST, "/hosts/self/state")
            .json(report)
            .send()
            .await?;
        handle_response(response).await
    }
}

#[async_trait]
impl SyncClient for HttpSyncClient {
    async fn synchronize(&self, report: &HostState) -> Result<HostSettings> {
        let response = self
            .request(reqwest::Method::POST, "/hosts/self/sync")
            .json(report)
            .send()
            .await?;
        handle_response(response).await
    }
}

async fn handle_response<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AgentError::Unauthorized(message)),
        _ => Err(AgentError::Server {
            status: status.as_u16(),
            message,
        }),
    }
}
