//! HTTP client for the sandbox provisioning API.
//!
//! Endpoints: `POST /sandboxes` to provision, `GET /sandboxes/{id}` for
//! live status, `POST /sandboxes/{id}/stop` for graceful shutdown.
//! Configured from environment variables by [`HttpSandboxProvider::from_env`].

use std::time::Duration;

use serde::Deserialize;

use super::{ProviderError, ProvisionedSandbox, SandboxProbe, SandboxProvider};
use crate::state::SandboxStatus;

const REQUEST_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 10;

pub struct HttpSandboxProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct CreateResponse {
    #[serde(rename = "sandboxId")]
    sandbox_id: String,
    #[serde(rename = "previewUrl")]
    preview_url: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: SandboxStatus,
    #[serde(rename = "previewUrl")]
    preview_url: Option<String>,
    error: Option<String>,
}

impl HttpSandboxProvider {
    /// Build a provider client from environment variables.
    ///
    /// - `SANDBOX_API_URL`: base URL of the provisioning API (required)
    /// - `SANDBOX_API_KEY`: bearer token, if the API requires one
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is missing or the HTTP client
    /// fails to build.
    pub fn from_env() -> Result<Self, ProviderError> {
        let base_url = std::env::var("SANDBOX_API_URL")
            .map_err(|_| ProviderError::Config("SANDBOX_API_URL not set".into()))?;
        let api_key = std::env::var("SANDBOX_API_KEY").ok();
        Self::new(&base_url, api_key)
    }

    /// Build a provider client against an explicit base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned(), api_key })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }
}

/// Convert a non-success response into a typed API error.
async fn api_error(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    ProviderError::Api { status, message }
}

#[async_trait::async_trait]
impl SandboxProvider for HttpSandboxProvider {
    async fn create(&self, title: &str) -> Result<ProvisionedSandbox, ProviderError> {
        let response = self
            .request(reqwest::Method::POST, "/sandboxes")
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: CreateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(ProvisionedSandbox { sandbox_id: body.sandbox_id, preview_url: body.preview_url })
    }

    async fn status(&self, sandbox_id: &str) -> Result<SandboxProbe, ProviderError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/sandboxes/{sandbox_id}"))
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(SandboxProbe { status: body.status, preview_url: body.preview_url, error: body.error })
    }

    async fn stop(&self, sandbox_id: &str) -> Result<SandboxProbe, ProviderError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/sandboxes/{sandbox_id}/stop"))
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(SandboxProbe { status: body.status, preview_url: body.preview_url, error: body.error })
    }
}
