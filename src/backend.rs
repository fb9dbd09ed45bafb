//! Shared HTTP plumbing for the remote service clients.
//!
//! All three backends (chat, files, cluster execution) live behind one base
//! URL, canonically `http://localhost:8000/api/v1`. [`Backend`] owns the
//! single `reqwest` client — built with the configured request timeout so a
//! stalled service cannot wedge the console forever — and the URL joining
//! every client goes through.
//!
//! No client retries. A transport failure or non-2xx response surfaces as an
//! error for the calling controller to convert into a user-facing notice.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::config::BackendConfig;

/// Handle to the remote backend: base URL plus the shared HTTP client.
#[derive(Clone)]
pub struct Backend {
    http: reqwest::Client,
    base_url: String,
}

impl Backend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Join a path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `GET /health` — used by the status view to report reachability.
    pub async fn health(&self) -> Result<Health> {
        let response = self.http.get(self.url("health")).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
}

/// Turn a non-2xx response into an error carrying status and body text.
pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("Backend error {}: {}", status, body)
}
