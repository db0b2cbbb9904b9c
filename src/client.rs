//! HTTP client for the generation providers.
//!
//! Centralizes base URLs, bearer auth, status checking and artifact
//! downloads. Provider calls are never retried.

use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::Config;
use crate::logging;
use crate::utils::{truncate_with_ellipsis, write_bytes};

const ERROR_BODY_LIMIT: usize = 500;

/// Build the shared `reqwest` client with the configured request timeout.
pub fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .user_agent(concat!("mediagen-mcp/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

/// Client for one provider API (base URL plus API key).
#[derive(Clone)]
#[must_use]
pub struct MediaClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

// === MediaClient ===

impl MediaClient {
    /// Create a client for the image/audio provider.
    pub fn new(config: &Config, http_client: reqwest::Client) -> Result<Self> {
        let base_url = config.provider_base_url();
        let api_key = config.provider_api_key()?;
        logging::info(format!("Provider base URL: {base_url}"));
        Ok(Self::with_credentials(http_client, base_url, api_key))
    }

    /// Create a client for the video provider.
    pub fn for_video(config: &Config, http_client: reqwest::Client) -> Result<Self> {
        let base_url = config.video_base_url();
        let api_key = config.video_api_key()?;
        logging::info(format!("Video provider base URL: {base_url}"));
        Ok(Self::with_credentials(http_client, base_url, api_key))
    }

    pub fn with_credentials(
        http_client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// The underlying client, without provider credentials attached.
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http_client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a JSON body and decode a JSON response.
    pub async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let response = self.post_json_raw(path, body).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode response from {path}"))
    }

    /// POST a JSON body and return the raw (successful) response.
    pub async fn post_json_raw(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let url = self.url(path);
        logging::debug(format!("POST {url}"));
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send API request to {path}"))?;
        ensure_success(response).await
    }

    /// POST a multipart form and decode a JSON response.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T> {
        let url = self.url(path);
        logging::debug(format!("POST (multipart) {url}"));
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("Failed to send API request to {path}"))?;
        let response = ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode response from {path}"))
    }
}

// === Response Helpers ===

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|e| format!("(failed to read body: {e})"));
    anyhow::bail!(
        "Failed to send API request: HTTP {status}: {}",
        truncate_with_ellipsis(text.trim(), ERROR_BODY_LIMIT, "...")
    );
}

/// Whether a response body is JSON rather than media bytes.
#[must_use]
pub fn is_json_response(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("json"))
}

/// Download a URL, checking the body length against `Content-Length`.
pub async fn download_bytes(http_client: &reqwest::Client, url: &str) -> Result<Bytes> {
    let response = http_client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {url}"))?;
    if !response.status().is_success() {
        anyhow::bail!("Failed to download {url}: HTTP {}", response.status());
    }
    let expected = response.content_length();
    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read download body from {url}"))?;
    if let Some(expected) = expected
        && expected != bytes.len() as u64
    {
        anyhow::bail!(
            "Failed to download {url}: received {} of {expected} bytes",
            bytes.len()
        );
    }
    Ok(bytes)
}

/// Download a URL straight to a file and return the number of bytes written.
pub async fn download_to_file(
    http_client: &reqwest::Client,
    url: &str,
    path: &Path,
) -> Result<u64> {
    let bytes = download_bytes(http_client, url).await?;
    write_bytes(path, &bytes)?;
    Ok(bytes.len() as u64)
}
