//! Remote artifact store: mirrors local files to an image-bed style upload endpoint.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::config::{Config, StorageSettings};
use crate::utils::mime_for_extension;

#[derive(Debug, Deserialize)]
struct UploadEntry {
    src: String,
}

/// Uploads artifacts and derives their public URL.
#[derive(Clone)]
pub struct RemoteStore {
    http_client: reqwest::Client,
    settings: StorageSettings,
}

impl RemoteStore {
    #[must_use]
    pub fn new(http_client: reqwest::Client, settings: StorageSettings) -> Self {
        Self {
            http_client,
            settings,
        }
    }

    /// The store is enabled only when both upload URL and auth code are configured.
    #[must_use]
    pub fn from_config(config: &Config, http_client: &reqwest::Client) -> Option<Self> {
        config
            .storage_settings()
            .map(|settings| Self::new(http_client.clone(), settings))
    }

    /// Upload a local file and return its public URL.
    pub async fn upload(&self, path: &Path) -> Result<String> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let total = file.metadata().await?.len();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload.bin")
            .to_string();
        let mime = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or("application/octet-stream", mime_for_extension);

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = reqwest::multipart::Part::stream_with_length(body, total)
            .file_name(filename)
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut url = reqwest::Url::parse(&self.settings.upload_url).with_context(|| {
            format!("Invalid artifact store URL: {}", self.settings.upload_url)
        })?;
        url.query_pairs_mut()
            .append_pair("authCode", &self.settings.auth_code);

        let response = self
            .http_client
            .post(url)
            .multipart(form)
            .send()
            .await
            .context("Failed to reach artifact store")?;
        if !response.status().is_success() {
            anyhow::bail!("Artifact store rejected upload: HTTP {}", response.status());
        }
        let entries: Vec<UploadEntry> = response
            .json()
            .await
            .context("Failed to decode artifact store response")?;
        let entry = entries
            .first()
            .context("Artifact store response contained no entries")?;
        public_url(&self.settings.upload_url, &entry.src)
    }
}

/// Join the relative `src` returned by the store onto the upload endpoint's origin.
pub fn public_url(upload_url: &str, src: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(upload_url)
        .with_context(|| format!("Invalid artifact store URL: {upload_url}"))?;
    let origin = parsed.origin().ascii_serialization();
    if src.starts_with('/') {
        Ok(format!("{origin}{src}"))
    } else {
        Ok(format!("{origin}/{src}"))
    }
}
