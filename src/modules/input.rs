//! Input media resolution: local paths are used in place, URLs are fetched
//! into temporary files that disappear when the handle is dropped.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use tempfile::NamedTempFile;
use tokio_util::io::ReaderStream;

use crate::client::download_bytes;
use crate::utils::{extension_from_url, is_http_url, mime_for_extension};

/// A file ready to be attached to a provider request.
pub enum InputFile {
    Local(PathBuf),
    Downloaded(NamedTempFile),
}

impl InputFile {
    /// Resolve a path-or-URL argument.
    pub async fn resolve(http_client: &reqwest::Client, value: &str) -> Result<Self> {
        let value = value.trim();
        if is_http_url(value) {
            let bytes = download_bytes(http_client, value).await?;
            let suffix = extension_from_url(value)
                .map(|ext| format!(".{ext}"))
                .unwrap_or_default();
            let mut temp = tempfile::Builder::new()
                .prefix("mediagen-input-")
                .suffix(&suffix)
                .tempfile()
                .context("Failed to create temporary input file")?;
            std::io::Write::write_all(&mut temp, &bytes)
                .context("Failed to write temporary input file")?;
            return Ok(Self::Downloaded(temp));
        }

        let path = PathBuf::from(shellexpand_path(value));
        if !path.is_file() {
            anyhow::bail!("Input file not found: {}", path.display());
        }
        Ok(Self::Local(path))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Local(path) => path,
            Self::Downloaded(temp) => temp.path(),
        }
    }

    fn extension(&self) -> Option<String> {
        self.path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
    }

    fn file_name(&self) -> String {
        let fallback = match self.extension() {
            Some(ext) => format!("input.{ext}"),
            None => "input.bin".to_string(),
        };
        match self {
            Self::Local(path) => path
                .file_name()
                .and_then(|name| name.to_str())
                .map_or(fallback, std::string::ToString::to_string),
            Self::Downloaded(_) => fallback,
        }
    }

    /// Stream the file into a multipart part.
    pub async fn to_part(&self) -> Result<reqwest::multipart::Part> {
        let file = tokio::fs::File::open(self.path())
            .await
            .with_context(|| format!("Failed to open {}", self.path().display()))?;
        let total = file.metadata().await?.len();
        let mime = self
            .extension()
            .map_or("application/octet-stream", |ext| mime_for_extension(&ext));
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = reqwest::multipart::Part::stream_with_length(body, total)
            .file_name(self.file_name())
            .mime_str(mime)?;
        Ok(part)
    }
}

fn shellexpand_path(value: &str) -> String {
    shellexpand::tilde(value).to_string()
}

/// Pass URLs through; inline local images as a base64 data URL.
pub fn media_reference(value: &str) -> Result<String> {
    let value = value.trim();
    if is_http_url(value) || value.starts_with("data:") {
        return Ok(value.to_string());
    }
    let path = PathBuf::from(shellexpand_path(value));
    let bytes = std::fs::read(&path)
        .with_context(|| format!("Failed to read media file: {}", path.display()))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    let mime = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or("application/octet-stream", mime_for_extension);
    Ok(format!("data:{mime};base64,{encoded}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn downloaded_inputs_are_removed_on_drop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/src.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNG".to_vec()))
            .mount(&server)
            .await;

        let url = format!("{}/src.png", server.uri());
        let input = InputFile::resolve(&reqwest::Client::new(), &url)
            .await
            .expect("resolve");
        let temp_path = input.path().to_path_buf();
        assert!(temp_path.exists());
        assert_eq!(temp_path.extension().and_then(|e| e.to_str()), Some("png"));
        drop(input);
        assert!(!temp_path.exists());
    }

    #[tokio::test]
    async fn missing_local_input_is_an_error() {
        let err = InputFile::resolve(&reqwest::Client::new(), "/definitely/not/here.png")
            .await
            .err()
            .expect("should fail");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn local_media_becomes_data_url() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("frame.jpg");
        std::fs::write(&file, b"JPEG").expect("write");
        let reference = media_reference(file.to_str().unwrap()).expect("reference");
        assert!(reference.starts_with("data:image/jpeg;base64,"));
        assert_eq!(
            media_reference("https://example.com/a.png").unwrap(),
            "https://example.com/a.png"
        );
    }
}
