//! Image generation and editing, plus per-item artifact handling.
//!
//! Both the synchronous tool path and the background job funnel provider
//! responses through [`save_batch`], which isolates failures per item.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

use crate::client::{MediaClient, download_bytes};
use crate::modules::input::InputFile;
use crate::modules::storage::RemoteStore;
use crate::notify::{Notifier, escape_markdown};
use crate::utils::{extension_from_url, pretty_json, truncate_with_ellipsis, write_bytes};

const DEFAULT_IMAGE_EXTENSION: &str = "png";
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpeg", "jpg", "webp", "gif"];

// === Types ===

/// Options for image generation requests.
#[derive(Debug, Clone)]
pub struct ImageGenerateOptions {
    pub model: String,
    pub prompt: String,
    pub size: Option<String>,
    pub n: Option<u32>,
    pub quality: Option<String>,
    pub style: Option<String>,
    pub response_format: Option<String>,
    pub background: Option<String>,
}

/// Options for image edit requests. `image` and `mask` are paths or URLs.
#[derive(Debug, Clone)]
pub struct ImageEditOptions {
    pub model: String,
    pub prompt: String,
    pub image: String,
    pub mask: Option<String>,
    pub size: Option<String>,
    pub n: Option<u32>,
}

/// One provider request, generation or edit.
#[derive(Debug, Clone)]
pub enum ImageRequest {
    Generate(ImageGenerateOptions),
    Edit(ImageEditOptions),
}

impl ImageRequest {
    #[must_use]
    pub fn model(&self) -> &str {
        match self {
            Self::Generate(options) => &options.model,
            Self::Edit(options) => &options.model,
        }
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        match self {
            Self::Generate(options) => &options.prompt,
            Self::Edit(options) => &options.prompt,
        }
    }

    /// Filename prefix for saved artifacts.
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Generate(_) => "image",
            Self::Edit(_) => "edit",
        }
    }

    /// Send the request and return the raw provider response.
    pub async fn send(&self, client: &MediaClient) -> Result<Value> {
        match self {
            Self::Generate(options) => request_generation(client, options).await,
            Self::Edit(options) => request_edit(client, options).await,
        }
    }
}

/// A single image in a provider response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    Url(String),
    Base64(String),
}

/// One entry of the response `data` array; `payload` is `None` when the
/// entry carries neither a URL nor base64 data.
#[derive(Debug, Clone)]
pub struct ImageItem {
    pub payload: Option<ImagePayload>,
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedImage {
    pub index: usize,
    pub path: String,
    pub bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageFailure {
    pub index: usize,
    pub error: String,
}

/// Outcome of processing one provider response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImageBatch {
    pub images: Vec<SavedImage>,
    pub failures: Vec<ImageFailure>,
}

// === Request Helpers ===

fn is_gpt_image_model(model: &str) -> bool {
    model.to_ascii_lowercase().starts_with("gpt-image")
}

fn is_dalle3_model(model: &str) -> bool {
    model.eq_ignore_ascii_case("dall-e-3")
}

/// Build the generation body, forwarding optional fields per model family.
#[must_use]
pub fn build_generation_request(options: &ImageGenerateOptions) -> Value {
    let mut body = json!({
        "model": options.model,
        "prompt": options.prompt,
    });

    if let Some(size) = &options.size {
        body["size"] = json!(size);
    }
    if let Some(n) = options.n {
        body["n"] = json!(n);
    }
    if let Some(quality) = &options.quality {
        body["quality"] = json!(quality);
    }
    if let Some(style) = &options.style
        && is_dalle3_model(&options.model)
    {
        body["style"] = json!(style);
    }
    // gpt-image models always answer with b64_json and reject the field.
    if let Some(response_format) = &options.response_format
        && !is_gpt_image_model(&options.model)
    {
        body["response_format"] = json!(response_format);
    }
    if let Some(background) = &options.background
        && is_gpt_image_model(&options.model)
    {
        body["background"] = json!(background);
    }

    body
}

pub async fn request_generation(
    client: &MediaClient,
    options: &ImageGenerateOptions,
) -> Result<Value> {
    client
        .post_json("/v1/images/generations", &build_generation_request(options))
        .await
}

/// Send an edit request. URL inputs are fetched into temporaries that are
/// removed when this function returns.
pub async fn request_edit(client: &MediaClient, options: &ImageEditOptions) -> Result<Value> {
    let image = InputFile::resolve(client.http(), &options.image)
        .await
        .context("Failed to prepare source image")?;
    let mask = match &options.mask {
        Some(mask) => Some(
            InputFile::resolve(client.http(), mask)
                .await
                .context("Failed to prepare mask image")?,
        ),
        None => None,
    };

    let mut form = reqwest::multipart::Form::new()
        .text("model", options.model.clone())
        .text("prompt", options.prompt.clone())
        .part("image", image.to_part().await?);
    if let Some(mask) = &mask {
        form = form.part("mask", mask.to_part().await?);
    }
    if let Some(size) = &options.size {
        form = form.text("size", size.clone());
    }
    if let Some(n) = options.n {
        form = form.text("n", n.to_string());
    }

    client.post_multipart("/v1/images/edits", form).await
}

// === Response Parsing ===

/// Extract the `data` array. A response without one is an error.
pub fn extract_items(response: &Value) -> Result<Vec<ImageItem>> {
    let Some(data) = response.get("data").and_then(Value::as_array) else {
        anyhow::bail!(
            "Image response contained no data array. Response: {}",
            pretty_json(response)
        );
    };

    Ok(data
        .iter()
        .map(|entry| {
            let payload = entry
                .get("b64_json")
                .and_then(Value::as_str)
                .filter(|b64| !b64.is_empty())
                .map(|b64| ImagePayload::Base64(b64.to_string()))
                .or_else(|| {
                    entry
                        .get("url")
                        .and_then(Value::as_str)
                        .filter(|url| !url.is_empty())
                        .map(|url| ImagePayload::Url(url.to_string()))
                });
            let revised_prompt = entry
                .get("revised_prompt")
                .and_then(Value::as_str)
                .map(std::string::ToString::to_string);
            ImageItem {
                payload,
                revised_prompt,
            }
        })
        .collect())
}

/// File extension for base64 payloads, from the response's `output_format`.
/// Anything but a known image format falls back to the default.
fn response_extension(response: &Value) -> String {
    response
        .get("output_format")
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .filter(|format| IMAGE_EXTENSIONS.contains(&format.as_str()))
        .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string())
}

// === Artifact Handling ===

/// Where and how a batch is persisted.
pub struct BatchTarget<'a> {
    pub http_client: &'a reqwest::Client,
    pub dir: &'a Path,
    pub prefix: &'a str,
    pub batch_id: &'a str,
    pub store: Option<&'a RemoteStore>,
}

async fn persist_item(
    target: &BatchTarget<'_>,
    index: usize,
    payload: Option<&ImagePayload>,
    b64_extension: &str,
) -> Result<(PathBuf, u64)> {
    let (bytes, extension) = match payload {
        Some(ImagePayload::Base64(b64)) => {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(b64.trim())
                .context("Failed to decode base64 image data")?;
            (decoded, b64_extension.to_string())
        }
        Some(ImagePayload::Url(url)) => {
            let downloaded = download_bytes(target.http_client, url).await?;
            let extension =
                extension_from_url(url).unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string());
            (downloaded.to_vec(), extension)
        }
        None => anyhow::bail!("Image entry has neither url nor b64_json"),
    };

    let filename = format!(
        "{}_{}_{index}.{extension}",
        target.prefix, target.batch_id
    );
    let path = target.dir.join(filename);
    write_bytes(&path, &bytes)?;
    Ok((path, bytes.len() as u64))
}

/// Persist every item. Failures are collected (and notified, when a
/// notifier is given) without stopping the remaining items.
pub async fn save_batch(
    target: &BatchTarget<'_>,
    response: &Value,
    notifier: Option<&Notifier>,
) -> Result<ImageBatch> {
    let items = extract_items(response)?;
    let b64_extension = response_extension(response);
    let total = items.len();
    let mut batch = ImageBatch::default();

    for (index, item) in items.into_iter().enumerate() {
        match persist_item(target, index, item.payload.as_ref(), &b64_extension).await {
            Ok((path, bytes)) => {
                let remote_url = match target.store {
                    Some(store) => match store.upload(&path).await {
                        Ok(url) => Some(url),
                        Err(e) => {
                            tracing::warn!(
                                path = %path.display(),
                                error = %format!("{e:#}"),
                                "image upload failed"
                            );
                            None
                        }
                    },
                    None => None,
                };
                if let Some(notifier) = notifier {
                    notifier
                        .notify(&item_ready_message(
                            target,
                            index,
                            total,
                            &path,
                            remote_url.as_deref(),
                        ))
                        .await;
                }
                batch.images.push(SavedImage {
                    index,
                    path: path.display().to_string(),
                    bytes,
                    remote_url,
                    revised_prompt: item.revised_prompt,
                });
            }
            Err(e) => {
                let error = format!("{e:#}");
                tracing::warn!(batch = target.batch_id, index, error = %error, "image item failed");
                if let Some(notifier) = notifier {
                    notifier
                        .notify(&format!(
                            "*Image {}/{total} failed*\nJob: {}\nReason: {}",
                            index + 1,
                            escape_markdown(target.batch_id),
                            escape_markdown(&error)
                        ))
                        .await;
                }
                batch.failures.push(ImageFailure { index, error });
            }
        }
    }

    Ok(batch)
}

fn item_ready_message(
    target: &BatchTarget<'_>,
    index: usize,
    total: usize,
    path: &Path,
    remote_url: Option<&str>,
) -> String {
    let location = match remote_url {
        Some(url) => format!("Remote URL: {}", escape_markdown(url)),
        None => "Stored locally only".to_string(),
    };
    format!(
        "*Image {}/{total} ready*\nJob: {}\nPath: {}\n{location}",
        index + 1,
        escape_markdown(target.batch_id),
        escape_markdown(&path.display().to_string())
    )
}

// === Synchronous Path ===

/// Send the request and save its images, returning both successes and
/// per-item failures.
pub async fn run_sync(
    client: &MediaClient,
    request: &ImageRequest,
    image_dir: &Path,
    store: Option<&RemoteStore>,
) -> Result<ImageBatch> {
    let response = request.send(client).await?;
    let batch_id = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();
    let target = BatchTarget {
        http_client: client.http(),
        dir: image_dir,
        prefix: request.prefix(),
        batch_id: &batch_id,
        store,
    };
    save_batch(&target, &response, None).await
}

// === Background Job ===

/// A detached image request whose results are delivered as notifications.
pub struct ImageJob {
    pub id: String,
    pub request: ImageRequest,
    pub client: MediaClient,
    pub notifier: Arc<Notifier>,
    pub store: Option<RemoteStore>,
    pub image_dir: PathBuf,
}

impl ImageJob {
    #[must_use]
    pub fn new(
        request: ImageRequest,
        client: MediaClient,
        notifier: Arc<Notifier>,
        store: Option<RemoteStore>,
        image_dir: PathBuf,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request,
            client,
            notifier,
            store,
            image_dir,
        }
    }

    /// Run to completion. A provider error or a malformed response yields a
    /// single failure notification and `None`.
    pub async fn run(self) -> Option<ImageBatch> {
        let processed = async {
            let response = self.request.send(&self.client).await?;
            let target = BatchTarget {
                http_client: self.client.http(),
                dir: &self.image_dir,
                prefix: self.request.prefix(),
                batch_id: &self.id,
                store: self.store.as_ref(),
            };
            save_batch(&target, &response, Some(&self.notifier)).await
        }
        .await;

        match processed {
            Ok(batch) => Some(batch),
            Err(e) => {
                let reason = format!("{e:#}");
                let prompt = truncate_with_ellipsis(self.request.prompt(), 200, "...");
                self.notifier
                    .notify(&format!(
                        "*Image job failed*\nJob: {}\nModel: {}\nPrompt: {}\nReason: {}",
                        escape_markdown(&self.id),
                        escape_markdown(self.request.model()),
                        escape_markdown(&prompt),
                        escape_markdown(&truncate_with_ellipsis(&reason, 500, "..."))
                    ))
                    .await;
                tracing::warn!(job = %self.id, error = %reason, "image job failed");
                None
            }
        }
    }
}

/// Start a detached image job. The request handler does not await it.
pub fn spawn_image_job(job: ImageJob) -> JoinHandle<Option<ImageBatch>> {
    tokio::spawn(async move {
        let id = job.id.clone();
        let batch = job.run().await;
        if let Some(batch) = &batch {
            tracing::info!(
                job = %id,
                saved = batch.images.len(),
                failed = batch.failures.len(),
                "image job completed"
            );
        }
        batch
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::recording_notifier;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generate_options(model: &str) -> ImageGenerateOptions {
        ImageGenerateOptions {
            model: model.to_string(),
            prompt: "a lighthouse at dusk".to_string(),
            size: Some("1024x1024".to_string()),
            n: Some(2),
            quality: None,
            style: Some("vivid".to_string()),
            response_format: Some("url".to_string()),
            background: Some("transparent".to_string()),
        }
    }

    #[test]
    fn request_fields_follow_model_family() {
        let dalle = build_generation_request(&generate_options("dall-e-3"));
        assert_eq!(
            dalle,
            json!({
                "model": "dall-e-3",
                "prompt": "a lighthouse at dusk",
                "size": "1024x1024",
                "n": 2,
                "style": "vivid",
                "response_format": "url"
            })
        );

        let gpt = build_generation_request(&generate_options("gpt-image-1"));
        assert!(gpt.get("response_format").is_none());
        assert!(gpt.get("style").is_none());
        assert_eq!(gpt["background"], "transparent");
    }

    #[test]
    fn missing_data_array_is_an_error() {
        assert!(extract_items(&json!({ "error": "nope" })).is_err());
        let items = extract_items(&json!({ "data": [{ "url": "https://x/a.png" }, {}] }))
            .expect("items");
        assert_eq!(
            items[0].payload,
            Some(ImagePayload::Url("https://x/a.png".to_string()))
        );
        assert_eq!(items[1].payload, None);
    }

    #[test]
    fn unknown_output_format_falls_back_to_png() {
        assert_eq!(response_extension(&json!({ "output_format": "WEBP" })), "webp");
        assert_eq!(
            response_extension(&json!({ "output_format": "png/../../x" })),
            "png"
        );
        assert_eq!(response_extension(&json!({})), "png");
    }

    #[test]
    fn ready_message_escapes_markdown_values() {
        let http_client = reqwest::Client::new();
        let dir = PathBuf::from("./outputs/images");
        let target = BatchTarget {
            http_client: &http_client,
            dir: &dir,
            prefix: "image",
            batch_id: "20250101_120000_001",
            store: None,
        };
        let path = dir.join("image_20250101_120000_001_0.png");
        let message = item_ready_message(&target, 0, 2, &path, Some("https://img.example/a_b.png"));
        assert_eq!(
            message,
            concat!(
                "*Image 1/2 ready*\n",
                r"Job: 20250101\_120000\_001",
                "\n",
                r"Path: ./outputs/images/image\_20250101\_120000\_001\_0.png",
                "\n",
                r"Remote URL: https://img.example/a\_b.png"
            )
        );
    }

    #[tokio::test]
    async fn one_bad_item_does_not_sink_the_batch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let raw = b"\x89PNG fake image bytes".to_vec();
        let b64 = base64::engine::general_purpose::STANDARD.encode(&raw);
        let response = json!({
            "data": [
                { "b64_json": b64, "revised_prompt": "lighthouse" },
                { "url": format!("{}/gone.png", server.uri()) }
            ]
        });

        let dir = tempfile::tempdir().expect("tempdir");
        let http = reqwest::Client::new();
        let target = BatchTarget {
            http_client: &http,
            dir: dir.path(),
            prefix: "image",
            batch_id: "b1",
            store: None,
        };
        let batch = save_batch(&target, &response, None).await.expect("batch");

        assert_eq!(batch.images.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].index, 1);
        let saved = &batch.images[0];
        assert_eq!(saved.bytes, raw.len() as u64);
        assert_eq!(saved.revised_prompt.as_deref(), Some("lighthouse"));
        let expected = dir.path().join("image_b1_0.png");
        assert_eq!(saved.path, expected.display().to_string());
        assert_eq!(std::fs::read(expected).expect("read"), raw);
    }

    #[tokio::test]
    async fn sync_generation_saves_downloaded_urls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .and(body_partial_json(json!({ "model": "dall-e-3" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "url": format!("{}/files/out.webp", server.uri()) }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/out.webp"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 300]))
            .mount(&server)
            .await;

        let client = MediaClient::with_credentials(reqwest::Client::new(), server.uri(), "sk");
        let dir = tempfile::tempdir().expect("tempdir");
        let request = ImageRequest::Generate(generate_options("dall-e-3"));
        let batch = run_sync(&client, &request, dir.path(), None)
            .await
            .expect("run");

        assert!(batch.failures.is_empty());
        assert_eq!(batch.images.len(), 1);
        assert_eq!(batch.images[0].bytes, 300);
        assert!(batch.images[0].path.ends_with("_0.webp"));
    }

    #[tokio::test]
    async fn edit_sends_multipart_with_local_image() {
        let server = MockServer::start().await;
        let b64 = base64::engine::general_purpose::STANDARD.encode(b"edited");
        Mock::given(method("POST"))
            .and(path("/v1/images/edits"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "b64_json": b64 }] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("source.png");
        std::fs::write(&source, b"PNG").expect("write");

        let client = MediaClient::with_credentials(reqwest::Client::new(), server.uri(), "sk");
        let request = ImageRequest::Edit(ImageEditOptions {
            model: "gpt-image-1".to_string(),
            prompt: "add a hat".to_string(),
            image: source.display().to_string(),
            mask: None,
            size: None,
            n: None,
        });
        let out_dir = dir.path().join("out");
        let batch = run_sync(&client, &request, &out_dir, None).await.expect("edit");
        assert_eq!(batch.images.len(), 1);
        assert!(batch.images[0].path.contains("edit_"));

        let requests = server.received_requests().await.expect("requests");
        let content_type = requests[0]
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.starts_with("multipart/form-data"));
    }

    #[tokio::test]
    async fn background_job_without_data_notifies_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "created": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let (notifier, channel) = recording_notifier();
        let dir = tempfile::tempdir().expect("tempdir");
        let client = MediaClient::with_credentials(reqwest::Client::new(), server.uri(), "sk");
        let job = ImageJob::new(
            ImageRequest::Generate(generate_options("gpt-image-1")),
            client,
            notifier,
            None,
            dir.path().to_path_buf(),
        );
        let job_id = job.id.clone();

        let outcome = spawn_image_job(job).await.expect("join");
        assert!(outcome.is_none());
        let messages = channel.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Image job failed"));
        assert!(messages[0].contains(&job_id));
    }

    #[tokio::test]
    async fn background_job_notifies_each_item() {
        let server = MockServer::start().await;
        let b64 = base64::engine::general_purpose::STANDARD.encode(b"img");
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output_format": "webp",
                "data": [{ "b64_json": b64 }, { "revised_prompt": "empty" }]
            })))
            .mount(&server)
            .await;

        let (notifier, channel) = recording_notifier();
        let dir = tempfile::tempdir().expect("tempdir");
        let client = MediaClient::with_credentials(reqwest::Client::new(), server.uri(), "sk");
        let job = ImageJob::new(
            ImageRequest::Generate(generate_options("gpt-image-1")),
            client,
            notifier,
            None,
            dir.path().to_path_buf(),
        );
        let job_id = job.id.clone();

        let batch = spawn_image_job(job).await.expect("join").expect("batch");
        assert_eq!(batch.images.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert!(dir.path().join(format!("image_{job_id}_0.webp")).exists());

        let messages = channel.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("Stored locally only"));
        assert!(messages[1].contains("failed"));
    }
}
