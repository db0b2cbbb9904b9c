//! Video generation: task submission and the background poll loop.
//!
//! A submitted task is tracked by a detached tokio task that checks status
//! on a fixed interval until the provider reports a terminal state or the
//! wall-clock ceiling is reached. Exactly one terminal notification is sent.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

use crate::client::{MediaClient, download_to_file};
use crate::config::PollPolicy;
use crate::modules::input::media_reference;
use crate::modules::storage::RemoteStore;
use crate::notify::{Notifier, escape_markdown};
use crate::utils::{extension_from_url, sanitize_filename_part, truncate_with_ellipsis};

const PROMPT_PREVIEW_CHARS: usize = 200;

// === Types ===

/// Options for a video submission.
#[derive(Debug, Clone)]
pub struct VideoGenerateOptions {
    pub model: String,
    pub prompt: String,
    pub image_size: String,
    pub negative_prompt: Option<String>,
    pub seed: Option<i64>,
    pub image: Option<String>,
}

/// In-memory record of a submitted task, owned by its poll loop.
#[derive(Debug, Clone)]
pub struct VideoTask {
    pub request_id: String,
    pub prompt: String,
    pub model: String,
    pub started_at: Instant,
}

/// Provider-reported task status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoStatus {
    Succeed,
    InQueue,
    InProgress,
    Failed,
    Unrecognized(String),
}

impl VideoStatus {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "Succeed" => Self::Succeed,
            "InQueue" => Self::InQueue,
            "InProgress" => Self::InProgress,
            "Failed" => Self::Failed,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

/// Result of a single status check.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStatusResult {
    pub status: VideoStatus,
    pub reason: Option<String>,
    pub video_url: Option<String>,
    pub inference_secs: Option<f64>,
    pub seed: Option<i64>,
}

impl VideoStatusResult {
    /// Parse the provider's status payload.
    #[must_use]
    pub fn from_response(response: &Value) -> Self {
        let status = response
            .get("status")
            .and_then(Value::as_str)
            .map_or_else(|| VideoStatus::Unrecognized(String::new()), VideoStatus::parse);
        let reason = response
            .get("reason")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(std::string::ToString::to_string);
        let results = response.get("results");
        let video_url = results
            .and_then(|r| r.get("videos"))
            .and_then(Value::as_array)
            .and_then(|videos| videos.first())
            .and_then(|video| video.get("url"))
            .and_then(Value::as_str)
            .filter(|url| !url.trim().is_empty())
            .map(std::string::ToString::to_string);
        let inference_secs = results
            .and_then(|r| r.get("timings"))
            .and_then(|t| t.get("inference"))
            .and_then(Value::as_f64);
        let seed = results.and_then(|r| r.get("seed")).and_then(Value::as_i64);

        Self {
            status,
            reason,
            video_url,
            inference_secs,
            seed,
        }
    }

    /// A synthetic failure, used when the status check itself errored.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: VideoStatus::Failed,
            reason: Some(reason.into()),
            video_url: None,
            inference_secs: None,
            seed: None,
        }
    }
}

/// Terminal state of a poll loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Succeeded {
        path: PathBuf,
        remote_url: Option<String>,
    },
    Failed {
        reason: String,
    },
    TimedOut,
}

/// Source of status checks for submitted tasks.
#[async_trait]
pub trait VideoStatusSource: Send + Sync {
    async fn check_status(&self, request_id: &str) -> Result<VideoStatusResult>;
}

#[async_trait]
impl VideoStatusSource for MediaClient {
    async fn check_status(&self, request_id: &str) -> Result<VideoStatusResult> {
        let response: Value = self
            .post_json("/v1/video/status", &json!({ "requestId": request_id }))
            .await?;
        Ok(VideoStatusResult::from_response(&response))
    }
}

// === API Calls ===

fn build_submit_request(options: &VideoGenerateOptions) -> Result<Value> {
    let mut body = json!({
        "model": options.model,
        "prompt": options.prompt,
        "image_size": options.image_size,
    });
    if let Some(negative_prompt) = &options.negative_prompt {
        body["negative_prompt"] = json!(negative_prompt);
    }
    if let Some(seed) = options.seed {
        body["seed"] = json!(seed);
    }
    if let Some(image) = &options.image {
        body["image"] = json!(media_reference(image)?);
    }
    Ok(body)
}

/// Submit a generation request and return the provider's request id.
pub async fn submit(client: &MediaClient, options: &VideoGenerateOptions) -> Result<String> {
    let body = build_submit_request(options)?;
    let response: Value = client.post_json("/v1/video/submit", &body).await?;
    extract_request_id(&response).with_context(|| {
        format!("Video submission returned no requestId. Response: {response}")
    })
}

fn extract_request_id(response: &Value) -> Option<String> {
    response
        .get("requestId")
        .or_else(|| response.get("request_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .map(std::string::ToString::to_string)
}

// === Poll Loop ===

/// Everything a poll loop needs besides its task record.
pub struct VideoPoller<S> {
    pub source: S,
    pub http_client: reqwest::Client,
    pub notifier: Arc<Notifier>,
    pub store: Option<RemoteStore>,
    pub video_dir: PathBuf,
    pub policy: PollPolicy,
}

impl<S: VideoStatusSource> VideoPoller<S> {
    /// Poll until a terminal state; sends exactly one terminal notification.
    pub async fn run(&self, task: VideoTask) -> PollOutcome {
        loop {
            if task.started_at.elapsed() > self.policy.timeout {
                self.notifier.notify(&timeout_message(&task, self.policy)).await;
                return PollOutcome::TimedOut;
            }

            let result = match self.source.check_status(&task.request_id).await {
                Ok(result) => result,
                Err(e) => VideoStatusResult::failed(format!("status check failed: {e:#}")),
            };

            match result.status {
                VideoStatus::Succeed => return self.finish_success(&task, result).await,
                VideoStatus::Failed => {
                    let reason = result
                        .reason
                        .unwrap_or_else(|| "unknown error".to_string());
                    self.notifier.notify(&failure_message(&task, &reason)).await;
                    return PollOutcome::Failed { reason };
                }
                VideoStatus::InQueue | VideoStatus::InProgress => {
                    tracing::debug!(
                        request_id = %task.request_id,
                        status = ?result.status,
                        "video task still running"
                    );
                    sleep(self.policy.interval).await;
                }
                VideoStatus::Unrecognized(raw) => {
                    let reason = format!("unrecognized task status '{raw}'");
                    self.notifier.notify(&failure_message(&task, &reason)).await;
                    return PollOutcome::Failed { reason };
                }
            }
        }
    }

    async fn finish_success(&self, task: &VideoTask, result: VideoStatusResult) -> PollOutcome {
        let Some(video_url) = result.video_url.clone() else {
            let reason = "task succeeded but no video URL was returned".to_string();
            self.notifier.notify(&failure_message(task, &reason)).await;
            return PollOutcome::Failed { reason };
        };

        let extension = extension_from_url(&video_url).unwrap_or_else(|| "mp4".to_string());
        let filename = format!(
            "video_{}.{extension}",
            sanitize_filename_part(&task.request_id)
        );
        let path = self.video_dir.join(&filename);

        if let Err(e) = download_to_file(&self.http_client, &video_url, &path).await {
            let reason = format!("failed to save video: {e:#}");
            self.notifier.notify(&failure_message(task, &reason)).await;
            return PollOutcome::Failed { reason };
        }
        tracing::info!(request_id = %task.request_id, path = %path.display(), "video saved");

        let remote_url = match &self.store {
            Some(store) => match store.upload(&path).await {
                Ok(url) => {
                    self.notifier
                        .notify(&format!(
                            "Video uploaded to remote store: {}",
                            escape_markdown(&url)
                        ))
                        .await;
                    Some(url)
                }
                Err(e) => {
                    tracing::warn!(error = %format!("{e:#}"), "video upload failed");
                    self.notifier
                        .notify(&format!(
                            "Remote upload failed for {}; the local copy is kept.",
                            escape_markdown(&filename)
                        ))
                        .await;
                    None
                }
            },
            None => None,
        };

        let message = SuccessReport {
            filename: &filename,
            path: &path,
            task,
            source_url: &video_url,
            result: &result,
            remote_url: remote_url.as_deref(),
        }
        .render();
        self.notifier.notify(&message).await;

        PollOutcome::Succeeded { path, remote_url }
    }
}

/// Start a detached poll loop. The request handler does not await it.
pub fn spawn_poll_loop<S>(poller: VideoPoller<S>, task: VideoTask) -> JoinHandle<PollOutcome>
where
    S: VideoStatusSource + 'static,
{
    tokio::spawn(async move {
        let request_id = task.request_id.clone();
        let outcome = poller.run(task).await;
        match &outcome {
            PollOutcome::Succeeded { path, .. } => {
                tracing::info!(
                    request_id = %request_id,
                    path = %path.display(),
                    "video task completed"
                );
            }
            PollOutcome::Failed { reason } => {
                tracing::warn!(request_id = %request_id, reason = %reason, "video task failed");
            }
            PollOutcome::TimedOut => {
                tracing::warn!(request_id = %request_id, "video task timed out");
            }
        }
        outcome
    })
}

// === Messages ===

struct SuccessReport<'a> {
    filename: &'a str,
    path: &'a std::path::Path,
    task: &'a VideoTask,
    source_url: &'a str,
    result: &'a VideoStatusResult,
    remote_url: Option<&'a str>,
}

impl SuccessReport<'_> {
    fn render(&self) -> String {
        let mut lines = vec![
            "*Video generation complete*".to_string(),
            format!("File: {}", escape_markdown(self.filename)),
            format!(
                "Path: {}",
                escape_markdown(&self.path.display().to_string())
            ),
            format!("Model: {}", escape_markdown(&self.task.model)),
            format!("Prompt: {}", prompt_preview(self.task)),
            format!("Source URL: {}", escape_markdown(self.source_url)),
        ];
        if let Some(secs) = self.result.inference_secs {
            lines.push(format!("Inference time: {secs:.1}s"));
        }
        if let Some(seed) = self.result.seed {
            lines.push(format!("Seed: {seed}"));
        }
        lines.push(format!(
            "Completed at: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        if let Some(url) = self.remote_url {
            lines.push(format!("Remote URL: {}", escape_markdown(url)));
        }
        lines.join("\n")
    }
}

fn failure_message(task: &VideoTask, reason: &str) -> String {
    format!(
        "*Video generation failed*\nRequest: {}\nModel: {}\nPrompt: {}\nReason: {}",
        escape_markdown(&task.request_id),
        escape_markdown(&task.model),
        prompt_preview(task),
        escape_markdown(reason)
    )
}

fn timeout_message(task: &VideoTask, policy: PollPolicy) -> String {
    format!(
        "*Video generation timed out*\nRequest: {}\nModel: {}\nPrompt: {}\nNo result after {}; polling stopped.",
        escape_markdown(&task.request_id),
        escape_markdown(&task.model),
        prompt_preview(task),
        describe_duration(policy.timeout)
    )
}

fn prompt_preview(task: &VideoTask) -> String {
    escape_markdown(&truncate_with_ellipsis(
        &task.prompt,
        PROMPT_PREVIEW_CHARS,
        "...",
    ))
}

fn describe_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        format!("{} hours", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{} minutes", secs / 60)
    } else {
        format!("{secs} seconds")
    }
}
