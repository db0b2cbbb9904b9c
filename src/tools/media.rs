//! Media generation tools exposed over MCP.

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::time::Instant;

use crate::modules::audio::{self, SpeechOptions, TranscriptionOptions};
use crate::modules::image::{
    self, ImageEditOptions, ImageGenerateOptions, ImageJob, ImageRequest, spawn_image_job,
};
use crate::modules::video::{
    self, VideoGenerateOptions, VideoPoller, VideoTask, spawn_poll_loop,
};

use super::spec::{
    ToolCapability, ToolContext, ToolError, ToolResult, ToolSpec, optional_choice,
    optional_f64_in, optional_i64, optional_str, optional_u64_in, required_str,
};

const SPEECH_FORMATS: &[&str] = &["mp3", "opus", "aac", "flac", "wav", "pcm"];
const MAX_SPEECH_INPUT_CHARS: usize = 4096;

fn owned(value: Option<&str>) -> Option<String> {
    value.map(std::string::ToString::to_string)
}

fn json_result(value: &Value) -> Result<ToolResult, ToolError> {
    ToolResult::json(value).map_err(|e| ToolError::execution_failed(e.to_string()))
}

fn image_count(input: &Value) -> Result<Option<u32>, ToolError> {
    Ok(optional_u64_in(input, "n", 1, 10)?.and_then(|n| u32::try_from(n).ok()))
}

/// Run an image request synchronously, or hand it to a background job when
/// the model is configured for background processing.
async fn dispatch_image(
    request: ImageRequest,
    context: &ToolContext,
) -> Result<ToolResult, ToolError> {
    let model = request.model().to_string();
    let image_dir = context.config.image_dir();

    if context.config.is_background_image_model(&model) {
        if !context.notifier.is_enabled() {
            tracing::warn!(
                model = %model,
                "background image job started without a notification channel; results will only be logged"
            );
        }
        let job = ImageJob::new(
            request,
            context.client.clone(),
            context.notifier.clone(),
            context.store.clone(),
            image_dir,
        );
        let job_id = job.id.clone();
        spawn_image_job(job);
        tracing::info!(job = %job_id, model = %model, "image job accepted");
        return json_result(&json!({
            "status": "accepted",
            "job_id": job_id,
            "model": model,
            "message": "Image generation is running in the background; results will be delivered as notifications.",
        }));
    }

    let batch = image::run_sync(&context.client, &request, &image_dir, context.store.as_ref())
        .await
        .map_err(|e| ToolError::execution_failed(format!("Failed to generate image: {e:#}")))?;
    json_result(&json!({
        "status": "completed",
        "model": model,
        "images": batch.images,
        "failures": batch.failures,
    }))
}

// === Image Tools ===

pub struct GenerateImageTool;

#[async_trait]
impl ToolSpec for GenerateImageTool {
    fn name(&self) -> &'static str {
        "generate_image"
    }

    fn description(&self) -> &'static str {
        "Generate images from a text prompt. Returns saved file paths, or a job id when the model runs in the background."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "Text prompt describing the image to generate"
                },
                "model": {
                    "type": "string",
                    "description": "Image model name (e.g. dall-e-3, gpt-image-1)"
                },
                "size": {
                    "type": "string",
                    "description": "Image size such as 1024x1024, 1792x1024 or 1024x1536"
                },
                "n": {
                    "type": "integer",
                    "description": "Number of images to generate (1-10)",
                    "minimum": 1,
                    "maximum": 10
                },
                "quality": {
                    "type": "string",
                    "description": "Quality level (standard, hd, low, medium, high, auto)"
                },
                "style": {
                    "type": "string",
                    "description": "Style for dall-e-3 (vivid or natural)"
                },
                "response_format": {
                    "type": "string",
                    "enum": ["url", "b64_json"],
                    "description": "Provider response format; ignored by gpt-image models"
                },
                "background": {
                    "type": "string",
                    "description": "Background for gpt-image models (transparent, opaque, auto)"
                }
            },
            "required": ["prompt"]
        })
    }

    fn capabilities(&self) -> Vec<ToolCapability> {
        vec![
            ToolCapability::Network,
            ToolCapability::WritesFiles,
            ToolCapability::Background,
        ]
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let prompt = required_str(&input, "prompt")?;
        let options = ImageGenerateOptions {
            model: optional_str(&input, "model")
                .map_or_else(|| context.config.image_model(), str::to_string),
            prompt: prompt.to_string(),
            size: Some(
                optional_str(&input, "size")
                    .map_or_else(|| context.config.image_size(), str::to_string),
            ),
            n: image_count(&input)?,
            quality: owned(optional_str(&input, "quality")),
            style: owned(optional_str(&input, "style")),
            response_format: owned(optional_choice(
                &input,
                "response_format",
                &["url", "b64_json"],
            )?),
            background: owned(optional_str(&input, "background")),
        };
        dispatch_image(ImageRequest::Generate(options), context).await
    }
}

pub struct EditImageTool;

#[async_trait]
impl ToolSpec for EditImageTool {
    fn name(&self) -> &'static str {
        "edit_image"
    }

    fn description(&self) -> &'static str {
        "Edit an existing image (local path or URL) with a text prompt and optional mask."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "image": {
                    "type": "string",
                    "description": "Source image: local file path or http(s) URL"
                },
                "prompt": {
                    "type": "string",
                    "description": "Description of the desired edit"
                },
                "mask": {
                    "type": "string",
                    "description": "Optional mask image (path or URL); transparent areas are edited"
                },
                "model": {
                    "type": "string",
                    "description": "Edit model name (e.g. gpt-image-1, dall-e-2)"
                },
                "size": {
                    "type": "string",
                    "description": "Output size such as 1024x1024"
                },
                "n": {
                    "type": "integer",
                    "description": "Number of variants (1-10)",
                    "minimum": 1,
                    "maximum": 10
                }
            },
            "required": ["image", "prompt"]
        })
    }

    fn capabilities(&self) -> Vec<ToolCapability> {
        vec![
            ToolCapability::Network,
            ToolCapability::WritesFiles,
            ToolCapability::Background,
        ]
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let image = required_str(&input, "image")?;
        let prompt = required_str(&input, "prompt")?;
        let mask = optional_str(&input, "mask");
        context.check_input_path("image", image)?;
        if let Some(mask) = mask {
            context.check_input_path("mask", mask)?;
        }

        let options = ImageEditOptions {
            model: optional_str(&input, "model")
                .map_or_else(|| context.config.edit_model(), str::to_string),
            prompt: prompt.to_string(),
            image: image.to_string(),
            mask: owned(mask),
            size: owned(optional_str(&input, "size")),
            n: image_count(&input)?,
        };
        dispatch_image(ImageRequest::Edit(options), context).await
    }
}

// === Audio Tools ===

pub struct GenerateSpeechTool;

#[async_trait]
impl ToolSpec for GenerateSpeechTool {
    fn name(&self) -> &'static str {
        "generate_speech"
    }

    fn description(&self) -> &'static str {
        "Convert text to speech and save the audio file. Returns the saved path."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "Text to speak (up to 4096 characters)"
                },
                "model": {
                    "type": "string",
                    "description": "Speech model (tts-1, tts-1-hd, gpt-4o-mini-tts)"
                },
                "voice": {
                    "type": "string",
                    "description": "Voice name (e.g. alloy, echo, fable, onyx, nova, shimmer)"
                },
                "response_format": {
                    "type": "string",
                    "enum": SPEECH_FORMATS,
                    "description": "Audio container format"
                },
                "speed": {
                    "type": "number",
                    "description": "Playback speed from 0.25 to 4.0",
                    "minimum": 0.25,
                    "maximum": 4.0
                },
                "instructions": {
                    "type": "string",
                    "description": "Delivery instructions (gpt-4o TTS models only)"
                }
            },
            "required": ["input"]
        })
    }

    fn capabilities(&self) -> Vec<ToolCapability> {
        vec![ToolCapability::Network, ToolCapability::WritesFiles]
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let text = required_str(&input, "input")?;
        if text.chars().count() > MAX_SPEECH_INPUT_CHARS {
            return Err(ToolError::invalid_input(format!(
                "input must be at most {MAX_SPEECH_INPUT_CHARS} characters"
            )));
        }
        let options = SpeechOptions {
            model: optional_str(&input, "model")
                .map_or_else(|| context.config.speech_model(), str::to_string),
            input: text.to_string(),
            voice: optional_str(&input, "voice")
                .map_or_else(|| context.config.voice(), str::to_string),
            response_format: optional_choice(&input, "response_format", SPEECH_FORMATS)?
                .map_or_else(|| context.config.speech_format(), str::to_string),
            speed: optional_f64_in(&input, "speed", 0.25, 4.0)?,
            instructions: owned(optional_str(&input, "instructions")),
        };

        let saved = audio::synthesize(
            &context.client,
            &options,
            &context.config.audio_dir(),
            context.store.as_ref(),
        )
        .await
        .map_err(|e| ToolError::execution_failed(format!("Failed to generate speech: {e:#}")))?;

        json_result(&json!({
            "status": "completed",
            "model": options.model,
            "voice": options.voice,
            "audio": saved,
        }))
    }
}

pub struct TranscribeAudioTool;

#[async_trait]
impl ToolSpec for TranscribeAudioTool {
    fn name(&self) -> &'static str {
        "transcribe_audio"
    }

    fn description(&self) -> &'static str {
        "Transcribe an audio file (local path or URL) to text."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file": {
                    "type": "string",
                    "description": "Audio file: local path or http(s) URL"
                },
                "model": {
                    "type": "string",
                    "description": "Transcription model (e.g. whisper-1)"
                },
                "language": {
                    "type": "string",
                    "description": "ISO-639-1 language hint such as en or zh"
                },
                "prompt": {
                    "type": "string",
                    "description": "Optional text to guide style or vocabulary"
                },
                "temperature": {
                    "type": "number",
                    "description": "Sampling temperature from 0 to 1",
                    "minimum": 0,
                    "maximum": 1
                }
            },
            "required": ["file"]
        })
    }

    fn capabilities(&self) -> Vec<ToolCapability> {
        vec![ToolCapability::Network]
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let file = required_str(&input, "file")?;
        context.check_input_path("file", file)?;
        let options = TranscriptionOptions {
            model: optional_str(&input, "model")
                .map_or_else(|| context.config.transcription_model(), str::to_string),
            file: file.to_string(),
            language: owned(optional_str(&input, "language")),
            prompt: owned(optional_str(&input, "prompt")),
            temperature: optional_f64_in(&input, "temperature", 0.0, 1.0)?,
        };

        let transcription = audio::transcribe(&context.client, &options)
            .await
            .map_err(|e| {
                ToolError::execution_failed(format!("Failed to transcribe audio: {e:#}"))
            })?;

        json_result(&json!({
            "status": "completed",
            "model": options.model,
            "text": transcription.text,
            "language": transcription.language,
            "duration": transcription.duration,
        }))
    }
}

// === Video Tool ===

pub struct GenerateVideoTool;

#[async_trait]
impl ToolSpec for GenerateVideoTool {
    fn name(&self) -> &'static str {
        "generate_video"
    }

    fn description(&self) -> &'static str {
        "Submit a text-to-video (or image-to-video) task. Returns a request id immediately; the finished video is saved and announced through the configured notification channels."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "Text prompt describing the video"
                },
                "model": {
                    "type": "string",
                    "description": "Video model (e.g. Wan-AI/Wan2.1-T2V-14B, Wan-AI/Wan2.1-I2V-14B-720P)"
                },
                "image_size": {
                    "type": "string",
                    "description": "Output resolution: 1280x720, 720x1280 or 960x960"
                },
                "negative_prompt": {
                    "type": "string",
                    "description": "What to avoid in the video"
                },
                "seed": {
                    "type": "integer",
                    "description": "Seed for reproducible generation"
                },
                "image": {
                    "type": "string",
                    "description": "Reference image for image-to-video: URL or local path"
                }
            },
            "required": ["prompt"]
        })
    }

    fn capabilities(&self) -> Vec<ToolCapability> {
        vec![
            ToolCapability::Network,
            ToolCapability::WritesFiles,
            ToolCapability::Background,
        ]
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        if !context.notifier.is_enabled() {
            return Err(ToolError::invalid_input(
                "generate_video requires a notification channel (chat relay or Telegram) to deliver the result",
            ));
        }
        let prompt = required_str(&input, "prompt")?;
        let image = optional_str(&input, "image");
        if let Some(image) = image {
            context.check_input_path("image", image)?;
        }

        let options = VideoGenerateOptions {
            model: optional_str(&input, "model")
                .map_or_else(|| context.config.video_model(), str::to_string),
            prompt: prompt.to_string(),
            image_size: optional_str(&input, "image_size")
                .map_or_else(|| context.config.video_size(), str::to_string),
            negative_prompt: owned(optional_str(&input, "negative_prompt")),
            seed: optional_i64(&input, "seed")?,
            image: owned(image),
        };

        let request_id = video::submit(&context.video_client, &options)
            .await
            .map_err(|e| ToolError::execution_failed(format!("Failed to submit video: {e:#}")))?;
        tracing::info!(request_id = %request_id, model = %options.model, "video task submitted");

        let task = VideoTask {
            request_id: request_id.clone(),
            prompt: options.prompt.clone(),
            model: options.model.clone(),
            started_at: Instant::now(),
        };
        let poller = VideoPoller {
            source: context.video_client.clone(),
            http_client: context.http_client.clone(),
            notifier: context.notifier.clone(),
            store: context.store.clone(),
            video_dir: context.config.video_dir(),
            policy: context.config.poll_policy(),
        };
        spawn_poll_loop(poller, task);

        json_result(&json!({
            "status": "submitted",
            "request_id": request_id,
            "model": options.model,
            "notify": context.notifier.channel_names(),
            "message": "Video generation started; you will be notified when it completes.",
        }))
    }
}
