//! Speech synthesis and transcription.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::client::{MediaClient, is_json_response};
use crate::modules::input::InputFile;
use crate::modules::storage::RemoteStore;
use crate::utils::{output_path, timestamped_filename, write_bytes};

// === Types ===

/// Options for text-to-speech requests.
#[derive(Debug, Clone)]
pub struct SpeechOptions {
    pub model: String,
    pub input: String,
    pub voice: String,
    pub response_format: String,
    pub speed: Option<f64>,
    pub instructions: Option<String>,
}

/// Options for transcription requests. `file` is a path or URL.
#[derive(Debug, Clone)]
pub struct TranscriptionOptions {
    pub model: String,
    pub file: String,
    pub language: Option<String>,
    pub prompt: Option<String>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedSpeech {
    pub path: String,
    pub bytes: u64,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Transcription {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

// === Speech ===

fn build_speech_request(options: &SpeechOptions) -> Value {
    let mut body = json!({
        "model": options.model,
        "input": options.input,
        "voice": options.voice,
        "response_format": options.response_format,
    });
    if let Some(speed) = options.speed {
        body["speed"] = json!(speed);
    }
    // Only the gpt-4o TTS family accepts steering instructions.
    if let Some(instructions) = &options.instructions
        && options.model.to_ascii_lowercase().starts_with("gpt-4o")
    {
        body["instructions"] = json!(instructions);
    }
    body
}

/// Synthesize speech and save it under `audio_dir`.
pub async fn synthesize(
    client: &MediaClient,
    options: &SpeechOptions,
    audio_dir: &Path,
    store: Option<&RemoteStore>,
) -> Result<SavedSpeech> {
    let response = client
        .post_json_raw("/v1/audio/speech", &build_speech_request(options))
        .await?;
    if is_json_response(&response) {
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("Speech endpoint returned JSON instead of audio: {text}");
    }
    let bytes = response
        .bytes()
        .await
        .context("Failed to read speech audio")?;
    if bytes.is_empty() {
        anyhow::bail!("Speech endpoint returned an empty body");
    }

    let path: PathBuf = output_path(
        audio_dir,
        &timestamped_filename("speech", &options.response_format),
    );
    write_bytes(&path, &bytes)?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "speech saved");

    let remote_url = match store {
        Some(store) => match store.upload(&path).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "speech upload failed");
                None
            }
        },
        None => None,
    };

    Ok(SavedSpeech {
        path: path.display().to_string(),
        bytes: bytes.len() as u64,
        format: options.response_format.clone(),
        remote_url,
    })
}

// === Transcription ===

/// Transcribe an audio file. URL inputs are downloaded to a temporary file
/// that is removed when this function returns.
pub async fn transcribe(
    client: &MediaClient,
    options: &TranscriptionOptions,
) -> Result<Transcription> {
    let input = InputFile::resolve(client.http(), &options.file)
        .await
        .context("Failed to prepare audio input")?;

    let mut form = reqwest::multipart::Form::new()
        .text("model", options.model.clone())
        .text("response_format", "json")
        .part("file", input.to_part().await?);
    if let Some(language) = &options.language {
        form = form.text("language", language.clone());
    }
    if let Some(prompt) = &options.prompt {
        form = form.text("prompt", prompt.clone());
    }
    if let Some(temperature) = options.temperature {
        form = form.text("temperature", temperature.to_string());
    }

    client.post_multipart("/v1/audio/transcriptions", form).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn speech_options() -> SpeechOptions {
        SpeechOptions {
            model: "tts-1".to_string(),
            input: "hello there".to_string(),
            voice: "alloy".to_string(),
            response_format: "mp3".to_string(),
            speed: Some(1.25),
            instructions: Some("cheerful".to_string()),
        }
    }

    #[test]
    fn instructions_only_for_gpt4o_tts() {
        let body = build_speech_request(&speech_options());
        assert!(body.get("instructions").is_none());
        assert_eq!(body["speed"], 1.25);

        let mut options = speech_options();
        options.model = "gpt-4o-mini-tts".to_string();
        assert_eq!(build_speech_request(&options)["instructions"], "cheerful");
    }

    #[tokio::test]
    async fn synthesize_writes_audio_bytes() {
        let server = MockServer::start().await;
        let audio = vec![0xFFu8; 2048];
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .and(body_partial_json(json!({ "voice": "alloy", "input": "hello there" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(audio.clone()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = MediaClient::with_credentials(reqwest::Client::new(), server.uri(), "sk");
        let dir = tempfile::tempdir().expect("tempdir");
        let saved = synthesize(&client, &speech_options(), dir.path(), None)
            .await
            .expect("synthesize");

        assert_eq!(saved.bytes, audio.len() as u64);
        assert!(saved.path.ends_with(".mp3"));
        assert_eq!(std::fs::read(&saved.path).expect("read"), audio);
    }

    #[tokio::test]
    async fn json_speech_response_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "error": "bad voice" })),
            )
            .mount(&server)
            .await;

        let client = MediaClient::with_credentials(reqwest::Client::new(), server.uri(), "sk");
        let dir = tempfile::tempdir().expect("tempdir");
        let err = synthesize(&client, &speech_options(), dir.path(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad voice"));
        assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 0);
    }

    #[tokio::test]
    async fn transcribe_downloads_url_input() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clips/memo.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3audio".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "text": "remember the milk" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = MediaClient::with_credentials(reqwest::Client::new(), server.uri(), "sk");
        let transcription = transcribe(
            &client,
            &TranscriptionOptions {
                model: "whisper-1".to_string(),
                file: format!("{}/clips/memo.mp3", server.uri()),
                language: Some("en".to_string()),
                prompt: None,
                temperature: Some(0.2),
            },
        )
        .await
        .expect("transcribe");
        assert_eq!(transcription.text, "remember the milk");
    }
}
