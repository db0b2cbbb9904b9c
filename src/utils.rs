//! Utility helpers shared across the media server.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde_json::Value;

// === Filesystem Helpers ===

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))
}

pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

/// Create a timestamped filename for generated assets.
#[must_use]
pub fn timestamped_filename(prefix: &str, extension: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{prefix}_{now}.{extension}")
}

/// Render JSON with pretty formatting, falling back to a compact string on error.
#[must_use]
pub fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Extract a lowercase file extension from a URL, if present.
#[must_use]
pub fn extension_from_url(url: &str) -> Option<String> {
    let path = url.split('?').next().unwrap_or(url);
    let ext = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase);
    ext.filter(|e| {
        !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric())
    })
}

/// Build an output path within the given directory.
#[must_use]
pub fn output_path(output_dir: &Path, filename: &str) -> PathBuf {
    output_dir.join(filename)
}

/// Replace characters that are unsafe in filenames (model ids contain `/`).
#[must_use]
pub fn sanitize_filename_part(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Truncate a string to a maximum length, adding an ellipsis if truncated
#[must_use]
pub fn truncate_with_ellipsis(s: &str, max_len: usize, ellipsis: &str) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let keep = max_len.saturating_sub(ellipsis.chars().count());
        let truncated: String = s.chars().take(keep).collect();
        format!("{truncated}{ellipsis}")
    }
}

/// Guess a MIME type from a file extension.
#[must_use]
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" | "opus" => "audio/ogg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "webm" => "audio/webm",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// Whether an argument names a remote resource rather than a local path.
#[must_use]
pub fn is_http_url(value: &str) -> bool {
    let lower = value.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_from_url_ignores_query() {
        assert_eq!(
            extension_from_url("https://cdn.example.com/a/b/video.MP4?sig=abc"),
            Some("mp4".to_string())
        );
        assert_eq!(extension_from_url("https://cdn.example.com/a/b/noext"), None);
    }

    #[test]
    fn sanitize_replaces_path_separators() {
        assert_eq!(
            sanitize_filename_part("Wan-AI/Wan2.1-T2V-14B"),
            "Wan-AI_Wan2.1-T2V-14B"
        );
        assert_eq!(sanitize_filename_part(""), "file");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_with_ellipsis("héllo wörld", 6, "..."), "hél...");
        assert_eq!(truncate_with_ellipsis("short", 10, "..."), "short");
    }

    #[test]
    fn http_url_detection() {
        assert!(is_http_url("https://example.com/a.png"));
        assert!(is_http_url("HTTP://example.com/a.png"));
        assert!(!is_http_url("/tmp/a.png"));
    }
}
