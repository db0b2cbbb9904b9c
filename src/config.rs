//! Configuration loading and defaults for mediagen-mcp.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_VIDEO_BASE_URL: &str = "https://api.siliconflow.cn";
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_RELAY_ACTION: &str = "send_text";

// === Types ===

/// Raw polling configuration loaded from config files.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollingConfig {
    pub interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

/// Resolved polling policy for background video tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Notification channel credentials loaded from config files.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    pub relay_url: Option<String>,
    pub relay_recipient: Option<String>,
    pub relay_action: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_api_base: Option<String>,
}

/// Remote artifact store settings loaded from config files.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    pub upload_url: Option<String>,
    pub auth_code: Option<String>,
}

/// Resolved chat relay channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    pub url: String,
    pub recipient: String,
    pub action: String,
}

/// Resolved Telegram bot channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramSettings {
    pub api_base: String,
    pub bot_token: String,
    pub chat_id: String,
}

/// Resolved remote store endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub upload_url: String,
    pub auth_code: String,
}

/// Resolved server configuration, including defaults and environment overrides.
///
/// Built once at startup and shared read-only (behind an `Arc`) with every
/// tool and background task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub video_api_key: Option<String>,
    pub video_base_url: Option<String>,

    // === Model Defaults ===
    pub default_image_model: Option<String>,
    pub default_edit_model: Option<String>,
    pub default_image_size: Option<String>,
    pub default_speech_model: Option<String>,
    pub default_voice: Option<String>,
    pub default_speech_format: Option<String>,
    pub default_transcription_model: Option<String>,
    pub default_video_model: Option<String>,
    pub default_video_size: Option<String>,
    /// Image models whose requests run as background jobs.
    pub background_image_models: Option<Vec<String>>,

    // === Standard Configuration ===
    pub output_dir: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub polling: Option<PollingConfig>,
    pub notify: Option<NotifyConfig>,
    pub storage: Option<StorageConfig>,
}

/// Values supplied on the command line; they win over every other layer.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(flatten)]
    base: Config,
    profiles: Option<HashMap<String, Config>>,
}

// === Config Loading ===

impl Config {
    /// Load configuration from disk and merge with environment overrides.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// # use crate::config::Config;
    /// let config = Config::load(None, None)?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn load(path: Option<PathBuf>, profile: Option<&str>) -> Result<Self> {
        let path = path.or_else(default_config_path);
        let mut config = if let Some(path) = path.as_ref() {
            if path.exists() {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                parse_config(&contents, profile)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            } else {
                Config::default()
            }
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(api_key) = overrides.api_key {
            self.api_key = Some(api_key);
        }
        if let Some(base_url) = overrides.base_url {
            self.base_url = Some(base_url);
        }
        if let Some(output_dir) = overrides.output_dir {
            self.output_dir = Some(output_dir.to_string_lossy().to_string());
        }
        if let Some(timeout) = overrides.request_timeout_secs {
            self.request_timeout_secs = Some(timeout);
        }
    }

    /// Validate that critical config fields are well formed.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref key) = self.api_key
            && key.trim().is_empty()
        {
            anyhow::bail!("api_key cannot be empty string");
        }
        if let Some(polling) = &self.polling
            && polling.interval_secs == Some(0)
        {
            anyhow::bail!("polling.interval_secs must be greater than zero");
        }
        if self.request_timeout_secs == Some(0) {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Read the provider API key; the server cannot start without it.
    pub fn provider_api_key(&self) -> Result<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .context(
                "Failed to load provider API key: MEDIAGEN_API_KEY missing. Set it in config.toml, the environment, or pass --api-key.",
            )
    }

    /// Return the provider base URL (normalized).
    #[must_use]
    pub fn provider_base_url(&self) -> String {
        let base = self
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        normalize_base_url(&base)
    }

    /// Read the video provider API key, falling back to the primary key.
    pub fn video_api_key(&self) -> Result<String> {
        if let Some(ref key) = self.video_api_key
            && !key.trim().is_empty()
        {
            return Ok(key.clone());
        }
        self.provider_api_key()
    }

    /// Return the video provider base URL (normalized).
    #[must_use]
    pub fn video_base_url(&self) -> String {
        let base = self
            .video_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_VIDEO_BASE_URL.to_string());
        normalize_base_url(&base)
    }

    #[must_use]
    pub fn image_model(&self) -> String {
        self.default_image_model
            .clone()
            .unwrap_or_else(|| "dall-e-3".to_string())
    }

    #[must_use]
    pub fn edit_model(&self) -> String {
        self.default_edit_model
            .clone()
            .unwrap_or_else(|| "gpt-image-1".to_string())
    }

    #[must_use]
    pub fn image_size(&self) -> String {
        self.default_image_size
            .clone()
            .unwrap_or_else(|| "1024x1024".to_string())
    }

    #[must_use]
    pub fn speech_model(&self) -> String {
        self.default_speech_model
            .clone()
            .unwrap_or_else(|| "tts-1".to_string())
    }

    #[must_use]
    pub fn voice(&self) -> String {
        self.default_voice
            .clone()
            .unwrap_or_else(|| "alloy".to_string())
    }

    #[must_use]
    pub fn speech_format(&self) -> String {
        self.default_speech_format
            .clone()
            .unwrap_or_else(|| "mp3".to_string())
    }

    #[must_use]
    pub fn transcription_model(&self) -> String {
        self.default_transcription_model
            .clone()
            .unwrap_or_else(|| "whisper-1".to_string())
    }

    #[must_use]
    pub fn video_model(&self) -> String {
        self.default_video_model
            .clone()
            .unwrap_or_else(|| "Wan-AI/Wan2.1-T2V-14B".to_string())
    }

    #[must_use]
    pub fn video_size(&self) -> String {
        self.default_video_size
            .clone()
            .unwrap_or_else(|| "1280x720".to_string())
    }

    /// Whether requests for this image model run as background jobs.
    #[must_use]
    pub fn is_background_image_model(&self, model: &str) -> bool {
        match &self.background_image_models {
            Some(models) => models.iter().any(|m| m.eq_ignore_ascii_case(model)),
            None => model.eq_ignore_ascii_case("gpt-image-1"),
        }
    }

    /// Root of the local artifact tree.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| PathBuf::from("./outputs"))
    }

    #[must_use]
    pub fn image_dir(&self) -> PathBuf {
        self.output_dir().join("images")
    }

    #[must_use]
    pub fn audio_dir(&self) -> PathBuf {
        self.output_dir().join("audio")
    }

    #[must_use]
    pub fn video_dir(&self) -> PathBuf {
        self.output_dir().join("video")
    }

    /// Per-request HTTP timeout for provider calls.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(600))
    }

    /// Resolve the effective polling policy with defaults applied.
    #[must_use]
    pub fn poll_policy(&self) -> PollPolicy {
        let defaults = PollPolicy::default();
        let Some(cfg) = &self.polling else {
            return defaults;
        };
        PollPolicy {
            interval: cfg
                .interval_secs
                .map_or(defaults.interval, Duration::from_secs),
            timeout: cfg
                .timeout_secs
                .map_or(defaults.timeout, Duration::from_secs),
        }
    }

    /// Chat relay channel, when both endpoint and recipient are configured.
    #[must_use]
    pub fn relay_settings(&self) -> Option<RelaySettings> {
        let notify = self.notify.as_ref()?;
        let url = non_empty(notify.relay_url.as_ref())?;
        let recipient = non_empty(notify.relay_recipient.as_ref())?;
        Some(RelaySettings {
            url,
            recipient,
            action: non_empty(notify.relay_action.as_ref())
                .unwrap_or_else(|| DEFAULT_RELAY_ACTION.to_string()),
        })
    }

    /// Telegram channel, when both bot token and chat id are configured.
    #[must_use]
    pub fn telegram_settings(&self) -> Option<TelegramSettings> {
        let notify = self.notify.as_ref()?;
        let bot_token = non_empty(notify.telegram_bot_token.as_ref())?;
        let chat_id = non_empty(notify.telegram_chat_id.as_ref())?;
        let api_base = non_empty(notify.telegram_api_base.as_ref())
            .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string());
        Some(TelegramSettings {
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
        })
    }

    /// Remote store endpoint, when both URL and auth code are configured.
    #[must_use]
    pub fn storage_settings(&self) -> Option<StorageSettings> {
        let storage = self.storage.as_ref()?;
        Some(StorageSettings {
            upload_url: non_empty(storage.upload_url.as_ref())?,
            auth_code: non_empty(storage.auth_code.as_ref())?,
        })
    }
}

// === Defaults ===

fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("MEDIAGEN_CONFIG_PATH")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".mediagen").join("config.toml"))
}

fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.as_ref())
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// === Environment Overrides ===

fn apply_env_overrides(config: &mut Config) {
    if let Ok(value) = std::env::var("OPENAI_API_KEY")
        && config.api_key.is_none()
    {
        config.api_key = Some(value);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_API_KEY") {
        config.api_key = Some(value);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_BASE_URL") {
        config.base_url = Some(value);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_VIDEO_API_KEY") {
        config.video_api_key = Some(value);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_VIDEO_BASE_URL") {
        config.video_base_url = Some(value);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_IMAGE_MODEL") {
        config.default_image_model = Some(value);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_EDIT_MODEL") {
        config.default_edit_model = Some(value);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_IMAGE_SIZE") {
        config.default_image_size = Some(value);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_SPEECH_MODEL") {
        config.default_speech_model = Some(value);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_VOICE") {
        config.default_voice = Some(value);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_SPEECH_FORMAT") {
        config.default_speech_format = Some(value);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_TRANSCRIPTION_MODEL") {
        config.default_transcription_model = Some(value);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_VIDEO_MODEL") {
        config.default_video_model = Some(value);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_VIDEO_SIZE") {
        config.default_video_size = Some(value);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_BACKGROUND_IMAGE_MODELS") {
        config.background_image_models = Some(parse_model_list(&value));
    }
    if let Ok(value) = std::env::var("MEDIAGEN_OUTPUT_DIR") {
        config.output_dir = Some(value);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_REQUEST_TIMEOUT")
        && let Ok(parsed) = value.trim().parse::<u64>()
    {
        config.request_timeout_secs = Some(parsed);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_POLL_INTERVAL")
        && let Ok(parsed) = value.trim().parse::<u64>()
    {
        config.polling.get_or_insert_with(PollingConfig::default).interval_secs = Some(parsed);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_POLL_TIMEOUT")
        && let Ok(parsed) = value.trim().parse::<u64>()
    {
        config.polling.get_or_insert_with(PollingConfig::default).timeout_secs = Some(parsed);
    }

    let notify_overrides = [
        ("MEDIAGEN_RELAY_URL", NotifyField::RelayUrl),
        ("MEDIAGEN_RELAY_TO", NotifyField::RelayRecipient),
        ("MEDIAGEN_RELAY_ACTION", NotifyField::RelayAction),
        ("TELEGRAM_BOT_TOKEN", NotifyField::TelegramBotToken),
        ("TELEGRAM_CHAT_ID", NotifyField::TelegramChatId),
        ("TELEGRAM_API_BASE", NotifyField::TelegramApiBase),
    ];
    for (var, field) in notify_overrides {
        if let Ok(value) = std::env::var(var) {
            let notify = config.notify.get_or_insert_with(NotifyConfig::default);
            field.set(notify, value);
        }
    }

    if let Ok(value) = std::env::var("MEDIAGEN_UPLOAD_URL") {
        config.storage.get_or_insert_with(StorageConfig::default).upload_url = Some(value);
    }
    if let Ok(value) = std::env::var("MEDIAGEN_UPLOAD_AUTH_CODE") {
        config.storage.get_or_insert_with(StorageConfig::default).auth_code = Some(value);
    }
}

#[derive(Clone, Copy)]
enum NotifyField {
    RelayUrl,
    RelayRecipient,
    RelayAction,
    TelegramBotToken,
    TelegramChatId,
    TelegramApiBase,
}

impl NotifyField {
    fn set(self, notify: &mut NotifyConfig, value: String) {
        let slot = match self {
            Self::RelayUrl => &mut notify.relay_url,
            Self::RelayRecipient => &mut notify.relay_recipient,
            Self::RelayAction => &mut notify.relay_action,
            Self::TelegramBotToken => &mut notify.telegram_bot_token,
            Self::TelegramChatId => &mut notify.telegram_chat_id,
            Self::TelegramApiBase => &mut notify.telegram_api_base,
        };
        *slot = Some(value);
    }
}

fn normalize_base_url(base: &str) -> String {
    base.trim()
        .trim_end_matches('/')
        .trim_end_matches("/v1")
        .to_string()
}

fn parse_model_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(std::string::ToString::to_string)
        .collect()
}

fn parse_config(contents: &str, profile: Option<&str>) -> Result<Config> {
    let parsed: ConfigFile = toml::from_str(contents)?;
    apply_profile(parsed, profile)
}

fn apply_profile(config: ConfigFile, profile: Option<&str>) -> Result<Config> {
    if let Some(profile_name) = profile {
        let profiles = config.profiles.as_ref();
        match profiles.and_then(|profiles| profiles.get(profile_name)) {
            Some(override_cfg) => Ok(merge_config(config.base, override_cfg.clone())),
            None => {
                let available = profiles
                    .map(|profiles| {
                        let mut keys = profiles.keys().cloned().collect::<Vec<_>>();
                        keys.sort();
                        if keys.is_empty() {
                            "none".to_string()
                        } else {
                            keys.join(", ")
                        }
                    })
                    .unwrap_or_else(|| "none".to_string());
                anyhow::bail!(
                    "Profile '{}' not found. Available profiles: {}",
                    profile_name,
                    available
                )
            }
        }
    } else {
        Ok(config.base)
    }
}

fn merge_config(base: Config, override_cfg: Config) -> Config {
    Config {
        api_key: override_cfg.api_key.or(base.api_key),
        base_url: override_cfg.base_url.or(base.base_url),
        video_api_key: override_cfg.video_api_key.or(base.video_api_key),
        video_base_url: override_cfg.video_base_url.or(base.video_base_url),
        default_image_model: override_cfg
            .default_image_model
            .or(base.default_image_model),
        default_edit_model: override_cfg.default_edit_model.or(base.default_edit_model),
        default_image_size: override_cfg.default_image_size.or(base.default_image_size),
        default_speech_model: override_cfg
            .default_speech_model
            .or(base.default_speech_model),
        default_voice: override_cfg.default_voice.or(base.default_voice),
        default_speech_format: override_cfg
            .default_speech_format
            .or(base.default_speech_format),
        default_transcription_model: override_cfg
            .default_transcription_model
            .or(base.default_transcription_model),
        default_video_model: override_cfg
            .default_video_model
            .or(base.default_video_model),
        default_video_size: override_cfg.default_video_size.or(base.default_video_size),
        background_image_models: override_cfg
            .background_image_models
            .or(base.background_image_models),
        output_dir: override_cfg.output_dir.or(base.output_dir),
        request_timeout_secs: override_cfg
            .request_timeout_secs
            .or(base.request_timeout_secs),
        polling: override_cfg.polling.or(base.polling),
        notify: override_cfg.notify.or(base.notify),
        storage: override_cfg.storage.or(base.storage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::ffi::OsString;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<OsString>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let previous = env::var_os(key);
            // Safety: test-only environment mutation guarded by a global mutex.
            unsafe {
                env::set_var(key, value);
            }
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            // Safety: test-only environment mutation guarded by a global mutex.
            unsafe {
                match self.previous.take() {
                    Some(value) => env::set_var(self.key, value),
                    None => env::remove_var(self.key),
                }
            }
        }
    }

    const SAMPLE: &str = r#"
api_key = "sk-base"
output_dir = "/srv/media"
background_image_models = ["gpt-image-1", "flux-kontext-pro"]

[polling]
interval_secs = 5

[notify]
relay_url = "http://relay.local/api"
relay_recipient = "room-1"
telegram_bot_token = "123:abc"

[storage]
upload_url = "https://files.example.com/upload"
auth_code = "secret"

[profiles.work]
api_key = "sk-work"
default_image_model = "gpt-image-1"
"#;

    #[test]
    fn parses_nested_sections() -> Result<()> {
        let config = parse_config(SAMPLE, None)?;
        assert_eq!(config.api_key.as_deref(), Some("sk-base"));
        assert_eq!(config.image_dir(), PathBuf::from("/srv/media/images"));
        assert_eq!(config.video_dir(), PathBuf::from("/srv/media/video"));
        assert!(config.is_background_image_model("FLUX-KONTEXT-PRO"));
        assert!(!config.is_background_image_model("dall-e-3"));

        let policy = config.poll_policy();
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.timeout, Duration::from_secs(86_400));

        let relay = config.relay_settings().expect("relay configured");
        assert_eq!(relay.recipient, "room-1");
        assert_eq!(relay.action, "send_text");
        // Telegram needs a chat id as well as a token.
        assert!(config.telegram_settings().is_none());

        let storage = config.storage_settings().expect("storage configured");
        assert_eq!(storage.auth_code, "secret");
        Ok(())
    }

    #[test]
    fn profile_overrides_base_values() -> Result<()> {
        let config = parse_config(SAMPLE, Some("work"))?;
        assert_eq!(config.api_key.as_deref(), Some("sk-work"));
        assert_eq!(config.image_model(), "gpt-image-1");
        assert_eq!(config.output_dir(), PathBuf::from("/srv/media"));
        Ok(())
    }

    #[test]
    fn test_nonexistent_profile_error() {
        let err = parse_config(SAMPLE, Some("nonexistent")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Profile 'nonexistent' not found"));
        assert!(message.contains("work"));
    }

    #[test]
    fn test_profile_with_no_profiles_section() {
        let config = ConfigFile {
            base: Config::default(),
            profiles: None,
        };
        let err = apply_profile(config, Some("missing")).unwrap_err();
        assert!(err.to_string().contains("Available profiles: none"));
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::default();
        assert_eq!(config.provider_base_url(), "https://api.openai.com");
        assert_eq!(config.video_base_url(), "https://api.siliconflow.cn");
        assert_eq!(config.video_model(), "Wan-AI/Wan2.1-T2V-14B");
        assert_eq!(config.poll_policy(), PollPolicy::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(600));
        assert!(config.is_background_image_model("gpt-image-1"));
        assert!(config.relay_settings().is_none());
        assert!(config.storage_settings().is_none());
        assert!(config.provider_api_key().is_err());
    }

    #[test]
    fn base_urls_are_normalized() {
        let config = Config {
            base_url: Some("https://proxy.example.com/v1/".to_string()),
            ..Config::default()
        };
        assert_eq!(config.provider_base_url(), "https://proxy.example.com");
    }

    #[test]
    fn video_key_falls_back_to_primary() -> Result<()> {
        let config = Config {
            api_key: Some("sk-primary".to_string()),
            ..Config::default()
        };
        assert_eq!(config.video_api_key()?, "sk-primary");

        let config = Config {
            api_key: Some("sk-primary".to_string()),
            video_api_key: Some("sk-video".to_string()),
            ..Config::default()
        };
        assert_eq!(config.video_api_key()?, "sk-video");
        Ok(())
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let config = Config {
            api_key: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let config = Config {
            polling: Some(PollingConfig {
                interval_secs: Some(0),
                timeout_secs: None,
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn cli_overrides_win() {
        let mut config = parse_config(SAMPLE, None).expect("parse");
        config.apply_overrides(ConfigOverrides {
            api_key: Some("sk-cli".to_string()),
            output_dir: Some(PathBuf::from("/tmp/out")),
            request_timeout_secs: Some(30),
            ..ConfigOverrides::default()
        });
        assert_eq!(config.api_key.as_deref(), Some("sk-cli"));
        assert_eq!(config.audio_dir(), PathBuf::from("/tmp/out/audio"));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn env_overrides_fill_notification_channels() {
        let _lock = env_lock().lock().unwrap();
        let _token = EnvVarGuard::set("TELEGRAM_BOT_TOKEN", "999:xyz");
        let _chat = EnvVarGuard::set("TELEGRAM_CHAT_ID", "-100200");
        let _models = EnvVarGuard::set("MEDIAGEN_BACKGROUND_IMAGE_MODELS", "a, b ,,c");

        let mut config = Config::default();
        apply_env_overrides(&mut config);

        let telegram = config.telegram_settings().expect("telegram configured");
        assert_eq!(telegram.bot_token, "999:xyz");
        assert_eq!(telegram.chat_id, "-100200");
        assert_eq!(telegram.api_base, "https://api.telegram.org");
        assert_eq!(
            config.background_image_models,
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }
}
