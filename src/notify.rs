//! Best-effort notification fan-out for background task outcomes.
//!
//! Each configured channel is delivered independently; a failing channel is
//! logged and never affects the others or the caller.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::json;

use crate::config::{Config, RelaySettings, TelegramSettings};

/// A single delivery sink for notification messages.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Short channel name used in logs.
    fn name(&self) -> &str;

    /// Deliver one message.
    async fn send(&self, message: &str) -> Result<()>;
}

/// Escape legacy Telegram Markdown metacharacters in an interpolated value.
///
/// Message headers keep their `*bold*` markup; only values pass through here.
#[must_use]
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// === Chat Relay ===

/// Generic HTTP relay that forwards messages to a chat recipient.
pub struct RelayChannel {
    http_client: reqwest::Client,
    settings: RelaySettings,
}

impl RelayChannel {
    #[must_use]
    pub fn new(http_client: reqwest::Client, settings: RelaySettings) -> Self {
        Self {
            http_client,
            settings,
        }
    }
}

#[async_trait]
impl NotificationChannel for RelayChannel {
    fn name(&self) -> &str {
        "relay"
    }

    async fn send(&self, message: &str) -> Result<()> {
        let body = json!({
            "action": self.settings.action,
            "data": {
                "to": self.settings.recipient,
                "content": message,
            }
        });
        let response = self
            .http_client
            .post(&self.settings.url)
            .json(&body)
            .send()
            .await
            .context("Failed to reach chat relay")?;
        if !response.status().is_success() {
            anyhow::bail!("Chat relay rejected message: HTTP {}", response.status());
        }
        Ok(())
    }
}

// === Telegram ===

/// Telegram Bot API `sendMessage` channel.
pub struct TelegramChannel {
    http_client: reqwest::Client,
    settings: TelegramSettings,
}

impl TelegramChannel {
    #[must_use]
    pub fn new(http_client: reqwest::Client, settings: TelegramSettings) -> Self {
        Self {
            http_client,
            settings,
        }
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: &str) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.settings.api_base, self.settings.bot_token
        );
        let body = json!({
            "chat_id": self.settings.chat_id,
            "text": message,
            "parse_mode": "Markdown",
        });
        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            // The URL embeds the bot token; keep it out of the error chain.
            .map_err(|e| anyhow::anyhow!("Failed to reach Telegram API: {}", e.without_url()))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Telegram rejected message: HTTP {status}: {text}");
        }
        Ok(())
    }
}

// === Notifier ===

/// Fan-out over every configured channel.
#[derive(Clone, Default)]
pub struct Notifier {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl Notifier {
    #[must_use]
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// Build the channels enabled by configuration; missing credentials skip a channel.
    #[must_use]
    pub fn from_config(config: &Config, http_client: &reqwest::Client) -> Self {
        let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();
        if let Some(settings) = config.relay_settings() {
            channels.push(Arc::new(RelayChannel::new(http_client.clone(), settings)));
        }
        if let Some(settings) = config.telegram_settings() {
            channels.push(Arc::new(TelegramChannel::new(http_client.clone(), settings)));
        }
        Self::new(channels)
    }

    /// Whether at least one channel is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.channels.is_empty()
    }

    #[must_use]
    pub fn channel_names(&self) -> Vec<String> {
        self.channels
            .iter()
            .map(|channel| channel.name().to_string())
            .collect()
    }

    /// Deliver `message` to every channel concurrently. Never fails.
    pub async fn notify(&self, message: &str) {
        if self.channels.is_empty() {
            tracing::debug!("No notification channel configured; dropping message");
            return;
        }
        let deliveries = self.channels.iter().map(|channel| async move {
            match channel.send(message).await {
                Ok(()) => tracing::debug!(channel = channel.name(), "notification delivered"),
                Err(e) => {
                    tracing::warn!(
                        channel = channel.name(),
                        error = %format!("{e:#}"),
                        "notification delivery failed"
                    );
                }
            }
        });
        join_all(deliveries).await;
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotifyConfig;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn relay_and_telegram_payloads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/relay"))
            .and(body_partial_json(json!({
                "action": "send_text",
                "data": { "to": "room-1", "content": "hello" }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot42:abc/sendMessage"))
            .and(body_partial_json(json!({
                "chat_id": "777",
                "text": "hello",
                "parse_mode": "Markdown"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let config = Config {
            notify: Some(NotifyConfig {
                relay_url: Some(format!("{}/relay", server.uri())),
                relay_recipient: Some("room-1".to_string()),
                telegram_bot_token: Some("42:abc".to_string()),
                telegram_chat_id: Some("777".to_string()),
                telegram_api_base: Some(server.uri()),
                ..NotifyConfig::default()
            }),
            ..Config::default()
        };
        let notifier = Notifier::from_config(&config, &reqwest::Client::new());
        assert_eq!(notifier.channel_names(), vec!["relay", "telegram"]);

        notifier.notify("hello").await;
        server.verify().await;
    }

    #[test]
    fn markdown_metacharacters_are_escaped() {
        assert_eq!(
            escape_markdown("./outputs/video/video_abc_1.mp4"),
            r"./outputs/video/video\_abc\_1.mp4"
        );
        assert_eq!(escape_markdown("a *b* `c` [d]"), r"a \*b\* \`c\` \[d]");
        assert_eq!(escape_markdown("plain text"), "plain text");
    }

    #[tokio::test]
    async fn unreachable_channel_does_not_block_the_other() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot1:x/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        // Port 9 (discard) on localhost is not listening in test environments.
        let config = Config {
            notify: Some(NotifyConfig {
                relay_url: Some("http://127.0.0.1:9/relay".to_string()),
                relay_recipient: Some("room-1".to_string()),
                telegram_bot_token: Some("1:x".to_string()),
                telegram_chat_id: Some("5".to_string()),
                telegram_api_base: Some(server.uri()),
                ..NotifyConfig::default()
            }),
            ..Config::default()
        };
        let notifier = Notifier::from_config(&config, &reqwest::Client::new());
        notifier.notify("still delivered").await;
        server.verify().await;
    }

    #[tokio::test]
    async fn rejected_delivery_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let relay = RelayChannel::new(
            reqwest::Client::new(),
            RelaySettings {
                url: format!("{}/relay", server.uri()),
                recipient: "r".to_string(),
                action: "send_text".to_string(),
            },
        );
        assert!(relay.send("x").await.is_err());

        let notifier = Notifier::default();
        assert!(!notifier.is_enabled());
        notifier.notify("nobody listens").await;
    }
}
