//! Tool system modules and re-exports.

// === Modules ===

pub mod media;
pub mod registry;
pub mod spec;

// === Re-exports ===

pub use registry::{ToolRegistry, ToolRegistryBuilder};
pub use spec::ToolContext;

#[cfg(test)]
pub mod testing {
    //! Context builders for tool and server tests.

    use std::path::Path;
    use std::sync::Arc;

    use crate::client::MediaClient;
    use crate::config::Config;
    use crate::notify::Notifier;

    use super::ToolContext;

    /// Configuration pointing both providers at `base_url`.
    pub fn test_config(base_url: &str, output_dir: &Path) -> Config {
        Config {
            api_key: Some("sk-test".to_string()),
            base_url: Some(base_url.to_string()),
            video_base_url: Some(base_url.to_string()),
            output_dir: Some(output_dir.display().to_string()),
            ..Config::default()
        }
    }

    pub fn context_with(base_url: &str, output_dir: &Path, notifier: Arc<Notifier>) -> ToolContext {
        let config = test_config(base_url, output_dir);
        let http_client = reqwest::Client::new();
        ToolContext {
            client: MediaClient::with_credentials(http_client.clone(), base_url, "sk-test"),
            video_client: MediaClient::with_credentials(http_client.clone(), base_url, "sk-test"),
            config: Arc::new(config),
            http_client,
            notifier,
            store: None,
        }
    }

    /// A context with no notification channel and a scratch output directory.
    pub fn test_context(base_url: &str) -> ToolContext {
        let output_dir = std::env::temp_dir().join("mediagen-mcp-tests");
        context_with(base_url, &output_dir, Arc::new(Notifier::default()))
    }
}
