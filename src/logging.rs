//! Logging setup and lightweight helpers.
//!
//! Stdout carries the MCP protocol, so every log line goes to stderr.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Install the global tracing subscriber.
pub fn init(verbose: bool) {
    set_verbose(verbose);
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A subscriber may already be installed (tests, embedding); keep the existing one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}

/// Enable or disable verbose logging output.
pub fn set_verbose(enabled: bool) {
    VERBOSE.store(enabled, Ordering::SeqCst);
}

/// Check whether verbose logging is enabled.
#[must_use]
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

/// Emit an info message.
pub fn info(message: impl AsRef<str>) {
    tracing::info!("{}", message.as_ref());
}

/// Emit a warning message.
pub fn warn(message: impl AsRef<str>) {
    tracing::warn!("{}", message.as_ref());
}

/// Emit a debug message (only rendered when verbose).
pub fn debug(message: impl AsRef<str>) {
    if is_verbose() {
        tracing::debug!("{}", message.as_ref());
    }
}
