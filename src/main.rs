//! mediagen-mcp: MCP server for image, speech, transcription and video generation.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use dotenvy::dotenv;

mod client;
mod config;
mod logging;
mod mcp;
mod modules;
mod notify;
mod tools;
mod utils;

use crate::config::{Config, ConfigOverrides};
use crate::mcp::McpServer;
use crate::tools::{ToolContext, ToolRegistryBuilder};

#[derive(Parser, Debug)]
#[command(
    name = "mediagen-mcp",
    author,
    version,
    about = "MCP server for image, speech, transcription and video generation",
    after_help = "Examples:\
    \\n   mediagen-mcp                  # Serve MCP over stdio\
    \\n   mediagen-mcp tools            # Print tool definitions as JSON\
    \\n   mediagen-mcp doctor           # Show which features are configured"
)]
struct Cli {
    /// Subcommand to run (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Config profile name
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Provider API key (overrides config and environment)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Provider base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Directory for generated artifacts
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Per-request HTTP timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Serve MCP over stdin/stdout
    Serve,
    /// Print the tool definitions as JSON
    Tools,
    /// Check configuration and report enabled features
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command.clone().unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&cli).await,
        Commands::Tools => print_tools(),
        Commands::Doctor => {
            run_doctor(&cli);
            Ok(())
        }
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
    }
}

fn load_config_from_cli(cli: &Cli) -> Result<Config> {
    let profile = cli
        .profile
        .clone()
        .or_else(|| std::env::var("MEDIAGEN_PROFILE").ok());
    let mut config = Config::load(cli.config.clone(), profile.as_deref())?;
    config.apply_overrides(ConfigOverrides {
        api_key: cli.api_key.clone(),
        base_url: cli.base_url.clone(),
        output_dir: cli.output_dir.clone(),
        request_timeout_secs: cli.timeout,
    });
    config.validate()?;
    Ok(config)
}

async fn serve(cli: &Cli) -> Result<()> {
    let config = load_config_from_cli(cli)?;
    let context = ToolContext::from_config(config)?;

    let channels = context.notifier.channel_names();
    if channels.is_empty() {
        logging::warn("No notification channel configured; generate_video will be rejected");
    } else {
        logging::info(format!("Notification channels: {}", channels.join(", ")));
    }
    if context.store.is_some() {
        logging::info("Remote artifact store enabled");
    }
    logging::info(format!(
        "Artifacts are written under {}",
        context.config.output_dir().display()
    ));

    let registry = ToolRegistryBuilder::new()
        .with_media_tools()
        .build(context);
    Arc::new(McpServer::new(registry)).run_stdio().await
}

fn print_tools() -> Result<()> {
    let definitions = ToolRegistryBuilder::new().with_media_tools().definitions();
    println!("{}", serde_json::to_string_pretty(&definitions)?);
    Ok(())
}

/// Generate shell completions for the given shell
fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

fn run_doctor(cli: &Cli) {
    use colored::Colorize;

    let ok = "✓".green();
    let off = "-".yellow();

    println!("{}", "mediagen-mcp doctor".bold());
    println!("  version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = match load_config_from_cli(cli) {
        Ok(config) => {
            println!("  {ok} configuration loaded");
            config
        }
        Err(e) => {
            println!("  {} configuration error: {e:#}", "✗".red());
            return;
        }
    };

    println!();
    println!("{}", "Providers:".bold());
    match config.provider_api_key() {
        Ok(_) => println!("  {ok} provider API key set ({})", config.provider_base_url()),
        Err(_) => println!(
            "  {} provider API key missing; the server will not start",
            "✗".red()
        ),
    }
    let dedicated_video_key = config
        .video_api_key
        .as_ref()
        .is_some_and(|key| !key.trim().is_empty());
    println!(
        "  {ok} video provider {} ({})",
        config.video_base_url(),
        if dedicated_video_key {
            "dedicated key"
        } else {
            "shares provider key"
        }
    );

    println!();
    println!("{}", "Notifications:".bold());
    match config.relay_settings() {
        Some(relay) => println!("  {ok} chat relay -> {} ({})", relay.url, relay.recipient),
        None => println!("  {off} chat relay not configured"),
    }
    match config.telegram_settings() {
        Some(telegram) => println!("  {ok} telegram chat {}", telegram.chat_id),
        None => println!("  {off} telegram not configured"),
    }
    if config.relay_settings().is_none() && config.telegram_settings().is_none() {
        println!("    generate_video requires at least one channel");
    }

    println!();
    println!("{}", "Storage:".bold());
    match config.storage_settings() {
        Some(storage) => println!("  {ok} remote store {}", storage.upload_url),
        None => println!("  {off} remote store not configured (local files only)"),
    }
    println!("  output directory: {}", config.output_dir().display());

    let policy = config.poll_policy();
    println!();
    println!("{}", "Video polling:".bold());
    println!(
        "  every {}s, giving up after {}s",
        policy.interval.as_secs(),
        policy.timeout.as_secs()
    );
}
