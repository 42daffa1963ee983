//! ocr-chat
//!
//! Command-line tool that:
//! 1. Crops a photo the way a touch crop overlay would
//! 2. Runs OCR on it and shapes the text into a prompt
//! 3. Sends the prompt to one or more chat models, rotating over a pool of
//!    API keys and quarantining the ones the API rejects

mod catalog_store;
mod cli;
mod commands;
mod config;
mod conversation;
mod error;
mod metrics;
mod ocr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::commands::App;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    // Install the recorder before any command emits metrics
    let prometheus = if cli.metrics {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    let config_path = Config::resolve_path(cli.config.as_deref());
    let explicit = cli.config.is_some() || std::env::var_os("CONFIG_PATH").is_some();
    debug!(path = %config_path.display(), explicit, "loading configuration");

    let config = if explicit {
        Config::load(&config_path)
    } else {
        Config::load_or_default(&config_path)
    }
    .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        keys_path = %config.storage.keys_path.display(),
        ocr_command = %config.ocr.command,
        "configuration loaded"
    );

    let app = App::open(config).await?;
    let output = commands::run(&app, cli.command).await;

    if let Some(handle) = prometheus {
        eprintln!("{}", handle.render());
    }

    let output = output?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

/// Logs go to stderr so stdout carries only command output.
/// LOG_FORMAT=json switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
