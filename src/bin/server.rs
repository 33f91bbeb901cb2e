//! Relay server binary.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use chat_relay::RelayConfig;
use chat_relay::config::LoggingConfig;
use chat_relay::server::{RelayServer, multiplexer_from_config};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Streaming chat relay with tool calling.
#[derive(Parser)]
#[command(name = "chat-relay-server", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file; 0 picks a free port).
    #[arg(short, long)]
    port: Option<u16>,
}

/// Log to stderr, and to a daily-rolling file when a directory is set.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chat_relay=info,chat_relay_server=info"));

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "chat-relay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RelayConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => RelayConfig::load_or_default(&RelayConfig::default_config_path())?,
    };
    config.apply_env();
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;

    let _log_guard = init_logging(&config.logging);
    info!(
        upstream = %config.upstream.base_url,
        model = %config.upstream.default_model,
        "starting chat relay"
    );

    let server = RelayServer::start(&config.server, multiplexer_from_config(&config)).await?;
    info!("chat endpoint: POST {}", server.chat_url());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("received Ctrl+C, shutting down");
    server.shutdown();
    Ok(())
}
