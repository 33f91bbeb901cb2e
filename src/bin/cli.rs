//! Terminal chat client.
//!
//! Reads one message per line and streams the reply. `/stop` aborts the
//! running turn and all speech, `/regen` regenerates the last answer,
//! `/quit` exits.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chat_relay::RelayConfig;
use chat_relay::client::{
    AudioQueue, ChatSession, CommandSink, Conversation, HttpSpeechClient, HttpTransport,
    MessageState, SessionSettings,
};
use chat_relay::llm::message::Role;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Chat with a relay server from the terminal.
#[derive(Parser)]
#[command(name = "chat-relay", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Chat endpoint URL (overrides the config file).
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Do not speak replies.
    #[arg(long)]
    no_speech: bool,
}

fn speech_queue(config: &RelayConfig) -> Option<AudioQueue> {
    if !config.speech.enabled {
        return None;
    }
    match CommandSink::from_config(&config.playback) {
        Ok(sink) => {
            info!(player = sink.program(), "speech enabled");
            Some(AudioQueue::new(
                Arc::new(HttpSpeechClient::from_config(&config.speech)),
                Arc::new(sink),
            ))
        }
        Err(e) => {
            warn!(error = %e, "speech disabled");
            None
        }
    }
}

/// Print the growing reply as snapshots arrive.
async fn print_replies(mut snapshots: watch::Receiver<Conversation>) {
    let mut shown_id = String::new();
    let mut shown_len = 0;
    let mut shown_status: Option<String> = None;
    let mut settled = true;

    while snapshots.changed().await.is_ok() {
        let conv = snapshots.borrow_and_update().clone();
        let Some(reply) = conv.messages.last().filter(|m| m.role == Role::Assistant) else {
            continue;
        };
        if reply.id != shown_id {
            shown_id = reply.id.clone();
            shown_len = 0;
            shown_status = None;
            settled = false;
        }
        if settled {
            continue;
        }

        let mut out = std::io::stdout().lock();
        if reply.thinking != shown_status {
            if let Some(status) = &reply.thinking {
                let _ = writeln!(out, "[{status}]");
            }
            shown_status = reply.thinking.clone();
        }
        match reply.state {
            MessageState::Failed => {
                let _ = writeln!(out, "\n{}", reply.content);
                settled = true;
            }
            state => {
                if let Some(fresh) = reply.content.get(shown_len..) {
                    let _ = write!(out, "{fresh}");
                    shown_len = reply.content.len();
                }
                match state {
                    MessageState::Complete => {
                        let _ = writeln!(out);
                        settled = true;
                    }
                    MessageState::Interrupted => {
                        let _ = writeln!(out, "\n[interrupted]");
                        settled = true;
                    }
                    _ => {}
                }
            }
        }
        let _ = out.flush();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => RelayConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => RelayConfig::load_or_default(&RelayConfig::default_config_path())?,
    };
    config.apply_env();
    if let Some(endpoint) = cli.endpoint {
        config.client.endpoint = endpoint;
    }
    if cli.no_speech {
        config.speech.enabled = false;
    }
    config.validate()?;

    let session = ChatSession::new(
        Arc::new(HttpTransport::new(&config.client.endpoint)),
        speech_queue(&config),
        SessionSettings::from_config(&config),
    );
    tokio::spawn(print_replies(session.subscribe()));

    println!("chat-relay v{} -> {}", env!("CARGO_PKG_VERSION"), config.client.endpoint);
    println!("Type a message. /stop aborts, /regen regenerates, /quit exits.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        match line.trim() {
            "" => {}
            "/quit" => break,
            "/stop" => session.abort(),
            "/regen" => {
                if !session.regenerate_last() {
                    println!("nothing to regenerate");
                }
            }
            text => {
                session.submit(text);
            }
        }
    }

    session.abort();
    Ok(())
}
