//! Audio output.
//!
//! Playback is delegated to an external player process so the client does
//! not need to decode compressed audio itself.

use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::debug;

use crate::config::PlaybackConfig;
use crate::error::{RelayError, Result};

/// Players tried in order when no command is configured. The audio file
/// path is appended as the last argument.
const PLAYER_CANDIDATES: &[&[&str]] = &[
    &["ffplay", "-nodisp", "-autoexit", "-loglevel", "quiet"],
    &["afplay"],
    &["aplay", "-q"],
    &["paplay"],
];

/// Plays one audio resource to completion.
///
/// Dropping the future returned by [`play`](AudioSink::play) must stop
/// playback.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play `audio`, resolving when playback has finished.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Playback`] if the audio could not be played.
    async fn play(&self, audio: Bytes) -> Result<()>;
}

/// A sink that discards audio and completes immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn play(&self, _audio: Bytes) -> Result<()> {
        Ok(())
    }
}

/// Plays audio by running an external player on a temporary file.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    /// Create a sink running `program args.. <file>`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Use the configured player, or the first known player on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Playback`] if the configured command is empty or
    /// no known player is installed.
    pub fn from_config(config: &PlaybackConfig) -> Result<Self> {
        if let Some(command) = &config.command {
            let Some((program, args)) = command.split_first() else {
                return Err(RelayError::Playback("player command is empty".into()));
            };
            return Ok(Self::new(program, args.to_vec()));
        }

        PLAYER_CANDIDATES
            .iter()
            .find(|candidate| which::which(candidate[0]).is_ok())
            .map(|candidate| {
                Self::new(
                    candidate[0],
                    candidate[1..].iter().map(|a| (*a).to_owned()).collect(),
                )
            })
            .ok_or_else(|| {
                RelayError::Playback(
                    "no audio player found (install ffplay, aplay or paplay, or set playback.command)"
                        .into(),
                )
            })
    }

    /// The program this sink runs.
    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl AudioSink for CommandSink {
    async fn play(&self, audio: Bytes) -> Result<()> {
        let file = tempfile::Builder::new()
            .prefix("chat-relay-")
            .suffix(".mp3")
            .tempfile()?;
        tokio::fs::write(file.path(), &audio).await?;

        debug!(program = %self.program, bytes = audio.len(), "starting playback");
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| RelayError::Playback(format!("failed to run {}: {e}", self.program)))?;

        if status.success() {
            Ok(())
        } else {
            Err(RelayError::Playback(format!(
                "{} exited with {status}",
                self.program
            )))
        }
    }
}
