//! Configuration types for the relay server and the chat client.
//!
//! Everything lives in one TOML file so both binaries can share it:
//!
//! ```toml
//! [server]
//! port = 3000
//!
//! [upstream]
//! base_url = "https://api.siliconflow.cn/v1"
//! default_model = "Qwen/Qwen3-8B"
//!
//! [speech]
//! voice = "曼波"
//! ```
//!
//! Secrets are normally supplied through the environment instead; see
//! [`RelayConfig::apply_env`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RelayError, Result};

/// Marker prefixed to a message whose head was cut to fit the context budget.
pub const DEFAULT_TRUNCATION_MARKER: &str = "...[content truncated]...\n";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Completion provider settings.
    pub upstream: UpstreamConfig,
    /// Context window budget.
    pub context: ContextConfig,
    /// Tool endpoints and limits.
    pub tools: ToolsConfig,
    /// Speech synthesis settings (client).
    pub speech: SpeechConfig,
    /// Audio output settings (client).
    pub playback: PlaybackConfig,
    /// Chat client settings.
    pub client: ClientConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port (0 = auto-assign).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 3000,
        }
    }
}

/// Completion provider configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL including the version segment.
    pub base_url: String,
    /// API key. Usually left unset here and supplied via the environment.
    pub api_key: Option<String>,
    /// Model used when a request does not name one.
    pub default_model: String,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.siliconflow.cn/v1".to_owned(),
            api_key: None,
            default_model: "Qwen/Qwen3-8B".to_owned(),
            connect_timeout_secs: 10,
        }
    }
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("default_model", &self.default_model)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Context window budget applied before every upstream request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum characters across the system prompt and history.
    pub max_chars: usize,
    /// Prefix for a message whose head was cut.
    pub truncation_marker: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_chars: 8000,
            truncation_marker: DEFAULT_TRUNCATION_MARKER.to_owned(),
        }
    }
}

/// Tool endpoints and limits.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Serper-compatible search endpoint.
    pub serper_url: String,
    /// Search API key (`X-API-KEY`).
    pub serper_api_key: Option<String>,
    /// Daily news endpoint; `?platform=` is appended.
    pub news_url: String,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Upper bound on a tool result before it goes back to the model.
    pub max_result_bytes: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            serper_url: "https://google.serper.dev/search".to_owned(),
            serper_api_key: None,
            news_url: "https://orz.ai/api/v1/dailynews/".to_owned(),
            timeout_secs: 15,
            max_result_bytes: crate::tools::types::DEFAULT_MAX_BYTES,
        }
    }
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("serper_url", &self.serper_url)
            .field(
                "serper_api_key",
                &self.serper_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("news_url", &self.news_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_result_bytes", &self.max_result_bytes)
            .finish()
    }
}

/// Speech synthesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Whether answers are spoken at all.
    pub enabled: bool,
    /// Speech service URL (`module=audio&text=..&voice=..` is appended).
    pub base_url: String,
    /// Voice identifier.
    pub voice: String,
    /// Longest text span sent in one synthesis request, in characters.
    pub max_segment_chars: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.cenguigui.cn/api/speech/AiChat/".to_owned(),
            voice: "体虚生".to_owned(),
            max_segment_chars: 180,
            timeout_secs: 30,
        }
    }
}

/// Audio output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Player command, e.g. `["mpv", "--no-video"]`. The audio file path is
    /// appended. `None` picks the first installed known player.
    pub command: Option<Vec<String>>,
}

/// Chat client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay endpoint URL.
    pub endpoint: String,
    /// Model requested for every turn.
    pub model_id: String,
    /// System prompt sent with every turn.
    pub system_prompt: Option<String>,
    /// Offer tools to the model.
    pub use_tools: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:3000/api/chat".to_owned(),
            model_id: "Qwen/Qwen3-8B".to_owned(),
            system_prompt: None,
            use_tools: true,
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily-rolling log files. `None` logs to stderr only.
    pub directory: Option<PathBuf>,
}

impl RelayConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| RelayError::Config(e.to_string()))
    }

    /// Load from `path` if it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| RelayError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/chat-relay/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("chat-relay")
            .join("config.toml")
    }

    /// Fill secrets from the process environment.
    ///
    /// `CHAT_RELAY_API_KEY` (or `SILICONFLOW_API_KEY`) sets the upstream key
    /// and `SERPER_API_KEY` the search key. Non-empty variables win over the
    /// file.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// [`apply_env`](Self::apply_env) with an injectable lookup.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("CHAT_RELAY_API_KEY").or_else(|| non_empty("SILICONFLOW_API_KEY"))
        {
            self.upstream.api_key = Some(key);
        }
        if let Some(key) = non_empty("SERPER_API_KEY") {
            self.tools.serper_api_key = Some(key);
        }
    }

    /// Check values that would otherwise fail later at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.upstream.base_url.trim().is_empty() {
            return Err(RelayError::Config("upstream.base_url must not be empty".into()));
        }
        if self.context.max_chars == 0 {
            return Err(RelayError::Config("context.max_chars must be > 0".into()));
        }
        if self.speech.max_segment_chars == 0 {
            return Err(RelayError::Config(
                "speech.max_segment_chars must be > 0".into(),
            ));
        }
        if let Some(command) = &self.playback.command
            && command.is_empty()
        {
            return Err(RelayError::Config(
                "playback.command must name a program".into(),
            ));
        }
        Ok(())
    }

    /// The upstream API key, if one is configured and non-blank.
    pub fn upstream_api_key(&self) -> Option<&str> {
        self.upstream
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.context.max_chars, 8000);
        assert_eq!(config.speech.max_segment_chars, 180);
        assert_eq!(config.context.truncation_marker, DEFAULT_TRUNCATION_MARKER);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            [server]
            port = 0

            [speech]
            voice = "曼波"
            "#,
        )
        .unwrap_or_default();
        assert_eq!(config.server.port, 0);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.speech.voice, "曼波");
        assert!(config.speech.enabled);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir();
        assert!(dir.is_ok());
        let Ok(dir) = dir else { return };
        let path = dir.path().join("nested").join("config.toml");

        let mut config = RelayConfig::default();
        config.client.use_tools = false;
        config.playback.command = Some(vec!["mpv".into(), "--no-video".into()]);
        assert!(config.save_to_file(&path).is_ok());

        let loaded = RelayConfig::from_file(&path);
        assert!(loaded.is_ok());
        if let Ok(loaded) = loaded {
            assert!(!loaded.client.use_tools);
            assert_eq!(
                loaded.playback.command,
                Some(vec!["mpv".to_owned(), "--no-video".to_owned()])
            );
        }
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = RelayConfig::from_file(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(RelayError::Io(_))));
    }

    #[test]
    fn from_file_invalid_toml_returns_config_error() {
        let Ok(dir) = tempfile::tempdir() else { return };
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").ok();
        assert!(matches!(
            RelayConfig::from_file(&path),
            Err(RelayError::Config(_))
        ));
    }

    #[test]
    fn load_or_default_missing_file() {
        let config = RelayConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert!(config.is_ok_and(|c| c.server.port == 3000));
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = RelayConfig::default_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("config.toml"));
        assert!(path_str.contains("chat-relay"));
    }

    // ── environment ───────────────────────────────────────────

    #[test]
    fn env_primary_key_wins_over_fallback() {
        let mut config = RelayConfig::default();
        config.apply_env_with(|k| match k {
            "CHAT_RELAY_API_KEY" => Some("primary".into()),
            "SILICONFLOW_API_KEY" => Some("fallback".into()),
            _ => None,
        });
        assert_eq!(config.upstream_api_key(), Some("primary"));
    }

    #[test]
    fn env_fallback_and_serper_key() {
        let mut config = RelayConfig::default();
        config.apply_env_with(|k| match k {
            "CHAT_RELAY_API_KEY" => Some("  ".into()),
            "SILICONFLOW_API_KEY" => Some("fallback".into()),
            "SERPER_API_KEY" => Some("serp".into()),
            _ => None,
        });
        assert_eq!(config.upstream_api_key(), Some("fallback"));
        assert_eq!(config.tools.serper_api_key.as_deref(), Some("serp"));
    }

    #[test]
    fn env_absent_keeps_file_values() {
        let mut config = RelayConfig::default();
        config.upstream.api_key = Some("from-file".into());
        config.apply_env_with(|_| None);
        assert_eq!(config.upstream_api_key(), Some("from-file"));
    }

    // ── validation ────────────────────────────────────────────

    #[test]
    fn validate_rejects_empty_base_url() {
        let mut config = RelayConfig::default();
        config.upstream.base_url = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_budgets() {
        let mut config = RelayConfig::default();
        config.context.max_chars = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.speech.max_segment_chars = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_player_command() {
        let mut config = RelayConfig::default();
        config.playback.command = Some(Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_keys() {
        let mut config = RelayConfig::default();
        config.upstream.api_key = Some("sk-secret".into());
        config.tools.serper_api_key = Some("serp-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("serp-secret"));
    }
}
