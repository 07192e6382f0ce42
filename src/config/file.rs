//! TOML configuration file loading
//!
//! Supports `~/.config/vox/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Chat completion configuration
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Speech recognition configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Speech synthesis configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Microphone capture timing
    #[serde(default)]
    pub listen: ListenFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Directory holding an `index.html` that replaces the built-in page
    pub static_dir: Option<PathBuf>,
    /// Seconds `stop` waits for the listen loop to exit
    pub stop_grace_secs: Option<u64>,
}

/// Chat completion configuration
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    /// Model identifier (e.g. "gpt-3.5-turbo")
    pub model: Option<String>,
    /// OpenAI-compatible API base URL
    pub base_url: Option<String>,
    pub system_prompt: Option<String>,
    /// Turn messages kept besides the system message
    pub max_turns: Option<usize>,
}

/// Speech recognition configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// "whisper" or "deepgram"
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Spoken language hint (e.g. "en")
    pub language: Option<String>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Voice used when `/start` names none (e.g. "Daniel")
    pub default: Option<String>,
    /// Synthesizer command line with `{voice}`, `{rate}` and `{text}` placeholders
    pub command: Option<String>,
    /// Words per minute
    pub rate: Option<u32>,
    pub trailing_silence_ms: Option<u64>,
}

/// Microphone capture timing
#[derive(Debug, Default, Deserialize)]
pub struct ListenFileConfig {
    pub wait_timeout_secs: Option<u64>,
    pub phrase_limit_secs: Option<u64>,
    pub ambient_ms: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
}

impl ConfigFile {
    /// Load a config file, returning defaults when it does not exist
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let file: Self = toml::from_str(&raw)?;
        tracing::info!(path = %path.display(), "loaded config file");
        Ok(file)
    }
}

/// Default config file location (`~/.config/vox/config.toml` on Linux)
#[must_use]
pub fn default_path() -> PathBuf {
    directories::ProjectDirs::from("dev", "vox", "vox").map_or_else(
        || PathBuf::from("vox.toml"),
        |d| d.config_dir().join("config.toml"),
    )
}
