//! Configuration management for the voice assistant
//!
//! Values are resolved in order: command-line overrides, environment,
//! config file, built-in defaults. The chat API key is the only required
//! value; loading fails fast without it.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::voice::{SpeechCommand, SttProvider};
use crate::{Error, Result};

pub use file::ConfigFile;

/// Port used when neither `--port`, `PORT` nor the config file set one
pub const DEFAULT_PORT: u16 = 3000;

/// Voice used when `/start` does not name one
pub const DEFAULT_VOICE: &str = "Daniel";

/// System preamble for every conversation
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful voice assistant. Keep responses concise and conversational. Avoid repeating the same responses.";

/// Voice assistant configuration
#[derive(Debug)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Chat completion configuration
    pub chat: ChatConfig,

    /// Speech recognition configuration
    pub stt: SttConfig,

    /// Speech synthesis configuration
    pub voice: VoiceConfig,

    /// Microphone capture timing
    pub listen: ListenConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Path to a directory with a replacement control page
    pub static_dir: Option<PathBuf>,

    /// How long `stop` waits for the listen loop to exit
    pub stop_grace: Duration,
}

/// Chat completion configuration
#[derive(Debug)]
pub struct ChatConfig {
    /// API credential (from `OPENAI_API_KEY`)
    pub api_key: SecretString,

    /// Model identifier
    pub model: String,

    /// OpenAI-compatible base URL
    pub base_url: String,

    /// System preamble kept at the head of the history
    pub system_prompt: String,

    /// Turn messages kept besides the system message
    pub max_turns: usize,
}

/// Speech recognition configuration
#[derive(Debug)]
pub struct SttConfig {
    /// Recognition backend
    pub provider: SttProvider,

    /// Provider model (e.g. "whisper-1", "nova-2")
    pub model: String,

    /// Spoken language hint
    pub language: String,

    /// Deepgram credential, required only for the Deepgram provider
    pub deepgram_api_key: Option<SecretString>,
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Voice used when a session does not pick one
    pub default_voice: String,

    /// Synthesizer command template
    pub command: SpeechCommand,

    /// Speaking rate in words per minute
    pub rate: u32,

    /// Silence kept after playback before listening resumes
    pub trailing_silence: Duration,
}

/// Microphone capture timing
#[derive(Debug, Clone, Copy)]
pub struct ListenConfig {
    /// How long to wait for speech to begin
    pub wait_timeout: Duration,

    /// Longest phrase captured once speech began
    pub phrase_limit: Duration,

    /// Ambient noise sampling before each capture
    pub ambient: Duration,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(10),
            phrase_limit: Duration::from_secs(15),
            ambient: Duration::from_millis(500),
        }
    }
}

/// Values given on the command line; they win over everything else
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub voice: Option<String>,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// A `.env` file in the working directory is read first, if present.
    ///
    /// # Errors
    ///
    /// Returns error if the config file is malformed or `OPENAI_API_KEY` is missing
    pub fn load(overrides: &Overrides) -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }

        let path = overrides
            .config_path
            .clone()
            .unwrap_or_else(file::default_path);
        let file = ConfigFile::load(&path)?;

        Self::resolve(file, |key| std::env::var(key).ok(), overrides)
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the chat API key is missing or a value is invalid
    pub fn resolve(
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
        overrides: &Overrides,
    ) -> Result<Self> {
        let openai_key = env("OPENAI_API_KEY")
            .or(file.api_keys.openai)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("OPENAI_API_KEY not found in environment".to_string()))?;

        let port = match overrides.port {
            Some(port) => port,
            None => match env("PORT") {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid PORT value: {raw}")))?,
                None => file.server.port.unwrap_or(DEFAULT_PORT),
            },
        };

        let server = ServerConfig {
            host: overrides
                .host
                .clone()
                .or_else(|| env("VOX_HOST"))
                .or(file.server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            static_dir: env("VOX_STATIC_DIR")
                .map(PathBuf::from)
                .or(file.server.static_dir),
            stop_grace: Duration::from_secs(file.server.stop_grace_secs.unwrap_or(2)),
        };

        let chat = ChatConfig {
            api_key: SecretString::from(openai_key),
            model: env("VOX_CHAT_MODEL")
                .or(file.chat.model)
                .unwrap_or_else(|| "gpt-3.5-turbo".to_string()),
            base_url: env("VOX_CHAT_BASE_URL")
                .or(file.chat.base_url)
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            system_prompt: file
                .chat
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_turns: file.chat.max_turns.unwrap_or(10),
        };

        let provider: SttProvider = env("VOX_STT_PROVIDER")
            .or(file.stt.provider)
            .as_deref()
            .unwrap_or("whisper")
            .parse()?;
        let stt = SttConfig {
            provider,
            model: env("VOX_STT_MODEL")
                .or(file.stt.model)
                .unwrap_or_else(|| provider.default_model().to_string()),
            language: file.stt.language.unwrap_or_else(|| "en".to_string()),
            deepgram_api_key: env("DEEPGRAM_API_KEY")
                .or(file.api_keys.deepgram)
                .map(SecretString::from),
        };

        let command = match env("VOX_SPEECH_COMMAND").or(file.voice.command) {
            Some(template) => template.parse()?,
            None => SpeechCommand::platform_default(),
        };
        let rate = match env("VOX_SPEECH_RATE") {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid VOX_SPEECH_RATE value: {raw}")))?,
            None => file.voice.rate.unwrap_or(175),
        };
        let voice = VoiceConfig {
            default_voice: overrides
                .voice
                .clone()
                .or_else(|| env("VOX_VOICE"))
                .or(file.voice.default)
                .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            command,
            rate,
            trailing_silence: Duration::from_millis(file.voice.trailing_silence_ms.unwrap_or(300)),
        };

        let defaults = ListenConfig::default();
        let listen = ListenConfig {
            wait_timeout: file
                .listen
                .wait_timeout_secs
                .map_or(defaults.wait_timeout, Duration::from_secs),
            phrase_limit: file
                .listen
                .phrase_limit_secs
                .map_or(defaults.phrase_limit, Duration::from_secs),
            ambient: file
                .listen
                .ambient_ms
                .map_or(defaults.ambient, Duration::from_millis),
        };

        Ok(Self {
            server,
            chat,
            stt,
            voice,
            listen,
        })
    }
}
