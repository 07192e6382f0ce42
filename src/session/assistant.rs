//! One voice assistant instance: listener, chat backend, speech, and history

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::conversation::Conversation;
use crate::Result;
use crate::chat::{ChatBackend, OpenAiChat};
use crate::config::{Config, ListenConfig, VoiceConfig};
use crate::voice::{Heard, Listener, MicrophoneListener, SpeechPlayer, SpeechToText, VoiceGate};

/// A configured assistant bound to one voice
pub struct Assistant {
    id: Uuid,
    started_at: DateTime<Utc>,
    gate: Arc<VoiceGate>,
    speaker: SpeechPlayer,
    listener: Arc<dyn Listener>,
    chat: Arc<dyn ChatBackend>,
    history: Mutex<Conversation>,
}

impl Assistant {
    #[must_use]
    pub fn new(
        voice: &str,
        voice_config: &VoiceConfig,
        history: Conversation,
        listener: Arc<dyn Listener>,
        chat: Arc<dyn ChatBackend>,
    ) -> Self {
        let gate = Arc::new(VoiceGate::new());
        let speaker = SpeechPlayer::new(Arc::clone(&gate), voice, voice_config);
        let id = Uuid::new_v4();

        tracing::info!(session = %id, voice, "assistant created");

        Self {
            id,
            started_at: Utc::now(),
            gate,
            speaker,
            listener,
            chat,
            history: Mutex::new(history),
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn voice(&self) -> &str {
        self.speaker.voice()
    }

    #[must_use]
    pub fn gate(&self) -> &VoiceGate {
        &self.gate
    }

    #[must_use]
    pub const fn speaker(&self) -> &SpeechPlayer {
        &self.speaker
    }

    /// Capture and transcribe one utterance
    pub async fn listen(&self, cancel: &CancellationToken) -> Heard {
        self.listener.listen(cancel).await
    }

    /// Speak `text`; see [`SpeechPlayer::speak`]
    pub fn speak(&self, text: &str, forced: bool) -> bool {
        self.speaker.speak(text, forced)
    }

    /// Generate a reply to `input`, recording both sides in the history
    ///
    /// Chat failures become an apology rather than an error; the failed
    /// user turn stays in the history.
    pub async fn respond(&self, input: &str) -> String {
        let mut history = self.history.lock().await;
        history.push_user(input);

        match self.chat.complete(&history.messages()).await {
            Ok(reply) => {
                history.push_assistant(reply.clone());
                reply
            }
            Err(e) => {
                tracing::error!(session = %self.id, error = %e, "failed to generate response");
                format!("Sorry, I encountered an error: {e}")
            }
        }
    }

    /// Number of messages in the history, preamble included
    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }

    /// Stop listening after the current capture and silence any speech
    pub fn pause(&self) {
        self.gate.set_paused(true);
        self.speaker.stop();
        tracing::info!(session = %self.id, "paused");
    }

    pub fn resume(&self) {
        self.gate.set_paused(false);
        tracing::info!(session = %self.id, "resumed");
    }

    /// Interrupt current speech; returns whether anything was playing
    pub fn stop_speaking(&self) -> bool {
        let stopped = self.speaker.stop();
        tracing::info!(session = %self.id, stopped, "stop speaking requested");
        stopped
    }
}

/// Builds assistants for new sessions
pub trait AssistantFactory: Send + Sync {
    /// Create an assistant speaking with `voice`
    ///
    /// # Errors
    ///
    /// Returns error if audio or service clients cannot be initialized
    fn create(&self, voice: &str) -> Result<Assistant>;
}

/// Assistants backed by the microphone, the STT service, and the chat API
pub struct VoiceAssistantFactory {
    stt: Arc<SpeechToText>,
    chat: Arc<dyn ChatBackend>,
    voice: VoiceConfig,
    listen: ListenConfig,
    system_prompt: String,
    max_turns: usize,
}

impl VoiceAssistantFactory {
    /// Build service clients from configuration
    ///
    /// # Errors
    ///
    /// Returns error if a service client cannot be created
    pub fn from_config(config: &Config) -> Result<Self> {
        let stt = SpeechToText::new(&config.stt, &config.chat.api_key)?;
        let chat = OpenAiChat::new(&config.chat)?;

        Ok(Self {
            stt: Arc::new(stt),
            chat: Arc::new(chat),
            voice: config.voice.clone(),
            listen: config.listen,
            system_prompt: config.chat.system_prompt.clone(),
            max_turns: config.chat.max_turns,
        })
    }
}

impl AssistantFactory for VoiceAssistantFactory {
    fn create(&self, voice: &str) -> Result<Assistant> {
        let listener = MicrophoneListener::new(Arc::clone(&self.stt), self.listen)?;

        Ok(Assistant::new(
            voice,
            &self.voice,
            Conversation::new(self.system_prompt.clone(), self.max_turns),
            Arc::new(listener),
            Arc::clone(&self.chat),
        ))
    }
}
