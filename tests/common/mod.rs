//! Shared test utilities
//!
//! Fakes for the microphone and the chat service so sessions can run
//! without audio hardware or network access.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use vox_assistant::chat::{ChatBackend, ChatMessage};
use vox_assistant::config::VoiceConfig;
use vox_assistant::session::{Assistant, AssistantFactory, Conversation, Outbox, SessionController};
use vox_assistant::voice::{Heard, Listener, SpeechCommand};
use vox_assistant::{Error, Result};

/// Listener fed by the test through [`ScriptedListener::hear`]
pub struct ScriptedListener {
    tx: mpsc::UnboundedSender<Heard>,
    rx: Mutex<mpsc::UnboundedReceiver<Heard>>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedListener {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Queue the next thing the microphone "hears"
    pub fn hear(&self, heard: Heard) {
        self.tx.send(heard).expect("listener receiver dropped");
    }

    /// Number of listen calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most listen calls ever in flight at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Listener for ScriptedListener {
    async fn listen(&self, cancel: &CancellationToken) -> Heard {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let heard = {
            let mut rx = self.rx.lock().await;
            tokio::select! {
                () = cancel.cancelled() => Heard::error("cancelled"),
                heard = rx.recv() => heard.unwrap_or_else(|| Heard::error("closed")),
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        heard
    }
}

/// Chat backend that echoes the last user message
pub struct EchoChat {
    pub calls: AtomicUsize,
    pub last_request_len: AtomicUsize,
}

impl EchoChat {
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            last_request_len: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChatBackend for EchoChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_request_len.store(messages.len(), Ordering::SeqCst);
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(format!("echo: {last}"))
    }
}

/// Factory sharing one scripted listener and one echo backend
pub struct FakeFactory {
    pub listener: Arc<ScriptedListener>,
    pub chat: Arc<EchoChat>,
    pub created: AtomicUsize,
    pub fail: bool,
    pub delay: Duration,
}

impl FakeFactory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            listener: Arc::new(ScriptedListener::new()),
            chat: Arc::new(EchoChat::new()),
            created: AtomicUsize::new(0),
            fail: false,
            delay: Duration::ZERO,
        }
    }

    /// Creation blocks the calling thread for `delay`, like device enumeration
    #[must_use]
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl AssistantFactory for FakeFactory {
    fn create(&self, voice: &str) -> Result<Assistant> {
        std::thread::sleep(self.delay);
        if self.fail {
            return Err(Error::Audio("no input devices".to_string()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);

        Ok(Assistant::new(
            voice,
            &silent_voice_config(),
            Conversation::new("You are a test assistant.", 10),
            Arc::clone(&self.listener) as Arc<dyn Listener>,
            Arc::clone(&self.chat) as Arc<dyn ChatBackend>,
        ))
    }
}

/// Voice settings whose synthesizer never exists, so speech is text only
#[must_use]
pub fn silent_voice_config() -> VoiceConfig {
    VoiceConfig {
        default_voice: "Daniel".to_string(),
        command: SpeechCommand::new("vox-test-missing-synthesizer", Vec::new()),
        rate: 175,
        trailing_silence: Duration::ZERO,
    }
}

/// Controller wired to `factory`
#[must_use]
pub fn controller(factory: Arc<FakeFactory>) -> Arc<SessionController> {
    Arc::new(SessionController::new(
        factory,
        Arc::new(Outbox::new()),
        "Daniel",
        Duration::from_secs(2),
    ))
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
