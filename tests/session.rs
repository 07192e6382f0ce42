//! Listen loop integration tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use vox_assistant::Result;
use vox_assistant::chat::{ChatBackend, ChatMessage};
use vox_assistant::config::VoiceConfig;
use vox_assistant::session::{
    Assistant, Conversation, FAREWELL, Outbox, OutboxChannel, StartOutcome, run_console,
    run_session,
};
use vox_assistant::voice::{Heard, Listener, SpeechCommand};

mod common;
use common::{EchoChat, FakeFactory, ScriptedListener, controller, eventually, silent_voice_config};

/// Chat backend that holds each reply until the test releases it
struct HeldChat {
    calls: AtomicUsize,
    release: tokio::sync::Semaphore,
    reply: &'static str,
}

#[async_trait]
impl ChatBackend for HeldChat {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.release.acquire().await {
            permit.forget();
        }
        Ok(self.reply.to_string())
    }
}

/// Panics on the first listen, then behaves like a user saying "hello"
struct FlakyListener {
    calls: AtomicUsize,
}

#[async_trait]
impl Listener for FlakyListener {
    async fn listen(&self, cancel: &CancellationToken) -> Heard {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("microphone exploded");
        }
        if self.calls.load(Ordering::SeqCst) > 2 {
            cancel.cancelled().await;
        }
        Heard::speech("hello")
    }
}

fn assistant(listener: Arc<dyn Listener>, chat: Arc<EchoChat>) -> Arc<Assistant> {
    Arc::new(Assistant::new(
        "Daniel",
        &silent_voice_config(),
        Conversation::new("You are a test assistant.", 10),
        listener,
        chat as Arc<dyn ChatBackend>,
    ))
}

#[tokio::test]
async fn test_panic_in_iteration_is_reported_and_loop_continues() {
    let chat = Arc::new(EchoChat::new());
    let assistant = assistant(
        Arc::new(FlakyListener {
            calls: AtomicUsize::new(0),
        }),
        Arc::clone(&chat),
    );
    let outbox = Arc::new(Outbox::new());
    let cancel = CancellationToken::new();

    let task = tokio::spawn(run_session(assistant, Arc::clone(&outbox), cancel.clone()));

    let mut messages = Vec::new();
    assert!(
        eventually(|| {
            messages.extend(outbox.drain());
            messages.len() >= 2
        })
        .await
    );

    assert_eq!(messages[0].channel(), OutboxChannel::Error);
    assert_eq!(messages[0].text(), "Error: microphone exploded");
    assert_eq!(messages[1].channel(), OutboxChannel::Assistant);
    assert_eq!(messages[1].text(), "echo: hello");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("loop should stop")
        .unwrap();
}

#[tokio::test]
async fn test_cancel_interrupts_pending_listen() {
    let listener = Arc::new(ScriptedListener::new());
    let assistant = assistant(Arc::clone(&listener) as Arc<dyn Listener>, Arc::new(EchoChat::new()));
    let outbox = Arc::new(Outbox::new());
    let cancel = CancellationToken::new();

    let task = tokio::spawn(run_session(assistant, Arc::clone(&outbox), cancel.clone()));
    assert!(eventually(|| listener.calls() == 1).await);

    cancel.cancel();
    tokio::time::timeout(Duration::from_millis(500), task)
        .await
        .expect("loop should stop promptly")
        .unwrap();
    assert!(outbox.drain().is_empty());
}

#[tokio::test]
async fn test_exit_phrase_cancels_token() {
    let listener = Arc::new(ScriptedListener::new());
    let assistant = assistant(Arc::clone(&listener) as Arc<dyn Listener>, Arc::new(EchoChat::new()));
    let outbox = Arc::new(Outbox::new());
    let cancel = CancellationToken::new();

    listener.hear(Heard::speech("Quit!"));
    tokio::time::timeout(
        Duration::from_secs(2),
        run_session(assistant, Arc::clone(&outbox), cancel.clone()),
    )
    .await
    .expect("exit phrase should end the loop");

    assert!(cancel.is_cancelled());
    let messages = outbox.drain();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text(), FAREWELL);
}

#[tokio::test]
async fn test_console_skips_errors_and_ends_on_exit_phrase() {
    let listener = Arc::new(ScriptedListener::new());
    let chat = Arc::new(EchoChat::new());
    let assistant = assistant(Arc::clone(&listener) as Arc<dyn Listener>, Arc::clone(&chat));

    listener.hear(Heard::error("Sorry, I didn't hear anything. Please try again."));
    listener.hear(Heard::speech("tell me a joke"));
    listener.hear(Heard::speech("goodbye"));

    tokio::time::timeout(
        Duration::from_secs(3),
        run_console(Arc::clone(&assistant), CancellationToken::new()),
    )
    .await
    .expect("console should end on exit phrase");

    assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    assert_eq!(assistant.history_len().await, 3);
}

#[cfg(unix)]
#[tokio::test]
async fn test_reply_finished_after_pause_is_not_spoken() {
    let listener = Arc::new(ScriptedListener::new());
    let chat = Arc::new(HeldChat {
        calls: AtomicUsize::new(0),
        release: tokio::sync::Semaphore::new(0),
        reply: "30",
    });
    // `sleep 30` stands in for a long utterance
    let voice = VoiceConfig {
        command: SpeechCommand::new("sleep", Vec::new()),
        ..silent_voice_config()
    };
    let assistant = Arc::new(Assistant::new(
        "Daniel",
        &voice,
        Conversation::new("You are a test assistant.", 10),
        Arc::clone(&listener) as Arc<dyn Listener>,
        Arc::clone(&chat) as Arc<dyn ChatBackend>,
    ));
    let outbox = Arc::new(Outbox::new());
    let cancel = CancellationToken::new();

    let task = tokio::spawn(run_session(
        Arc::clone(&assistant),
        Arc::clone(&outbox),
        cancel.clone(),
    ));

    listener.hear(Heard::speech("hello"));
    assert!(eventually(|| chat.calls.load(Ordering::SeqCst) == 1).await);

    assistant.pause();
    chat.release.add_permits(1);

    let mut messages = Vec::new();
    assert!(
        eventually(|| {
            messages.extend(outbox.drain());
            !messages.is_empty()
        })
        .await
    );
    assert_eq!(messages[0].text(), "30", "the reply is still queued as text");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(assistant.gate().is_paused());
    assert!(!assistant.gate().is_speaking(), "nothing is spoken while paused");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("loop should stop")
        .unwrap();
    assistant.stop_speaking();
}

#[tokio::test]
async fn test_slow_assistant_creation_does_not_stall_runtime() {
    let factory = Arc::new(FakeFactory::slow(Duration::from_millis(500)));
    let sessions = controller(Arc::clone(&factory));

    let starting = {
        let sessions = Arc::clone(&sessions);
        tokio::spawn(async move { sessions.start(None).await })
    };

    let before = std::time::Instant::now();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(
        before.elapsed() < Duration::from_millis(300),
        "device setup ran on the runtime thread"
    );

    let outcome = starting.await.unwrap().unwrap();
    assert_eq!(outcome, StartOutcome::Started);
    assert_eq!(factory.created(), 1);
    sessions.stop().await;
}
