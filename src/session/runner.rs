//! Listen-respond loops
//!
//! [`run_session`] drives a server session: replies and failures go to the
//! outbox and are always spoken. [`run_console`] is the standalone mode that
//! greets the user and speaks only when a synthesizer is available.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use super::assistant::Assistant;
use super::outbox::{Outbox, OutboxMessage};

/// Words that end a session, compared after normalization
pub const EXIT_PHRASES: [&str; 4] = ["exit", "quit", "bye", "goodbye"];

/// Reply to an exit phrase
pub const FAREWELL: &str = "Goodbye! Have a great day!";

/// Spoken when console mode starts
pub const GREETING: &str = "Hello! I'm your voice assistant. How can I help you today?";

/// Pause after a failed iteration before listening again
const ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Whether `text` is an exit phrase
///
/// Surrounding whitespace and punctuation are ignored, as is case, so
/// "Goodbye." and " BYE! " both match.
#[must_use]
pub fn is_exit_phrase(text: &str) -> bool {
    let normalized = text
        .trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .to_lowercase();
    EXIT_PHRASES.contains(&normalized.as_str())
}

enum Flow {
    Continue,
    Failed,
    Exit,
    Cancelled,
}

/// Run the server listen loop until cancelled or an exit phrase is heard
///
/// An exit phrase cancels `cancel` itself before the farewell is queued.
/// A panic inside one iteration is reported to the outbox and the loop
/// carries on.
pub async fn run_session(assistant: Arc<Assistant>, outbox: Arc<Outbox>, cancel: CancellationToken) {
    tracing::info!(session = %assistant.id(), voice = assistant.voice(), "listen loop started");

    while !cancel.is_cancelled() {
        let iteration = AssertUnwindSafe(session_iteration(&assistant, &outbox, &cancel))
            .catch_unwind()
            .await;

        let flow = iteration.unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            tracing::error!(session = %assistant.id(), error = %message, "error in listen loop");
            outbox.push(OutboxMessage::error(format!("Error: {message}")));
            Flow::Failed
        });

        match flow {
            Flow::Continue => {}
            Flow::Failed => backoff(&cancel).await,
            Flow::Exit | Flow::Cancelled => break,
        }
    }

    tracing::info!(session = %assistant.id(), "listen loop stopped");
}

async fn session_iteration(assistant: &Assistant, outbox: &Outbox, cancel: &CancellationToken) -> Flow {
    let Some(heard) = listen_when_open(assistant, cancel).await else {
        return Flow::Cancelled;
    };

    if assistant.gate().is_paused() {
        tracing::debug!("paused while listening, discarding input");
        return Flow::Continue;
    }

    if is_exit_phrase(&heard.text) {
        tracing::info!(session = %assistant.id(), "exit phrase heard");
        cancel.cancel();
        outbox.push(OutboxMessage::assistant(FAREWELL));
        return Flow::Exit;
    }

    if heard.is_error {
        outbox.push(OutboxMessage::error(heard.text.clone()));
        assistant.speak(&heard.text, true);
        return Flow::Failed;
    }

    let reply = tokio::select! {
        biased;
        () = cancel.cancelled() => return Flow::Cancelled,
        reply = assistant.respond(&heard.text) => reply,
    };

    outbox.push(OutboxMessage::assistant(reply.clone()));
    if assistant.gate().is_paused() {
        tracing::debug!("paused while generating reply, not speaking it");
    } else {
        assistant.speak(&reply, true);
    }
    Flow::Continue
}

/// Run the standalone console loop until an exit phrase or cancellation
pub async fn run_console(assistant: Arc<Assistant>, cancel: CancellationToken) {
    assistant.speak(GREETING, false);

    loop {
        let Some(heard) = listen_when_open(&assistant, &cancel).await else {
            break;
        };

        if heard.is_error {
            tracing::info!(reason = %heard.text, "error in listening, skipping response");
            backoff(&cancel).await;
            continue;
        }

        if is_exit_phrase(&heard.text) {
            assistant.speak(FAREWELL, false);
            assistant.speaker().wait_until_done().await;
            break;
        }

        let reply = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            reply = assistant.respond(&heard.text) => reply,
        };
        assistant.speak(&reply, false);
    }

    assistant.stop_speaking();
    tracing::info!(session = %assistant.id(), "console session ended");
}

/// Wait for the gate to open, then listen once; `None` when cancelled
async fn listen_when_open(
    assistant: &Assistant,
    cancel: &CancellationToken,
) -> Option<crate::voice::Heard> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => return None,
        () = assistant.gate().wait_open() => {}
    }

    tracing::debug!("listening for user input");
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        heard = assistant.listen(cancel) => Some(heard),
    }
}

async fn backoff(cancel: &CancellationToken) {
    tokio::select! {
        () = cancel.cancelled() => {}
        () = tokio::time::sleep(ERROR_BACKOFF) => {}
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
