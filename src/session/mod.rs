//! Assistant sessions
//!
//! A session is one assistant plus the background loop that listens,
//! asks the chat backend, and speaks. The [`SessionController`] makes sure
//! only one loop runs at a time; the [`Outbox`] carries its output to
//! whoever polls for it.

mod assistant;
mod controller;
mod conversation;
mod outbox;
mod runner;

pub use assistant::{Assistant, AssistantFactory, VoiceAssistantFactory};
pub use controller::{SessionController, SessionSnapshot, StartOutcome};
pub use conversation::Conversation;
pub use outbox::{Outbox, OutboxChannel, OutboxMessage};
pub use runner::{EXIT_PHRASES, FAREWELL, GREETING, is_exit_phrase, run_console, run_session};
