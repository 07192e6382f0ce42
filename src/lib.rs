//! Vox - a local voice assistant with a browser control page
//!
//! The assistant listens on the microphone, transcribes speech, asks a chat
//! model for a reply, and speaks it through the platform synthesizer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │        Control page  /  HTTP API (axum)          │
//! │  start │ stop │ pause │ resume │ messages        │
//! └─────────────────────┬────────────────────────────┘
//!                       │
//! ┌─────────────────────▼────────────────────────────┐
//! │               Session controller                 │
//! │   one listen loop  │  outbox  │  voice gate      │
//! └─────────────────────┬────────────────────────────┘
//!                       │
//! ┌─────────────────────▼────────────────────────────┐
//! │  Microphone + STT  │  Chat API  │  Synthesizer   │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod session;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use session::{Assistant, AssistantFactory, Outbox, SessionController};
