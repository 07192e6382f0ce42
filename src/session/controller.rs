//! Session lifecycle: at most one listen loop per process

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::assistant::{Assistant, AssistantFactory};
use super::outbox::Outbox;
use super::runner::run_session;
use crate::{Error, Result};

/// What `start` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Point-in-time view of the session for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub listening: bool,
    pub session_id: Option<Uuid>,
    pub voice: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub speaking: bool,
    pub paused: bool,
}

struct LoopTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl LoopTask {
    fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

/// Owns the assistant and its listen loop
///
/// The assistant outlives `stop` so that pause, resume, and stop-speaking
/// keep acting on it; it is replaced by the next successful `start`.
pub struct SessionController {
    factory: Arc<dyn AssistantFactory>,
    outbox: Arc<Outbox>,
    default_voice: String,
    stop_grace: Duration,
    assistant: Mutex<Option<Arc<Assistant>>>,
    task: tokio::sync::Mutex<Option<LoopTask>>,
}

impl SessionController {
    #[must_use]
    pub fn new(
        factory: Arc<dyn AssistantFactory>,
        outbox: Arc<Outbox>,
        default_voice: impl Into<String>,
        stop_grace: Duration,
    ) -> Self {
        Self {
            factory,
            outbox,
            default_voice: default_voice.into(),
            stop_grace,
            assistant: Mutex::new(None),
            task: tokio::sync::Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    /// Start a session unless one is already listening
    ///
    /// A blank or missing voice falls back to the default voice.
    ///
    /// # Errors
    ///
    /// Returns error if the assistant cannot be created; nothing changes then
    pub async fn start(&self, voice: Option<String>) -> Result<StartOutcome> {
        let mut task = self.task.lock().await;

        if task.as_ref().is_some_and(LoopTask::is_running) {
            tracing::info!("start requested while already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        // A loop that ended itself may still be unwinding
        if let Some(previous) = task.take() {
            self.shutdown(previous).await;
        }

        let voice = voice
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.default_voice.clone());

        // Device enumeration blocks
        let factory = Arc::clone(&self.factory);
        let created = {
            let voice = voice.clone();
            tokio::task::spawn_blocking(move || factory.create(&voice))
                .await
                .unwrap_or_else(|e| Err(Error::from(e)))
        };
        let assistant = match created {
            Ok(assistant) => Arc::new(assistant),
            Err(e) => {
                tracing::error!(error = %e, voice = %voice, "failed to initialize assistant");
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_session(
            Arc::clone(&assistant),
            Arc::clone(&self.outbox),
            cancel.clone(),
        ));

        if let Some(previous) = self.replace_assistant(assistant) {
            previous.stop_speaking();
        }
        *task = Some(LoopTask { cancel, handle });

        tracing::info!(voice = %voice, "session started");
        Ok(StartOutcome::Started)
    }

    /// Stop the listen loop and wait for it to exit
    ///
    /// Safe to call when nothing is running. The loop is aborted if it does
    /// not finish within the grace period.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        if let Some(running) = task.take() {
            self.shutdown(running).await;
            tracing::info!("session stopped");
        }
    }

    async fn shutdown(&self, task: LoopTask) {
        task.cancel.cancel();
        let mut handle = task.handle;

        match tokio::time::timeout(self.stop_grace, &mut handle).await {
            Ok(Ok(())) => tracing::debug!("listen loop exited"),
            Ok(Err(e)) => tracing::warn!(error = %e, "listen loop ended abnormally"),
            Err(_) => {
                tracing::warn!(
                    grace_ms = self.stop_grace.as_millis(),
                    "listen loop did not stop in time, aborting"
                );
                handle.abort();
            }
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before the first successful start
    pub fn pause(&self) -> Result<()> {
        self.current()?.pause();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before the first successful start
    pub fn resume(&self) -> Result<()> {
        self.current()?.resume();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before the first successful start
    pub fn stop_speaking(&self) -> Result<()> {
        self.current()?.stop_speaking();
        Ok(())
    }

    /// Whether a listen loop is running
    pub async fn is_listening(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(LoopTask::is_running)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let listening = self.is_listening().await;
        let assistant = self.current().ok();
        let gate = assistant.as_ref().map(|a| a.gate().state()).unwrap_or_default();

        SessionSnapshot {
            listening,
            session_id: assistant.as_ref().map(|a| a.id()),
            voice: assistant.as_ref().map(|a| a.voice().to_string()),
            started_at: assistant.as_ref().map(|a| a.started_at()),
            speaking: gate.speaking,
            paused: gate.paused,
        }
    }

    fn current(&self) -> Result<Arc<Assistant>> {
        self.assistant
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::NotInitialized)
    }

    fn replace_assistant(&self, assistant: Arc<Assistant>) -> Option<Arc<Assistant>> {
        self.assistant
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(assistant)
    }
}
