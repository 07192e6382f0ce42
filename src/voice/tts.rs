//! Text-to-speech (TTS) through a platform synthesizer process
//!
//! Speech is produced by an external program (`say` on macOS, `espeak`
//! elsewhere). The player marks the session as speaking while the process
//! runs and for a short trailing silence afterwards, so the microphone does
//! not pick up the assistant's own voice.

use std::process::Stdio;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use super::gate::VoiceGate;
use crate::config::VoiceConfig;
use crate::{Error, Result};

/// Synthesizer command line with `{voice}`, `{rate}` and `{text}` placeholders
///
/// When no argument mentions `{text}`, the text is appended as the last argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechCommand {
    program: String,
    args: Vec<String>,
}

impl SpeechCommand {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `say` on macOS, `espeak` everywhere else
    #[must_use]
    pub fn platform_default() -> Self {
        let template = if cfg!(target_os = "macos") {
            "say -v {voice} -r {rate} {text}"
        } else {
            "espeak -v {voice} -s {rate} {text}"
        };
        Self::from_template(template)
    }

    fn from_template(template: &str) -> Self {
        let mut parts = template.split_whitespace().map(ToString::to_string);
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
        }
    }

    /// Program name or path
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether the program can be found on this host
    #[must_use]
    pub fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    /// Arguments with placeholders filled in
    #[must_use]
    pub fn render(&self, voice: &str, rate: u32, text: &str) -> Vec<String> {
        let rate = rate.to_string();
        let mut has_text = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                has_text |= arg.contains("{text}");
                arg.replace("{voice}", voice)
                    .replace("{rate}", &rate)
                    .replace("{text}", text)
            })
            .collect();

        if !has_text {
            args.push(text.to_string());
        }
        args
    }

    fn build(&self, voice: &str, rate: u32, text: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(self.render(voice, rate, text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

impl FromStr for SpeechCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(Error::Config("speech command must not be empty".to_string()));
        }
        Ok(Self::from_template(s))
    }
}

/// One running synthesis process
struct Utterance {
    id: u64,
    cancel: CancellationToken,
}

struct PlayerInner {
    gate: Arc<VoiceGate>,
    command: SpeechCommand,
    voice: String,
    rate: u32,
    trailing_silence: Duration,
    available: bool,
    next_id: AtomicU64,
    current: Mutex<Option<Utterance>>,
}

impl PlayerInner {
    /// Clear the speaking flag if `id` is still the current utterance
    fn finish(&self, id: u64) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|u| u.id == id) {
            *current = None;
            self.gate.set_speaking(false);
            tracing::debug!(id, "speech finished");
        }
    }
}

/// Speaks text through the synthesizer and tracks speaking state
#[derive(Clone)]
pub struct SpeechPlayer {
    inner: Arc<PlayerInner>,
}

impl SpeechPlayer {
    /// Create a player speaking with `voice`
    #[must_use]
    pub fn new(gate: Arc<VoiceGate>, voice: impl Into<String>, config: &VoiceConfig) -> Self {
        let available = config.command.is_available();
        let voice = voice.into();

        if available {
            tracing::debug!(program = config.command.program(), voice = %voice, "speech synthesis available");
        } else {
            tracing::warn!(
                program = config.command.program(),
                "speech synthesizer not found, replies will be text only unless forced"
            );
        }

        Self {
            inner: Arc::new(PlayerInner {
                gate,
                command: config.command.clone(),
                voice,
                rate: config.rate,
                trailing_silence: config.trailing_silence,
                available,
                next_id: AtomicU64::new(1),
                current: Mutex::new(None),
            }),
        }
    }

    /// Speak `text`
    ///
    /// The text is always logged. Audio is produced when the synthesizer is
    /// available or `forced` is set. A new utterance interrupts the previous
    /// one. Returns whether a synthesis process was started.
    pub fn speak(&self, text: &str, forced: bool) -> bool {
        tracing::info!(text, "assistant says");

        if !(self.inner.available || forced) {
            tracing::info!("text-to-speech not available, text only");
            return false;
        }

        let mut current = self
            .inner
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.take() {
            previous.cancel.cancel();
        }

        self.inner.gate.set_speaking(true);

        let spawned = self
            .inner
            .command
            .build(&self.inner.voice, self.inner.rate, text)
            .spawn();

        match spawned {
            Ok(child) => {
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                let cancel = CancellationToken::new();
                *current = Some(Utterance {
                    id,
                    cancel: cancel.clone(),
                });
                drop(current);

                tracing::debug!(id, voice = %self.inner.voice, "speech started");
                tokio::spawn(watch_utterance(Arc::clone(&self.inner), child, id, cancel));
                true
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    program = self.inner.command.program(),
                    "error in text-to-speech, continuing in text-only mode"
                );
                self.inner.gate.set_speaking(false);
                false
            }
        }
    }

    /// Interrupt the current utterance
    ///
    /// The speaking flag is cleared before this returns. Returns whether
    /// anything was playing.
    pub fn stop(&self) -> bool {
        let mut current = self
            .inner
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match current.take() {
            Some(utterance) => {
                utterance.cancel.cancel();
                self.inner.gate.set_speaking(false);
                tracing::debug!(id = utterance.id, "speech stopped");
                true
            }
            None => false,
        }
    }

    /// Wait until the current utterance and its trailing silence are over
    pub async fn wait_until_done(&self) {
        self.inner.gate.wait_silent().await;
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.inner.gate.is_speaking()
    }

    #[must_use]
    pub fn voice(&self) -> &str {
        &self.inner.voice
    }

    /// Whether unforced speech produces audio
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.inner.available
    }
}

/// Wait for a synthesis process, then clear the speaking flag
async fn watch_utterance(
    inner: Arc<PlayerInner>,
    mut child: Child,
    id: u64,
    cancel: CancellationToken,
) {
    tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) if !status.success() => {
                    tracing::warn!(id, %status, "speech synthesizer exited with failure");
                }
                Err(e) => tracing::warn!(id, error = %e, "failed to wait for speech synthesizer"),
                Ok(_) => {}
            }

            tokio::select! {
                () = tokio::time::sleep(inner.trailing_silence) => inner.finish(id),
                () = cancel.cancelled() => {}
            }
        }
        () = cancel.cancelled() => {
            if let Err(e) = child.kill().await {
                tracing::debug!(id, error = %e, "speech process already gone");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice_config(template: &str, trailing_ms: u64) -> VoiceConfig {
        VoiceConfig {
            default_voice: "Daniel".to_string(),
            command: template.parse().unwrap(),
            rate: 175,
            trailing_silence: Duration::from_millis(trailing_ms),
        }
    }

    #[test]
    fn render_fills_placeholders() {
        let command: SpeechCommand = "say -v {voice} -r {rate} {text}".parse().unwrap();
        assert_eq!(command.program(), "say");
        assert_eq!(
            command.render("Daniel", 175, "hello there"),
            vec!["-v", "Daniel", "-r", "175", "hello there"]
        );
    }

    #[test]
    fn render_appends_text_without_placeholder() {
        let command: SpeechCommand = "espeak -v {voice}".parse().unwrap();
        assert_eq!(command.render("en", 150, "hi"), vec!["-v", "en", "hi"]);
    }

    #[test]
    fn text_is_not_reinterpreted() {
        let command: SpeechCommand = "say {text}".parse().unwrap();
        assert_eq!(command.render("Daniel", 175, "{voice}"), vec!["{voice}"]);
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!("   ".parse::<SpeechCommand>().is_err());
    }

    #[tokio::test]
    async fn unavailable_synthesizer_is_text_only() {
        let gate = Arc::new(VoiceGate::new());
        let player = SpeechPlayer::new(
            Arc::clone(&gate),
            "Daniel",
            &voice_config("vox-no-such-synthesizer {text}", 0),
        );

        assert!(!player.is_available());
        assert!(!player.speak("hello", false));
        assert!(!gate.is_speaking());
    }

    #[tokio::test]
    async fn forced_spawn_failure_clears_speaking() {
        let gate = Arc::new(VoiceGate::new());
        let player = SpeechPlayer::new(
            Arc::clone(&gate),
            "Daniel",
            &voice_config("vox-no-such-synthesizer {text}", 0),
        );

        assert!(!player.speak("hello", true));
        assert!(!gate.is_speaking());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn speaking_clears_after_process_exits() {
        let gate = Arc::new(VoiceGate::new());
        let player = SpeechPlayer::new(Arc::clone(&gate), "Daniel", &voice_config("true", 20));

        assert!(player.speak("hello", true));
        assert!(player.is_speaking());

        tokio::time::timeout(Duration::from_secs(5), player.wait_until_done())
            .await
            .expect("speech should finish");
        assert!(!gate.is_speaking());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_interrupts_synchronously() {
        let gate = Arc::new(VoiceGate::new());
        let player = SpeechPlayer::new(Arc::clone(&gate), "Daniel", &voice_config("sleep", 0));

        assert!(player.speak("30", true));
        assert!(gate.is_speaking());

        assert!(player.stop());
        assert!(!gate.is_speaking());
        assert!(!player.stop(), "nothing left to stop");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stale_watcher_does_not_clear_newer_utterance() {
        let gate = Arc::new(VoiceGate::new());
        let player = SpeechPlayer::new(Arc::clone(&gate), "Daniel", &voice_config("sleep", 0));

        assert!(player.speak("0.05", true));
        assert!(player.speak("30", true));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(gate.is_speaking());

        player.stop();
        assert!(!gate.is_speaking());
    }
}
