//! One-shot listening: capture a phrase from the microphone and transcribe it

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::capture::{AudioCapture, SAMPLE_RATE, input_device_names, samples_to_wav};
use super::stt::SpeechToText;
use super::utterance::UtteranceDetector;
use crate::config::ListenConfig;
use crate::Result;

/// Reply when speech was captured but yielded no words
pub const NOT_UNDERSTOOD: &str =
    "Sorry, I couldn't understand that. Could you please speak more clearly?";

/// Reply when the transcription service failed
pub const RECOGNITION_FAILED: &str =
    "Sorry, there was an error with the speech recognition service. Please try again.";

/// Reply when the microphone could not be used
pub const MICROPHONE_FAILED: &str =
    "Sorry, there was an error with the microphone. Please check your microphone settings.";

/// Reply when nobody spoke before the wait timeout
pub const NOTHING_HEARD: &str = "Sorry, I didn't hear anything. Please try again.";

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of one listen: a transcript, or a user-facing failure message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heard {
    pub text: String,
    pub is_error: bool,
}

impl Heard {
    pub fn speech(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// Source of user utterances
#[async_trait]
pub trait Listener: Send + Sync {
    /// Capture and transcribe one utterance
    ///
    /// Failures are reported as [`Heard::error`], never as `Err`. Capture
    /// stops early once `cancel` fires.
    async fn listen(&self, cancel: &CancellationToken) -> Heard;
}

/// Listens on the local microphone and transcribes through [`SpeechToText`]
pub struct MicrophoneListener {
    stt: Arc<SpeechToText>,
    timing: ListenConfig,
}

impl MicrophoneListener {
    /// Create a listener after checking that input devices can be enumerated
    ///
    /// # Errors
    ///
    /// Returns error if the audio host cannot list input devices
    pub fn new(stt: Arc<SpeechToText>, timing: ListenConfig) -> Result<Self> {
        let devices = input_device_names()?;
        if devices.is_empty() {
            tracing::warn!("no input devices found, listening will fail until one is connected");
        }
        for (index, name) in devices.iter().enumerate() {
            tracing::debug!(index, name = %name, "input device");
        }

        Ok(Self { stt, timing })
    }
}

#[async_trait]
impl Listener for MicrophoneListener {
    async fn listen(&self, cancel: &CancellationToken) -> Heard {
        let timing = self.timing;
        let stop = cancel.clone();
        let captured =
            tokio::task::spawn_blocking(move || capture_phrase(timing, &stop)).await;

        let samples = match captured {
            Ok(Ok(Some(samples))) => samples,
            Ok(Ok(None)) => {
                tracing::info!("no speech detected within timeout");
                return Heard::error(NOTHING_HEARD);
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "microphone capture failed");
                return Heard::error(MICROPHONE_FAILED);
            }
            Err(e) => {
                tracing::error!(error = %e, "capture task failed");
                return Heard::error(MICROPHONE_FAILED);
            }
        };

        let wav = match samples_to_wav(&samples, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode captured audio");
                return Heard::error(MICROPHONE_FAILED);
            }
        };

        match self.stt.transcribe(&wav).await {
            Ok(text) if text.trim().is_empty() => {
                tracing::info!("transcript was empty");
                Heard::error(NOT_UNDERSTOOD)
            }
            Ok(text) => {
                tracing::info!(text = %text.trim(), "user said");
                Heard::speech(text.trim())
            }
            Err(e) => {
                tracing::error!(error = %e, "speech recognition failed");
                Heard::error(RECOGNITION_FAILED)
            }
        }
    }
}

/// Blocking capture of a single phrase
///
/// Returns `None` when no speech starts within the wait timeout or when
/// cancelled.
fn capture_phrase(timing: ListenConfig, cancel: &CancellationToken) -> Result<Option<Vec<f32>>> {
    let mut capture = AudioCapture::new()?;
    capture.start()?;

    let mut detector = UtteranceDetector::default();
    if !sleep_unless_cancelled(timing.ambient, cancel) {
        capture.stop();
        return Ok(None);
    }
    detector.calibrate(&capture.take_buffer());
    tracing::debug!(
        device = %capture.device_name(),
        threshold = detector.threshold(),
        "listening"
    );

    let started = Instant::now();
    let mut speech_started: Option<Instant> = None;

    loop {
        if cancel.is_cancelled() {
            capture.stop();
            return Ok(None);
        }

        std::thread::sleep(POLL_INTERVAL);
        if detector.process(&capture.take_buffer()) {
            break;
        }

        if detector.has_speech() {
            let since = *speech_started.get_or_insert_with(Instant::now);
            if since.elapsed() >= timing.phrase_limit {
                tracing::debug!("phrase limit reached");
                break;
            }
        } else {
            speech_started = None;
            if started.elapsed() >= timing.wait_timeout {
                capture.stop();
                return Ok(None);
            }
        }
    }

    capture.stop();
    Ok(Some(detector.take_speech_buffer()))
}

/// Sleep for `duration` in poll-sized slices; false if cancelled first
fn sleep_unless_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return true;
        }
        std::thread::sleep(left.min(POLL_INTERVAL));
    }
}
