//! Voice processing module
//!
//! Microphone capture, utterance detection, transcription, and spoken
//! replies through the platform synthesizer.

mod capture;
mod gate;
mod listener;
mod stt;
mod tts;
mod utterance;

pub use capture::{AudioCapture, SAMPLE_RATE, input_device_names, rms, samples_to_wav};
pub use gate::{GateState, VoiceGate};
pub use listener::{
    Heard, Listener, MICROPHONE_FAILED, MicrophoneListener, NOT_UNDERSTOOD, NOTHING_HEARD,
    RECOGNITION_FAILED,
};
pub use stt::{SpeechToText, SttProvider};
pub use tts::{SpeechCommand, SpeechPlayer};
pub use utterance::{DEFAULT_THRESHOLD, UtteranceDetector, UtteranceState};
