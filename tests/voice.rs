//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use vox_assistant::voice::{
    SAMPLE_RATE, SpeechPlayer, UtteranceDetector, UtteranceState, VoiceGate, samples_to_wav,
};

mod common;
use common::silent_voice_config;

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// Feed audio in 100ms chunks, the way the listener polls
fn feed(detector: &mut UtteranceDetector, samples: &[f32]) -> bool {
    let chunk = SAMPLE_RATE as usize / 10;
    samples.chunks(chunk).any(|c| detector.process(c))
}

#[test]
fn test_detector_starts_waiting() {
    let detector = UtteranceDetector::default();
    assert_eq!(detector.state(), UtteranceState::Waiting);
    assert!(!detector.has_speech());
    assert!(detector.speech_buffer().is_empty());
}

#[test]
fn test_silence_never_completes() {
    let mut detector = UtteranceDetector::default();
    assert!(!feed(&mut detector, &generate_silence(3.0)));
    assert_eq!(detector.state(), UtteranceState::Waiting);
}

#[test]
fn test_phrase_followed_by_pause_completes() {
    let mut detector = UtteranceDetector::default();

    assert!(!feed(&mut detector, &generate_sine_samples(300.0, 1.0, 0.5)));
    assert_eq!(detector.state(), UtteranceState::Speaking);

    assert!(feed(&mut detector, &generate_silence(1.0)));
    assert_eq!(detector.state(), UtteranceState::Complete);

    let phrase = detector.take_speech_buffer();
    assert!(phrase.len() >= SAMPLE_RATE as usize);
    assert_eq!(detector.state(), UtteranceState::Waiting);
}

#[test]
fn test_short_pause_does_not_end_phrase() {
    let mut detector = UtteranceDetector::default();

    feed(&mut detector, &generate_sine_samples(300.0, 0.5, 0.5));
    assert!(!feed(&mut detector, &generate_silence(0.4)));
    feed(&mut detector, &generate_sine_samples(300.0, 0.5, 0.5));

    assert_eq!(detector.state(), UtteranceState::Speaking);
}

#[test]
fn test_calibration_raises_threshold_above_noise() {
    let mut detector = UtteranceDetector::default();
    let noise = generate_sine_samples(50.0, 0.5, 0.1);
    detector.calibrate(&noise);

    assert!(detector.threshold() > 0.07);
    assert!(!feed(&mut detector, &generate_sine_samples(50.0, 1.0, 0.1)));
    assert!(!detector.has_speech(), "ambient noise is not speech");
}

#[test]
fn test_samples_to_wav_header() {
    let samples = generate_sine_samples(440.0, 0.25, 0.5);
    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len() as usize, samples.len());
}

#[test]
fn test_samples_to_wav_clamps() {
    let wav = samples_to_wav(&[2.0, -2.0], SAMPLE_RATE).unwrap();
    let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    let decoded: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(decoded, vec![i16::MAX, i16::MIN]);
}

#[tokio::test]
async fn test_text_only_speech_leaves_gate_open() {
    let gate = Arc::new(VoiceGate::new());
    let player = SpeechPlayer::new(Arc::clone(&gate), "Daniel", &silent_voice_config());

    assert!(!player.speak("hello", false));
    assert!(!player.speak("hello", true));

    tokio::time::timeout(Duration::from_millis(100), gate.wait_open())
        .await
        .expect("gate should stay open");
}
