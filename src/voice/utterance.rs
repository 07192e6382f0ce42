//! Utterance segmentation
//!
//! Finds the start and end of one spoken phrase in a stream of audio
//! chunks using RMS energy against a threshold calibrated from ambient noise.

use super::capture::{SAMPLE_RATE, rms};

/// Default energy threshold when no calibration was done
pub const DEFAULT_THRESHOLD: f32 = 0.03;

/// Calibrated thresholds never drop below this
const MIN_THRESHOLD: f32 = 0.01;

/// Ambient energy is scaled by this to get the speech threshold
const AMBIENT_RATIO: f32 = 1.5;

/// Minimum duration of speech for a phrase (0.3 seconds)
const MIN_SPEECH_SAMPLES: usize = SAMPLE_RATE as usize * 3 / 10;

/// Trailing silence that ends a phrase (0.8 seconds)
const PAUSE_SAMPLES: usize = SAMPLE_RATE as usize * 8 / 10;

/// State of the utterance detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceState {
    /// Waiting for speech to begin
    Waiting,
    /// Speech began, accumulating the phrase
    Speaking,
    /// Phrase ended with enough trailing silence
    Complete,
}

/// Segments a single utterance out of streamed audio
pub struct UtteranceDetector {
    threshold: f32,
    state: UtteranceState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
}

impl Default for UtteranceDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl UtteranceDetector {
    /// Create a detector with a fixed energy threshold
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self {
            threshold,
            state: UtteranceState::Waiting,
            speech_buffer: Vec::new(),
            silence_counter: 0,
        }
    }

    /// Set the threshold from a sample of ambient noise
    pub fn calibrate(&mut self, ambient: &[f32]) {
        let energy = rms(ambient);
        self.threshold = (energy * AMBIENT_RATIO).max(MIN_THRESHOLD);
        tracing::debug!(ambient = energy, threshold = self.threshold, "calibrated for ambient noise");
    }

    /// Process a chunk of samples
    ///
    /// Returns true once the utterance is complete
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = rms(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            UtteranceState::Waiting => {
                if is_speech {
                    self.state = UtteranceState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech started");
                }
            }
            UtteranceState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > PAUSE_SAMPLES {
                    if self.speech_buffer.len() - self.silence_counter > MIN_SPEECH_SAMPLES {
                        tracing::debug!(samples = self.speech_buffer.len(), "utterance complete");
                        self.state = UtteranceState::Complete;
                    } else {
                        tracing::trace!("noise burst, waiting again");
                        self.reset();
                    }
                }
            }
            UtteranceState::Complete => {}
        }

        self.state == UtteranceState::Complete
    }

    /// Take the captured phrase, resetting the detector
    pub fn take_speech_buffer(&mut self) -> Vec<f32> {
        let buffer = std::mem::take(&mut self.speech_buffer);
        self.reset();
        buffer
    }

    /// Captured phrase so far
    #[must_use]
    pub fn speech_buffer(&self) -> &[f32] {
        &self.speech_buffer
    }

    /// Whether speech has begun
    #[must_use]
    pub fn has_speech(&self) -> bool {
        self.state != UtteranceState::Waiting
    }

    /// Reset detector to waiting, keeping the threshold
    pub fn reset(&mut self) {
        self.state = UtteranceState::Waiting;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> UtteranceState {
        self.state
    }

    /// Current energy threshold
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_has_a_floor() {
        let mut detector = UtteranceDetector::default();
        detector.calibrate(&[0.0; 1600]);
        assert!((detector.threshold() - MIN_THRESHOLD).abs() < f32::EPSILON);

        detector.calibrate(&[0.1; 1600]);
        assert!(detector.threshold() > 0.14);
    }

    #[test]
    fn short_noise_burst_is_discarded() {
        let mut detector = UtteranceDetector::default();
        // 0.1s of noise then a long pause
        assert!(!detector.process(&[0.5; 1600]));
        assert_eq!(detector.state(), UtteranceState::Speaking);
        assert!(!detector.process(&[0.0; 16000]));
        assert_eq!(detector.state(), UtteranceState::Waiting);
        assert!(detector.speech_buffer().is_empty());
    }
}
