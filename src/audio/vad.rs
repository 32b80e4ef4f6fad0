//! Energy-based voice activity detection
//!
//! Segments the microphone stream into utterances: a speech-start transition
//! fires immediately (used for barge-in), and an utterance completes after
//! trailing silence. While assistant audio is live the energy threshold is
//! raised so playback bleed does not self-trigger.

/// Minimum RMS energy to consider a chunk speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Threshold multiplier while assistant audio is playing (echo guard)
const PLAYBACK_THRESHOLD_SCALE: f32 = 1.25;

/// Minimum accumulated speech to count as an utterance (0.3s at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Trailing silence that ends an utterance (0.5s at 16kHz)
const SILENCE_SAMPLES: usize = 8000;

/// Hard cap on utterance length (30s at 16kHz); longer input resets
const MAX_UTTERANCE_SAMPLES: usize = 480_000;

/// Detector state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VadState {
    /// Waiting for speech
    Idle,
    /// Accumulating an utterance
    Speaking,
}

/// Signals produced while processing the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    /// Voice activity just began (fires before any transcription)
    SpeechStarted,
    /// The utterance ended; take it with [`SpeechDetector::take_utterance`]
    UtteranceComplete,
}

/// Segments audio into utterances by energy
pub struct SpeechDetector {
    state: VadState,
    buffer: Vec<f32>,
    silence_run: usize,
    playback_active: bool,
}

impl Default for SpeechDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechDetector {
    /// Create an idle detector
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: VadState::Idle,
            buffer: Vec::new(),
            silence_run: 0,
            playback_active: false,
        }
    }

    /// Tell the detector whether assistant audio is currently audible.
    ///
    /// Detection keeps running either way — barge-in depends on it — but the
    /// threshold is raised so the speaker output does not trip it.
    pub const fn set_playback_active(&mut self, active: bool) {
        self.playback_active = active;
    }

    /// Feed a chunk of mono samples, returning a transition if one occurred
    pub fn process(&mut self, samples: &[f32]) -> Option<VadEvent> {
        if samples.is_empty() {
            return None;
        }

        let threshold = if self.playback_active {
            ENERGY_THRESHOLD * PLAYBACK_THRESHOLD_SCALE
        } else {
            ENERGY_THRESHOLD
        };
        let is_speech = rms_energy(samples) > threshold;

        match self.state {
            VadState::Idle => {
                if is_speech {
                    self.state = VadState::Speaking;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(samples);
                    self.silence_run = 0;
                    tracing::trace!("speech started");
                    return Some(VadEvent::SpeechStarted);
                }
            }
            VadState::Speaking => {
                self.buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_run = 0;
                } else {
                    self.silence_run += samples.len();
                }

                if self.silence_run > SILENCE_SAMPLES {
                    if self.buffer.len() - self.silence_run > MIN_SPEECH_SAMPLES {
                        tracing::debug!(samples = self.buffer.len(), "utterance complete");
                        return Some(VadEvent::UtteranceComplete);
                    }
                    // Noise blip, not an utterance
                    self.reset();
                } else if self.buffer.len() > MAX_UTTERANCE_SAMPLES {
                    tracing::debug!("utterance too long, resetting");
                    self.reset();
                }
            }
        }

        None
    }

    /// Take the completed utterance, returning the detector to idle
    pub fn take_utterance(&mut self) -> Vec<f32> {
        self.state = VadState::Idle;
        self.silence_run = 0;
        std::mem::take(&mut self.buffer)
    }

    /// Whether an utterance is currently being accumulated
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.state == VadState::Speaking
    }

    /// Return to idle, discarding any partial utterance
    pub fn reset(&mut self) {
        self.state = VadState::Idle;
        self.buffer.clear();
        self.silence_run = 0;
    }
}

/// RMS energy of a sample chunk
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
