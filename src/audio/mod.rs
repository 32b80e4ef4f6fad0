//! Audio input/output
//!
//! Microphone capture, energy-based speech detection, and interruptible
//! playback. Backend-bound audio (WAV upload, MP3 download) is encoded and
//! decoded here.

mod capture;
mod playback;
mod vad;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use playback::{AudioOutput, CancelToken, CpalOutput, PLAYBACK_SAMPLE_RATE};
pub use vad::{SpeechDetector, VadEvent, rms_energy};
