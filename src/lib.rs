//! Sous Voice - real-time voice conversation engine for the Sous cooking assistant
//!
//! This library coordinates microphone capture, speech-to-text, response
//! generation, and streamed text-to-speech playback into one coherent,
//! interruptible, half-duplex conversation loop:
//! - Transcription capture (energy VAD, barge-in signalling, STT)
//! - Response generation (turn history + memory context, duplicate guards)
//! - Speech playback (sentence-by-sentence synthesis, FIFO audio queue,
//!   generation-counter cancellation)
//! - The call orchestrator that owns turn-taking, mute, and call lifetime
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 Call Orchestrator                     │
//! │   session │ state machine │ barge-in │ duration      │
//! └────┬──────────────────┬──────────────────┬───────────┘
//!      │                  │                  │
//! ┌────▼──────┐    ┌──────▼──────┐    ┌──────▼──────┐
//! │ Capture   │    │  Generator  │    │   Player    │
//! │ mic + VAD │    │ turn log    │    │ queue+token │
//! └────┬──────┘    └──────┬──────┘    └──────┬──────┘
//!      │                  │                  │
//! ┌────▼──────────────────▼──────────────────▼───────────┐
//! │        Backends (STT │ chat completion │ TTS)        │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod backends;
pub mod call;
pub mod config;
pub mod error;

pub use config::Config;
pub use error::{Error, Result};

pub use audio::{AudioCapture, AudioOutput, CancelToken, CpalOutput, SpeechDetector, samples_to_wav};
pub use backends::{GenerationBackend, SynthesisBackend, TranscriptionBackend};
pub use call::{
    CallSession, CallState, CallStatus, CaptureEvent, ConversationTurn, DedupTuning,
    Orchestrator, ResponseGenerator, SpeechPlayer, TextDedup, TranscriptSource,
    TranscriptionCapture, TurnLog, TurnRole,
};
