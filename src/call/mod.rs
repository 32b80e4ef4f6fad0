//! The conversation-turn core
//!
//! One call session wires four pieces together: transcription capture
//! (microphone → text, barge-in signal), the response generator (text →
//! assistant reply), the speech player (reply → audible output), and the
//! orchestrator that owns turn-taking policy and the call lifecycle.

mod dedup;
mod orchestrator;
mod respond;
mod speech;
mod transcribe;
mod turn;

pub use dedup::{DedupTuning, TextDedup, Verdict};
pub use orchestrator::{CallSession, CallState, CallStatus, Orchestrator};
pub use respond::ResponseGenerator;
pub use speech::{SpeechPlayer, split_sentences};
pub use transcribe::{CaptureEvent, TranscriptSource, TranscriptionCapture};
pub use turn::{ConversationTurn, TurnLog, TurnRole};
