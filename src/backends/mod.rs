//! Backend capability ports
//!
//! The conversation core consumes speech recognition, response generation,
//! and speech synthesis only through these three contracts. The provided
//! implementations are HTTP clients; tests substitute mocks.

mod llm;
mod stt;
mod tts;

use async_trait::async_trait;

use crate::Result;
use crate::call::ConversationTurn;

pub use llm::ChatClient;
pub use stt::SttClient;
pub use tts::TtsClient;

/// Converts captured audio into text
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe a WAV-encoded utterance
    ///
    /// # Errors
    ///
    /// Returns error if recognition fails; callers treat failures as
    /// transient.
    async fn recognize(&self, audio_wav: &[u8]) -> Result<String>;
}

/// Produces one assistant utterance from the conversation so far
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate a reply from the full turn history plus a memory/context
    /// string. Stateless per call — the core supplies full context each time.
    ///
    /// # Errors
    ///
    /// Returns error if the backend call fails
    async fn respond(&self, turns: &[ConversationTurn], memory_context: &str) -> Result<String>;
}

/// Converts one sentence of text into encoded audio
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Synthesize a sentence, returning MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails; callers skip the sentence.
    async fn synthesize(&self, sentence: &str) -> Result<Vec<u8>>;
}
