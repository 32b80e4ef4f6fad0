//! Error types for the voice conversation engine

use thiserror::Error;

/// Result type alias for voice engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice conversation engine
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone access was denied by the user or OS
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// No usable audio device was found
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Speech recognition error (transient, non-fatal)
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Response generation error (backend/network)
    #[error("generation error: {0}")]
    Generation(String),

    /// Speech synthesis error (per-sentence, non-fatal)
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio playback error (decode/output)
    #[error("playback error: {0}")]
    Playback(String),

    /// Audio capture/encoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Call session error
    #[error("call error: {0}")]
    Call(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
