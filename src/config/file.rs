//! TOML configuration file loading
//!
//! Supports `~/.config/sous-voice/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of defaults.

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Generation configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Call session configuration
    #[serde(default)]
    pub call: CallFileConfig,

    /// Repeated-text filter tuning
    #[serde(default)]
    pub dedup: DedupFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable microphone capture
    pub capture_enabled: Option<bool>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,
}

/// Generation configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Chat model identifier
    pub model: Option<String>,

    /// Max tokens per response
    pub max_tokens: Option<u32>,

    /// System prompt override
    pub system_prompt: Option<String>,
}

/// Call session configuration
#[derive(Debug, Default, Deserialize)]
pub struct CallFileConfig {
    /// Greeting spoken at call start
    pub greeting: Option<String>,

    /// Sign-off spoken at the duration limit
    pub limit_message: Option<String>,

    /// Maximum call length in seconds
    pub max_call_secs: Option<u64>,

    /// User context string for the generation backend
    pub memory_context: Option<String>,
}

/// Repeated-text filter tuning
#[derive(Debug, Default, Deserialize)]
pub struct DedupFileConfig {
    pub speech_min_extension_chars: Option<usize>,
    pub speech_minor_ratio: Option<f32>,
    pub speech_minor_max_chars: Option<usize>,
    pub transcript_min_extension_chars: Option<usize>,
    pub transcript_minor_ratio: Option<f32>,
    pub transcript_minor_max_chars: Option<usize>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
    pub deepgram: Option<String>,
}
