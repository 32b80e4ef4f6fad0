//! Configuration management for the voice conversation engine

pub mod file;

use std::path::{Path, PathBuf};

use crate::call::DedupTuning;
use crate::{Error, Result};

/// Default maximum call length in seconds (10 minutes)
pub const DEFAULT_MAX_CALL_SECS: u64 = 600;

/// Voice engine configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Voice capture/synthesis configuration
    pub voice: VoiceConfig,

    /// Response generation configuration
    pub llm: LlmConfig,

    /// Call session configuration
    pub call: CallConfig,

    /// Repeated-text filter tuning
    pub dedup: DedupConfig,

    /// API keys for external services
    pub api_keys: ApiKeys,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable microphone capture (disable for manual text entry only)
    pub capture_enabled: bool,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// TTS model (e.g. "tts-1", "eleven_monolingual_v1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            capture_enabled: true,
            stt_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
        }
    }
}

/// Response generation configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Chat model identifier
    pub model: String,

    /// Max tokens per response
    pub max_tokens: u32,

    /// System prompt for the assistant persona
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            system_prompt: "You are Sous, a friendly cooking assistant on a voice call. \
                            Help with recipes, techniques, and ingredient questions. \
                            Keep responses concise and conversational."
                .to_string(),
        }
    }
}

/// Call session configuration
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Greeting spoken when a call starts (empty to skip)
    pub greeting: String,

    /// Sign-off spoken when the duration limit is reached (empty to skip)
    pub limit_message: String,

    /// Maximum call length in seconds (0 = unlimited)
    pub max_call_secs: u64,

    /// Free-form user context handed to the generation backend
    pub memory_context: String,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            greeting: "Hi! I'm Sous, your cooking assistant. What would you like to make today?"
                .to_string(),
            limit_message: "We've been cooking together for ten minutes, so I'll let you go. \
                            Call back any time you need a recipe!"
                .to_string(),
            max_call_secs: DEFAULT_MAX_CALL_SECS,
            memory_context: String::new(),
        }
    }
}

/// Repeated-text filter tuning for both filter sites
#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    /// Tuning for the synthesis path (assistant text)
    pub speech: DedupTuning,

    /// Tuning for the transcription path (user utterances)
    pub transcript: DedupTuning,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            speech: DedupTuning::speech(),
            transcript: DedupTuning::transcript(),
        }
    }
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper STT, chat completions, TTS)
    pub openai: Option<String>,

    /// `ElevenLabs` API key (TTS)
    pub elevenlabs: Option<String>,

    /// Deepgram API key (STT)
    pub deepgram: Option<String>,
}

impl Config {
    /// Load configuration: defaults, overlaid with the TOML file (if any),
    /// overlaid with environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if an explicitly given config file cannot be read or
    /// parsed. A missing default-location file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        let file_path = path.map_or_else(Self::default_config_path, |p| Some(p.to_path_buf()));

        if let Some(file_path) = file_path {
            if file_path.exists() {
                let raw = std::fs::read_to_string(&file_path)?;
                let overlay: file::ConfigFile = toml::from_str(&raw)?;
                config.apply_file(overlay);
                tracing::debug!(path = %file_path.display(), "loaded config file");
            } else if path.is_some() {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    file_path.display()
                )));
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Default config file location (`~/.config/sous-voice/config.toml`)
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "omni", "sous-voice")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Overlay values from a parsed config file
    fn apply_file(&mut self, overlay: file::ConfigFile) {
        if let Some(enabled) = overlay.voice.capture_enabled {
            self.voice.capture_enabled = enabled;
        }
        if let Some(model) = overlay.voice.stt_model {
            self.voice.stt_model = model;
        }
        if let Some(model) = overlay.voice.tts_model {
            self.voice.tts_model = model;
        }
        if let Some(voice) = overlay.voice.tts_voice {
            self.voice.tts_voice = voice;
        }
        if let Some(speed) = overlay.voice.tts_speed {
            self.voice.tts_speed = speed;
        }

        if let Some(model) = overlay.llm.model {
            self.llm.model = model;
        }
        if let Some(max_tokens) = overlay.llm.max_tokens {
            self.llm.max_tokens = max_tokens;
        }
        if let Some(prompt) = overlay.llm.system_prompt {
            self.llm.system_prompt = prompt;
        }

        if let Some(greeting) = overlay.call.greeting {
            self.call.greeting = greeting;
        }
        if let Some(msg) = overlay.call.limit_message {
            self.call.limit_message = msg;
        }
        if let Some(secs) = overlay.call.max_call_secs {
            self.call.max_call_secs = secs;
        }
        if let Some(ctx) = overlay.call.memory_context {
            self.call.memory_context = ctx;
        }

        if let Some(chars) = overlay.dedup.speech_min_extension_chars {
            self.dedup.speech.min_extension_chars = chars;
        }
        if let Some(ratio) = overlay.dedup.speech_minor_ratio {
            self.dedup.speech.minor_ratio = ratio;
        }
        if let Some(chars) = overlay.dedup.speech_minor_max_chars {
            self.dedup.speech.minor_max_chars = chars;
        }
        if let Some(chars) = overlay.dedup.transcript_min_extension_chars {
            self.dedup.transcript.min_extension_chars = chars;
        }
        if let Some(ratio) = overlay.dedup.transcript_minor_ratio {
            self.dedup.transcript.minor_ratio = ratio;
        }
        if let Some(chars) = overlay.dedup.transcript_minor_max_chars {
            self.dedup.transcript.minor_max_chars = chars;
        }

        if overlay.api_keys.openai.is_some() {
            self.api_keys.openai = overlay.api_keys.openai;
        }
        if overlay.api_keys.elevenlabs.is_some() {
            self.api_keys.elevenlabs = overlay.api_keys.elevenlabs;
        }
        if overlay.api_keys.deepgram.is_some() {
            self.api_keys.deepgram = overlay.api_keys.deepgram;
        }
    }

    /// Overlay API keys from environment variables
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.api_keys.openai = Some(key);
            }
        }
        if let Ok(key) = std::env::var("ELEVENLABS_API_KEY") {
            if !key.is_empty() {
                self.api_keys.elevenlabs = Some(key);
            }
        }
        if let Ok(key) = std::env::var("DEEPGRAM_API_KEY") {
            if !key.is_empty() {
                self.api_keys.deepgram = Some(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.voice.capture_enabled);
        assert_eq!(config.voice.stt_model, "whisper-1");
        assert_eq!(config.call.max_call_secs, DEFAULT_MAX_CALL_SECS);
        assert_eq!(config.dedup.speech.min_extension_chars, 10);
        assert_eq!(config.dedup.transcript.min_extension_chars, 5);
    }

    #[test]
    fn test_file_overlay() {
        let overlay: file::ConfigFile = toml::from_str(
            r#"
            [voice]
            tts_voice = "nova"

            [call]
            max_call_secs = 120

            [dedup]
            speech_min_extension_chars = 20
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        config.apply_file(overlay);

        assert_eq!(config.voice.tts_voice, "nova");
        assert_eq!(config.call.max_call_secs, 120);
        assert_eq!(config.dedup.speech.min_extension_chars, 20);
        // Untouched fields keep defaults
        assert_eq!(config.voice.tts_model, "tts-1");
    }
}
