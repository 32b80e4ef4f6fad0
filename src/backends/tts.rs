//! Text-to-speech over HTTP
//!
//! OpenAI and ElevenLabs providers behind the [`SynthesisBackend`] port.
//! Synthesis is requested one sentence at a time; each call is stateless.

use async_trait::async_trait;

use super::SynthesisBackend;
use crate::{Error, Result};

/// TTS provider backend
#[derive(Clone, Copy, Debug)]
enum TtsProvider {
    OpenAi,
    ElevenLabs,
}

/// HTTP synthesis client
pub struct TtsClient {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    speed: f32,
    model: String,
    provider: TtsProvider,
}

impl TtsClient {
    /// Create an OpenAI-backed client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn openai(api_key: String, voice: String, speed: f32, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            speed,
            model,
            provider: TtsProvider::OpenAi,
        })
    }

    /// Create an ElevenLabs-backed client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn elevenlabs(api_key: String, voice_id: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice: voice_id,
            speed: 1.0, // ElevenLabs does not take a speed parameter
            model,
            provider: TtsProvider::ElevenLabs,
        })
    }

    async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!(
                "OpenAI TTS error {status}: {body}"
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn synthesize_elevenlabs(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!("https://api.elevenlabs.io/v1/text-to-speech/{}", self.voice);

        let request = SpeechRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!(
                "ElevenLabs TTS error {status}: {body}"
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl SynthesisBackend for TtsClient {
    async fn synthesize(&self, sentence: &str) -> Result<Vec<u8>> {
        tracing::debug!(chars = sentence.len(), "synthesizing sentence");
        match self.provider {
            TtsProvider::OpenAi => self.synthesize_openai(sentence).await,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(sentence).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        assert!(TtsClient::openai(String::new(), "alloy".into(), 1.0, "tts-1".into()).is_err());
        assert!(
            TtsClient::elevenlabs(String::new(), "voice".into(), "model".into()).is_err()
        );
    }
}
