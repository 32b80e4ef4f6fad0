//! Transcription capture
//!
//! Owns the microphone for the lifetime of a call, segments the stream into
//! utterances, and turns completed utterances into text. Speech onset is
//! reported immediately — before any transcription — so the orchestrator can
//! interrupt assistant playback (barge-in). Recognition keeps running while
//! the assistant speaks; the detector's raised threshold handles echo.

use std::sync::Arc;

use crate::audio::{AudioCapture, SAMPLE_RATE, SpeechDetector, VadEvent, samples_to_wav};
use crate::backends::TranscriptionBackend;
use crate::call::dedup::{DedupTuning, TextDedup};
use crate::Result;

/// Shortest transcript worth processing, in characters
const MIN_TRANSCRIPT_CHARS: usize = 2;

/// Filler-only utterances discarded as recognition noise
const FILLER_SOUNDS: &[&str] = &["uh", "um", "umm", "hmm", "hm", "mm", "ah", "er", "eh", "mhm"];

/// Where a finished transcript came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptSource {
    /// The primary recognition backend
    Recognizer,
    /// The secondary fallback backend
    Fallback,
    /// Text typed by the user (devices without usable microphone input)
    Manual,
}

/// Signals emitted by the capture loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Voice activity detected; fires before transcription completes and is
    /// never suppressed while the assistant is speaking
    SpeechStarted,
    /// A completed utterance was transcribed; exactly one per utterance
    Transcribed {
        text: String,
        source: TranscriptSource,
    },
}

/// Microphone-to-text controller
pub struct TranscriptionCapture {
    capture: Option<AudioCapture>,
    detector: SpeechDetector,
    primary: Arc<dyn TranscriptionBackend>,
    fallback: Option<Arc<dyn TranscriptionBackend>>,
    dedup: TextDedup,
    analyzing: bool,
}

impl TranscriptionCapture {
    /// Create a capture controller; the microphone is not touched until
    /// [`Self::initialize`].
    #[must_use]
    pub fn new(
        primary: Arc<dyn TranscriptionBackend>,
        fallback: Option<Arc<dyn TranscriptionBackend>>,
        tuning: DedupTuning,
    ) -> Self {
        Self {
            capture: None,
            detector: SpeechDetector::new(),
            primary,
            fallback,
            dedup: TextDedup::new(tuning),
            analyzing: false,
        }
    }

    /// Acquire the microphone and start streaming.
    ///
    /// # Errors
    ///
    /// Surfaces [`crate::Error::PermissionDenied`] and
    /// [`crate::Error::DeviceUnavailable`] to the caller without retry; the
    /// caller decides whether to fall back to manual text entry.
    pub fn initialize(&mut self) -> Result<()> {
        if self.capture.is_some() {
            return Ok(());
        }

        let mut capture = AudioCapture::new()?;
        capture.start()?;
        self.capture = Some(capture);
        self.analyzing = true;
        self.dedup.reset();

        tracing::info!("transcription capture initialized");
        Ok(())
    }

    /// Resume analyzing incoming audio (unmute)
    ///
    /// # Errors
    ///
    /// Returns error if the microphone stream cannot be restarted
    pub fn start(&mut self) -> Result<()> {
        if let Some(capture) = &mut self.capture {
            capture.start()?;
            self.analyzing = true;
            tracing::debug!("capture analysis resumed");
        }
        Ok(())
    }

    /// Stop analyzing incoming audio (mute). The microphone stream is shut
    /// off entirely; no audio is buffered while muted.
    pub fn stop(&mut self) {
        if let Some(capture) = &mut self.capture {
            capture.stop();
        }
        self.detector.reset();
        self.analyzing = false;
        tracing::debug!("capture analysis stopped");
    }

    /// Whether the microphone is held and streaming
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.analyzing && self.capture.as_ref().is_some_and(AudioCapture::is_capturing)
    }

    /// Process audio captured since the last tick.
    ///
    /// `playback_active` raises the detector's energy threshold so speaker
    /// bleed does not self-trigger. At most one speech-start and one
    /// transcription event are produced per tick.
    pub async fn poll(&mut self, playback_active: bool) -> Vec<CaptureEvent> {
        let mut events = Vec::new();

        let Some(capture) = &self.capture else {
            return events;
        };
        if !self.analyzing {
            return events;
        }

        let samples = capture.drain();
        if samples.is_empty() {
            return events;
        }

        self.detector.set_playback_active(playback_active);
        match self.detector.process(&samples) {
            Some(VadEvent::SpeechStarted) => {
                // New utterance: the previous transcript no longer dedups it
                self.dedup.reset();
                events.push(CaptureEvent::SpeechStarted);
            }
            Some(VadEvent::UtteranceComplete) => {
                let utterance = self.detector.take_utterance();
                if let Some((text, source)) = self.transcribe(&utterance).await {
                    events.push(CaptureEvent::Transcribed { text, source });
                }
            }
            None => {}
        }

        events
    }

    /// Transcribe one utterance, trying the fallback backend if the primary
    /// fails. Transient failures produce no event.
    async fn transcribe(&mut self, utterance: &[f32]) -> Option<(String, TranscriptSource)> {
        let wav = match samples_to_wav(utterance, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "utterance encoding failed");
                return None;
            }
        };

        let (raw, source) = match self.primary.recognize(&wav).await {
            Ok(text) => (text, TranscriptSource::Recognizer),
            Err(e) => {
                tracing::warn!(error = %e, "primary recognition failed");
                let fallback = self.fallback.as_ref()?;
                match fallback.recognize(&wav).await {
                    Ok(text) => {
                        tracing::debug!("fallback recognition succeeded");
                        (text, TranscriptSource::Fallback)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "fallback recognition failed");
                        return None;
                    }
                }
            }
        };

        let text = raw.trim();
        if !acceptable_transcript(text) {
            tracing::debug!(text, "discarding unusable transcript");
            return None;
        }
        if !self.dedup.check(text).is_fresh() {
            tracing::debug!(text, "discarding repeated transcript");
            return None;
        }

        tracing::info!(text, ?source, "utterance transcribed");
        Some((text.to_string(), source))
    }

    /// Release the microphone and discard all in-progress work.
    ///
    /// Safe to call multiple times and from any state.
    pub fn cleanup(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
            tracing::debug!("microphone released");
        }
        self.detector.reset();
        self.dedup.reset();
        self.analyzing = false;
    }
}

/// Reject transcripts that carry no real content
fn acceptable_transcript(text: &str) -> bool {
    if text.chars().count() < MIN_TRANSCRIPT_CHARS {
        return false;
    }

    let normalized: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let mut words = normalized.split_whitespace().peekable();
    if words.peek().is_none() {
        return false;
    }

    !words.all(|w| FILLER_SOUNDS.contains(&w))
}
