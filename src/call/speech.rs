//! Streamed speech playback
//!
//! Turns a block of assistant text into audible speech sentence by sentence
//! while remaining instantly interruptible. Cancellation is a generation
//! counter: every pass snapshots the counter at start and abandons its
//! remaining work the moment the live value moves on. Incrementing the
//! counter (via [`SpeechPlayer::stop`]) is the only way to stop a pass.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::{AudioOutput, CancelToken};
use crate::backends::SynthesisBackend;
use crate::call::dedup::{DedupTuning, TextDedup};

/// Sentence-by-sentence speech player with a FIFO audio queue
pub struct SpeechPlayer {
    synth: Arc<dyn SynthesisBackend>,
    output: Arc<dyn AudioOutput>,
    /// Live generation counter; a pass is valid while this equals its snapshot
    generation: Arc<AtomicU64>,
    /// Undecoded audio segments awaiting playback, strictly producer-ordered
    queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    speaking: Arc<AtomicBool>,
    synthesizing: Arc<AtomicBool>,
    dedup: Mutex<TextDedup>,
}

impl SpeechPlayer {
    /// Create a player over a synthesis backend and an audio output
    #[must_use]
    pub fn new(
        synth: Arc<dyn SynthesisBackend>,
        output: Arc<dyn AudioOutput>,
        tuning: DedupTuning,
    ) -> Self {
        Self {
            synth,
            output,
            generation: Arc::new(AtomicU64::new(0)),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            speaking: Arc::new(AtomicBool::new(false)),
            synthesizing: Arc::new(AtomicBool::new(false)),
            dedup: Mutex::new(TextDedup::new(tuning)),
        }
    }

    /// Speak a block of text, returning `true` if it was accepted.
    ///
    /// The repeated-text filter runs once, up front, for the whole block.
    /// Accepted text is split into sentence units that are synthesized in
    /// order and queued for playback; a stale generation snapshot aborts the
    /// remainder at every step. Per-sentence synthesis failures are logged
    /// and skipped — the remaining sentences still play.
    pub async fn speak(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }

        let verdict = match self.dedup.lock() {
            Ok(mut dedup) => dedup.check(trimmed),
            Err(_) => return false,
        };
        if !verdict.is_fresh() {
            tracing::debug!(?verdict, "suppressing repeated text");
            return false;
        }

        let sentences = split_sentences(trimmed);
        if sentences.is_empty() {
            return false;
        }

        let pass = self.generation.load(Ordering::SeqCst);
        tracing::debug!(pass, sentences = sentences.len(), "synthesis pass started");
        self.synthesizing.store(true, Ordering::SeqCst);

        for sentence in &sentences {
            if self.generation.load(Ordering::SeqCst) != pass {
                tracing::debug!(pass, "synthesis pass superseded");
                break;
            }

            match self.synth.synthesize(sentence).await {
                Ok(audio) if !audio.is_empty() => {
                    // The pass may have been superseded while the request was
                    // in flight; late results must not reach the queue.
                    if self.generation.load(Ordering::SeqCst) != pass {
                        tracing::debug!(pass, "discarding late synthesis result");
                        break;
                    }
                    if let Ok(mut queue) = self.queue.lock() {
                        queue.push_back(audio);
                    }
                    self.ensure_playing(pass);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, sentence = %sentence, "sentence synthesis failed, skipping");
                }
            }
        }

        self.synthesizing.store(false, Ordering::SeqCst);
        true
    }

    /// Start the playback drain task if one is not already running
    fn ensure_playing(&self, pass: u64) {
        if self.speaking.swap(true, Ordering::SeqCst) {
            return;
        }

        let queue = Arc::clone(&self.queue);
        let generation = Arc::clone(&self.generation);
        let output = Arc::clone(&self.output);
        let speaking = Arc::clone(&self.speaking);

        tokio::spawn(async move {
            loop {
                // Drain strictly in FIFO order, one segment at a time
                loop {
                    if generation.load(Ordering::SeqCst) != pass {
                        // Superseded: stop() owns the queue and status flags
                        return;
                    }

                    let next = queue.lock().ok().and_then(|mut q| q.pop_front());
                    let Some(audio) = next else { break };

                    let cancel = CancelToken::new(Arc::clone(&generation), pass);
                    if let Err(e) = output.play(audio, cancel).await {
                        tracing::warn!(error = %e, "segment playback failed, skipping");
                    }
                }

                speaking.store(false, Ordering::SeqCst);

                // A producer may have enqueued between the final pop and the
                // flag clear; reclaim the flag and keep draining if so.
                let refill = generation.load(Ordering::SeqCst) == pass
                    && queue.lock().is_ok_and(|q| !q.is_empty())
                    && !speaking.swap(true, Ordering::SeqCst);
                if !refill {
                    return;
                }
            }
        });
    }

    /// Interrupt playback.
    ///
    /// Increments the generation counter (invalidating every in-flight pass),
    /// clears the queue, halts the current segment mid-stream, and resets
    /// both status flags. Callable at any time, including when idle.
    pub fn stop(&self) {
        let superseded = self.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
        self.speaking.store(false, Ordering::SeqCst);
        self.synthesizing.store(false, Ordering::SeqCst);
        tracing::debug!(superseded, "speech stopped");
    }

    /// Whether any segment is queued or currently playing
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Whether a synthesis pass is in its network/CPU phase
    #[must_use]
    pub fn is_synthesizing(&self) -> bool {
        self.synthesizing.load(Ordering::SeqCst)
    }

    /// Whether the assistant is audibly or imminently speaking
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_speaking() || self.is_synthesizing()
    }

    /// Forget the repeated-text slot. Called when a new user utterance
    /// begins a new turn.
    pub fn reset_dedup(&self) {
        if let Ok(mut dedup) = self.dedup.lock() {
            dedup.reset();
        }
    }

    /// Current live generation value
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Number of segments awaiting playback
    #[must_use]
    pub fn queued_segments(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or_default()
    }
}

/// Split text into sentence units on terminal punctuation.
///
/// A unit ends at whitespace that follows `.`, `!`, or `?`, so consecutive
/// terminators ("Really!?") stay in one unit. Empty fragments are discarded.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut units = Vec::new();
    let mut current = String::new();
    let mut at_boundary = false;

    for ch in text.chars() {
        if ch.is_whitespace() && at_boundary {
            let unit = current.trim();
            if !unit.is_empty() {
                units.push(unit.to_string());
            }
            current.clear();
            at_boundary = false;
            continue;
        }
        if !ch.is_whitespace() {
            at_boundary = matches!(ch, '.' | '!' | '?');
        }
        current.push(ch);
    }

    let unit = current.trim();
    if !unit.is_empty() {
        units.push(unit.to_string());
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_basic() {
        assert_eq!(
            split_sentences("Dice the onion. Heat the pan! Ready?"),
            vec!["Dice the onion.", "Heat the pan!", "Ready?"]
        );
    }

    #[test]
    fn test_split_no_terminator() {
        assert_eq!(split_sentences("just one fragment"), vec!["just one fragment"]);
    }

    #[test]
    fn test_split_consecutive_terminators() {
        assert_eq!(
            split_sentences("Really!? Add it now."),
            vec!["Really!?", "Add it now."]
        );
    }

    #[test]
    fn test_split_discards_empty() {
        assert_eq!(split_sentences("   "), Vec::<String>::new());
        assert_eq!(split_sentences("One.   Two."), vec!["One.", "Two."]);
    }

    #[test]
    fn test_split_preserves_order() {
        let units = split_sentences("First. Second. Third.");
        assert_eq!(units, vec!["First.", "Second.", "Third."]);
    }
}
