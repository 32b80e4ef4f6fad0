//! Repeated-text filtering
//!
//! Streaming recognition and generation both re-deliver text: the same
//! utterance twice, a growing prefix as tokens stream in, or a cosmetic
//! rewording. A single slot holding the last processed text is enough to
//! classify each arrival; the thresholds are tuning constants with no
//! derivation beyond matching the upstream backends' observed behavior.

/// Thresholds for the repeated-text filter
#[derive(Debug, Clone, Copy)]
pub struct DedupTuning {
    /// A prefix-extension must add more than this many characters
    pub min_extension_chars: usize,

    /// Below this relative length difference, a rewording is cosmetic
    pub minor_ratio: f32,

    /// Cosmetic rewording also requires fewer than this many changed chars
    pub minor_max_chars: usize,
}

impl DedupTuning {
    /// Defaults for the synthesis path (assistant text)
    #[must_use]
    pub const fn speech() -> Self {
        Self {
            min_extension_chars: 10,
            minor_ratio: 0.2,
            minor_max_chars: 100,
        }
    }

    /// Defaults for the transcription path (user utterances)
    #[must_use]
    pub const fn transcript() -> Self {
        Self {
            min_extension_chars: 5,
            minor_ratio: 0.2,
            minor_max_chars: 50,
        }
    }
}

/// How a new text relates to the last processed one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Genuinely new content; process it
    Fresh,
    /// Exact repeat of the last processed text
    Duplicate,
    /// Left-extension of the last processed text (streaming re-delivery)
    Extension,
    /// Small difference from the last processed text (cosmetic rewording)
    MinorVariation,
}

impl Verdict {
    /// Whether the text should be processed
    #[must_use]
    pub const fn is_fresh(self) -> bool {
        matches!(self, Self::Fresh)
    }
}

/// Single-slot repeated-text filter
#[derive(Debug)]
pub struct TextDedup {
    last: String,
    tuning: DedupTuning,
}

impl TextDedup {
    /// Create an empty filter with the given thresholds
    #[must_use]
    pub const fn new(tuning: DedupTuning) -> Self {
        Self {
            last: String::new(),
            tuning,
        }
    }

    /// Classify `text` against the slot and update the slot.
    ///
    /// The slot advances on every verdict except [`Verdict::Duplicate`], so a
    /// re-delivered growing prefix keeps being recognized as it grows.
    pub fn check(&mut self, text: &str) -> Verdict {
        let text_chars = text.chars().count();
        let last_chars = self.last.chars().count();

        if !self.last.is_empty()
            && text.starts_with(self.last.as_str())
            && text_chars > last_chars
            && text_chars - last_chars > self.tuning.min_extension_chars
        {
            tracing::debug!(from = last_chars, to = text_chars, "text extends previous");
            self.last = text.to_string();
            return Verdict::Extension;
        }

        if self.last == text {
            tracing::debug!("exact duplicate text");
            return Verdict::Duplicate;
        }

        let diff = text_chars.abs_diff(last_chars);
        let max_len = text_chars.max(last_chars);
        #[allow(clippy::cast_precision_loss)]
        if !self.last.is_empty()
            && max_len > 0
            && (diff as f32 / max_len as f32) < self.tuning.minor_ratio
            && diff < self.tuning.minor_max_chars
        {
            tracing::debug!(changed = diff, "minor variation of previous text");
            self.last = text.to_string();
            return Verdict::MinorVariation;
        }

        self.last = text.to_string();
        Verdict::Fresh
    }

    /// The last processed text, if any
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        if self.last.is_empty() {
            None
        } else {
            Some(&self.last)
        }
    }

    /// Forget the slot. Called when a new user utterance begins a new turn —
    /// never implicitly by time.
    pub fn reset(&mut self) {
        self.last.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_text_is_fresh() {
        let mut dedup = TextDedup::new(DedupTuning::speech());
        assert_eq!(dedup.check("Hello"), Verdict::Fresh);
        assert_eq!(dedup.last(), Some("Hello"));
    }

    #[test]
    fn test_exact_duplicate() {
        let mut dedup = TextDedup::new(DedupTuning::speech());
        assert_eq!(dedup.check("Hello"), Verdict::Fresh);
        assert_eq!(dedup.check("Hello"), Verdict::Duplicate);
    }

    #[test]
    fn test_prefix_extension_updates_slot() {
        let mut dedup = TextDedup::new(DedupTuning::speech());
        assert_eq!(dedup.check("The soup needs"), Verdict::Fresh);
        assert_eq!(
            dedup.check("The soup needs salt and pepper"),
            Verdict::Extension
        );
        // Slot advanced with the extension
        assert_eq!(dedup.last(), Some("The soup needs salt and pepper"));
        assert_eq!(
            dedup.check("The soup needs salt and pepper"),
            Verdict::Duplicate
        );
    }

    #[test]
    fn test_short_extension_is_not_extension() {
        let mut dedup = TextDedup::new(DedupTuning::speech());
        assert_eq!(dedup.check("Preheat the oven to 180 degrees"), Verdict::Fresh);
        // Adds fewer than 10 chars and differs by under 20%: cosmetic
        assert_eq!(
            dedup.check("Preheat the oven to 180 degrees C"),
            Verdict::MinorVariation
        );
    }

    #[test]
    fn test_minor_variation() {
        let mut dedup = TextDedup::new(DedupTuning::speech());
        assert_eq!(
            dedup.check("Let the dough rest for twenty minutes"),
            Verdict::Fresh
        );
        assert_eq!(
            dedup.check("Let the dough rest for thirty minutes"),
            Verdict::MinorVariation
        );
    }

    #[test]
    fn test_distinct_text_is_fresh() {
        let mut dedup = TextDedup::new(DedupTuning::speech());
        assert_eq!(dedup.check("First, dice the onions"), Verdict::Fresh);
        assert_eq!(
            dedup.check("Meanwhile, bring a large pot of salted water to a rolling boil"),
            Verdict::Fresh
        );
    }

    #[test]
    fn test_reset_forgets_slot() {
        let mut dedup = TextDedup::new(DedupTuning::speech());
        assert_eq!(dedup.check("Hello"), Verdict::Fresh);
        dedup.reset();
        assert_eq!(dedup.last(), None);
        assert_eq!(dedup.check("Hello"), Verdict::Fresh);
    }

    #[test]
    fn test_transcript_tuning_tighter_extension() {
        let mut dedup = TextDedup::new(DedupTuning::transcript());
        assert_eq!(dedup.check("how do I"), Verdict::Fresh);
        // 9 chars added: extension under the transcript tuning (> 5)
        assert_eq!(dedup.check("how do I fry rice"), Verdict::Extension);
    }
}
