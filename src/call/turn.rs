//! Conversation turn history
//!
//! An append-only, chronologically ordered log of messages for the lifetime
//! of one call. Turns are immutable once appended; the log is cleared only
//! when a call ends.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

impl TurnRole {
    /// Wire-format role string
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// Create a turn stamped with the current time
    #[must_use]
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Shared append-only turn log
#[derive(Debug, Default)]
pub struct TurnLog {
    turns: Mutex<Vec<ConversationTurn>>,
}

impl TurnLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn
    pub fn append(&self, role: TurnRole, content: impl Into<String>) {
        let turn = ConversationTurn::new(role, content);
        if let Ok(mut turns) = self.turns.lock() {
            turns.push(turn);
        }
    }

    /// Copy of the full history, in submission order
    #[must_use]
    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.lock().map(|t| t.len()).unwrap_or_default()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard all turns (call teardown only)
    pub fn clear(&self) {
        if let Ok(mut turns) = self.turns.lock() {
            turns.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let log = TurnLog::new();
        log.append(TurnRole::Assistant, "greeting");
        log.append(TurnRole::User, "question");
        log.append(TurnRole::Assistant, "answer");

        let turns = log.snapshot();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, TurnRole::Assistant);
        assert_eq!(turns[1].content, "question");
        assert!(turns[0].timestamp <= turns[2].timestamp);
    }

    #[test]
    fn test_clear() {
        let log = TurnLog::new();
        log.append(TurnRole::User, "hello");
        assert!(!log.is_empty());

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_role_strings() {
        assert_eq!(TurnRole::User.as_str(), "user");
        assert_eq!(TurnRole::Assistant.as_str(), "assistant");
        assert_eq!(TurnRole::System.as_str(), "system");
    }
}
