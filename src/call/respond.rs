//! Response generation
//!
//! Turns an accepted user utterance plus the running turn history and memory
//! context into one assistant turn. Overlapping recognition events deliver
//! the same utterance more than once, so acceptance is guarded twice: a busy
//! flag (one invocation in flight at a time) and the exact text currently
//! being processed.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::backends::GenerationBackend;
use crate::call::turn::{TurnLog, TurnRole};
use crate::{Error, Result};

/// Single-flight response generator over a shared turn log
pub struct ResponseGenerator {
    backend: Arc<dyn GenerationBackend>,
    turns: Arc<TurnLog>,
    memory_context: Mutex<String>,
    busy: AtomicBool,
    current_text: Mutex<Option<String>>,
}

impl ResponseGenerator {
    /// Create a generator writing into the given turn log
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>, turns: Arc<TurnLog>) -> Self {
        Self {
            backend,
            turns,
            memory_context: Mutex::new(String::new()),
            busy: AtomicBool::new(false),
            current_text: Mutex::new(None),
        }
    }

    /// Replace the memory/context string sent with every generation
    pub fn set_memory_context(&self, context: impl Into<String>) {
        if let Ok(mut memory) = self.memory_context.lock() {
            *memory = context.into();
        }
    }

    /// Whether a generation is currently in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// The shared turn log
    #[must_use]
    pub fn turns(&self) -> &Arc<TurnLog> {
        &self.turns
    }

    /// Process one user utterance.
    ///
    /// No-op (returns `Ok(false)`) if the text is empty after trimming, a
    /// generation is already in flight, or the same trimmed text is the one
    /// currently being processed. On acceptance: appends the user turn,
    /// invokes the backend with the full history plus memory context,
    /// appends the assistant turn, and hands the reply to `on_response` for
    /// playback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Generation`] if the backend call fails; no assistant
    /// turn is appended in that case. The busy flag is cleared on every exit
    /// path.
    pub async fn process_user_message<F, Fut>(&self, text: &str, on_response: F) -> Result<bool>
    where
        F: FnOnce(String) -> Fut + Send,
        Fut: Future<Output = ()> + Send,
    {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(false);
        }

        if let Ok(current) = self.current_text.lock() {
            if current.as_deref() == Some(trimmed) {
                tracing::debug!(text = trimmed, "same text already being processed");
                return Ok(false);
            }
        }

        if self.busy.swap(true, Ordering::SeqCst) {
            tracing::debug!("generation already in flight, ignoring");
            return Ok(false);
        }

        if let Ok(mut current) = self.current_text.lock() {
            *current = Some(trimmed.to_string());
        }

        self.turns.append(TurnRole::User, trimmed);

        let history = self.turns.snapshot();
        let memory = self
            .memory_context
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default();

        tracing::debug!(turns = history.len(), "generating response");

        let outcome = match self.backend.respond(&history, &memory).await {
            Ok(reply) => {
                self.turns.append(TurnRole::Assistant, reply.clone());
                on_response(reply).await;
                Ok(true)
            }
            Err(e) => {
                tracing::error!(error = %e, "response generation failed");
                Err(match e {
                    e @ Error::Generation(_) => e,
                    other => Error::Generation(other.to_string()),
                })
            }
        };

        if let Ok(mut current) = self.current_text.lock() {
            *current = None;
        }
        self.busy.store(false, Ordering::SeqCst);

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct EchoBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerationBackend for EchoBackend {
        async fn respond(
            &self,
            turns: &[crate::call::ConversationTurn],
            _memory_context: &str,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let last = turns.last().map(|t| t.content.clone()).unwrap_or_default();
            Ok(format!("re: {last}"))
        }
    }

    fn generator() -> (Arc<ResponseGenerator>, Arc<TurnLog>) {
        let turns = Arc::new(TurnLog::new());
        let backend = Arc::new(EchoBackend {
            calls: AtomicUsize::new(0),
        });
        (
            Arc::new(ResponseGenerator::new(backend, Arc::clone(&turns))),
            turns,
        )
    }

    #[tokio::test]
    async fn test_appends_user_and_assistant_turns() {
        let (generator, turns) = generator();

        let accepted = generator
            .process_user_message("how long do I boil eggs", |_| async {})
            .await
            .unwrap();

        assert!(accepted);
        let history = turns.snapshot();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, TurnRole::User);
        assert_eq!(history[1].role, TurnRole::Assistant);
        assert_eq!(history[1].content, "re: how long do I boil eggs");
    }

    #[tokio::test]
    async fn test_empty_text_is_noop() {
        let (generator, turns) = generator();

        let accepted = generator.process_user_message("   ", |_| async {}).await.unwrap();

        assert!(!accepted);
        assert!(turns.is_empty());
    }

    #[tokio::test]
    async fn test_busy_clears_after_failure() {
        struct FailingBackend;

        #[async_trait]
        impl GenerationBackend for FailingBackend {
            async fn respond(
                &self,
                _turns: &[crate::call::ConversationTurn],
                _memory_context: &str,
            ) -> Result<String> {
                Err(Error::Generation("backend down".to_string()))
            }
        }

        let turns = Arc::new(TurnLog::new());
        let generator =
            ResponseGenerator::new(Arc::new(FailingBackend), Arc::clone(&turns));

        let result = generator.process_user_message("hello", |_| async {}).await;
        assert!(result.is_err());
        assert!(!generator.is_busy());

        // Only the user turn landed; no assistant turn on failure
        let history = turns.snapshot();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, TurnRole::User);
    }

    #[tokio::test]
    async fn test_memory_context_reaches_backend() {
        struct MemoryProbe {
            seen: Mutex<String>,
        }

        #[async_trait]
        impl GenerationBackend for MemoryProbe {
            async fn respond(
                &self,
                _turns: &[crate::call::ConversationTurn],
                memory_context: &str,
            ) -> Result<String> {
                *self.seen.lock().unwrap() = memory_context.to_string();
                Ok("ok".to_string())
            }
        }

        let probe = Arc::new(MemoryProbe {
            seen: Mutex::new(String::new()),
        });
        let generator = ResponseGenerator::new(
            Arc::clone(&probe) as Arc<dyn GenerationBackend>,
            Arc::new(TurnLog::new()),
        );
        generator.set_memory_context("prefers spicy food");

        generator.process_user_message("dinner ideas", |_| async {}).await.unwrap();

        assert_eq!(*probe.seen.lock().unwrap(), "prefers spicy food");
    }
}
