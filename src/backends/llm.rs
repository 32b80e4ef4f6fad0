//! Response generation over HTTP
//!
//! OpenAI-compatible chat completions behind the [`GenerationBackend`] port.
//! The full turn history is sent on every call; any per-user memory context
//! is injected into the system message.

use async_trait::async_trait;

use super::GenerationBackend;
use crate::call::ConversationTurn;
use crate::{Error, Result};

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(serde::Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completion client
pub struct ChatClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl ChatClient {
    /// Create a chat client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(
        api_key: String,
        model: String,
        max_tokens: u32,
        system_prompt: String,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for chat completions".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            max_tokens,
            system_prompt,
        })
    }

    /// Compose the system message from the persona prompt and memory context
    fn system_message(&self, memory_context: &str) -> String {
        if memory_context.is_empty() {
            self.system_prompt.clone()
        } else {
            format!(
                "{}\n\n<user-context>\n{memory_context}\n</user-context>",
                self.system_prompt
            )
        }
    }
}

#[async_trait]
impl GenerationBackend for ChatClient {
    async fn respond(&self, turns: &[ConversationTurn], memory_context: &str) -> Result<String> {
        let system = self.system_message(memory_context);

        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ChatMessage {
            role: "system",
            content: &system,
        });
        messages.extend(turns.iter().map(|turn| ChatMessage {
            role: turn.role.as_str(),
            content: &turn.content,
        }));

        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
        };

        tracing::debug!(model = %self.model, turns = turns.len(), "requesting completion");

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!(
                "chat API error {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let reply = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if reply.trim().is_empty() {
            return Err(Error::Generation("empty completion".to_string()));
        }

        tracing::debug!(reply_len = reply.len(), "completion received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        assert!(
            ChatClient::new(String::new(), "gpt-4o-mini".into(), 1024, "prompt".into()).is_err()
        );
    }

    #[test]
    fn test_system_message_includes_context() {
        let client = ChatClient::new(
            "key".into(),
            "gpt-4o-mini".into(),
            1024,
            "You are Sous.".into(),
        )
        .unwrap();

        assert_eq!(client.system_message(""), "You are Sous.");

        let with_memory = client.system_message("Vegetarian, allergic to peanuts");
        assert!(with_memory.starts_with("You are Sous."));
        assert!(with_memory.contains("<user-context>"));
        assert!(with_memory.contains("allergic to peanuts"));
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "choices": [
                { "message": { "content": "Try adding a pinch of salt." } }
            ]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("Try adding a pinch of salt.")
        );
    }
}
