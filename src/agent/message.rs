//! Provider-agnostic message types for LLM communication.
//!
//! These types decouple the workflow from any specific LLM SDK, so the
//! same stages run against Gemini, `OpenAI`, or a test double.

use serde::{Deserialize, Serialize};

use crate::core::GroundingMetadata;

/// Role of a chat message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

impl Role {
    /// Display name used when rendering a conversation as text.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::System => "System",
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Message content.
    pub content: String,
}

/// A chat completion request (provider-agnostic).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// Ordered conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature; `0.0` is deterministic.
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// JSON schema the response must follow, if structured output is wanted.
    pub response_schema: Option<serde_json::Value>,
    /// Bind the provider's web search grounding tool.
    pub grounding: bool,
}

/// Token usage statistics from a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated in the completion.
    pub completion_tokens: u32,
    /// Total tokens used.
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Adds another usage record, saturating on overflow.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens.saturating_add(other.prompt_tokens),
            completion_tokens: self
                .completion_tokens
                .saturating_add(other.completion_tokens),
            total_tokens: self.total_tokens.saturating_add(other.total_tokens),
        }
    }
}

/// A chat completion response (provider-agnostic).
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    /// Generated text content.
    pub content: String,
    /// Token usage statistics.
    pub usage: TokenUsage,
    /// Grounding evidence, present when grounding was requested and used.
    pub grounding: Option<GroundingMetadata>,
    /// Finish reason from the model (e.g., `"stop"`).
    pub finish_reason: Option<String>,
}

/// Creates a system message.
#[must_use]
pub fn system_message(content: &str) -> ChatMessage {
    ChatMessage {
        role: Role::System,
        content: content.to_string(),
    }
}

/// Creates a user message.
#[must_use]
pub fn user_message(content: &str) -> ChatMessage {
    ChatMessage {
        role: Role::User,
        content: content.to_string(),
    }
}

/// Creates an assistant message.
#[must_use]
pub fn assistant_message(content: &str) -> ChatMessage {
    ChatMessage {
        role: Role::Assistant,
        content: content.to_string(),
    }
}

/// Renders the conversation as a research topic.
///
/// A single message is used verbatim. Longer histories render each user
/// and assistant message as `"<Role>: <text>"`, one per line, in order;
/// system messages are skipped.
#[must_use]
pub fn research_topic(messages: &[ChatMessage]) -> String {
    match messages {
        [only] => only.content.clone(),
        _ => messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| format!("{}: {}", m.role.display_name(), m.content))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_message_topic_is_verbatim() {
        let topic = research_topic(&[user_message("What is Rust?")]);
        assert_eq!(topic, "What is Rust?");
    }

    #[test]
    fn test_history_topic_is_role_tagged() {
        let topic = research_topic(&[
            user_message("What is Rust?"),
            assistant_message("A language."),
            user_message("Who maintains it?"),
        ]);
        assert_eq!(
            topic,
            "User: What is Rust?\nAssistant: A language.\nUser: Who maintains it?"
        );
    }

    #[test]
    fn test_history_topic_skips_system_messages() {
        let topic = research_topic(&[
            system_message("Answer tersely."),
            user_message("What is Rust?"),
            assistant_message("A language."),
            user_message("Who maintains it?"),
        ]);
        assert_eq!(
            topic,
            "User: What is Rust?\nAssistant: A language.\nUser: Who maintains it?"
        );
    }

    #[test]
    fn test_empty_history_topic() {
        assert_eq!(research_topic(&[]), "");
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Role::Assistant).unwrap_or_default();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_usage_accumulates() {
        let a = TokenUsage {
            prompt_tokens: 1,
            completion_tokens: 2,
            total_tokens: 3,
        };
        let total = a.saturating_add(a);
        assert_eq!(total.total_tokens, 6);
        let capped = TokenUsage {
            total_tokens: u32::MAX,
            ..a
        }
        .saturating_add(a);
        assert_eq!(capped.total_tokens, u32::MAX);
    }
}
