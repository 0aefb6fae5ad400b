//! Pluggable LLM provider trait.
//!
//! Implementations translate provider-agnostic [`ChatRequest`]/[`ChatResponse`]
//! into provider-specific calls. This keeps every workflow stage decoupled
//! from any particular LLM vendor.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::AgentError;

/// Trait for LLM provider backends.
///
/// Implementations handle the transport layer for a specific provider and
/// classify failures: rate limiting and resource exhaustion must surface as
/// errors for which [`AgentError::is_transient`] returns `true`, so the
/// workflow's retry policy can back off. Providers do not retry themselves.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"gemini"`, `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// When `request.grounding` is set and the provider supports search
    /// grounding, the response carries [`ChatResponse::grounding`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on API failures, timeouts, or parse errors.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;
}
