//! Provider registry and factory.
//!
//! Maps provider names to concrete [`LlmProvider`] implementations.

use std::sync::Arc;

use crate::agent::config::AgentConfig;
use crate::agent::provider::LlmProvider;
use crate::error::AgentError;

/// Creates an [`LlmProvider`] based on the configured provider name.
///
/// # Supported Providers
///
/// - `"gemini"` (default): Gemini REST API with Google Search grounding
/// - `"openai"`: `OpenAI`-compatible APIs via `async-openai`, no grounding
///
/// A provider whose cargo feature is disabled counts as unsupported.
///
/// # Errors
///
/// Returns [`AgentError::UnsupportedProvider`] for unknown provider names.
pub fn create_provider(config: &AgentConfig) -> Result<Arc<dyn LlmProvider>, AgentError> {
    match config.provider.as_str() {
        #[cfg(feature = "gemini")]
        "gemini" => Ok(Arc::new(super::providers::GeminiProvider::new(config)?)),
        #[cfg(feature = "openai")]
        "openai" => Ok(Arc::new(super::providers::OpenAiProvider::new(config))),
        other => Err(AgentError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}
