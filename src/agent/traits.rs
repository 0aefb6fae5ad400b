//! Agent trait definition.
//!
//! Every model-backed stage (planner, search, reflection, finalizer)
//! implements this trait, which turns a rendered prompt into a single
//! provider call with the stage's model settings.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::message::{ChatRequest, TokenUsage, user_message};
use super::provider::LlmProvider;
use crate::core::GroundingMetadata;
use crate::error::AgentError;

/// Sampling temperature for the exploratory stages: planning, search and
/// reflection. The final answer keeps the deterministic default.
pub const RESEARCH_TEMPERATURE: f32 = 0.6;

/// Response from an agent execution.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// The agent's text output.
    pub content: String,
    /// Token usage for this call.
    pub usage: TokenUsage,
    /// Grounding evidence, for grounded agents.
    pub grounding: Option<GroundingMetadata>,
    /// Why the model stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
}

/// Trait implemented by all model-backed workflow stages.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &'static str;

    /// Model identifier to use for this agent.
    fn model(&self) -> &str;

    /// Sampling temperature (0.0 = deterministic, higher = more creative).
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response, `None` for the provider default.
    fn max_tokens(&self) -> Option<u32> {
        None
    }

    /// JSON schema for structured output, if the agent needs one.
    fn response_schema(&self) -> Option<serde_json::Value> {
        None
    }

    /// Whether to bind the provider's search grounding tool.
    fn grounding(&self) -> bool {
        false
    }

    /// Builds the request for a rendered prompt.
    fn build_request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model().to_string(),
            messages: vec![user_message(prompt)],
            temperature: Some(self.temperature()),
            max_tokens: self.max_tokens(),
            response_schema: self.response_schema(),
            grounding: self.grounding(),
        }
    }

    /// Executes the agent with the given prompt.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on API failures.
    async fn execute(
        &self,
        provider: &dyn LlmProvider,
        prompt: &str,
    ) -> Result<AgentResponse, AgentError> {
        let request = self.build_request(prompt);
        let response = provider.chat(&request).await?;

        Ok(AgentResponse {
            content: response.content,
            usage: response.usage,
            grounding: response.grounding,
            finish_reason: response.finish_reason,
        })
    }
}

/// Parses a structured JSON response.
///
/// Tolerates a surrounding markdown code fence. Any mismatch with `T` is an
/// [`AgentError::StructuredOutput`], which the workflow treats as fatal.
pub fn parse_structured<T: DeserializeOwned>(content: &str, what: &str) -> Result<T, AgentError> {
    let trimmed = content.trim();

    let json_str = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    serde_json::from_str::<T>(json_str).map_err(|e| {
        let preview: String = json_str.chars().take(200).collect();
        AgentError::StructuredOutput {
            message: format!("Failed to parse {what}: {e}. Preview: {preview:?}"),
            content: content.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn test_parse_plain_json() {
        let sample: Result<Sample, _> = parse_structured(r#"{"value": 3}"#, "sample");
        assert_eq!(sample.ok(), Some(Sample { value: 3 }));
    }

    #[test]
    fn test_parse_code_fence() {
        let sample: Result<Sample, _> = parse_structured("```json\n{\"value\": 4}\n```", "sample");
        assert_eq!(sample.ok(), Some(Sample { value: 4 }));
    }

    #[test]
    fn test_parse_failure_is_structured_output_error() {
        let sample: Result<Sample, _> = parse_structured("not json", "sample");
        assert!(matches!(
            sample,
            Err(AgentError::StructuredOutput { ref content, .. }) if content == "not json"
        ));
    }
}
