//! Error types for the research workflow.
//!
//! A single [`AgentError`] covers provider, parsing, configuration and
//! orchestration failures. Fatal errors that reach the run boundary are
//! wrapped in [`AgentError::Stage`] so callers can tell which stage of the
//! workflow produced them.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = AgentError> = std::result::Result<T, E>;

/// Workflow stage identifiers, used to attribute fatal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Initial query generation.
    GenerateQuery,
    /// One grounded search task.
    WebResearch,
    /// Sufficiency reflection.
    Reflection,
    /// Final answer synthesis.
    FinalizeAnswer,
}

impl Stage {
    /// Returns the stage name as used in logs and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GenerateQuery => "generate_query",
            Self::WebResearch => "web_research",
            Self::Reflection => "reflection",
            Self::FinalizeAnswer => "finalize_answer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by providers, agents and the workflow engine.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key was configured for the provider.
    #[error("API key missing: set GEMINI_API_KEY, OPENAI_API_KEY or DEEP_RESEARCH_API_KEY")]
    ApiKeyMissing,

    /// The configured provider name is not known.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Requested provider name.
        name: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {message}")]
    Config {
        /// What was wrong.
        message: String,
    },

    /// The provider call failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider error message.
        message: String,
        /// HTTP status, when the transport exposed one.
        status: Option<u16>,
    },

    /// The provider signalled rate limiting or resource exhaustion.
    #[error("rate limited by provider: {message}")]
    RateLimited {
        /// Provider error message.
        message: String,
    },

    /// The response did not match the requested output schema.
    #[error("structured output error: {message}")]
    StructuredOutput {
        /// Parse failure description.
        message: String,
        /// Raw response content.
        content: String,
    },

    /// Engine-internal failure (task join, closed limiter, bad input).
    #[error("orchestration error: {message}")]
    Orchestration {
        /// Failure description.
        message: String,
    },

    /// A fatal error attributed to the stage that raised it.
    #[error("stage {stage} failed: {source}")]
    Stage {
        /// Originating stage.
        stage: Stage,
        /// Underlying error.
        #[source]
        source: Box<AgentError>,
    },
}

impl AgentError {
    /// Returns `true` for transient provider conditions worth retrying.
    ///
    /// Covers explicit rate limiting, HTTP 429 and provider messages that
    /// carry a `429` or resource-exhausted signal.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::ApiRequest { status: Some(429), .. } => true,
            Self::ApiRequest { message, .. } => {
                message.contains("429")
                    || message.contains("ResourceExhausted")
                    || message.contains("RESOURCE_EXHAUSTED")
            }
            Self::Stage { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Wraps this error with its originating stage.
    ///
    /// Errors already attributed to a stage are returned unchanged.
    #[must_use]
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Returns the stage this error is attributed to, if any.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
