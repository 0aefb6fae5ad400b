//! Query planning agent.
//!
//! Turns the research topic into the initial round of search queries.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::prompt::build_query_writer_prompt;
use super::provider::LlmProvider;
use super::traits::{Agent, AgentResponse, RESEARCH_TEMPERATURE, parse_structured};
use crate::core::RetryPolicy;
use crate::error::AgentError;

/// Structured planner output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QueryPlan {
    /// Why these queries were chosen.
    #[serde(default)]
    pub rationale: String,
    /// Search queries, in the order the model produced them.
    pub query: Vec<String>,
}

/// Agent that generates the initial search queries.
///
/// The returned list is taken as-is: a model that returns fewer queries
/// than requested is not corrected.
pub struct QueryPlanner {
    model: String,
    template: String,
    retry: RetryPolicy,
}

impl QueryPlanner {
    /// Creates a planner for the given model and prompt template.
    #[must_use]
    pub fn new(model: impl Into<String>, template: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            model: model.into(),
            template: template.into(),
            retry,
        }
    }

    /// Generates up to `count` queries for `research_topic`.
    ///
    /// # Errors
    ///
    /// Returns the provider error once retries are exhausted, or
    /// [`AgentError::StructuredOutput`] if the response does not match
    /// the query schema.
    pub async fn plan(
        &self,
        provider: &dyn LlmProvider,
        research_topic: &str,
        count: usize,
        current_date: &str,
    ) -> Result<(QueryPlan, AgentResponse), AgentError> {
        let prompt = build_query_writer_prompt(&self.template, research_topic, count, current_date);
        let response = self
            .retry
            .execute(self.name(), || self.execute(provider, &prompt))
            .await?;
        let plan: QueryPlan = parse_structured(&response.content, "search query plan")?;
        Ok((plan, response))
    }
}

#[async_trait]
impl Agent for QueryPlanner {
    fn name(&self) -> &'static str {
        "query_planner"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn temperature(&self) -> f32 {
        RESEARCH_TEMPERATURE
    }

    fn response_schema(&self) -> Option<serde_json::Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "rationale": { "type": "string" },
                "query": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["rationale", "query"]
        }))
    }
}
