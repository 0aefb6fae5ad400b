//! Sufficiency reflection and loop routing.
//!
//! After each fan-out round the evaluator judges whether the gathered
//! results answer the question and proposes follow-up queries if not.
//! [`route`] then decides, from state alone, whether to finalize or to
//! fan out another round.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::prompt::build_reflection_prompt;
use super::provider::LlmProvider;
use super::search::SearchTaskInput;
use super::state::{StateUpdate, WorkflowState};
use super::traits::{Agent, AgentResponse, RESEARCH_TEMPERATURE, parse_structured};
use crate::core::RetryPolicy;
use crate::error::AgentError;

/// Structured reflection output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Verdict {
    /// Whether the results are enough to answer the question.
    pub is_sufficient: bool,
    /// What is still missing.
    #[serde(default)]
    pub knowledge_gap: String,
    /// Queries that would close the gap.
    #[serde(default)]
    pub follow_up_queries: Vec<String>,
}

/// Snapshot of the state fields the evaluator reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectionInput {
    /// Rendered research topic.
    pub research_topic: String,
    /// All results gathered so far.
    pub web_results: Vec<String>,
    /// Queries dispatched so far.
    pub search_query_count: usize,
    /// Reflections already executed.
    pub research_loop_count: u32,
}

impl From<&WorkflowState> for ReflectionInput {
    fn from(state: &WorkflowState) -> Self {
        Self {
            research_topic: state.research_topic(),
            web_results: state.web_results.clone(),
            search_query_count: state.search_queries.len(),
            research_loop_count: state.research_loop_count,
        }
    }
}

/// Where the workflow goes after a reflection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Synthesize the final answer.
    Finalize,
    /// Run another round with these tasks (possibly none).
    Research(Vec<SearchTaskInput>),
}

/// Routes on the post-reflection state.
///
/// Finalizes when the results were judged sufficient or the loop budget is
/// spent; otherwise schedules one task per follow-up query with ids
/// starting at `number_of_ran_queries`.
#[must_use]
pub fn route(state: &WorkflowState) -> Route {
    if state.is_sufficient || state.research_loop_count >= state.max_research_loops {
        Route::Finalize
    } else {
        Route::Research(SearchTaskInput::round(
            &state.follow_up_queries,
            state.number_of_ran_queries,
        ))
    }
}

/// Agent that judges research sufficiency.
pub struct ReflectionEvaluator {
    model: String,
    template: String,
    retry: RetryPolicy,
}

impl ReflectionEvaluator {
    /// Creates an evaluator for the given model and prompt template.
    #[must_use]
    pub fn new(model: impl Into<String>, template: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            model: model.into(),
            template: template.into(),
            retry,
        }
    }

    /// Runs one reflection.
    ///
    /// The returned update increments the loop count by exactly one and
    /// records the number of queries dispatched so far.
    ///
    /// # Errors
    ///
    /// Returns the provider error once retries are exhausted, or
    /// [`AgentError::StructuredOutput`] if the response does not match
    /// the reflection schema.
    pub async fn evaluate(
        &self,
        provider: &dyn LlmProvider,
        input: ReflectionInput,
    ) -> Result<(Verdict, StateUpdate, AgentResponse), AgentError> {
        let prompt = build_reflection_prompt(&self.template, &input.research_topic, &input.web_results);
        let response = self
            .retry
            .execute(self.name(), || self.execute(provider, &prompt))
            .await?;
        let verdict: Verdict = parse_structured(&response.content, "reflection")?;

        let update = StateUpdate {
            research_loop_count: Some(input.research_loop_count + 1),
            is_sufficient: Some(verdict.is_sufficient),
            knowledge_gap: Some(verdict.knowledge_gap.clone()),
            follow_up_queries: Some(verdict.follow_up_queries.clone()),
            number_of_ran_queries: Some(input.search_query_count),
            ..StateUpdate::default()
        };
        Ok((verdict, update, response))
    }
}

#[async_trait]
impl Agent for ReflectionEvaluator {
    fn name(&self) -> &'static str {
        "reflection"
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
                "is_sufficient": { "type": "boolean" },
                "knowledge_gap": { "type": "string" },
                "follow_up_queries": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["is_sufficient", "knowledge_gap", "follow_up_queries"]
        }))
    }
}
