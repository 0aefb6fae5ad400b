//! Grounded search task.
//!
//! One task runs one query: under the retry policy, each attempt waits for
//! a limiter slot and calls the model with search grounding. The result's
//! grounding metadata is then resolved into citation markers and source
//! records.

use async_trait::async_trait;
use tracing::debug;

use super::message::TokenUsage;
use super::prompt::build_web_searcher_prompt;
use super::provider::LlmProvider;
use super::state::StateUpdate;
use super::traits::{Agent, RESEARCH_TEMPERATURE};
use crate::core::{ConcurrencyLimiter, RetryPolicy, annotate};
use crate::error::AgentError;

/// Descriptor for one fan-out child: the query and its task id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTaskInput {
    /// Query text.
    pub query: String,
    /// Id used in the task's short URLs.
    pub task_id: usize,
}

impl SearchTaskInput {
    /// Builds descriptors for a round, numbering ids from `first_id`.
    #[must_use]
    pub fn round(queries: &[String], first_id: usize) -> Vec<Self> {
        queries
            .iter()
            .enumerate()
            .map(|(idx, query)| Self {
                query: query.clone(),
                task_id: first_id + idx,
            })
            .collect()
    }
}

/// Result of one completed search task.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutput {
    /// Task that produced this output.
    pub task_id: usize,
    /// Partial state update: one query, one result, its sources.
    pub update: StateUpdate,
    /// Token usage of the grounded call.
    pub usage: TokenUsage,
}

/// Agent that runs a single grounded web search.
pub struct SearchTask {
    model: String,
    template: String,
    retry: RetryPolicy,
}

impl SearchTask {
    /// Creates a search agent for the given model and prompt template.
    #[must_use]
    pub fn new(model: impl Into<String>, template: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            model: model.into(),
            template: template.into(),
            retry,
        }
    }

    /// Runs one query, taking a limiter slot for each attempt.
    ///
    /// The slot is released after every attempt, so backoff waits do not
    /// block sibling tasks.
    ///
    /// # Errors
    ///
    /// Returns the provider error once retries are exhausted, or
    /// [`AgentError::Orchestration`] if the limiter was closed.
    pub async fn run(
        &self,
        provider: &dyn LlmProvider,
        limiter: &ConcurrencyLimiter,
        input: SearchTaskInput,
        current_date: &str,
    ) -> Result<SearchOutput, AgentError> {
        debug!(task_id = input.task_id, query = %input.query, "search task started");

        let prompt = build_web_searcher_prompt(&self.template, &input.query, current_date);
        let prompt = prompt.as_str();
        let response = self
            .retry
            .execute(self.name(), || async move {
                let permit = limiter.acquire().await?;
                let result = self.execute(provider, prompt).await;
                limiter.release(permit);
                result
            })
            .await?;

        let metadata = response.grounding.unwrap_or_default();
        let annotated = annotate(&response.content, &metadata, input.task_id);
        debug!(
            task_id = input.task_id,
            sources = annotated.sources.len(),
            "search task finished"
        );

        Ok(SearchOutput {
            task_id: input.task_id,
            update: StateUpdate {
                search_queries: vec![input.query],
                web_results: vec![annotated.text],
                sources_gathered: annotated.sources,
                ..StateUpdate::default()
            },
            usage: response.usage,
        })
    }
}

#[async_trait]
impl Agent for SearchTask {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn temperature(&self) -> f32 {
        RESEARCH_TEMPERATURE
    }

    fn grounding(&self) -> bool {
        true
    }
}
