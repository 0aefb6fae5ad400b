//! Final answer synthesis.
//!
//! Writes the answer from every gathered result, then collapses the
//! gathered sources to one record per URL and appends a numbered source
//! section to the answer.

use std::collections::HashSet;

use async_trait::async_trait;

use super::message::assistant_message;
use super::prompt::build_answer_prompt;
use super::provider::LlmProvider;
use super::state::{SourceRecord, StateUpdate};
use super::traits::{Agent, AgentResponse};
use crate::core::RetryPolicy;
use crate::error::AgentError;

/// Heading of the source section appended to the answer.
pub const SOURCES_HEADING: &str = "\n\n**Sources:**\n";

/// Collapses sources to one record per `original_url`.
///
/// First-seen order is kept and labels are renumbered `"1"..="K"` in that
/// order. Records without a URL are dropped.
#[must_use]
pub fn dedup_sources(sources: &[SourceRecord]) -> Vec<SourceRecord> {
    let mut seen = HashSet::new();
    sources
        .iter()
        .filter(|s| !s.original_url.is_empty() && seen.insert(s.original_url.as_str()))
        .enumerate()
        .map(|(i, s)| SourceRecord {
            label: (i + 1).to_string(),
            ..s.clone()
        })
        .collect()
}

/// Renders the source section, or an empty string when there are none.
#[must_use]
pub fn format_sources(sources: &[SourceRecord]) -> String {
    if sources.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = sources
        .iter()
        .map(|s| format!("{} - {}", s.label, s.original_url))
        .collect();
    format!("{SOURCES_HEADING}{}", lines.join("\n"))
}

/// Snapshot of the state fields the finalizer reads.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeInput {
    /// Rendered research topic.
    pub research_topic: String,
    /// All results gathered across rounds.
    pub web_results: Vec<String>,
    /// All sources gathered across rounds, duplicates included.
    pub sources_gathered: Vec<SourceRecord>,
}

/// The finished answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Finalized {
    /// Answer text including the source section.
    pub answer: String,
    /// Deduplicated, renumbered sources.
    pub sources: Vec<SourceRecord>,
    /// Update appending the answer and replacing the gathered sources.
    pub update: StateUpdate,
}

/// Agent that writes the final answer.
pub struct Finalizer {
    model: String,
    template: String,
    retry: RetryPolicy,
}

impl Finalizer {
    /// Creates a finalizer for the given model and prompt template.
    #[must_use]
    pub fn new(model: impl Into<String>, template: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            model: model.into(),
            template: template.into(),
            retry,
        }
    }

    /// Synthesizes the answer and the deduplicated source list.
    ///
    /// # Errors
    ///
    /// Returns the provider error once retries are exhausted.
    pub async fn finalize(
        &self,
        provider: &dyn LlmProvider,
        input: FinalizeInput,
        current_date: &str,
    ) -> Result<(Finalized, AgentResponse), AgentError> {
        let prompt = build_answer_prompt(
            &self.template,
            &input.research_topic,
            &input.web_results,
            current_date,
        );
        let response = self
            .retry
            .execute(self.name(), || self.execute(provider, &prompt))
            .await?;

        let sources = dedup_sources(&input.sources_gathered);
        let answer = format!("{}{}", response.content, format_sources(&sources));
        let update = StateUpdate {
            messages: vec![assistant_message(&answer)],
            final_sources: Some(sources.clone()),
            ..StateUpdate::default()
        };

        Ok((
            Finalized {
                answer,
                sources,
                update,
            },
            response,
        ))
    }
}

#[async_trait]
impl Agent for Finalizer {
    fn name(&self) -> &'static str {
        "finalizer"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
