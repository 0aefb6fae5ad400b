//! Workflow state and per-field merge rules.
//!
//! [`WorkflowState`] is owned by the engine. Stages never see it mutably:
//! they receive the inputs they need by value and return a
//! [`StateUpdate`], which the engine merges with [`WorkflowState::apply`].
//! List fields fed by concurrent search tasks are append-only, so merge
//! order does not affect their contents. Scalar fields are overwritten and
//! are only produced by single, non-concurrent stages.

use serde::Serialize;

use super::message::{ChatMessage, research_topic};
use crate::core::Segment;

/// A gathered source: `{original_url, title, label, short_url}`.
///
/// The deduplication key is `original_url`.
pub type SourceRecord = Segment;

/// The full state of one research run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowState {
    /// Conversation history; append-only.
    pub messages: Vec<ChatMessage>,
    /// Every query issued so far, across rounds; append-only.
    pub search_queries: Vec<String>,
    /// Annotated result text, one per completed search task; append-only.
    pub web_results: Vec<String>,
    /// Sources from all tasks; replaced by the deduplicated list at the end.
    pub sources_gathered: Vec<SourceRecord>,
    /// Reflection stages executed.
    pub research_loop_count: u32,
    /// Latest sufficiency verdict.
    pub is_sufficient: bool,
    /// Latest knowledge gap description.
    pub knowledge_gap: String,
    /// Follow-up queries from the latest reflection.
    pub follow_up_queries: Vec<String>,
    /// Queries dispatched so far, as observed by the latest reflection.
    pub number_of_ran_queries: usize,
    /// Reflection loops allowed for this run.
    pub max_research_loops: u32,
    /// Queries requested from the planner for this run.
    pub initial_search_query_count: usize,
}

/// A partial update returned by a stage.
///
/// `Vec` fields are appended; `Option` fields overwrite when `Some`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    /// Messages to append.
    pub messages: Vec<ChatMessage>,
    /// Queries to append.
    pub search_queries: Vec<String>,
    /// Results to append.
    pub web_results: Vec<String>,
    /// Sources to append.
    pub sources_gathered: Vec<SourceRecord>,
    /// Replaces `sources_gathered` entirely (finalization only).
    pub final_sources: Option<Vec<SourceRecord>>,
    /// New loop count.
    pub research_loop_count: Option<u32>,
    /// New sufficiency verdict.
    pub is_sufficient: Option<bool>,
    /// New knowledge gap.
    pub knowledge_gap: Option<String>,
    /// New follow-up queries.
    pub follow_up_queries: Option<Vec<String>>,
    /// New dispatched-query count.
    pub number_of_ran_queries: Option<usize>,
}

impl WorkflowState {
    /// Creates the initial state for a run.
    #[must_use]
    pub fn new(
        messages: Vec<ChatMessage>,
        max_research_loops: u32,
        initial_search_query_count: usize,
    ) -> Self {
        Self {
            messages,
            max_research_loops,
            initial_search_query_count,
            ..Self::default()
        }
    }

    /// The research topic rendered from the conversation.
    #[must_use]
    pub fn research_topic(&self) -> String {
        research_topic(&self.messages)
    }

    /// Merges a stage update into the state.
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        self.search_queries.extend(update.search_queries);
        self.web_results.extend(update.web_results);
        self.sources_gathered.extend(update.sources_gathered);

        if let Some(sources) = update.final_sources {
            self.sources_gathered = sources;
        }
        if let Some(count) = update.research_loop_count {
            self.research_loop_count = count;
        }
        if let Some(sufficient) = update.is_sufficient {
            self.is_sufficient = sufficient;
        }
        if let Some(gap) = update.knowledge_gap {
            self.knowledge_gap = gap;
        }
        if let Some(queries) = update.follow_up_queries {
            self.follow_up_queries = queries;
        }
        if let Some(n) = update.number_of_ran_queries {
            self.number_of_ran_queries = n;
        }
    }

    /// Merges a batch of updates, e.g. the results of one fan-out round.
    pub fn apply_all(&mut self, updates: impl IntoIterator<Item = StateUpdate>) {
        for update in updates {
            self.apply(update);
        }
    }
}
