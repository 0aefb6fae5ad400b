//! Workflow engine for iterative research runs.
//!
//! Sequences the stages: plan queries → fan out grounded searches → join
//! → reflect → (fan out follow-ups, or) → finalize. The engine is the only
//! owner of [`WorkflowState`]; stages get snapshots and return
//! [`StateUpdate`]s that are merged here, one at a time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use super::config::{AgentConfig, RunOptions, RunSettings};
use super::finalizer::{FinalizeInput, Finalizer};
use super::message::{ChatMessage, TokenUsage, assistant_message};
use super::planner::QueryPlanner;
use super::prompt::{PromptSet, current_date};
use super::provider::LlmProvider;
use super::reflection::{ReflectionEvaluator, ReflectionInput, Route, route};
use super::search::{SearchOutput, SearchTask, SearchTaskInput};
use super::state::{SourceRecord, WorkflowState};
use crate::core::ConcurrencyLimiter;
use crate::error::{AgentError, Stage};

/// Progress events emitted during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// The planner produced the first round of queries.
    QueriesGenerated {
        /// Queries, in planner order.
        queries: Vec<String>,
    },
    /// One search task finished.
    SearchCompleted {
        /// Task id.
        task_id: usize,
        /// Query the task ran.
        query: String,
        /// Sources referenced by its citations.
        source_count: usize,
    },
    /// A reflection finished.
    Reflected {
        /// Loop count after this reflection.
        loop_count: u32,
        /// Sufficiency verdict.
        is_sufficient: bool,
        /// Reported knowledge gap.
        knowledge_gap: String,
        /// Proposed follow-up queries.
        follow_up_queries: Vec<String>,
    },
    /// The final answer was written.
    Finalized {
        /// Sources after deduplication.
        source_count: usize,
    },
}

/// Why a run stopped researching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Reflection judged the results sufficient.
    Sufficient,
    /// The reflection loop budget ran out.
    LoopLimit,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Final assistant message, source section included.
    pub answer: ChatMessage,
    /// Deduplicated sources, labelled `1..K`.
    pub sources: Vec<SourceRecord>,
    /// Terminal workflow state.
    pub state: WorkflowState,
    /// Why research stopped.
    pub completion: CompletionReason,
    /// Token usage across all model calls.
    pub usage: TokenUsage,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Runs research workflows against one provider.
pub struct WorkflowEngine {
    provider: Arc<dyn LlmProvider>,
    config: AgentConfig,
    prompts: PromptSet,
    events: Option<UnboundedSender<WorkflowEvent>>,
}

impl WorkflowEngine {
    /// Creates an engine with the given provider and configuration.
    ///
    /// Loads prompt templates from [`AgentConfig::prompt_dir`], falling
    /// back to compiled-in defaults.
    pub fn new(provider: Arc<dyn LlmProvider>, config: AgentConfig) -> Self {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        Self {
            provider,
            config,
            prompts,
            events: None,
        }
    }

    /// Replaces the prompt templates.
    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    /// Sends progress events to `sender`.
    ///
    /// A dropped receiver does not affect runs.
    #[must_use]
    pub fn with_events(mut self, sender: UnboundedSender<WorkflowEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Executes one research run.
    ///
    /// Each run gets its own concurrency limiter sized by the resolved
    /// `num_parallel_tasks`. A fatal error in any stage ends the run
    /// immediately; search tasks still in flight are left to finish on
    /// their own and their results are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Orchestration`] for an empty question, and
    /// otherwise an [`AgentError::Stage`] naming the stage that failed.
    pub async fn run(
        &self,
        messages: Vec<ChatMessage>,
        options: RunOptions,
    ) -> Result<RunOutcome, AgentError> {
        if messages.iter().all(|m| m.content.trim().is_empty()) {
            return Err(AgentError::Orchestration {
                message: "Research question cannot be empty".to_string(),
            });
        }

        let start = Instant::now();
        let settings = RunSettings::resolve(&self.config, &options);
        let retry = self.config.retry_policy();
        let date = current_date();
        let limiter = ConcurrencyLimiter::new(settings.num_parallel_tasks);
        let mut state = WorkflowState::new(
            messages,
            settings.max_research_loops,
            settings.initial_search_query_count,
        );
        let mut usage = TokenUsage::default();

        info!(
            provider = self.provider.name(),
            initial_queries = settings.initial_search_query_count,
            max_loops = settings.max_research_loops,
            parallel_tasks = settings.num_parallel_tasks,
            "research run started"
        );

        // Stage 1: plan the first round
        let planner = QueryPlanner::new(
            settings.query_generator_model.clone(),
            self.prompts.query_writer.clone(),
            retry,
        );
        let (plan, plan_response) = planner
            .plan(
                &*self.provider,
                &state.research_topic(),
                settings.initial_search_query_count,
                &date,
            )
            .await
            .map_err(|e| e.in_stage(Stage::GenerateQuery))?;
        usage = usage.saturating_add(plan_response.usage);
        debug!(queries = plan.query.len(), rationale = %plan.rationale, "queries generated");
        self.emit(WorkflowEvent::QueriesGenerated {
            queries: plan.query.clone(),
        });

        let search = Arc::new(SearchTask::new(
            settings.query_generator_model.clone(),
            self.prompts.web_searcher.clone(),
            retry,
        ));
        let reflection = ReflectionEvaluator::new(
            settings.reflection_model.clone(),
            self.prompts.reflection.clone(),
            retry,
        );

        // Stages 2-3: search rounds and reflection until routed to finalize
        let mut round = SearchTaskInput::round(&plan.query, 0);
        loop {
            let outputs = self
                .scatter(round, &search, &limiter, &date)
                .await
                .map_err(|e| e.in_stage(Stage::WebResearch))?;
            state.apply_all(outputs.into_iter().map(|output| {
                usage = usage.saturating_add(output.usage);
                self.emit(WorkflowEvent::SearchCompleted {
                    task_id: output.task_id,
                    query: output.update.search_queries.concat(),
                    source_count: output.update.sources_gathered.len(),
                });
                output.update
            }));

            let (verdict, update, response) = reflection
                .evaluate(&*self.provider, ReflectionInput::from(&state))
                .await
                .map_err(|e| e.in_stage(Stage::Reflection))?;
            usage = usage.saturating_add(response.usage);
            state.apply(update);
            info!(
                loop_count = state.research_loop_count,
                is_sufficient = verdict.is_sufficient,
                follow_ups = verdict.follow_up_queries.len(),
                "reflection complete"
            );
            self.emit(WorkflowEvent::Reflected {
                loop_count: state.research_loop_count,
                is_sufficient: verdict.is_sufficient,
                knowledge_gap: verdict.knowledge_gap,
                follow_up_queries: verdict.follow_up_queries,
            });

            match route(&state) {
                Route::Finalize => break,
                Route::Research(next) => round = next,
            }
        }

        // Stage 4: answer and deduplicate sources
        let finalizer = Finalizer::new(
            settings.answer_model.clone(),
            self.prompts.answer.clone(),
            retry,
        );
        let input = FinalizeInput {
            research_topic: state.research_topic(),
            web_results: state.web_results.clone(),
            sources_gathered: state.sources_gathered.clone(),
        };
        let (finalized, response) = finalizer
            .finalize(&*self.provider, input, &date)
            .await
            .map_err(|e| e.in_stage(Stage::FinalizeAnswer))?;
        usage = usage.saturating_add(response.usage);
        self.emit(WorkflowEvent::Finalized {
            source_count: finalized.sources.len(),
        });
        state.apply(finalized.update);

        let completion = if state.is_sufficient {
            CompletionReason::Sufficient
        } else {
            CompletionReason::LoopLimit
        };
        let elapsed = start.elapsed();
        info!(
            loops = state.research_loop_count,
            queries = state.search_queries.len(),
            sources = finalized.sources.len(),
            ?completion,
            elapsed_ms = elapsed.as_millis(),
            "research run complete"
        );

        Ok(RunOutcome {
            answer: assistant_message(&finalized.answer),
            sources: finalized.sources,
            state,
            completion,
            usage,
            elapsed,
        })
    }

    /// Spawns one task per input and gathers their outputs.
    ///
    /// Outputs are returned in completion order. The first failure is
    /// returned without waiting for the remaining tasks.
    async fn scatter(
        &self,
        round: Vec<SearchTaskInput>,
        search: &Arc<SearchTask>,
        limiter: &ConcurrencyLimiter,
        date: &str,
    ) -> Result<Vec<SearchOutput>, AgentError> {
        debug!(tasks = round.len(), "fanning out search tasks");

        let mut pending: FuturesUnordered<_> = round
            .into_iter()
            .map(|input| {
                let provider = Arc::clone(&self.provider);
                let search = Arc::clone(search);
                let limiter = limiter.clone();
                let date = date.to_string();
                tokio::spawn(async move { search.run(&*provider, &limiter, input, &date).await })
            })
            .collect();

        let mut outputs = Vec::with_capacity(pending.len());
        while let Some(joined) = pending.next().await {
            let output = joined.map_err(|e| AgentError::Orchestration {
                message: format!("Search task join failed: {e}"),
            })??;
            outputs.push(output);
        }
        Ok(outputs)
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .field("prompts", &self.prompts)
            .finish_non_exhaustive()
    }
}
