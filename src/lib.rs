//! Iterative web research workflow.
//!
//! A run plans search queries for a question, executes them concurrently
//! with search grounding, reflects on whether the results suffice, loops
//! with follow-up queries if they do not, and finally writes an answer with
//! inline citation markers and a deduplicated source list.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use deep_research::agent::message::user_message;
//! use deep_research::{AgentConfig, RunOptions, WorkflowEngine, create_provider};
//!
//! # async fn run() -> deep_research::Result<()> {
//! let config = AgentConfig::from_env()?;
//! let provider = create_provider(&config)?;
//! let engine = WorkflowEngine::new(Arc::clone(&provider), config);
//!
//! let outcome = engine
//!     .run(vec![user_message("How do Rust async runtimes schedule tasks?")], RunOptions::default())
//!     .await?;
//! for source in &outcome.sources {
//!     tracing::info!(label = %source.label, url = %source.original_url, "source");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`core`]: retry policy, concurrency limiter and citation resolution
//! - [`agent`]: providers, workflow stages and the engine
//! - [`error`]: error type and stage attribution

pub mod agent;
pub mod core;
pub mod error;

pub use agent::{
    AgentConfig, CompletionReason, LlmProvider, RunOptions, RunOutcome, WorkflowEngine,
    WorkflowEvent, create_provider,
};
pub use error::{AgentError, Result, Stage};
