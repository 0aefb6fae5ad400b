//! Research workflow agents and engine.
//!
//! Provides an LLM-powered workflow that plans queries, fans out grounded
//! searches, reflects on sufficiency and synthesizes a cited answer. Uses
//! a pluggable provider abstraction backed by Gemini or `OpenAI`-compatible
//! APIs.
//!
//! # Architecture
//!
//! ```text
//! User question → WorkflowEngine
//!   ├── QueryPlanner (initial queries)
//!   ├── Fan-out → N concurrent SearchTasks (bounded by ConcurrencyLimiter)
//!   │   └── Each runs one grounded query → annotated text + sources
//!   ├── Join, merge updates into WorkflowState
//!   ├── ReflectionEvaluator → finalize, or fan out follow-up queries
//!   └── Finalizer → answer + deduplicated source list
//! ```
//!
//! # Providers
//!
//! Enable providers with cargo features (both on by default):
//! ```toml
//! [dependencies]
//! deep-research = { version = "...", default-features = false, features = ["gemini"] }
//! ```

pub mod client;
pub mod config;
pub mod engine;
pub mod finalizer;
pub mod message;
pub mod planner;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod reflection;
pub mod search;
pub mod state;
pub mod traits;

// Re-export key types
pub use client::create_provider;
pub use config::{AgentConfig, AgentConfigBuilder, RunOptions, RunSettings};
pub use engine::{CompletionReason, RunOutcome, WorkflowEngine, WorkflowEvent};
pub use finalizer::{Finalizer, dedup_sources};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use planner::{QueryPlan, QueryPlanner};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use reflection::{ReflectionEvaluator, Route, Verdict, route};
pub use search::{SearchOutput, SearchTask, SearchTaskInput};
pub use state::{SourceRecord, StateUpdate, WorkflowState};
pub use traits::{Agent, AgentResponse};
