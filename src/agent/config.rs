//! Research configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.
//! [`RunOptions`] then overrides a subset of fields for a single run.

use std::path::PathBuf;
use std::time::Duration;

use crate::core::RetryPolicy;
use crate::core::retry::{DEFAULT_MAX_RETRIES, DEFAULT_MAX_WAIT, DEFAULT_MULTIPLIER};
use crate::error::AgentError;

/// Default number of queries generated for the first round.
const DEFAULT_INITIAL_QUERY_COUNT: usize = 3;
/// Default number of reflection loops before forcing an answer.
const DEFAULT_MAX_RESEARCH_LOOPS: u32 = 2;
/// Default number of search tasks allowed in flight.
const DEFAULT_NUM_PARALLEL_TASKS: usize = 3;
/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default model for every stage.
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for the research workflow.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (`"gemini"` or `"openai"`).
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model for query generation and grounded search.
    pub query_generator_model: String,
    /// Model for the reflection stage.
    pub reflection_model: String,
    /// Model for the final answer.
    pub answer_model: String,
    /// Number of queries requested from the planner.
    pub initial_search_query_count: usize,
    /// Reflection loops allowed before finalizing.
    pub max_research_loops: u32,
    /// Search tasks allowed in flight per run.
    pub num_parallel_tasks: usize,
    /// Total attempts per provider call, including the first.
    pub max_retries: u32,
    /// Base unit of retry backoff.
    pub retry_multiplier: Duration,
    /// Cap on a single retry wait.
    pub retry_max_wait: Duration,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Directory containing prompt template files.
    ///
    /// Missing files fall back to compiled-in defaults.
    pub prompt_dir: Option<PathBuf>,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }

    /// Retry policy derived from the retry settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
            .with_multiplier(self.retry_multiplier)
            .with_max_wait(self.retry_max_wait)
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    query_generator_model: Option<String>,
    reflection_model: Option<String>,
    answer_model: Option<String>,
    initial_search_query_count: Option<usize>,
    max_research_loops: Option<u32>,
    num_parallel_tasks: Option<usize>,
    max_retries: Option<u32>,
    retry_multiplier: Option<Duration>,
    retry_max_wait: Option<Duration>,
    timeout: Option<Duration>,
    prompt_dir: Option<PathBuf>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("DEEP_RESEARCH_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            let provider_key = match self.provider.as_deref() {
                Some("openai") => "OPENAI_API_KEY",
                _ => "GEMINI_API_KEY",
            };
            self.api_key = std::env::var(provider_key)
                .or_else(|_| std::env::var("DEEP_RESEARCH_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("DEEP_RESEARCH_BASE_URL").ok();
        }
        if self.query_generator_model.is_none() {
            self.query_generator_model = std::env::var("DEEP_RESEARCH_QUERY_MODEL").ok();
        }
        if self.reflection_model.is_none() {
            self.reflection_model = std::env::var("DEEP_RESEARCH_REFLECTION_MODEL").ok();
        }
        if self.answer_model.is_none() {
            self.answer_model = std::env::var("DEEP_RESEARCH_ANSWER_MODEL").ok();
        }
        if self.initial_search_query_count.is_none() {
            self.initial_search_query_count = env_parse("DEEP_RESEARCH_INITIAL_QUERIES");
        }
        if self.max_research_loops.is_none() {
            self.max_research_loops = env_parse("DEEP_RESEARCH_MAX_LOOPS");
        }
        if self.num_parallel_tasks.is_none() {
            self.num_parallel_tasks = env_parse("DEEP_RESEARCH_PARALLEL_TASKS");
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("DEEP_RESEARCH_PROMPT_DIR")
                .ok()
                .map(PathBuf::from);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the query generation model.
    #[must_use]
    pub fn query_generator_model(mut self, model: impl Into<String>) -> Self {
        self.query_generator_model = Some(model.into());
        self
    }

    /// Sets the reflection model.
    #[must_use]
    pub fn reflection_model(mut self, model: impl Into<String>) -> Self {
        self.reflection_model = Some(model.into());
        self
    }

    /// Sets the answer model.
    #[must_use]
    pub fn answer_model(mut self, model: impl Into<String>) -> Self {
        self.answer_model = Some(model.into());
        self
    }

    /// Sets the number of initial search queries.
    #[must_use]
    pub const fn initial_search_query_count(mut self, n: usize) -> Self {
        self.initial_search_query_count = Some(n);
        self
    }

    /// Sets the maximum number of research loops.
    #[must_use]
    pub const fn max_research_loops(mut self, n: u32) -> Self {
        self.max_research_loops = Some(n);
        self
    }

    /// Sets the number of parallel search tasks.
    #[must_use]
    pub const fn num_parallel_tasks(mut self, n: usize) -> Self {
        self.num_parallel_tasks = Some(n);
        self
    }

    /// Sets the total attempts per provider call.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the retry backoff multiplier.
    #[must_use]
    pub const fn retry_multiplier(mut self, d: Duration) -> Self {
        self.retry_multiplier = Some(d);
        self
    }

    /// Sets the cap on a single retry wait.
    #[must_use]
    pub const fn retry_max_wait(mut self, d: Duration) -> Self {
        self.retry_max_wait = Some(d);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set, or
    /// [`AgentError::Config`] for a zero parallelism or retry budget.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let api_key = self.api_key.ok_or(AgentError::ApiKeyMissing)?;

        let num_parallel_tasks = self.num_parallel_tasks.unwrap_or(DEFAULT_NUM_PARALLEL_TASKS);
        if num_parallel_tasks == 0 {
            return Err(AgentError::Config {
                message: "num_parallel_tasks must be at least 1".to_string(),
            });
        }
        let max_retries = self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        if max_retries == 0 {
            return Err(AgentError::Config {
                message: "max_retries must be at least 1".to_string(),
            });
        }

        Ok(AgentConfig {
            provider: self.provider.unwrap_or_else(|| "gemini".to_string()),
            api_key,
            base_url: self.base_url,
            query_generator_model: self
                .query_generator_model
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            reflection_model: self
                .reflection_model
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            answer_model: self
                .answer_model
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            initial_search_query_count: self
                .initial_search_query_count
                .unwrap_or(DEFAULT_INITIAL_QUERY_COUNT),
            max_research_loops: self
                .max_research_loops
                .unwrap_or(DEFAULT_MAX_RESEARCH_LOOPS),
            num_parallel_tasks,
            max_retries,
            retry_multiplier: self.retry_multiplier.unwrap_or(DEFAULT_MULTIPLIER),
            retry_max_wait: self.retry_max_wait.unwrap_or(DEFAULT_MAX_WAIT),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            prompt_dir: self.prompt_dir,
        })
    }
}

/// Per-run overrides of [`AgentConfig`].
///
/// Every field is optional; `None` keeps the configured value.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Number of queries requested from the planner.
    pub initial_search_query_count: Option<usize>,
    /// Reflection loops allowed before finalizing.
    pub max_research_loops: Option<u32>,
    /// Model used for both reflection and the final answer.
    pub reasoning_model: Option<String>,
    /// Search tasks allowed in flight for this run.
    pub num_parallel_tasks: Option<usize>,
}

/// Settings fixed at the start of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Queries requested from the planner.
    pub initial_search_query_count: usize,
    /// Reflection loops allowed before finalizing.
    pub max_research_loops: u32,
    /// Search tasks allowed in flight.
    pub num_parallel_tasks: usize,
    /// Model for query generation and search.
    pub query_generator_model: String,
    /// Model for reflection.
    pub reflection_model: String,
    /// Model for the final answer.
    pub answer_model: String,
}

impl RunSettings {
    /// Resolves run settings: options → config.
    #[must_use]
    pub fn resolve(config: &AgentConfig, options: &RunOptions) -> Self {
        Self {
            initial_search_query_count: options
                .initial_search_query_count
                .unwrap_or(config.initial_search_query_count),
            max_research_loops: options
                .max_research_loops
                .unwrap_or(config.max_research_loops),
            num_parallel_tasks: options
                .num_parallel_tasks
                .unwrap_or(config.num_parallel_tasks)
                .max(1),
            query_generator_model: config.query_generator_model.clone(),
            reflection_model: options
                .reasoning_model
                .clone()
                .unwrap_or_else(|| config.reflection_model.clone()),
            answer_model: options
                .reasoning_model
                .clone()
                .unwrap_or_else(|| config.answer_model.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = AgentConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "gemini");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.initial_search_query_count, DEFAULT_INITIAL_QUERY_COUNT);
        assert_eq!(config.max_research_loops, 2);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_max_wait, Duration::from_secs(120));
        assert_eq!(config.answer_model, DEFAULT_MODEL);
    }

    #[test]
    fn test_builder_missing_api_key() {
        let result = AgentConfig::builder().build();
        assert!(matches!(result, Err(AgentError::ApiKeyMissing)));
    }

    #[test]
    fn test_builder_rejects_zero_parallelism() {
        let result = AgentConfig::builder()
            .api_key("k")
            .num_parallel_tasks(0)
            .build();
        assert!(matches!(result, Err(AgentError::Config { .. })));
    }

    #[test]
    fn test_builder_custom_values() {
        let config = AgentConfig::builder()
            .api_key("key")
            .provider("openai")
            .query_generator_model("gpt-4o-mini")
            .num_parallel_tasks(10)
            .max_research_loops(4)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "openai");
        assert_eq!(config.query_generator_model, "gpt-4o-mini");
        assert_eq!(config.num_parallel_tasks, 10);
        assert_eq!(config.max_research_loops, 4);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = AgentConfig::builder()
            .api_key("key")
            .max_retries(3)
            .retry_multiplier(Duration::from_millis(10))
            .build()
            .unwrap_or_else(|_| unreachable!());
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.multiplier, Duration::from_millis(10));
    }

    #[test]
    fn test_run_settings_overrides() {
        let config = AgentConfig::builder()
            .api_key("key")
            .reflection_model("r")
            .answer_model("a")
            .build()
            .unwrap_or_else(|_| unreachable!());

        let defaults = RunSettings::resolve(&config, &RunOptions::default());
        assert_eq!(defaults.reflection_model, "r");
        assert_eq!(defaults.answer_model, "a");
        assert_eq!(defaults.max_research_loops, 2);

        let options = RunOptions {
            initial_search_query_count: Some(5),
            max_research_loops: Some(1),
            reasoning_model: Some("big".to_string()),
            num_parallel_tasks: Some(0),
        };
        let run = RunSettings::resolve(&config, &options);
        assert_eq!(run.initial_search_query_count, 5);
        assert_eq!(run.max_research_loops, 1);
        assert_eq!(run.reflection_model, "big");
        assert_eq!(run.answer_model, "big");
        assert_eq!(run.num_parallel_tasks, 1);
    }
}
