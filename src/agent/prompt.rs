//! Prompt templates and builders for each workflow stage.
//!
//! Templates use `{research_topic}`, `{number_queries}`, `{current_date}`
//! and `{summaries}` placeholders. The compiled-in defaults can be
//! replaced file by file from a prompt directory.

use std::path::{Path, PathBuf};

/// Separator placed between search results in reflection and answer prompts.
pub const SUMMARY_SEPARATOR: &str = "\n\n---\n\n";

/// Template for the query planner.
pub const QUERY_WRITER_PROMPT: &str = r#"Your goal is to generate sophisticated and diverse web search queries. These queries are intended for an advanced automated web research tool capable of analyzing complex results, following links, and synthesizing information.

Instructions:
- Always prefer a single search query, only add another query if the original question requests multiple aspects or elements and one query is not enough.
- Each query should focus on one specific aspect of the original question.
- Don't produce more than {number_queries} queries.
- Queries should be diverse, if the topic is broad, generate more than 1 query.
- Don't generate multiple similar queries, 1 is enough.
- Query should ensure that the most current information is gathered. The current date is {current_date}.

Format:
- Format your response as a JSON object with these exact keys:
   - "rationale": Brief explanation of why these queries are relevant
   - "query": A list of search queries

Context: {research_topic}"#;

/// Template for one grounded search task.
pub const WEB_SEARCHER_PROMPT: &str = r"Conduct targeted web searches to gather the most recent, credible information on {research_topic} and synthesize it into a verifiable text artifact.

Instructions:
- Query should ensure that the most current information is gathered. The current date is {current_date}.
- Conduct multiple, diverse searches to gather comprehensive information.
- Consolidate key findings while meticulously tracking the source(s) for each specific piece of information.
- The output should be a well-written summary or report based on your search findings.
- Only include the information found in the search results, don't make up any information.

Research Topic:
{research_topic}";

/// Template for the reflection stage.
pub const REFLECTION_PROMPT: &str = r#"You are an expert research assistant analyzing summaries about "{research_topic}".

Instructions:
- Identify knowledge gaps or areas that need deeper exploration and generate follow-up queries (one or multiple).
- If provided summaries are sufficient to answer the user's question, don't generate a follow-up query.
- If there is a knowledge gap, generate follow-up queries that would help expand your understanding.
- Focus on technical details, implementation specifics, or emerging trends that weren't fully covered.

Requirements:
- Ensure the follow-up query is self-contained and includes necessary context for web search.

Output Format:
- Format your response as a JSON object with these exact keys:
   - "is_sufficient": true or false
   - "knowledge_gap": Describe what information is missing or needs clarification
   - "follow_up_queries": Write specific questions to address this gap

Summaries:
{summaries}"#;

/// Template for the final answer.
pub const ANSWER_PROMPT: &str = r"Generate a high-quality answer to the user's question based on the provided summaries.

Instructions:
- The current date is {current_date}.
- You are the final step of a multi-step research process, don't mention that you are the final step.
- You have access to all the information gathered from the previous steps.
- You have access to the user's question.
- Generate a high-quality answer to the user's question based on the provided summaries and the user's question.
- Keep the citation markers such as [1] or [2] from the summaries next to the statements they support.

User Context:
- {research_topic}

Summaries:
{summaries}";

const DEFAULT_PROMPT_DIR: &str = ".config/deep-research/prompts";
const QUERY_WRITER_FILENAME: &str = "query_writer.md";
const WEB_SEARCHER_FILENAME: &str = "web_searcher.md";
const REFLECTION_FILENAME: &str = "reflection.md";
const ANSWER_FILENAME: &str = "answer.md";

/// A set of prompt templates for all stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    /// Query planner template.
    pub query_writer: String,
    /// Grounded search template.
    pub web_searcher: String,
    /// Reflection template.
    pub reflection: String,
    /// Final answer template.
    pub answer: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::defaults()
    }
}

impl PromptSet {
    /// Loads templates from the given directory, falling back to defaults.
    ///
    /// Resolution order for the directory:
    /// 1. Explicit `prompt_dir` argument
    /// 2. `DEEP_RESEARCH_PROMPT_DIR` environment variable
    /// 3. `~/.config/deep-research/prompts/`
    ///
    /// Each file is loaded independently; a missing file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(Path::to_path_buf)
            .or_else(|| {
                std::env::var("DEEP_RESEARCH_PROMPT_DIR")
                    .ok()
                    .map(PathBuf::from)
            })
            .or_else(Self::default_dir);

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(&path).ok())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            query_writer: load_file(QUERY_WRITER_FILENAME, QUERY_WRITER_PROMPT),
            web_searcher: load_file(WEB_SEARCHER_FILENAME, WEB_SEARCHER_PROMPT),
            reflection: load_file(REFLECTION_FILENAME, REFLECTION_PROMPT),
            answer: load_file(ANSWER_FILENAME, ANSWER_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            query_writer: QUERY_WRITER_PROMPT.to_string(),
            web_searcher: WEB_SEARCHER_PROMPT.to_string(),
            reflection: REFLECTION_PROMPT.to_string(),
            answer: ANSWER_PROMPT.to_string(),
        }
    }

    /// Returns the default prompt directory under the user's home.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}

/// Current date as rendered into prompts, e.g. `October 17, 2026`.
#[must_use]
pub fn current_date() -> String {
    chrono::Local::now().format("%B %-d, %Y").to_string()
}

/// Renders the query planner prompt.
#[must_use]
pub fn build_query_writer_prompt(
    template: &str,
    research_topic: &str,
    number_queries: usize,
    current_date: &str,
) -> String {
    template
        .replace("{number_queries}", &number_queries.to_string())
        .replace("{current_date}", current_date)
        .replace("{research_topic}", research_topic)
}

/// Renders the prompt for one search task.
#[must_use]
pub fn build_web_searcher_prompt(template: &str, query: &str, current_date: &str) -> String {
    template
        .replace("{current_date}", current_date)
        .replace("{research_topic}", query)
}

/// Renders the reflection prompt over all results gathered so far.
#[must_use]
pub fn build_reflection_prompt(template: &str, research_topic: &str, results: &[String]) -> String {
    template
        .replace("{summaries}", &results.join(SUMMARY_SEPARATOR))
        .replace("{research_topic}", research_topic)
}

/// Renders the final answer prompt.
#[must_use]
pub fn build_answer_prompt(
    template: &str,
    research_topic: &str,
    results: &[String],
    current_date: &str,
) -> String {
    template
        .replace("{summaries}", &results.join(SUMMARY_SEPARATOR))
        .replace("{current_date}", current_date)
        .replace("{research_topic}", research_topic)
}
