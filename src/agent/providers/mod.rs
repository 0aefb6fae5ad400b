//! Concrete LLM provider implementations.
//!
//! Each provider is behind a cargo feature of the same name.

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "gemini")]
pub use gemini::GeminiProvider;
#[cfg(feature = "openai")]
pub use openai::OpenAiProvider;
