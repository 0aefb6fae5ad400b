//! Workflow primitives with no provider dependency.
//!
//! - [`retry`]: classify-then-backoff retry policy.
//! - [`limiter`]: per-run bound on in-flight tasks.
//! - [`citation`]: grounding metadata to inline markers and sources.

pub mod citation;
pub mod limiter;
pub mod retry;

pub use citation::{
    Annotated, Citation, GroundingChunk, GroundingMetadata, GroundingSupport, Segment,
    SupportSpan, UrlMap, WebSource, annotate, get_citations, insert_citation_markers,
    resolve_urls,
};
pub use limiter::{ConcurrencyLimiter, Permit};
pub use retry::RetryPolicy;
