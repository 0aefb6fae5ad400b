//! Citation resolution for grounded answers.
//!
//! Turns provider grounding metadata into inline citation markers and a
//! list of source records in three phases:
//!
//! 1. [`resolve_urls`] maps each distinct source URL of one search task to
//!    a short, task-scoped identifier (`<base>/<task_id>-<ordinal>`).
//! 2. [`get_citations`] converts text-span supports into [`Citation`]s,
//!    labelling every resolved source.
//! 3. [`insert_citation_markers`] splices ` [label]` markers into the text
//!    at each citation's end offset.
//!
//! Offsets are byte offsets into the UTF-8 answer text, as reported by
//! the grounding provider.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prefix for synthetic short URLs.
pub const SHORT_URL_BASE: &str = "https://vertexaisearch.cloud.google.com/id/";

/// Grounding evidence attached to a model response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    /// Referenced source chunks, addressed by position.
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
    /// Text spans backed by one or more chunks.
    #[serde(default)]
    pub grounding_supports: Vec<GroundingSupport>,
}

/// One referenced source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingChunk {
    /// Web source, when the chunk came from web search.
    #[serde(default)]
    pub web: Option<WebSource>,
}

impl GroundingChunk {
    /// Creates a web chunk.
    #[must_use]
    pub fn web(uri: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            web: Some(WebSource {
                uri: Some(uri.into()),
                title: Some(title.into()),
            }),
        }
    }

    /// Source URL, if present.
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.web.as_ref().and_then(|w| w.uri.as_deref())
    }

    /// Source title, if present.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.web.as_ref().and_then(|w| w.title.as_deref())
    }
}

/// URL and title of a web source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSource {
    /// Source URL.
    #[serde(default)]
    pub uri: Option<String>,
    /// Page title.
    #[serde(default)]
    pub title: Option<String>,
}

/// A text span and the chunks supporting it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingSupport {
    /// Supported span of the answer text.
    #[serde(default)]
    pub segment: SupportSpan,
    /// Positions into [`GroundingMetadata::grounding_chunks`].
    #[serde(default)]
    pub grounding_chunk_indices: Vec<usize>,
}

impl GroundingSupport {
    /// Creates a support for `start..end` backed by the given chunks.
    #[must_use]
    pub fn new(start: usize, end: usize, chunk_indices: Vec<usize>) -> Self {
        Self {
            segment: SupportSpan {
                start_index: Some(start),
                end_index: Some(end),
            },
            grounding_chunk_indices: chunk_indices,
        }
    }
}

/// Byte range of a supported span. Either bound may be missing on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportSpan {
    /// Start offset; absent means 0.
    #[serde(default)]
    pub start_index: Option<usize>,
    /// End offset; supports without one are dropped.
    #[serde(default)]
    pub end_index: Option<usize>,
}

/// A resolved reference to one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Display label, e.g. `"1"`.
    pub label: String,
    /// Task-scoped short identifier.
    pub short_url: String,
    /// Original source URL; the deduplication key.
    pub original_url: String,
    /// Page title, if the provider sent one.
    pub title: Option<String>,
}

/// A span of text and the sources backing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Start byte offset.
    pub start_index: usize,
    /// End byte offset; markers are inserted here.
    pub end_index: usize,
    /// Resolved sources, never empty.
    pub segments: Vec<Segment>,
}

impl Citation {
    /// Marker text for this citation: ` [label]` once per segment.
    #[must_use]
    pub fn marker(&self) -> String {
        self.segments
            .iter()
            .map(|s| format!(" [{}]", s.label))
            .collect()
    }
}

/// Insertion-ordered mapping from original URL to short identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlMap {
    entries: Vec<(String, String)>,
    positions: HashMap<String, usize>,
}

impl UrlMap {
    /// Number of distinct URLs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no URL has been mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Short identifier for `url`.
    #[must_use]
    pub fn get(&self, url: &str) -> Option<&str> {
        self.positions
            .get(url)
            .map(|&pos| self.entries[pos].1.as_str())
    }

    /// Label for `url`: distinct URL count minus insertion position.
    ///
    /// The most recently discovered URL is labelled `"1"`.
    #[must_use]
    pub fn label(&self, url: &str) -> Option<String> {
        self.positions
            .get(url)
            .map(|&pos| (self.entries.len() - pos).to_string())
    }

    /// Entries in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(u, s)| (u.as_str(), s.as_str()))
    }

    fn insert_if_absent(&mut self, url: &str, short: String) {
        if !self.positions.contains_key(url) {
            self.positions.insert(url.to_string(), self.entries.len());
            self.entries.push((url.to_string(), short));
        }
    }
}

/// Maps each distinct chunk URL of one task to `<base><task_id>-<ordinal>`.
///
/// `ordinal` is the chunk position where the URL first appears. Chunks
/// without a URL are skipped but still count toward positions.
#[must_use]
pub fn resolve_urls(chunks: &[GroundingChunk], task_id: usize) -> UrlMap {
    resolve_urls_with_base(chunks, task_id, SHORT_URL_BASE)
}

/// [`resolve_urls`] with a caller-chosen base.
#[must_use]
pub fn resolve_urls_with_base(chunks: &[GroundingChunk], task_id: usize, base: &str) -> UrlMap {
    let mut map = UrlMap::default();
    for (ordinal, chunk) in chunks.iter().enumerate() {
        if let Some(uri) = chunk.uri().filter(|u| !u.is_empty()) {
            map.insert_if_absent(uri, format!("{base}{task_id}-{ordinal}"));
        }
    }
    map
}

/// Builds citations from grounding supports.
///
/// Supports without an end offset are dropped, as are chunk references
/// that are out of range or whose URL is not in `url_map`. A support left
/// with no resolvable segment produces no citation.
#[must_use]
pub fn get_citations(
    supports: &[GroundingSupport],
    chunks: &[GroundingChunk],
    url_map: &UrlMap,
) -> Vec<Citation> {
    let mut citations = Vec::with_capacity(supports.len());

    for support in supports {
        let Some(end_index) = support.segment.end_index else {
            debug!("dropping grounding support without end offset");
            continue;
        };
        let start_index = support.segment.start_index.unwrap_or(0);

        let mut segments = Vec::with_capacity(support.grounding_chunk_indices.len());
        for &idx in &support.grounding_chunk_indices {
            let Some(chunk) = chunks.get(idx) else {
                debug!(chunk_index = idx, chunk_count = chunks.len(), "dropping out-of-range chunk reference");
                continue;
            };
            let Some(uri) = chunk.uri() else {
                continue;
            };
            let (Some(short_url), Some(label)) = (url_map.get(uri), url_map.label(uri)) else {
                debug!(uri, "dropping reference to unresolved url");
                continue;
            };
            segments.push(Segment {
                label,
                short_url: short_url.to_string(),
                original_url: uri.to_string(),
                title: chunk.title().map(str::to_string),
            });
        }

        if segments.is_empty() {
            continue;
        }

        citations.push(Citation {
            start_index,
            end_index,
            segments,
        });
    }

    citations
}

/// Inserts ` [label]` markers at each citation's end offset.
///
/// Citations are applied by descending `(end_index, start_index)`, so each
/// insertion lands at or after every offset still to be processed. Ties are
/// broken on the marker text, which makes the result independent of input
/// order. Offsets past the end are clamped to the end; offsets inside a
/// multi-byte character move forward to the next character boundary.
#[must_use]
pub fn insert_citation_markers(text: &str, citations: &[Citation]) -> String {
    let mut ordered: Vec<(&Citation, String)> = citations.iter().map(|c| (c, c.marker())).collect();
    ordered.sort_by(|(a, ma), (b, mb)| {
        (b.end_index, b.start_index, mb).cmp(&(a.end_index, a.start_index, ma))
    });

    let extra: usize = ordered.iter().map(|(_, m)| m.len()).sum();
    let mut out = String::with_capacity(text.len() + extra);
    out.push_str(text);

    for (citation, marker) in &ordered {
        let pos = char_boundary_at_or_after(text, citation.end_index);
        out.insert_str(pos, marker);
    }

    out
}

/// Flattens citation segments into source records, in citation order.
#[must_use]
pub fn collect_sources(citations: &[Citation]) -> Vec<Segment> {
    citations
        .iter()
        .flat_map(|c| c.segments.iter().cloned())
        .collect()
}

/// Result of annotating one grounded answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotated {
    /// Answer text with citation markers.
    pub text: String,
    /// Sources referenced by the markers.
    pub sources: Vec<Segment>,
}

/// Runs all three phases for one task's answer.
#[must_use]
pub fn annotate(text: &str, metadata: &GroundingMetadata, task_id: usize) -> Annotated {
    let url_map = resolve_urls(&metadata.grounding_chunks, task_id);
    let citations = get_citations(
        &metadata.grounding_supports,
        &metadata.grounding_chunks,
        &url_map,
    );
    Annotated {
        text: insert_citation_markers(text, &citations),
        sources: collect_sources(&citations),
    }
}

fn char_boundary_at_or_after(text: &str, offset: usize) -> usize {
    let mut pos = offset.min(text.len());
    while !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunks(urls: &[&str]) -> Vec<GroundingChunk> {
        urls.iter()
            .map(|u| GroundingChunk::web(*u, format!("title {u}")))
            .collect()
    }

    fn citation(start: usize, end: usize, labels: &[&str]) -> Citation {
        Citation {
            start_index: start,
            end_index: end,
            segments: labels
                .iter()
                .map(|l| Segment {
                    label: (*l).to_string(),
                    short_url: format!("s{l}"),
                    original_url: format!("u{l}"),
                    title: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_duplicate_url_maps_to_same_short_id() {
        let map = resolve_urls(&chunks(&["https://a", "https://b", "https://a"]), 4);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("https://a"), Some(&*format!("{SHORT_URL_BASE}4-0")));
        assert_eq!(map.get("https://b"), Some(&*format!("{SHORT_URL_BASE}4-1")));
    }

    #[test]
    fn test_same_url_independent_across_tasks() {
        let a = resolve_urls(&chunks(&["https://x"]), 0);
        let b = resolve_urls(&chunks(&["https://x"]), 7);
        assert_ne!(a.get("https://x"), b.get("https://x"));
        assert_eq!(b.get("https://x"), Some(&*format!("{SHORT_URL_BASE}7-0")));
    }

    #[test]
    fn test_ordinal_counts_chunks_without_url() {
        let mut cs = vec![GroundingChunk::default()];
        cs.extend(chunks(&["https://a"]));
        let map = resolve_urls(&cs, 2);
        assert_eq!(map.get("https://a"), Some(&*format!("{SHORT_URL_BASE}2-1")));
    }

    #[test]
    fn test_labels_reverse_discovery_order() {
        let cs = chunks(&["A", "B", "C"]);
        let map = resolve_urls(&cs, 0);
        assert_eq!(map.label("A").as_deref(), Some("3"));
        assert_eq!(map.label("B").as_deref(), Some("2"));
        assert_eq!(map.label("C").as_deref(), Some("1"));

        let supports = vec![GroundingSupport::new(0, 5, vec![0, 1, 2])];
        let citations = get_citations(&supports, &cs, &map);
        let labels: Vec<&str> = citations[0]
            .segments
            .iter()
            .map(|s| s.label.as_str())
            .collect();
        assert_eq!(labels, vec!["3", "2", "1"]);
    }

    #[test]
    fn test_get_citations_drops_missing_reference_data() {
        let cs = chunks(&["A", "B"]);
        let map = resolve_urls(&cs[..1], 0);
        let supports = vec![
            GroundingSupport {
                segment: SupportSpan {
                    start_index: Some(0),
                    end_index: None,
                },
                grounding_chunk_indices: vec![0],
            },
            GroundingSupport::new(0, 3, vec![0, 9, 1]),
            GroundingSupport::new(4, 6, vec![1]),
        ];
        let citations = get_citations(&supports, &cs, &map);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].end_index, 3);
        assert_eq!(citations[0].segments.len(), 1);
        assert_eq!(citations[0].segments[0].original_url, "A");
        assert_eq!(citations[0].segments[0].title.as_deref(), Some("title A"));
    }

    #[test]
    fn test_missing_start_defaults_to_zero() {
        let cs = chunks(&["A"]);
        let map = resolve_urls(&cs, 0);
        let supports = vec![GroundingSupport {
            segment: SupportSpan {
                start_index: None,
                end_index: Some(2),
            },
            grounding_chunk_indices: vec![0],
        }];
        let citations = get_citations(&supports, &cs, &map);
        assert_eq!(citations[0].start_index, 0);
    }

    #[test]
    fn test_insert_markers() {
        let text = "Rust is fast. It is safe.";
        let cites = vec![citation(0, 13, &["2"]), citation(14, 25, &["1", "2"])];
        let out = insert_citation_markers(text, &cites);
        assert_eq!(out, "Rust is fast. [2] It is safe. [1] [2]");
    }

    #[test]
    fn test_insert_markers_same_end_orders_by_start_desc() {
        let out = insert_citation_markers("abc", &[citation(0, 3, &["1"]), citation(2, 3, &["2"])]);
        assert_eq!(out, "abc [1] [2]");
    }

    #[test]
    fn test_insert_markers_clamps_offsets() {
        let out = insert_citation_markers("héllo", &[citation(0, 2, &["1"]), citation(0, 99, &["2"])]);
        assert_eq!(out, "hé [1]llo [2]");
    }

    #[test]
    fn test_annotate_end_to_end() {
        let metadata = GroundingMetadata {
            grounding_chunks: chunks(&["https://a", "https://b", "https://a"]),
            grounding_supports: vec![
                GroundingSupport::new(0, 4, vec![0]),
                GroundingSupport::new(5, 9, vec![1, 2]),
            ],
        };
        let annotated = annotate("abcd efgh", &metadata, 3);
        assert_eq!(annotated.text, "abcd [2] efgh [1] [2]");
        assert_eq!(annotated.sources.len(), 3);
        assert_eq!(annotated.sources[0].short_url, format!("{SHORT_URL_BASE}3-0"));
        assert_eq!(annotated.sources[2].short_url, format!("{SHORT_URL_BASE}3-0"));
    }

    #[test]
    fn test_metadata_wire_format() {
        let json = r#"{
            "groundingChunks": [{"web": {"uri": "https://a", "title": "a.com"}}],
            "groundingSupports": [
                {"segment": {"endIndex": 12, "text": "hello"}, "groundingChunkIndices": [0]}
            ]
        }"#;
        let metadata: GroundingMetadata =
            serde_json::from_str(json).unwrap_or_else(|_| unreachable!());
        assert_eq!(metadata.grounding_chunks[0].uri(), Some("https://a"));
        assert_eq!(metadata.grounding_supports[0].segment.start_index, None);
        assert_eq!(metadata.grounding_supports[0].segment.end_index, Some(12));
    }

    fn arb_case() -> impl Strategy<Value = (String, Vec<Citation>)> {
        "[a-z ]{0,80}".prop_flat_map(|text| {
            let len = text.len();
            let cite = (0..=len, 0..=len, prop::collection::vec(1u8..=9, 1..4)).prop_map(
                |(a, b, labels)| {
                    let labels: Vec<String> = labels.iter().map(u8::to_string).collect();
                    let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
                    citation(a.min(b), a.max(b), &refs)
                },
            );
            (Just(text), prop::collection::vec(cite, 0..8))
        })
    }

    proptest! {
        #[test]
        fn prop_order_invariant((text, cites) in arb_case(), seed in any::<u64>()) {
            let mut sorted = cites.clone();
            sorted.sort_by(|a, b| (b.end_index, b.start_index, b.marker()).cmp(&(a.end_index, a.start_index, a.marker())));
            let mut shuffled = cites;
            fastrand::Rng::with_seed(seed).shuffle(&mut shuffled);
            prop_assert_eq!(
                insert_citation_markers(&text, &shuffled),
                insert_citation_markers(&text, &sorted)
            );
        }

        #[test]
        fn prop_only_inserts((text, cites) in arb_case()) {
            let out = insert_citation_markers(&text, &cites);
            let marker_len: usize = cites.iter().map(|c| c.marker().len()).sum();
            prop_assert_eq!(out.len(), text.len() + marker_len);

            let mut stripped = out;
            for label in 1..=9 {
                stripped = stripped.replace(&format!(" [{label}]"), "");
            }
            prop_assert_eq!(stripped, text);
        }
    }
}
