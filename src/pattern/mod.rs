//! Pattern registry and matcher: normalizes route patterns and answers best-match and
//! all-nested-matches queries for a request path.
//!
//! A pattern is a `/`-delimited template made up of static, dynamic (`:name`), splat (`*`),
//! and index segments. Registration threads dynamic/splat patterns into a trie (`node`) so
//! that matching doesn't need to scan every registered pattern; static patterns bypass the
//! trie entirely via direct map lookup.

mod node;
mod registry;

pub mod nested;

pub use node::{SegmentNode, SegmentNodeArena};
pub use registry::PatternRegistry;

use std::collections::HashMap;
use thiserror::Error;

/// Configures the characters and conventions a [`PatternRegistry`] parses patterns with.
#[derive(Debug, Clone)]
pub struct PatternRegistryConfig {
    /// Character marking a dynamic (named-parameter) segment. Default `:`.
    pub dynamic_prefix: char,
    /// Character marking a splat (wildcard) segment. Default `*`.
    pub splat_char: char,
    /// When `Some`, an explicit marker token (e.g. `"_index"`) denotes an index route instead
    /// of a bare trailing slash, and a trailing slash on any other pattern is a registration
    /// error. When `None` (the default), a trailing slash implicitly marks an index route.
    pub index_marker: Option<String>,
}

impl Default for PatternRegistryConfig {
    fn default() -> Self {
        PatternRegistryConfig {
            dynamic_prefix: ':',
            splat_char: '*',
            index_marker: None,
        }
    }
}

/// The kind of a single normalized path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    /// Matched by exact string equality.
    Static,
    /// Matches any single segment; the matched text is bound to `name`.
    Dynamic {
        /// The parameter name this segment's matched value is recorded under.
        name: String,
    },
    /// Matches all remaining segments to the end of the path.
    Splat,
    /// A zero-width segment representing "the page at exactly this ancestor chain".
    Index,
}

/// A single normalized segment of a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    /// The segment's normalized textual form (`:name` for dynamic, `*` for splat, `""` for
    /// index, the literal text for static).
    pub normalized_value: String,
    /// What kind of segment this is.
    pub kind: SegmentKind,
}

impl Segment {
    fn is_static(&self) -> bool {
        matches!(self.kind, SegmentKind::Static | SegmentKind::Index)
    }
}

/// A pattern that has been normalized and registered into a [`PatternRegistry`].
#[derive(Debug, Clone)]
pub struct RegisteredPattern {
    /// The pattern exactly as the caller wrote it.
    pub original_pattern: String,
    /// The normalized form used as the map/trie key.
    pub normalized_pattern: String,
    /// The normalized segments making up this pattern.
    pub segments: Vec<Segment>,
    /// The kind of the final segment.
    pub last_segment_kind: SegmentKind,
    /// Whether the final segment is a splat that is not the sole root segment (i.e. not `/*`).
    pub last_segment_is_non_root_splat: bool,
    /// Whether the final segment is an index segment.
    pub last_segment_is_index: bool,
    /// How many segments in this pattern are dynamic (named) parameters.
    pub number_of_dynamic_param_segments: usize,
}

impl RegisteredPattern {
    /// A pattern is "static" iff none of its segments are dynamic or splat.
    pub fn is_static(&self) -> bool {
        self.segments.iter().all(Segment::is_static)
    }

    fn final_score(&self) -> u32 {
        self.segments
            .iter()
            .map(|s| match s.kind {
                SegmentKind::Static => 2,
                SegmentKind::Dynamic { .. } => 1,
                SegmentKind::Splat => 0,
                SegmentKind::Index => 0,
            })
            .sum()
    }
}

/// The result of a successful best-match query.
#[derive(Debug, Clone)]
pub struct Match {
    /// The pattern that matched.
    pub pattern: RegisteredPattern,
    /// Values captured by dynamic segments, keyed by parameter name.
    pub params: HashMap<String, String>,
    /// The tail of path segments absorbed by a trailing splat, in order.
    pub splat_values: Vec<String>,
    /// The static-weighted score used to break ties between candidate matches.
    pub score: u32,
}

/// The result of an all-nested-matches query: the full ancestor chain of patterns describing
/// a path, ordered shallowest to deepest, with index-terminal matches last.
#[derive(Debug, Clone)]
pub struct NestedMatchSet {
    /// Values captured by dynamic segments across the whole chain, keyed by parameter name.
    pub params: HashMap<String, String>,
    /// The tail of path segments absorbed by the deepest splat, if any matched.
    pub splat_values: Vec<String>,
    /// Every matched ancestor pattern, ordered shallowest to deepest with index routes last.
    pub matches: Vec<Match>,
}

/// Errors that can occur while registering a pattern.
///
/// Duplicate registration is not an error value at all — per the design it's a warning,
/// logged at the call site, with the later registration silently overwriting the earlier one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// An explicit index marker was configured but contains a `/`, which would make it
    /// ambiguous with segment boundaries.
    #[error("index marker {0:?} must not contain '/'")]
    InvalidIndexMarker(String),
    /// A trailing slash appeared on a non-root pattern while the registry is configured for
    /// explicit index markers.
    #[error("trailing slash on {0:?} is invalid in explicit-index mode; use the configured index marker instead")]
    TrailingSlashInExplicitIndexMode(String),
}

/// Splits a request path into segments the same way a pattern is normalized into segments.
///
/// Leading-slash emptiness is dropped, but a single trailing empty segment is preserved to
/// represent a trailing slash. The empty path maps to an empty sequence; `"/"` maps to `[""]`.
pub fn parse_segments(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return vec![String::new()];
    }
    trimmed.split('/').map(|s| s.to_string()).collect()
}
