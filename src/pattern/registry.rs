//! [`PatternRegistry`]: holds every registered pattern and answers best-match queries.

use std::collections::HashMap;

use log::{trace, warn};

use super::node::SegmentNodeArena;
use super::{parse_segments, Match, PatternRegistryConfig, RegisteredPattern, RegistrationError, Segment, SegmentKind};

/// Holds every pattern registered against one configuration, split into a static map (exact
/// string lookup) and a dynamic map plus trie (for patterns containing a dynamic or splat
/// segment). A pattern lives in exactly one of the two maps.
pub struct PatternRegistry {
    pub(crate) static_patterns: HashMap<String, RegisteredPattern>,
    pub(crate) dynamic_patterns: HashMap<String, RegisteredPattern>,
    pub(crate) arena: SegmentNodeArena,
    pub(crate) config: PatternRegistryConfig,
}

impl PatternRegistry {
    /// Creates an empty registry using the given configuration.
    pub fn new(config: PatternRegistryConfig) -> Self {
        PatternRegistry {
            static_patterns: HashMap::new(),
            dynamic_patterns: HashMap::new(),
            arena: SegmentNodeArena::new(),
            config,
        }
    }

    /// Creates an empty registry using the default configuration (`:` dynamic prefix, `*`
    /// splat, implicit trailing-slash index).
    pub fn with_defaults() -> Self {
        PatternRegistry::new(PatternRegistryConfig::default())
    }

    /// Normalizes `pattern` and registers it. Duplicate registration is logged as a warning
    /// and overwrites the previous registration; structurally invalid patterns (an explicit
    /// index marker containing `/`, or a trailing slash on a non-root pattern while running in
    /// explicit-index mode) are a hard [`RegistrationError`].
    pub fn register(&mut self, pattern: &str) -> Result<RegisteredPattern, RegistrationError> {
        let registered = normalize_pattern(pattern, &self.config)?;

        if registered.is_static() {
            if self.static_patterns.contains_key(&registered.normalized_pattern) {
                warn!(
                    "duplicate pattern registration for {:?}; overwriting",
                    registered.normalized_pattern
                );
            }
            self.static_patterns
                .insert(registered.normalized_pattern.clone(), registered.clone());
        } else {
            if self.dynamic_patterns.contains_key(&registered.normalized_pattern) {
                warn!(
                    "duplicate pattern registration for {:?}; overwriting",
                    registered.normalized_pattern
                );
            }
            self.thread_into_trie(&registered);
            self.dynamic_patterns
                .insert(registered.normalized_pattern.clone(), registered.clone());
        }

        Ok(registered)
    }

    fn thread_into_trie(&mut self, pattern: &RegisteredPattern) {
        let mut node = self.arena.root();
        for segment in &pattern.segments {
            trace!("threading segment {:?} of {:?} into trie", segment, pattern.normalized_pattern);
            node = match &segment.kind {
                SegmentKind::Static | SegmentKind::Index => {
                    self.arena.static_child_or_insert(node, &segment.normalized_value)
                }
                SegmentKind::Dynamic { name } => self.arena.dynamic_child_or_insert(node, name),
                SegmentKind::Splat => self.arena.splat_child_or_insert(node),
            };
        }
        self.arena.get_mut(node).pattern = Some(pattern.clone());
    }

    /// Finds the single best match for `real_path`, per the static-weighted scoring rule: the
    /// static map is checked first (exact, then trailing-slash-stripped), falling back to a
    /// depth-first trie search that returns the highest-scoring terminal candidate.
    pub fn find_best_match(&self, real_path: &str) -> Option<Match> {
        if let Some(pattern) = self.static_patterns.get(real_path) {
            return Some(Match {
                pattern: pattern.clone(),
                params: HashMap::new(),
                splat_values: Vec::new(),
                score: pattern.final_score(),
            });
        }

        if real_path.len() > 1 && real_path.ends_with('/') {
            let prefix = &real_path[..real_path.len() - 1];
            if let Some(pattern) = self.static_patterns.get(prefix) {
                return Some(Match {
                    pattern: pattern.clone(),
                    params: HashMap::new(),
                    splat_values: Vec::new(),
                    score: pattern.final_score(),
                });
            }
        }

        let segments = parse_segments(real_path);
        let check_trailing_slash = real_path.len() > 1 && real_path.ends_with('/');

        let mut candidates: Vec<(u32, RegisteredPattern, HashMap<String, String>, usize)> = Vec::new();
        self.search(
            self.arena.root(),
            &segments,
            0,
            0,
            check_trailing_slash,
            HashMap::new(),
            &mut candidates,
        );

        candidates
            .into_iter()
            .max_by(|a, b| a.0.cmp(&b.0).then(b.3.cmp(&a.3)))
            .map(|(score, pattern, params, _dynamic_count)| {
                let splat_values = splat_tail(&pattern, &segments);
                Match {
                    pattern,
                    params,
                    splat_values,
                    score,
                }
            })
    }

    #[allow(clippy::too_many_arguments)]
    fn search(
        &self,
        node_idx: usize,
        segments: &[String],
        depth: usize,
        score: u32,
        check_trailing_slash: bool,
        params: HashMap<String, String>,
        candidates: &mut Vec<(u32, RegisteredPattern, HashMap<String, String>, usize)>,
    ) {
        let node = self.arena.get(node_idx);

        if node.is_terminal() {
            let is_full = depth == segments.len();
            let is_trailing =
                check_trailing_slash && segments.len() > 0 && depth == segments.len() - 1;
            if is_full || node.is_splat() || is_trailing {
                let pattern = node.pattern.clone().unwrap();
                let dynamic_count = pattern.number_of_dynamic_param_segments;
                candidates.push((score, pattern, params.clone(), usize::MAX - dynamic_count));
            }
        }

        if depth >= segments.len() {
            return;
        }
        let seg = &segments[depth];

        if let Some(&child) = node.static_children.get(seg) {
            let bump = if matches!(self.arena.get(child).kind, SegmentKind::Index) { 0 } else { 2 };
            self.search(child, segments, depth + 1, score + bump, check_trailing_slash, params.clone(), candidates);
        }

        for &child_idx in &node.dynamic_children {
            let child = self.arena.get(child_idx);
            match &child.kind {
                SegmentKind::Dynamic { name } => {
                    if seg.is_empty() {
                        continue;
                    }
                    let mut next_params = params.clone();
                    next_params.insert(name.clone(), seg.clone());
                    self.search(child_idx, segments, depth + 1, score + 1, check_trailing_slash, next_params, candidates);
                }
                SegmentKind::Splat => {
                    if let Some(pattern) = &child.pattern {
                        candidates.push((score, pattern.clone(), params.clone(), usize::MAX));
                    }
                }
                _ => {}
            }
        }
    }
}

pub(super) fn splat_tail(pattern: &RegisteredPattern, segments: &[String]) -> Vec<String> {
    if pattern.normalized_pattern == "/*" {
        return segments.to_vec();
    }
    if !pattern.last_segment_is_non_root_splat {
        return Vec::new();
    }
    let non_splat_segment_count = pattern.segments.len() - 1;
    if segments.len() > non_splat_segment_count {
        segments[non_splat_segment_count..].to_vec()
    } else {
        Vec::new()
    }
}

fn normalize_pattern(
    original: &str,
    config: &PatternRegistryConfig,
) -> Result<RegisteredPattern, RegistrationError> {
    if let Some(marker) = &config.index_marker {
        if marker.contains('/') {
            return Err(RegistrationError::InvalidIndexMarker(marker.clone()));
        }
    }

    if original.is_empty() {
        return Ok(RegisteredPattern {
            original_pattern: String::new(),
            normalized_pattern: String::new(),
            segments: Vec::new(),
            last_segment_kind: SegmentKind::Static,
            last_segment_is_non_root_splat: false,
            last_segment_is_index: false,
            number_of_dynamic_param_segments: 0,
        });
    }

    let is_root = original == "/";
    let body = original.strip_prefix('/').unwrap_or(original);

    let mut raw: Vec<String> = if is_root {
        vec![String::new()]
    } else {
        body.split('/').map(|s| s.to_string()).collect()
    };

    let mut is_index = false;
    if !is_root {
        if let Some(marker) = &config.index_marker {
            if raw.last().map(String::as_str) == Some(marker.as_str()) {
                is_index = true;
                raw.pop();
            } else if raw.last().map(String::as_str) == Some("") {
                return Err(RegistrationError::TrailingSlashInExplicitIndexMode(
                    original.to_string(),
                ));
            }
        } else if raw.len() > 1 && raw.last().map(String::as_str) == Some("") {
            is_index = true;
            raw.pop();
        }
    }

    let mut segments = Vec::with_capacity(raw.len() + 1);
    let mut dynamic_count = 0;
    for tok in &raw {
        if tok.len() == 1 && tok.starts_with(config.splat_char) {
            segments.push(Segment {
                normalized_value: "*".to_string(),
                kind: SegmentKind::Splat,
            });
        } else if tok.starts_with(config.dynamic_prefix) {
            let name = tok[config.dynamic_prefix.len_utf8()..].to_string();
            segments.push(Segment {
                normalized_value: format!(":{}", name),
                kind: SegmentKind::Dynamic { name },
            });
            dynamic_count += 1;
        } else {
            segments.push(Segment {
                normalized_value: tok.clone(),
                kind: SegmentKind::Static,
            });
        }
    }
    if is_index {
        segments.push(Segment {
            normalized_value: String::new(),
            kind: SegmentKind::Index,
        });
    }

    let last_segment_kind = segments
        .last()
        .map(|s| s.kind.clone())
        .unwrap_or(SegmentKind::Static);
    let last_segment_is_non_root_splat =
        matches!(last_segment_kind, SegmentKind::Splat) && segments.len() != 1;

    let mut normalized_parts: Vec<String> = segments.iter().map(|s| s.normalized_value.clone()).collect();
    if is_index {
        if let Some(marker) = &config.index_marker {
            normalized_parts.pop();
            normalized_parts.push(marker.clone());
        }
    }
    let normalized_pattern = format!("/{}", normalized_parts.join("/"));

    Ok(RegisteredPattern {
        original_pattern: original.to_string(),
        normalized_pattern,
        segments,
        last_segment_kind,
        last_segment_is_non_root_splat,
        last_segment_is_index: is_index,
        number_of_dynamic_param_segments: dynamic_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_extraction() {
        let mut registry = PatternRegistry::with_defaults();
        for p in ["/", "/api", "/api/:version", "/api/v1"] {
            registry.register(p).unwrap();
        }
        let m = registry.find_best_match("/api/v1").unwrap();
        assert_eq!(m.pattern.normalized_pattern, "/api/v1");
        assert!(m.params.is_empty());
        assert!(m.splat_values.is_empty());
    }

    #[test]
    fn dynamic_param_bound() {
        let mut registry = PatternRegistry::with_defaults();
        for p in ["/", "/api", "/api/:version", "/api/v1"] {
            registry.register(p).unwrap();
        }
        let m = registry.find_best_match("/api/v2").unwrap();
        assert_eq!(m.pattern.normalized_pattern, "/api/:version");
        assert_eq!(m.params.get("version").unwrap(), "v2");
    }

    #[test]
    fn splat_tail_values() {
        let mut registry = PatternRegistry::with_defaults();
        registry.register("/files").unwrap();
        registry.register("/files/*").unwrap();
        let m = registry.find_best_match("/files/documents/report.pdf").unwrap();
        assert_eq!(m.pattern.normalized_pattern, "/files/*");
        assert_eq!(m.splat_values, vec!["documents", "report.pdf"]);
    }

    #[test]
    fn trailing_slash_round_trip() {
        let mut registry = PatternRegistry::with_defaults();
        registry.register("/x").unwrap();
        let m = registry.find_best_match("/x/").unwrap();
        assert_eq!(m.pattern.normalized_pattern, "/x");
    }

    #[test]
    fn explicit_index_mode_rejects_trailing_slash() {
        let mut registry = PatternRegistry::new(PatternRegistryConfig {
            index_marker: Some("_index".to_string()),
            ..Default::default()
        });
        let err = registry.register("/dashboard/").unwrap_err();
        assert_eq!(
            err,
            RegistrationError::TrailingSlashInExplicitIndexMode("/dashboard/".to_string())
        );
    }

    #[test]
    fn duplicate_registration_overwrites() {
        let mut registry = PatternRegistry::with_defaults();
        registry.register("/x").unwrap();
        registry.register("/x").unwrap();
        assert_eq!(registry.static_patterns.len(), 1);
    }
}
