//! All-nested-matches resolution: the full ancestor chain of patterns describing a path.
//!
//! Unlike [`super::PatternRegistry::find_best_match`], which wants the single highest-scoring
//! pattern, a nested router wants every pattern along the layout chain leading to that page —
//! the root layout, every intermediate segment layout, and the page itself — so each can
//! contribute a loader and a rendered frame.

use std::collections::HashMap;

use super::registry::splat_tail;
use super::{parse_segments, Match, NestedMatchSet, PatternRegistry, RegisteredPattern, SegmentKind};

/// Finds every pattern on the ancestor chain leading to `real_path`, ordered shallowest to
/// deepest with any index-terminal match last.
///
/// Static ancestors (e.g. `/dashboard`, `/dashboard/customers`) are found by walking cumulative
/// path prefixes against the static map, since purely static patterns are never threaded into
/// the trie. The deepest, possibly dynamic or splat, segment is resolved by a depth-first walk
/// of the trie with backtracking across dynamic siblings.
pub fn find_nested_matches(registry: &PatternRegistry, real_path: &str) -> Option<NestedMatchSet> {
    let segments = parse_segments(real_path);
    let mut matches: Vec<Match> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let mut push = |matches: &mut Vec<Match>, seen: &mut std::collections::HashSet<String>, m: Match| {
        if seen.insert(m.pattern.normalized_pattern.clone()) {
            matches.push(m);
        }
    };

    if let Some(p) = registry.static_patterns.get("") {
        push(&mut matches, &mut seen, trivial_match(p));
    }

    let mut prefix = String::new();
    for seg in segments.iter().take(segments.len().saturating_sub(1)) {
        prefix.push('/');
        prefix.push_str(seg);
        if let Some(p) = registry.static_patterns.get(&prefix) {
            push(&mut matches, &mut seen, trivial_match(p));
        }
    }

    if let Some(p) = registry.static_patterns.get(real_path) {
        push(&mut matches, &mut seen, trivial_match(p));
    } else if real_path.len() > 1 && real_path.ends_with('/') {
        if let Some(p) = registry.static_patterns.get(&real_path[..real_path.len() - 1]) {
            push(&mut matches, &mut seen, trivial_match(p));
        }
    }

    if let Some(chain) = resolve_chain(registry, registry.arena.root(), &segments, 0) {
        for idx in chain {
            let pattern = registry.arena.get(idx).pattern.clone().unwrap();
            let consumed = pattern.segments.len().min(segments.len());
            let params = params_for(&pattern, &segments[..consumed]);
            let sv = splat_tail(&pattern, &segments);
            push(
                &mut matches,
                &mut seen,
                Match {
                    score: pattern.final_score(),
                    params,
                    splat_values: sv,
                    pattern,
                },
            );
        }
    }

    if matches.is_empty() {
        return None;
    }
    if !real_path.is_empty() && matches.len() == 1 && matches[0].pattern.normalized_pattern.is_empty() {
        return None;
    }

    matches.sort_by_key(|m| {
        let depth = if m.pattern.last_segment_is_index {
            m.pattern.segments.len().saturating_sub(1)
        } else {
            m.pattern.segments.len()
        };
        (depth, m.pattern.last_segment_is_index)
    });

    let mut params = HashMap::new();
    let mut splat_values = Vec::new();
    for m in &matches {
        for (k, v) in &m.params {
            params.insert(k.clone(), v.clone());
        }
        if !m.splat_values.is_empty() {
            splat_values = m.splat_values.clone();
        }
    }

    Some(NestedMatchSet {
        params,
        splat_values,
        matches,
    })
}

fn trivial_match(pattern: &RegisteredPattern) -> Match {
    Match {
        score: pattern.final_score(),
        params: HashMap::new(),
        splat_values: Vec::new(),
        pattern: pattern.clone(),
    }
}

fn params_for(pattern: &RegisteredPattern, segments: &[String]) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (segment, value) in pattern.segments.iter().zip(segments.iter()) {
        if let SegmentKind::Dynamic { name } = &segment.kind {
            params.insert(name.clone(), value.clone());
        }
    }
    params
}

/// Depth-first walk of the trie collecting the chain of terminal node indices from the root to
/// whichever leaf resolves the full path, backtracking across dynamic siblings when a branch
/// dead-ends. Static children are preferred, then named dynamic children, then a trailing splat.
fn resolve_chain(
    registry: &PatternRegistry,
    node_idx: usize,
    segments: &[String],
    depth: usize,
) -> Option<Vec<usize>> {
    let node = registry.arena.get(node_idx);

    if depth >= segments.len() {
        let mut chain = Vec::new();
        if node.is_terminal() {
            chain.push(node_idx);
        }
        if let Some(&index_child) = node.static_children.get("") {
            if registry.arena.get(index_child).is_terminal() {
                chain.push(index_child);
            }
        }
        return if chain.is_empty() { None } else { Some(chain) };
    }
    let seg = &segments[depth];

    if let Some(&child) = node.static_children.get(seg) {
        if let Some(mut rest) = resolve_chain(registry, child, segments, depth + 1) {
            if node.is_terminal() {
                rest.insert(0, node_idx);
            }
            return Some(rest);
        }
    }

    for &child_idx in &node.dynamic_children {
        let child = registry.arena.get(child_idx);
        match &child.kind {
            SegmentKind::Dynamic { .. } => {
                if seg.is_empty() {
                    continue;
                }
                if let Some(mut rest) = resolve_chain(registry, child_idx, segments, depth + 1) {
                    if node.is_terminal() {
                        rest.insert(0, node_idx);
                    }
                    return Some(rest);
                }
            }
            SegmentKind::Splat => {
                if child.is_terminal() {
                    let mut rest = vec![child_idx];
                    if node.is_terminal() {
                        rest.insert(0, node_idx);
                    }
                    return Some(rest);
                }
            }
            _ => {}
        }
    }

    if depth == segments.len() - 1 && seg.is_empty() && node.is_terminal() {
        return Some(vec![node_idx]);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::super::PatternRegistryConfig;
    use super::*;

    fn registry() -> PatternRegistry {
        let mut r = PatternRegistry::new(PatternRegistryConfig::default());
        for p in [
            "",
            "/dashboard",
            "/dashboard/customers",
            "/dashboard/customers/:customer_id",
            "/dashboard/customers/:customer_id/",
        ] {
            r.register(p).unwrap();
        }
        r
    }

    #[test]
    fn ancestor_chain_includes_index_sibling_last() {
        let r = registry();
        let set = find_nested_matches(&r, "/dashboard/customers/42").unwrap();
        let patterns: Vec<_> = set.matches.iter().map(|m| m.pattern.normalized_pattern.clone()).collect();
        assert_eq!(
            patterns,
            vec![
                "".to_string(),
                "/dashboard".to_string(),
                "/dashboard/customers".to_string(),
                "/dashboard/customers/:customer_id".to_string(),
                "/dashboard/customers/:customer_id/".to_string(),
            ]
        );
        assert_eq!(set.params.get("customer_id").unwrap(), "42");
    }

    #[test]
    fn index_route_sorts_last() {
        let r = registry();
        let set = find_nested_matches(&r, "/dashboard/customers/42/").unwrap();
        let last = set.matches.last().unwrap();
        assert!(last.pattern.last_segment_is_index);
    }

    #[test]
    fn unmatched_path_rejected() {
        let r = registry();
        assert!(find_nested_matches(&r, "/nowhere").is_none());
    }
}
