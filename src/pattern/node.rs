//! The trie used to resolve dynamic and splat patterns.
//!
//! Nodes are stored in a flat arena and referenced by index rather than owned recursively,
//! which sidesteps the ownership cycles an owned-child/parent-pointer tree would need and
//! keeps the terminal flag (and the registered pattern it terminates) directly on the node
//! rather than in a side table.

use std::collections::HashMap;

use super::{RegisteredPattern, SegmentKind};

/// A single node in the pattern trie.
pub struct SegmentNode {
    pub(super) kind: SegmentKind,
    /// Set only on nodes that terminate a registered pattern.
    pub(super) pattern: Option<RegisteredPattern>,
    pub(super) static_children: HashMap<String, usize>,
    /// Dynamic children first, with at most one splat child last (and always terminal).
    pub(super) dynamic_children: Vec<usize>,
}

impl SegmentNode {
    fn new(kind: SegmentKind) -> Self {
        SegmentNode {
            kind,
            pattern: None,
            static_children: HashMap::new(),
            dynamic_children: Vec::new(),
        }
    }

    pub(super) fn is_terminal(&self) -> bool {
        self.pattern.is_some()
    }

    pub(super) fn is_splat(&self) -> bool {
        matches!(self.kind, SegmentKind::Splat)
    }
}

/// Flat arena backing the trie. Index `0` is always the root.
pub struct SegmentNodeArena {
    nodes: Vec<SegmentNode>,
}

impl SegmentNodeArena {
    pub(super) fn new() -> Self {
        SegmentNodeArena {
            nodes: vec![SegmentNode::new(SegmentKind::Static)],
        }
    }

    pub(super) fn root(&self) -> usize {
        0
    }

    pub(super) fn get(&self, idx: usize) -> &SegmentNode {
        &self.nodes[idx]
    }

    pub(super) fn get_mut(&mut self, idx: usize) -> &mut SegmentNode {
        &mut self.nodes[idx]
    }

    /// Finds or creates the static child of `parent` for `segment`, returning its index.
    pub(super) fn static_child_or_insert(&mut self, parent: usize, segment: &str) -> usize {
        if let Some(&idx) = self.nodes[parent].static_children.get(segment) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(SegmentNode::new(SegmentKind::Static));
        self.nodes[parent]
            .static_children
            .insert(segment.to_string(), idx);
        idx
    }

    /// Finds or creates the dynamic child of `parent` carrying parameter `name`, returning its
    /// index. Dynamic children are kept ahead of any splat child in `dynamic_children`.
    pub(super) fn dynamic_child_or_insert(&mut self, parent: usize, name: &str) -> usize {
        for &idx in &self.nodes[parent].dynamic_children {
            if let SegmentKind::Dynamic { name: existing } = &self.nodes[idx].kind {
                if existing == name {
                    return idx;
                }
            }
        }
        let idx = self.nodes.len();
        self.nodes.push(SegmentNode::new(SegmentKind::Dynamic {
            name: name.to_string(),
        }));
        let insert_at = self.nodes[parent]
            .dynamic_children
            .iter()
            .position(|&c| self.nodes[c].is_splat())
            .unwrap_or(self.nodes[parent].dynamic_children.len());
        self.nodes[parent].dynamic_children.insert(insert_at, idx);
        idx
    }

    /// Finds or creates the (sole) splat child of `parent`, returning its index. A splat child
    /// is always terminal and always sorted after any dynamic siblings.
    pub(super) fn splat_child_or_insert(&mut self, parent: usize) -> usize {
        if let Some(&idx) = self.nodes[parent]
            .dynamic_children
            .iter()
            .find(|&&c| self.nodes[c].is_splat())
        {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(SegmentNode::new(SegmentKind::Splat));
        self.nodes[parent].dynamic_children.push(idx);
        idx
    }
}
