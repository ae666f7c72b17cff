//! Groups a flat page of keys into a namespace tree.
//!
//! `user:1:profile`, `user:1:sessions` and `user:2` become
//!
//! ```text
//! user (3)
//! ├── 1 (2)
//! │   ├── profile  [leaf]
//! │   └── sessions [leaf]
//! └── 2            [leaf]
//! ```
//!
//! A path can be a key and a prefix of other keys at the same time; such a
//! node carries the key's type and TTL and also has children.
//!
//! The tree is rebuilt from scratch for every page. Build order is
//! deterministic: children appear in the order their first key appeared.

use crate::scanner::{KeyDescriptor, KeyType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_DELIMITER: &str = ":";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceNode {
    pub segment: String,
    pub full_path: String,
    pub is_leaf: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub key_type: Option<KeyType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    pub children: Vec<NamespaceNode>,
    /// Keys in this subtree, this node included when it is a leaf.
    pub descendant_key_count: usize,
}

/// Builds the tree with `:` as the delimiter.
pub fn build(keys: &[KeyDescriptor]) -> Vec<NamespaceNode> {
    build_with_delimiter(keys, DEFAULT_DELIMITER)
}

/// Builds the tree splitting names on `delimiter`. An empty delimiter puts
/// every key at the top level.
pub fn build_with_delimiter(keys: &[KeyDescriptor], delimiter: &str) -> Vec<NamespaceNode> {
    let mut arena = Arena::default();

    for key in keys {
        let mut parent: Option<usize> = None;
        let mut path = String::with_capacity(key.name.len());
        let segments: Vec<&str> = if delimiter.is_empty() {
            vec![key.name.as_str()]
        } else {
            key.name.split(delimiter).collect()
        };

        for (depth, segment) in segments.iter().enumerate() {
            if depth > 0 {
                path.push_str(delimiter);
            }
            path.push_str(segment);
            parent = Some(arena.child(parent, segment, &path));
        }

        if let Some(index) = parent {
            // Later duplicates overwrite earlier metadata.
            arena.nodes[index].leaf = Some((key.key_type, key.ttl));
        }
    }

    arena.into_tree()
}

struct ArenaNode {
    segment: String,
    full_path: String,
    leaf: Option<(KeyType, i64)>,
    children: Vec<usize>,
}

#[derive(Default)]
struct Arena {
    nodes: Vec<ArenaNode>,
    roots: Vec<usize>,
    /// (parent, segment) to node index; `None` parent for roots.
    index: HashMap<(Option<usize>, String), usize>,
}

impl Arena {
    /// Returns the child of `parent` named `segment`, creating it if needed.
    fn child(&mut self, parent: Option<usize>, segment: &str, full_path: &str) -> usize {
        let lookup = (parent, segment.to_string());
        if let Some(&existing) = self.index.get(&lookup) {
            return existing;
        }

        let id = self.nodes.len();
        self.nodes.push(ArenaNode {
            segment: segment.to_string(),
            full_path: full_path.to_string(),
            leaf: None,
            children: Vec::new(),
        });
        match parent {
            Some(p) => self.nodes[p].children.push(id),
            None => self.roots.push(id),
        }
        self.index.insert(lookup, id);
        id
    }

    /// Children are always created after their parent, so walking the arena
    /// backwards finishes every subtree before its parent needs it.
    fn into_tree(self) -> Vec<NamespaceNode> {
        let mut built: Vec<Option<NamespaceNode>> = (0..self.nodes.len()).map(|_| None).collect();

        for (id, node) in self.nodes.into_iter().enumerate().rev() {
            let children: Vec<NamespaceNode> = node
                .children
                .iter()
                .filter_map(|&child| built[child].take())
                .collect();
            let descendant_key_count = usize::from(node.leaf.is_some())
                + children.iter().map(|c| c.descendant_key_count).sum::<usize>();

            built[id] = Some(NamespaceNode {
                segment: node.segment,
                full_path: node.full_path,
                is_leaf: node.leaf.is_some(),
                key_type: node.leaf.map(|(key_type, _)| key_type),
                ttl: node.leaf.map(|(_, ttl)| ttl),
                children,
                descendant_key_count,
            });
        }

        self.roots
            .iter()
            .filter_map(|&root| built[root].take())
            .collect()
    }
}
