//! Type Hierarchy - inheritance graph of registered types.
//!
//! Uses `petgraph::DiGraph` with:
//! - Nodes: the `TypeHash` of each registered type
//! - Edges: `derived -> base`

use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;

use opgraph_core::TypeHash;

/// Inheritance graph keyed by type hash.
#[derive(Debug, Default)]
pub struct TypeHierarchy {
    graph: DiGraph<TypeHash, ()>,
    nodes: FxHashMap<TypeHash, NodeIndex>,
}

impl TypeHierarchy {
    /// Create an empty hierarchy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the node of a type.
    pub fn add_type(&mut self, hash: TypeHash) -> NodeIndex {
        if let Some(&node) = self.nodes.get(&hash) {
            return node;
        }
        let node = self.graph.add_node(hash);
        self.nodes.insert(hash, node);
        node
    }

    /// Record that `derived` inherits from `base`.
    pub fn add_base(&mut self, derived: TypeHash, base: TypeHash) {
        let from = self.add_type(derived);
        let to = self.add_type(base);
        self.graph.update_edge(from, to, ());
    }

    /// Direct base of a type.
    pub fn base_of(&self, hash: TypeHash) -> Option<TypeHash> {
        let node = *self.nodes.get(&hash)?;
        self.graph
            .neighbors_directed(node, Direction::Outgoing)
            .next()
            .map(|base| self.graph[base])
    }

    /// The type followed by all of its ancestors, nearest first.
    pub fn ancestry(&self, hash: TypeHash) -> Vec<TypeHash> {
        let mut chain = vec![hash];
        let mut current = hash;
        while let Some(base) = self.base_of(current) {
            if chain.contains(&base) {
                break;
            }
            chain.push(base);
            current = base;
        }
        chain
    }

    /// Types deriving directly from `hash`.
    pub fn derived_of(&self, hash: TypeHash) -> Vec<TypeHash> {
        match self.nodes.get(&hash) {
            Some(&node) => self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .map(|child| self.graph[child])
                .collect(),
            None => Vec::new(),
        }
    }

    /// Whether `derived` is `base` or inherits from it.
    pub fn derives_from(&self, derived: TypeHash, base: TypeHash) -> bool {
        if derived == base {
            return true;
        }
        match (self.nodes.get(&derived), self.nodes.get(&base)) {
            (Some(&from), Some(&to)) => has_path_connecting(&self.graph, from, to, None),
            _ => false,
        }
    }
}
