//! Per-invocation match state.

use hashbrown::{HashMap, HashSet};

use crate::model::{Identifier, NodeId};
use crate::schema::TypeRef;

/// Source → target correspondence built by one match (and consumed by the
/// merge that follows it).
///
/// The identifier cache is keyed by the hierarchy root of the node's type,
/// so a `Manager` with identifier 7 and an `Employee` with identifier 7 are
/// the same entity when `Manager` extends `Employee`.
#[derive(Debug, Clone, Default)]
pub struct MatchContext {
    forward: HashMap<NodeId, NodeId>,
    reverse: HashMap<NodeId, NodeId>,
    by_identifier: HashMap<(TypeRef, Identifier), NodeId>,
    merged: HashSet<NodeId>,
}

impl MatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target node matched to `source`.
    pub fn target_of(&self, source: NodeId) -> Option<NodeId> {
        self.forward.get(&source).copied()
    }

    /// First source node matched to `target`.
    pub fn source_of(&self, target: NodeId) -> Option<NodeId> {
        self.reverse.get(&target).copied()
    }

    pub fn is_matched(&self, source: NodeId) -> bool {
        self.forward.contains_key(&source)
    }

    pub fn is_claimed(&self, target: NodeId) -> bool {
        self.reverse.contains_key(&target)
    }

    /// Target nodes the merge has already written to.
    pub fn is_merged(&self, target: NodeId) -> bool {
        self.merged.contains(&target)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// `(source, target)` pairs sorted by source id.
    pub fn pairs(&self) -> Vec<(NodeId, NodeId)> {
        let mut pairs: Vec<_> = self.forward.iter().map(|(s, t)| (*s, *t)).collect();
        pairs.sort_unstable();
        pairs
    }

    pub(crate) fn register(&mut self, source: NodeId, target: NodeId) {
        self.forward.insert(source, target);
        self.reverse.entry(target).or_insert(source);
    }

    pub(crate) fn remember(&mut self, root: TypeRef, identifier: Identifier, target: NodeId) {
        self.by_identifier.entry((root, identifier)).or_insert(target);
    }

    pub(crate) fn cached(&self, root: TypeRef, identifier: &Identifier) -> Option<NodeId> {
        self.by_identifier.get(&(root, identifier.clone())).copied()
    }

    pub(crate) fn mark_merged(&mut self, target: NodeId) {
        self.merged.insert(target);
    }
}
