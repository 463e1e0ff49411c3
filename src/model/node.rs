//! Node in the object graph.

use serde::{Deserialize, Serialize};

use crate::schema::{PropertyId, TypeRef};
use super::{AttributeMap, Value};

/// Opaque node handle. Stable for the lifetime of the owning graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Business identifier of a domain object (e.g. a database key).
///
/// Independent of [`NodeId`]: two distinct nodes may carry the same
/// identifier when they represent the same entity loaded twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    Int(i64),
    Text(String),
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identifier::Int(i) => write!(f, "{i}"),
            Identifier::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Identifier { fn from(v: i64) -> Self { Identifier::Int(v) } }
impl From<&str> for Identifier { fn from(v: &str) -> Self { Identifier::Text(v.to_owned()) } }
impl From<String> for Identifier { fn from(v: String) -> Self { Identifier::Text(v) } }

/// A domain-object instance.
///
/// Attribute slots are keyed by the canonical [`PropertyId`]; reads and writes
/// should go through [`ObjectGraph`](crate::graph::ObjectGraph), which resolves
/// restrictions and keeps inverses consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub type_ref: TypeRef,
    pub identifier: Option<Identifier>,
    pub attributes: AttributeMap,
}

impl Node {
    pub fn new(id: NodeId, type_ref: TypeRef) -> Self {
        Self {
            id,
            type_ref,
            identifier: None,
            attributes: AttributeMap::new(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<Identifier>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Raw slot read. `None` and `Some(Value::Null)` both mean absent.
    pub fn get(&self, property: PropertyId) -> Option<&Value> {
        self.attributes.get(&property)
    }

    /// Identifier equality: both present and equal.
    pub fn same_identifier(&self, other: &Node) -> bool {
        matches!((&self.identifier, &other.identifier), (Some(a), Some(b)) if a == b)
    }
}
