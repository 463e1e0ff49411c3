//! # typegraph — typed object graphs: integrity, traversal, match/merge
//!
//! Attribute metadata for a typed object domain drives three runtime
//! behaviors over in-memory object graphs:
//!
//! 1. **Referential integrity**: assigning one side of an inverse pair
//!    updates the other side.
//! 2. **Completeness validation**: mandatory attributes, single ownership,
//!    recursively into dependents.
//! 3. **Traversal and reconciliation**: a generic [`Visitor`] plus a
//!    match/merge engine that folds one graph into another using identifiers
//!    and business keys.
//!
//! ## Design Principles
//!
//! 1. **Metadata first**: a frozen [`Schema`] decides which edges matter
//! 2. **Arena graphs**: nodes live in an [`ObjectGraph`] and are addressed by [`NodeId`]
//! 3. **Per-call state**: traversal and match state never outlives the call
//! 4. **Short-circuit by value**: operators return [`ControlFlow`](std::ops::ControlFlow)
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use typegraph::{ObjectGraph, Value};
//! use typegraph::schema::{Schema, PropertyFlags, ValueType};
//!
//! # fn main() -> typegraph::Result<()> {
//! let mut schema = Schema::new();
//! let parent = schema.declare_type("Parent", None)?;
//! let child = schema.declare_type("Child", None)?;
//! schema.register_attribute(parent, "children", ValueType::Entity(child), PropertyFlags::COLLECTION)?;
//! schema.register_attribute(child, "parent", ValueType::Entity(parent), PropertyFlags::NONE)?;
//! schema.mark_dependent(parent, "children", None)?;
//! schema.freeze();
//!
//! let mut graph = ObjectGraph::new(Arc::new(schema));
//! let p = graph.create(parent)?;
//! let c = graph.create(child)?;
//! graph.set_by_name(c, "parent", Value::Ref(p))?;
//!
//! assert_eq!(graph.refs_by_name(p, "children")?, vec![c]);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod schema;
pub mod graph;
pub mod visitor;
pub mod matching;
pub mod config;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{Node, NodeId, Identifier, Value, AttributeMap};

// ============================================================================
// Re-exports: Schema
// ============================================================================

pub use schema::{
    Schema, Property, PropertyId, PropertyFlags, TypeRef, ValueType, ScalarKind,
    KeyKind, Registry, Restriction, OwnerGraph, Introspector,
};

// ============================================================================
// Re-exports: Graph, traversal, reconciliation
// ============================================================================

pub use graph::{ObjectGraph, validate, effective_owner};
pub use visitor::{Visitor, VisitOptions, Walk, Children};
pub use matching::{MatchMerge, MatchContext, Selector, NodeMatcher, KeyMatcher, Copier, DefaultCopier, copy};
pub use config::{EngineConfig, IntegrityConfig, Severity};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Duplicate attribute '{name}' on type {type_name}")]
    DuplicateAttribute { type_name: String, name: String },

    #[error("Duplicate type: {0}")]
    DuplicateType(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No inverse for dependent attribute {attribute} on owner type {owner_type}")]
    MissingInverse { attribute: String, owner_type: String },

    #[error("Inverse conflict: {attribute} is bound to {bound}, cannot rebind to {requested}")]
    InverseConflict { attribute: String, bound: String, requested: String },

    #[error("Flag conflict: {0}")]
    FlagConflict(String),

    #[error("Type error: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Schema is frozen: {0} not allowed")]
    Frozen(String),

    #[error("Validation failed for node {node}: {message}")]
    ValidationError { node: NodeId, message: String },

    #[error("Owner of node {node} reassigned through {attribute} from {from} to {to}")]
    OwnerReassigned { node: NodeId, attribute: String, from: NodeId, to: NodeId },

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error is a per-node completeness failure the caller may
    /// fix and re-validate, as opposed to a definition bug.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::ValidationError { .. } | Error::OwnerReassigned { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
