//! # Object graph arena
//!
//! [`ObjectGraph`] owns the nodes of one graph and is the only way to read
//! and write attribute slots. Node identity is [`NodeId`] equality; cycles
//! are ordinary data.
//!
//! Writes come in two flavours:
//! - [`ObjectGraph::set`], [`ObjectGraph::add`], [`ObjectGraph::remove`]
//!   (see `integrity`) keep inverse attributes consistent and watch owner
//!   reassignment.
//! - `put` (crate-internal) writes one slot and nothing else.
//!
//! ## Limitations
//!
//! - **Not transactional**: an error part-way through an inverse update can
//!   leave the forward slot written and the reciprocal not yet updated.
//! - **One schema**: every node's type comes from the graph's [`Schema`];
//!   graphs that exchange nodes through match/merge must share it.

pub mod integrity;
pub mod validation;

use std::sync::Arc;

use hashbrown::HashMap;
use tracing::trace;

use crate::config::IntegrityConfig;
use crate::model::{Identifier, Node, NodeId, Value};
use crate::schema::{Property, PropertyId, Schema, TypeRef};
use crate::visitor::{Children, VisitOptions, Visitor};
use crate::{Error, Result};

pub use validation::{validate, effective_owner};

static NULL: Value = Value::Null;

// ============================================================================
// ObjectGraph
// ============================================================================

/// In-memory arena of typed nodes.
#[derive(Debug, Clone)]
pub struct ObjectGraph {
    schema: Arc<Schema>,
    nodes: HashMap<NodeId, Node>,
    next_node_id: u64,
    config: IntegrityConfig,
}

impl ObjectGraph {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_config(schema, IntegrityConfig::default())
    }

    pub fn with_config(schema: Arc<Schema>, config: IntegrityConfig) -> Self {
        Self {
            schema,
            nodes: HashMap::new(),
            next_node_id: 1,
            config,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn config(&self) -> &IntegrityConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ========================================================================
    // Node lifecycle
    // ========================================================================

    /// Create a node of type `ty` with the type's defaults applied.
    pub fn create(&mut self, ty: TypeRef) -> Result<NodeId> {
        if !self.schema.contains_type(ty) {
            return Err(Error::NotFound(format!("type {ty}")));
        }
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        let mut node = Node::new(id, ty);
        for (property, value) in self.schema.registry(ty).defaults() {
            node.attributes.insert(property, value.clone());
        }
        self.nodes.insert(id, node);
        trace!(%id, type_name = self.schema.type_name(ty), "created node");
        Ok(id)
    }

    /// Create a node and set its identifier.
    pub fn create_identified(&mut self, ty: TypeRef, identifier: impl Into<Identifier>) -> Result<NodeId> {
        let id = self.create(ty)?;
        self.set_identifier(id, Some(identifier.into()))?;
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// All node ids in creation order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn type_of(&self, id: NodeId) -> Result<TypeRef> {
        Ok(self.node(id)?.type_ref)
    }

    pub fn identifier(&self, id: NodeId) -> Result<Option<&Identifier>> {
        Ok(self.node(id)?.identifier.as_ref())
    }

    pub fn set_identifier(&mut self, id: NodeId, identifier: Option<Identifier>) -> Result<()> {
        self.node_mut(id)?.identifier = identifier;
        Ok(())
    }

    // ========================================================================
    // Attribute access
    // ========================================================================

    /// The most specific property for `property` on the node's type, and the
    /// canonical id its slot is stored under. Fails with
    /// [`Error::TypeMismatch`] when the node's type does not have the property.
    pub(crate) fn effective(&self, id: NodeId, property: PropertyId) -> Result<(&Property, PropertyId)> {
        let ty = self.type_of(id)?;
        self.schema.try_property(property)?;
        let canonical = self.schema.canonical(property);
        let declared = self.schema.property(canonical);
        if !self.schema.is_subtype(ty, declared.declaring_type) {
            return Err(Error::TypeMismatch {
                expected: format!("node with attribute {}", self.schema.describe(canonical)),
                got: format!("node {id} of type {}", self.schema.type_name(ty)),
            });
        }
        let specific = self
            .schema
            .registry(ty)
            .lookup(&declared.name)
            .filter(|p| self.schema.canonical(p.id) == canonical)
            .unwrap_or(declared);
        Ok((specific, canonical))
    }

    /// Resolve an attribute name against the node's type.
    pub fn attribute(&self, id: NodeId, name: &str) -> Result<PropertyId> {
        let ty = self.type_of(id)?;
        self.schema.resolve(ty, name)
    }

    /// Read a slot. Absent slots read as [`Value::Null`].
    pub fn get(&self, id: NodeId, property: PropertyId) -> Result<&Value> {
        let (_, canonical) = self.effective(id, property)?;
        Ok(self.slot(id, canonical))
    }

    pub fn get_by_name(&self, id: NodeId, name: &str) -> Result<&Value> {
        let property = self.attribute(id, name)?;
        self.get(id, property)
    }

    /// Nodes referenced through `property`, in order.
    pub fn refs(&self, id: NodeId, property: PropertyId) -> Result<Vec<NodeId>> {
        Ok(self.get(id, property)?.refs().into_vec())
    }

    pub fn refs_by_name(&self, id: NodeId, name: &str) -> Result<Vec<NodeId>> {
        let property = self.attribute(id, name)?;
        self.refs(id, property)
    }

    /// Unchecked slot read by canonical id.
    pub(crate) fn slot(&self, id: NodeId, canonical: PropertyId) -> &Value {
        self.nodes
            .get(&id)
            .and_then(|n| n.attributes.get(&canonical))
            .unwrap_or(&NULL)
    }

    /// Write one slot by canonical id, bypassing integrity rules.
    pub(crate) fn put(&mut self, id: NodeId, canonical: PropertyId, value: Value) -> Result<()> {
        let node = self.node_mut(id)?;
        if value.is_null() {
            node.attributes.remove(&canonical);
        } else {
            node.attributes.insert(canonical, value);
        }
        Ok(())
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Children of `id` through the given attributes of its type.
    pub fn children_through(&self, id: NodeId, select: impl Fn(&Schema, TypeRef) -> Vec<PropertyId>) -> Children<NodeId> {
        let Some(node) = self.nodes.get(&id) else {
            return Children::new();
        };
        let mut out = Children::new();
        for property in select(&self.schema, node.type_ref) {
            let canonical = self.schema.canonical(property);
            if let Some(value) = node.attributes.get(&canonical) {
                out.extend(value.refs());
            }
        }
        out
    }

    /// A visitor over this graph following every reference attribute.
    pub fn visitor(&self, options: VisitOptions) -> Visitor<'_, NodeId> {
        Visitor::new(
            move |id| self.children_through(id, |schema, ty| schema.registry(ty).references().to_vec()),
            options,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
