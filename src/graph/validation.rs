//! Completeness validation.

use hashbrown::HashSet;
use tracing::debug;

use crate::model::NodeId;
use crate::{Error, Result};
use super::ObjectGraph;

/// The unique populated owner reference of `id`.
///
/// `Ok(None)` when the node has no owner attribute populated; a
/// [`Error::ValidationError`] when more than one is.
pub fn effective_owner(graph: &ObjectGraph, id: NodeId) -> Result<Option<NodeId>> {
    let schema = graph.schema();
    let owners = schema.owner_graph(graph.type_of(id)?);
    let mut found: Option<NodeId> = None;
    for link in &owners.links {
        let Some(owner) = graph.slot(id, link.property).as_ref_id() else {
            continue;
        };
        if found.is_some() {
            return Err(Error::ValidationError {
                node: id,
                message: format!("more than one owner populated (second through {})", schema.describe(link.property)),
            });
        }
        found = Some(owner);
    }
    Ok(found)
}

/// Validate `id` and, recursively, every dependent it effectively owns.
///
/// Fails on the first node that has an empty mandatory attribute, more than
/// one populated owner attribute, or no owner although its type requires one.
pub fn validate(graph: &ObjectGraph, id: NodeId) -> Result<()> {
    let mut validated = HashSet::new();
    validate_node(graph, id, &mut validated)
}

fn validate_node(graph: &ObjectGraph, id: NodeId, validated: &mut HashSet<NodeId>) -> Result<()> {
    if !validated.insert(id) {
        return Ok(());
    }
    let schema = graph.schema();
    let ty = graph.type_of(id)?;
    let registry = schema.registry(ty);

    for property in registry.mandatory().iter() {
        if graph.get(id, *property)?.is_empty() {
            return Err(Error::ValidationError {
                node: id,
                message: format!("mandatory attribute {} is empty", schema.describe(*property)),
            });
        }
    }

    let owners = schema.owner_graph(ty);
    if effective_owner(graph, id)?.is_none() && owners.requires_owner() {
        return Err(Error::ValidationError {
            node: id,
            message: format!("{} requires an owner", schema.type_name(ty)),
        });
    }

    for property in registry.dependents().iter() {
        for dependent in graph.refs(id, *property)? {
            if effective_owner(graph, dependent)? == Some(id) {
                validate_node(graph, dependent, validated)?;
            }
        }
    }
    debug!(node = %id, type_name = schema.type_name(ty), "validated");
    Ok(())
}

impl ObjectGraph {
    /// See [`validate`].
    pub fn validate(&self, id: NodeId) -> Result<()> {
        validate(self, id)
    }

    /// See [`effective_owner`].
    pub fn effective_owner(&self, id: NodeId) -> Result<Option<NodeId>> {
        effective_owner(self, id)
    }
}

// ============================================================================
// Tests
// ============================================================================
