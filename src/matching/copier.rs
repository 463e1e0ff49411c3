//! Creating target nodes for unmatched sources.

use tracing::trace;

use crate::graph::ObjectGraph;
use crate::model::NodeId;
use crate::Result;

/// Creates a target-graph counterpart for a source node that found no match.
///
/// The copy only needs to exist; references are wired by the merge that
/// follows.
pub trait Copier {
    fn copy(&self, source: &ObjectGraph, node: NodeId, target: &mut ObjectGraph) -> Result<NodeId>;
}

impl<F> Copier for F
where
    F: Fn(&ObjectGraph, NodeId, &mut ObjectGraph) -> Result<NodeId>,
{
    fn copy(&self, source: &ObjectGraph, node: NodeId, target: &mut ObjectGraph) -> Result<NodeId> {
        self(source, node, target)
    }
}

/// Creates a node of the same type and copies its identifier and every
/// populated scalar attribute. Reference attributes are left empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCopier;

impl Copier for DefaultCopier {
    fn copy(&self, source: &ObjectGraph, node: NodeId, target: &mut ObjectGraph) -> Result<NodeId> {
        let original = source.node(node)?;
        let schema = source.schema();
        let copy = target.create(original.type_ref)?;
        target.set_identifier(copy, original.identifier.clone())?;
        for property in schema.registry(original.type_ref).scalars().iter() {
            let canonical = schema.canonical(*property);
            let value = source.slot(node, canonical);
            if !value.is_null() {
                target.put(copy, canonical, value.clone())?;
            }
        }
        trace!(source = %node, %copy, "copied node");
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::model::{Identifier, Value};
    use crate::schema::{PropertyFlags, ScalarKind, Schema, ValueType};
    use super::*;

    #[test]
    fn test_default_copier_copies_scalars_and_identifier() {
        let mut s = Schema::new();
        let item = s.declare_type("Item", None).unwrap();
        s.register_attribute(item, "label", ValueType::Scalar(ScalarKind::String), PropertyFlags::NONE).unwrap();
        s.register_attribute(item, "next", ValueType::Entity(item), PropertyFlags::NONE).unwrap();
        s.freeze();
        let s = Arc::new(s);

        let mut source = ObjectGraph::new(s.clone());
        let a = source.create_identified(item, "a").unwrap();
        let b = source.create(item).unwrap();
        source.set_by_name(a, "label", Value::from("first")).unwrap();
        source.set_by_name(a, "next", Value::Ref(b)).unwrap();

        let mut target = ObjectGraph::new(s);
        let c = DefaultCopier.copy(&source, a, &mut target).unwrap();
        assert_eq!(target.identifier(c).unwrap(), Some(&Identifier::from("a")));
        assert_eq!(target.get_by_name(c, "label").unwrap(), &Value::from("first"));
        assert_eq!(target.get_by_name(c, "next").unwrap(), &Value::Null);
        assert_eq!(target.len(), 1);
    }
}
