//! Referential integrity on mutation.
//!
//! Writing one side of an inverse pair updates the other side:
//!
//! - scalar ↔ scalar (`spouse`): `a.spouse = b` sets `b.spouse = a` and
//!   unlinks whoever was previously attached on either side.
//! - scalar ↔ collection (`child.parent` / `parent.children`): setting the
//!   scalar side moves the node between the owners' collections; adding to
//!   the collection side re-points the member's scalar slot.
//! - collection ↔ collection: membership is mirrored.
//!
//! Reassigning a populated owner reference is reported according to
//! [`IntegrityConfig::owner_change`](crate::config::IntegrityConfig).

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Severity;
use crate::model::{NodeId, Value};
use crate::schema::{KeyKind, Property, PropertyId, ScalarKind, ValueType};
use crate::{Error, Result};
use super::ObjectGraph;

impl ObjectGraph {
    // ========================================================================
    // Public mutation API
    // ========================================================================

    /// Assign `value` to `property` of `id`, maintaining the inverse.
    ///
    /// Collection properties take a [`Value::List`] (or `Null` to clear) and
    /// are diffed against the current members.
    pub fn set(&mut self, id: NodeId, property: PropertyId, value: Value) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        let (effective, canonical) = self.effective(id, property)?;
        let effective = effective.clone();
        self.check_value(&effective, &value)?;

        if effective.is_collection() {
            return self.set_members(id, canonical, value);
        }

        let old = self.slot(id, canonical).as_ref_id();
        let new = value.as_ref_id();
        if effective.is_owner() {
            self.check_owner_change(id, canonical, old, new)?;
        }

        match schema.inverse(canonical) {
            Some(inverse) if old != new => {
                if let Some(previous) = old {
                    self.detach(previous, inverse, id)?;
                }
                self.put(id, canonical, value)?;
                if let Some(target) = new {
                    self.attach(target, inverse, id, canonical)?;
                }
                Ok(())
            }
            _ => self.put(id, canonical, value),
        }
    }

    pub fn set_by_name(&mut self, id: NodeId, name: &str, value: Value) -> Result<()> {
        let property = self.attribute(id, name)?;
        self.set(id, property, value)
    }

    /// Append `member` to the collection `property` of `id` (no-op when
    /// already present), linking the member's inverse slot.
    pub fn add(&mut self, id: NodeId, property: PropertyId, member: NodeId) -> Result<()> {
        let (effective, canonical) = self.effective(id, property)?;
        let effective = effective.clone();
        if !effective.is_collection() {
            return Err(Error::TypeMismatch {
                expected: "collection attribute".into(),
                got: self.schema.describe(canonical),
            });
        }
        self.check_element(&effective, &Value::Ref(member))?;
        if self.slot(id, canonical).references(member) {
            return Ok(());
        }
        if let Some(inverse) = self.schema.inverse(canonical) {
            self.attach(member, inverse, id, canonical)?;
        }
        // A self-inverse collection may already hold the member via `attach`.
        if !self.slot(id, canonical).references(member) {
            self.push_member(id, canonical, member)?;
        }
        Ok(())
    }

    pub fn add_by_name(&mut self, id: NodeId, name: &str, member: NodeId) -> Result<()> {
        let property = self.attribute(id, name)?;
        self.add(id, property, member)
    }

    /// Remove `member` from the collection `property` of `id`, unlinking the
    /// member's inverse slot.
    pub fn remove(&mut self, id: NodeId, property: PropertyId, member: NodeId) -> Result<()> {
        let (_, canonical) = self.effective(id, property)?;
        if !self.slot(id, canonical).references(member) {
            return Ok(());
        }
        self.detach(id, canonical, member)?;
        if let Some(inverse) = self.schema.inverse(canonical) {
            self.detach(member, inverse, id)?;
        }
        Ok(())
    }

    pub fn remove_by_name(&mut self, id: NodeId, name: &str, member: NodeId) -> Result<()> {
        let property = self.attribute(id, name)?;
        self.remove(id, property, member)
    }

    // ========================================================================
    // Inverse plumbing
    // ========================================================================

    fn set_members(&mut self, id: NodeId, canonical: PropertyId, value: Value) -> Result<()> {
        let value = match value {
            Value::List(items) => {
                let mut unique: Vec<Value> = Vec::with_capacity(items.len());
                for item in items {
                    if !unique.contains(&item) {
                        unique.push(item);
                    }
                }
                Value::List(unique)
            }
            other => other,
        };
        let old = self.slot(id, canonical).refs();
        let new = value.refs();
        let Some(inverse) = self.schema.inverse(canonical) else {
            return self.put(id, canonical, value);
        };

        for removed in old.iter().filter(|m| !new.contains(m)) {
            self.detach(*removed, inverse, id)?;
        }
        self.put(id, canonical, value)?;
        for added in new.iter().filter(|m| !old.contains(m)) {
            self.attach(*added, inverse, id, canonical)?;
        }
        Ok(())
    }

    /// Drop `target` from `holder.slot`: remove it from a collection or clear
    /// a scalar that still points at it.
    fn detach(&mut self, holder: NodeId, slot: PropertyId, target: NodeId) -> Result<()> {
        match self.slot(holder, slot).clone() {
            Value::List(items) => {
                let kept: Vec<Value> = items.into_iter().filter(|v| v.as_ref_id() != Some(target)).collect();
                self.put(holder, slot, Value::List(kept))
            }
            Value::Ref(current) if current == target => self.put(holder, slot, Value::Null),
            // Already points elsewhere.
            _ => Ok(()),
        }
    }

    /// Point `holder.slot` (the reciprocal of `forward`) at `target`.
    ///
    /// For a scalar reciprocal, the node it previously pointed at is first
    /// unlinked from `forward` so both directions stay symmetric.
    fn attach(&mut self, holder: NodeId, slot: PropertyId, target: NodeId, forward: PropertyId) -> Result<()> {
        let reciprocal = self.schema.property(slot).clone();
        if reciprocal.is_collection() {
            if !self.slot(holder, slot).references(target) {
                self.push_member(holder, slot, target)?;
            }
            return Ok(());
        }

        let previous = self.slot(holder, slot).as_ref_id();
        if previous == Some(target) {
            return Ok(());
        }
        if reciprocal.is_owner() {
            self.check_owner_change(holder, slot, previous, Some(target))?;
        }
        if let Some(previous) = previous {
            self.detach(previous, forward, holder)?;
        }
        self.put(holder, slot, Value::Ref(target))
    }

    fn push_member(&mut self, holder: NodeId, slot: PropertyId, member: NodeId) -> Result<()> {
        let mut items = match self.slot(holder, slot) {
            Value::List(items) => items.clone(),
            _ => Vec::new(),
        };
        items.push(Value::Ref(member));
        self.put(holder, slot, Value::List(items))
    }

    // ========================================================================
    // Owner reassignment
    // ========================================================================

    fn check_owner_change(
        &self,
        id: NodeId,
        slot: PropertyId,
        old: Option<NodeId>,
        new: Option<NodeId>,
    ) -> Result<()> {
        let (Some(from), Some(to)) = (old, new) else {
            return Ok(());
        };
        if from == to || self.same_entity(from, to) {
            return Ok(());
        }
        let attribute = self.schema.describe(slot);
        match self.config.owner_change {
            Severity::Warn => {
                warn!(node = %id, %attribute, %from, %to, "owner reassigned");
                Ok(())
            }
            Severity::Fail => Err(Error::OwnerReassigned { node: id, attribute, from, to }),
        }
    }

    /// Key equality within this graph: identifier first, then the first key
    /// kind whose attributes are populated on both nodes.
    pub fn same_entity(&self, a: NodeId, b: NodeId) -> bool {
        let (Ok(na), Ok(nb)) = (self.node(a), self.node(b)) else {
            return false;
        };
        if !self.schema.related(na.type_ref, nb.type_ref) {
            return false;
        }
        if let (Some(ia), Some(ib)) = (&na.identifier, &nb.identifier) {
            return ia == ib;
        }
        let registry = self.schema.registry(na.type_ref);
        for kind in KeyKind::ORDER {
            let Some(key) = registry.key(kind) else { continue };
            let pairs: Vec<(&Value, &Value)> = key.iter().map(|p| (self.slot(a, *p), self.slot(b, *p))).collect();
            if pairs.iter().any(|(x, y)| x.is_empty() || y.is_empty()) {
                continue;
            }
            let equal = pairs.iter().all(|(x, y)| x == y);
            debug!(%a, %b, ?kind, equal, "key comparison");
            return equal;
        }
        false
    }

    // ========================================================================
    // Type checks
    // ========================================================================

    fn check_value(&self, property: &Property, value: &Value) -> Result<()> {
        match value {
            Value::Null => Ok(()),
            Value::List(items) if property.is_collection() => {
                items.iter().try_for_each(|item| self.check_element(property, item))
            }
            _ if property.is_collection() => Err(self.mismatch(property, "LIST", value)),
            _ => self.check_element(property, value),
        }
    }

    fn check_element(&self, property: &Property, value: &Value) -> Result<()> {
        let ok = match (property.value_type, value) {
            (ValueType::Entity(expected), Value::Ref(target)) => {
                let actual = self.type_of(*target)?;
                self.schema.is_subtype(actual, expected)
            }
            (ValueType::Entity(_), _) => false,
            (ValueType::Scalar(_), Value::Ref(_) | Value::List(_)) => false,
            (ValueType::Scalar(ScalarKind::Any), _) => true,
            (ValueType::Scalar(ScalarKind::Bool), Value::Bool(_)) => true,
            (ValueType::Scalar(ScalarKind::Int), Value::Int(_)) => true,
            (ValueType::Scalar(ScalarKind::Float), Value::Float(_) | Value::Int(_)) => true,
            (ValueType::Scalar(ScalarKind::String), Value::String(_)) => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            let expected = match property.value_type {
                ValueType::Entity(ty) => format!("reference to {}", self.schema.type_name(ty)),
                ValueType::Scalar(kind) => format!("{kind:?}"),
            };
            Err(self.mismatch(property, &expected, value))
        }
    }

    fn mismatch(&self, property: &Property, expected: &str, value: &Value) -> Error {
        let got = match value {
            Value::Ref(target) => match self.type_of(*target) {
                Ok(ty) => format!("reference to {}", self.schema.type_name(ty)),
                Err(_) => format!("dangling reference {target}"),
            },
            other => other.type_name().to_string(),
        };
        Error::TypeMismatch {
            expected: format!("{expected} for {}", self.schema.describe(property.id)),
            got,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::config::IntegrityConfig;
    use crate::schema::{PropertyFlags, Schema, TypeRef};
    use super::*;

    struct Family {
        graph: ObjectGraph,
        parent: TypeRef,
        child: TypeRef,
    }

    fn family(owner_change: Severity) -> Family {
        let mut s = Schema::new();
        let parent = s.declare_type("Parent", None).unwrap();
        let child = s.declare_type("Child", None).unwrap();
        s.register_attribute(parent, "name", ValueType::Scalar(ScalarKind::String), PropertyFlags::NONE).unwrap();
        s.register_attribute(parent, "children", ValueType::Entity(child), PropertyFlags::COLLECTION).unwrap();
        s.register_attribute(parent, "spouse", ValueType::Entity(parent), PropertyFlags::NONE).unwrap();
        s.register_attribute(parent, "friends", ValueType::Entity(parent), PropertyFlags::COLLECTION).unwrap();
        s.register_attribute(child, "parent", ValueType::Entity(parent), PropertyFlags::NONE).unwrap();
        s.mark_dependent(parent, "children", None).unwrap();
        s.set_inverse(parent, "spouse", "spouse").unwrap();
        s.set_inverse(parent, "friends", "friends").unwrap();
        s.add_key(parent, KeyKind::Primary, &["name"]).unwrap();
        s.freeze();
        let graph = ObjectGraph::with_config(Arc::new(s), IntegrityConfig { owner_change });
        Family { graph, parent, child }
    }

    #[test]
    fn test_scalar_owner_moves_between_collections() {
        let Family { mut graph, parent, child } = family(Severity::Warn);
        let a = graph.create(parent).unwrap();
        let b = graph.create(parent).unwrap();
        let c = graph.create(child).unwrap();

        graph.set_by_name(c, "parent", Value::Ref(a)).unwrap();
        assert_eq!(graph.refs_by_name(a, "children").unwrap(), vec![c]);

        graph.set_by_name(c, "parent", Value::Ref(b)).unwrap();
        assert_eq!(graph.refs_by_name(a, "children").unwrap(), Vec::<NodeId>::new());
        assert_eq!(graph.refs_by_name(b, "children").unwrap(), vec![c]);

        graph.set_by_name(c, "parent", Value::Null).unwrap();
        assert!(graph.refs_by_name(b, "children").unwrap().is_empty());
    }

    #[test]
    fn test_collection_side_repoints_owner() {
        let Family { mut graph, parent, child } = family(Severity::Warn);
        let a = graph.create(parent).unwrap();
        let b = graph.create(parent).unwrap();
        let c = graph.create(child).unwrap();

        graph.add_by_name(a, "children", c).unwrap();
        assert_eq!(graph.get_by_name(c, "parent").unwrap(), &Value::Ref(a));

        graph.add_by_name(b, "children", c).unwrap();
        assert_eq!(graph.get_by_name(c, "parent").unwrap(), &Value::Ref(b));
        assert!(graph.refs_by_name(a, "children").unwrap().is_empty());

        graph.remove_by_name(b, "children", c).unwrap();
        assert_eq!(graph.get_by_name(c, "parent").unwrap(), &Value::Null);
    }

    #[test]
    fn test_assigning_whole_collection_diffs_members() {
        let Family { mut graph, parent, child } = family(Severity::Warn);
        let a = graph.create(parent).unwrap();
        let c1 = graph.create(child).unwrap();
        let c2 = graph.create(child).unwrap();
        let c3 = graph.create(child).unwrap();

        graph.set_by_name(a, "children", Value::from(vec![c1, c2])).unwrap();
        graph.set_by_name(a, "children", Value::from(vec![c2, c3])).unwrap();
        assert_eq!(graph.get_by_name(c1, "parent").unwrap(), &Value::Null);
        assert_eq!(graph.get_by_name(c2, "parent").unwrap(), &Value::Ref(a));
        assert_eq!(graph.get_by_name(c3, "parent").unwrap(), &Value::Ref(a));
    }

    #[test]
    fn test_assigning_collection_drops_repeated_members() {
        let Family { mut graph, parent, child } = family(Severity::Warn);
        let a = graph.create(parent).unwrap();
        let c1 = graph.create(child).unwrap();
        let c2 = graph.create(child).unwrap();

        graph.set_by_name(a, "children", Value::from(vec![c1, c1, c2, c1])).unwrap();
        assert_eq!(graph.refs_by_name(a, "children").unwrap(), vec![c1, c2]);

        graph.remove_by_name(a, "children", c1).unwrap();
        assert_eq!(graph.refs_by_name(a, "children").unwrap(), vec![c2]);
        assert_eq!(graph.get_by_name(c1, "parent").unwrap(), &Value::Null);
    }

    #[test]
    fn test_self_inverse_scalar() {
        let Family { mut graph, parent, .. } = family(Severity::Warn);
        let a = graph.create(parent).unwrap();
        let b = graph.create(parent).unwrap();
        let c = graph.create(parent).unwrap();

        graph.set_by_name(a, "spouse", Value::Ref(b)).unwrap();
        assert_eq!(graph.get_by_name(b, "spouse").unwrap(), &Value::Ref(a));

        // c takes b: a is left alone
        graph.set_by_name(c, "spouse", Value::Ref(b)).unwrap();
        assert_eq!(graph.get_by_name(b, "spouse").unwrap(), &Value::Ref(c));
        assert_eq!(graph.get_by_name(a, "spouse").unwrap(), &Value::Null);
    }

    #[test]
    fn test_symmetric_collections() {
        let Family { mut graph, parent, .. } = family(Severity::Warn);
        let a = graph.create(parent).unwrap();
        let b = graph.create(parent).unwrap();
        graph.add_by_name(a, "friends", b).unwrap();
        assert_eq!(graph.refs_by_name(b, "friends").unwrap(), vec![a]);
        graph.remove_by_name(b, "friends", a).unwrap();
        assert!(graph.refs_by_name(a, "friends").unwrap().is_empty());
    }

    #[test]
    fn test_owner_change_fail_leaves_graph_untouched() {
        let Family { mut graph, parent, child } = family(Severity::Fail);
        let a = graph.create(parent).unwrap();
        let b = graph.create(parent).unwrap();
        let c = graph.create(child).unwrap();
        graph.set_by_name(a, "name", Value::from("Ann")).unwrap();
        graph.set_by_name(b, "name", Value::from("Bob")).unwrap();
        graph.set_by_name(c, "parent", Value::Ref(a)).unwrap();

        let err = graph.set_by_name(c, "parent", Value::Ref(b)).unwrap_err();
        assert!(matches!(err, Error::OwnerReassigned { .. }));
        assert!(err.is_recoverable());
        assert_eq!(graph.get_by_name(c, "parent").unwrap(), &Value::Ref(a));
        assert_eq!(graph.refs_by_name(a, "children").unwrap(), vec![c]);
    }

    #[test]
    fn test_owner_change_between_key_equal_owners_is_silent() {
        let Family { mut graph, parent, child } = family(Severity::Fail);
        let a = graph.create(parent).unwrap();
        let a2 = graph.create(parent).unwrap();
        let c = graph.create(child).unwrap();
        graph.set_by_name(a, "name", Value::from("Ann")).unwrap();
        graph.set_by_name(a2, "name", Value::from("Ann")).unwrap();
        graph.set_by_name(c, "parent", Value::Ref(a)).unwrap();
        graph.set_by_name(c, "parent", Value::Ref(a2)).unwrap();
        assert_eq!(graph.refs_by_name(a2, "children").unwrap(), vec![c]);
    }

    #[test]
    fn test_type_checks() {
        let Family { mut graph, parent, child } = family(Severity::Warn);
        let a = graph.create(parent).unwrap();
        let c = graph.create(child).unwrap();
        assert!(matches!(graph.set_by_name(a, "name", Value::Int(3)), Err(Error::TypeMismatch { .. })));
        assert!(matches!(graph.set_by_name(a, "spouse", Value::Ref(c)), Err(Error::TypeMismatch { .. })));
        assert!(matches!(graph.set_by_name(a, "children", Value::Ref(c)), Err(Error::TypeMismatch { .. })));
        assert!(matches!(graph.add_by_name(a, "spouse", a), Err(Error::TypeMismatch { .. })));
        assert!(matches!(graph.set_by_name(a, "spouse", Value::Ref(NodeId(99))), Err(Error::NotFound(_))));
    }
}
