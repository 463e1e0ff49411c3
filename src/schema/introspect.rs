//! Bridge to whatever discovers attributes of a native type.
//!
//! The engine does not enumerate fields itself. An [`Introspector`] reports
//! `(name, type, readable, writable)` tuples and [`Schema::introspect`] turns
//! them into properties, consulting the collaborator once per type.

use tracing::debug;

use crate::Result;
use super::{PropertyFlags, ScalarKind, Schema, TypeRef, ValueType};

/// Declared type of an introspected attribute. Entity types are named so
/// that the collaborator need not know [`TypeRef`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredType {
    Scalar(ScalarKind),
    Entity(String),
}

/// One attribute reported by an [`Introspector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub name: String,
    pub value_type: DeclaredType,
    pub collection: bool,
    pub readable: bool,
    pub writable: bool,
}

impl AttributeDescriptor {
    pub fn scalar(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            name: name.into(),
            value_type: DeclaredType::Scalar(kind),
            collection: false,
            readable: true,
            writable: true,
        }
    }

    pub fn entity(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: DeclaredType::Entity(type_name.into()),
            collection: false,
            readable: true,
            writable: true,
        }
    }

    pub fn many(mut self) -> Self {
        self.collection = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }
}

/// Source of attribute metadata for a native type.
pub trait Introspector {
    /// Attributes declared directly on `type_name` (not inherited ones).
    fn introspect(&self, type_name: &str) -> Vec<AttributeDescriptor>;
}

impl Schema {
    /// Register the attributes `introspector` reports for `ty`.
    ///
    /// The collaborator is consulted at most once per type; later calls
    /// return `Ok(0)`. Attributes that are not both readable and writable are
    /// skipped. Entity types must already be declared. Returns the number of
    /// attributes registered.
    pub fn introspect(&mut self, ty: TypeRef, introspector: &dyn Introspector) -> Result<usize> {
        self.check_type(ty)?;
        if self.type_registry(ty).introspected {
            debug!(type_name = self.type_name(ty), "already introspected");
            return Ok(0);
        }
        let type_name = self.type_name(ty).to_string();
        let descriptors = introspector.introspect(&type_name);

        let mut registered = 0;
        for desc in descriptors {
            if !(desc.readable && desc.writable) {
                debug!(type_name = %type_name, attribute = %desc.name, "skipping inaccessible attribute");
                continue;
            }
            let value_type = match &desc.value_type {
                DeclaredType::Scalar(kind) => ValueType::Scalar(*kind),
                DeclaredType::Entity(name) => ValueType::Entity(self.type_ref(name)?),
            };
            let flags = if desc.collection { PropertyFlags::COLLECTION } else { PropertyFlags::NONE };
            self.register_attribute(ty, &desc.name, value_type, flags)?;
            registered += 1;
        }
        self.type_registry_mut(ty).introspected = true;
        Ok(registered)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct Fixed {
        calls: Cell<usize>,
    }

    impl Introspector for Fixed {
        fn introspect(&self, type_name: &str) -> Vec<AttributeDescriptor> {
            self.calls.set(self.calls.get() + 1);
            match type_name {
                "Order" => vec![
                    AttributeDescriptor::scalar("number", ScalarKind::String),
                    AttributeDescriptor::entity("lines", "Line").many(),
                    AttributeDescriptor::scalar("total", ScalarKind::Float).read_only(),
                ],
                "Line" => vec![
                    AttributeDescriptor::entity("order", "Order"),
                    AttributeDescriptor::scalar("qty", ScalarKind::Int),
                ],
                _ => Vec::new(),
            }
        }
    }

    #[test]
    fn test_introspect_registers_accessible_attributes_once() {
        let mut s = Schema::new();
        let order = s.declare_type("Order", None).unwrap();
        let line = s.declare_type("Line", None).unwrap();
        let source = Fixed { calls: Cell::new(0) };

        assert_eq!(s.introspect(order, &source).unwrap(), 2);
        assert_eq!(s.introspect(line, &source).unwrap(), 2);
        assert_eq!(s.introspect(order, &source).unwrap(), 0);
        assert_eq!(source.calls.get(), 2);

        let lines = s.registry(order).resolve("lines").unwrap();
        assert!(lines.is_collection());
        assert_eq!(lines.entity_type(), Some(line));
        assert!(s.registry(order).resolve("total").is_err());

        s.mark_dependent(order, "lines", None).unwrap();
        assert!(s.registry(line).resolve("order").unwrap().is_owner());
    }

    #[test]
    fn test_introspect_unknown_entity_type() {
        struct Dangling;
        impl Introspector for Dangling {
            fn introspect(&self, _: &str) -> Vec<AttributeDescriptor> {
                vec![AttributeDescriptor::entity("ghost", "Ghost")]
            }
        }
        let mut s = Schema::new();
        let ty = s.declare_type("Haunted", None).unwrap();
        assert!(matches!(s.introspect(ty, &Dangling), Err(crate::Error::NotFound(_))));
    }

    #[test]
    fn test_introspect_foreign_type() {
        let source = Fixed { calls: Cell::new(0) };
        let mut s = Schema::new();
        assert!(matches!(s.introspect(TypeRef(3), &source), Err(crate::Error::NotFound(_))));
        assert_eq!(source.calls.get(), 0);
    }
}
