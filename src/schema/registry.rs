//! Per-type property registry.
//!
//! Each declared type owns a [`TypeRegistry`] holding its local properties,
//! aliases, keys and defaults. [`Registry`] is the read view that composes a
//! type's registry with its supertype chain: local entries shadow inherited
//! ones, and derived filters (mandatory, dependent, owner, ...) are computed
//! once per type and memoized on the [`Schema`].

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::model::Value;
use crate::{Error, Result};
use super::{Property, PropertyId, Schema, TypeRef};

// ============================================================================
// Keys
// ============================================================================

/// Attribute sets used, after the identifier, to decide whether two nodes
/// represent the same entity. Tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    Primary,
    Secondary,
    Alternate,
}

impl KeyKind {
    pub const ORDER: [KeyKind; 3] = [KeyKind::Primary, KeyKind::Secondary, KeyKind::Alternate];
}

// ============================================================================
// Derived sets
// ============================================================================

/// Memoized attribute filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Derived {
    All,
    Mandatory,
    Dependent,
    Owner,
    Reference,
    Scalar,
}

// ============================================================================
// TypeRegistry (storage)
// ============================================================================

/// Locally declared metadata of one type.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    pub(crate) type_ref: TypeRef,
    pub(crate) name: String,
    pub(crate) supertype: Option<TypeRef>,
    /// Local properties in declaration order.
    pub(crate) local: Vec<PropertyId>,
    pub(crate) by_name: HashMap<String, PropertyId>,
    /// alias → canonical attribute name
    pub(crate) aliases: HashMap<String, String>,
    pub(crate) keys: HashMap<KeyKind, Vec<PropertyId>>,
    pub(crate) defaults: Vec<(PropertyId, Value)>,
    pub(crate) mandatory: Vec<PropertyId>,
    pub(crate) unidirectional: HashSet<PropertyId>,
    pub(crate) introspected: bool,
}

impl TypeRegistry {
    pub(crate) fn new(type_ref: TypeRef, name: impl Into<String>, supertype: Option<TypeRef>) -> Self {
        Self {
            type_ref,
            name: name.into(),
            supertype,
            local: Vec::new(),
            by_name: HashMap::new(),
            aliases: HashMap::new(),
            keys: HashMap::new(),
            defaults: Vec::new(),
            mandatory: Vec::new(),
            unidirectional: HashSet::new(),
            introspected: false,
        }
    }

    pub(crate) fn insert(&mut self, property: &Property) -> Result<()> {
        if self.by_name.contains_key(&property.name) {
            return Err(Error::DuplicateAttribute {
                type_name: self.name.clone(),
                name: property.name.clone(),
            });
        }
        self.by_name.insert(property.name.clone(), property.id);
        self.local.push(property.id);
        Ok(())
    }
}

// ============================================================================
// Registry (composed read view)
// ============================================================================

/// Read view of one type's registry composed with its supertypes.
#[derive(Clone, Copy)]
pub struct Registry<'s> {
    pub(crate) schema: &'s Schema,
    pub(crate) ty: TypeRef,
}

impl<'s> Registry<'s> {
    fn data(&self) -> &'s TypeRegistry {
        self.schema.type_registry(self.ty)
    }

    pub fn type_ref(&self) -> TypeRef {
        self.ty
    }

    pub fn name(&self) -> &'s str {
        &self.data().name
    }

    pub fn supertype(&self) -> Option<Registry<'s>> {
        self.data().supertype.map(|ty| self.schema.registry(ty))
    }

    /// Properties declared on this type itself, in declaration order.
    pub fn local(&self) -> impl Iterator<Item = &'s Property> + 's {
        let schema = self.schema;
        self.data().local.iter().map(move |id| schema.property(*id))
    }

    /// Resolve an attribute name or alias, walking local entries first and
    /// then the supertype chain.
    pub fn resolve(&self, name: &str) -> Result<&'s Property> {
        self.lookup(name).ok_or_else(|| {
            Error::NotFound(format!("attribute '{}.{}'", self.name(), name))
        })
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&'s Property> {
        let data = self.data();
        let canonical = data.aliases.get(name).map(String::as_str).unwrap_or(name);
        if let Some(id) = data.by_name.get(canonical) {
            return Some(self.schema.property(*id));
        }
        self.supertype().and_then(|sup| sup.lookup(canonical))
    }

    /// Whether `name` is declared or aliased on this type itself.
    pub fn declares(&self, name: &str) -> bool {
        let data = self.data();
        data.by_name.contains_key(name) || data.aliases.contains_key(name)
    }

    /// All visible attributes: inherited first (a local restriction takes its
    /// original's position), then local additions.
    pub fn attributes(&self) -> Arc<[PropertyId]> {
        self.derived(Derived::All)
    }

    /// Visible attributes satisfying `predicate`, in [`attributes`](Self::attributes) order.
    pub fn attributes_matching(&self, predicate: impl Fn(&Property) -> bool) -> Vec<PropertyId> {
        self.attributes()
            .iter()
            .copied()
            .filter(|id| predicate(self.schema.property(*id)))
            .collect()
    }

    pub fn mandatory(&self) -> Arc<[PropertyId]> { self.derived(Derived::Mandatory) }
    pub fn dependents(&self) -> Arc<[PropertyId]> { self.derived(Derived::Dependent) }
    pub fn owners(&self) -> Arc<[PropertyId]> { self.derived(Derived::Owner) }
    pub fn references(&self) -> Arc<[PropertyId]> { self.derived(Derived::Reference) }
    pub fn scalars(&self) -> Arc<[PropertyId]> { self.derived(Derived::Scalar) }

    /// The key of the given kind, inherited when not declared locally.
    pub fn key(&self, kind: KeyKind) -> Option<&'s [PropertyId]> {
        match self.data().keys.get(&kind) {
            Some(key) => Some(key.as_slice()),
            None => self.supertype().and_then(|sup| sup.key(kind)),
        }
    }

    /// Default values applied to new nodes, keyed by canonical property.
    /// A subtype default replaces an inherited one.
    pub fn defaults(&self) -> Vec<(PropertyId, &'s Value)> {
        let mut out: Vec<(PropertyId, &'s Value)> = match self.supertype() {
            Some(sup) => sup.defaults(),
            None => Vec::new(),
        };
        for (id, value) in &self.data().defaults {
            match out.iter_mut().find(|(existing, _)| existing == id) {
                Some(slot) => slot.1 = value,
                None => out.push((*id, value)),
            }
        }
        out
    }

    /// Whether `property` was declared unidirectional on this type or a supertype.
    pub fn is_unidirectional(&self, property: PropertyId) -> bool {
        self.data().unidirectional.contains(&property)
            || self.supertype().is_some_and(|sup| sup.is_unidirectional(property))
    }

    // ------------------------------------------------------------------------
    // Memoization
    // ------------------------------------------------------------------------

    pub(crate) fn derived(&self, which: Derived) -> Arc<[PropertyId]> {
        if let Some(hit) = self.schema.derived.read().get(&(self.ty, which)) {
            return Arc::clone(hit);
        }
        let computed: Arc<[PropertyId]> = self.compute(which).into();
        self.schema
            .derived
            .write()
            .entry((self.ty, which))
            .or_insert_with(|| Arc::clone(&computed));
        computed
    }

    fn compute(&self, which: Derived) -> Vec<PropertyId> {
        let schema = self.schema;
        match which {
            Derived::All => {
                let mut out: Vec<PropertyId> = match self.supertype() {
                    Some(sup) => sup.attributes().to_vec(),
                    None => Vec::new(),
                };
                for id in &self.data().local {
                    let property = schema.property(*id);
                    let replaced = property
                        .restricted_from
                        .and_then(|orig| out.iter().position(|p| *p == orig));
                    match replaced {
                        Some(pos) => out[pos] = *id,
                        None => out.push(*id),
                    }
                }
                out
            }
            Derived::Mandatory => {
                let extra = self.mandatory_declarations();
                self.attributes_matching(|p| {
                    p.is_mandatory() || extra.contains(&schema.canonical(p.id))
                })
            }
            Derived::Dependent => self.attributes_matching(Property::is_dependent),
            Derived::Owner => self.attributes_matching(Property::is_owner),
            Derived::Reference => self.attributes_matching(Property::is_reference),
            Derived::Scalar => self.attributes_matching(|p| !p.is_reference()),
        }
    }

    fn mandatory_declarations(&self) -> Vec<PropertyId> {
        let mut out = match self.supertype() {
            Some(sup) => sup.mandatory_declarations(),
            None => Vec::new(),
        };
        out.extend(self.data().mandatory.iter().copied());
        out
    }
}

impl std::fmt::Debug for Registry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("type", &self.name())
            .field("attributes", &self.attributes())
            .finish()
    }
}
