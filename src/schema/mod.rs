//! # Schema — attribute metadata for a typed object domain
//!
//! The schema is built once per domain at setup time: types are declared,
//! attributes registered (by hand or through an [`Introspector`]), then
//! qualified with inverses, dependency/ownership, keys, defaults and
//! mandatory markers. [`Schema::freeze`] ends the setup phase; from then on
//! only [`Schema::restrict`] may add metadata.
//!
//! ```
//! use typegraph::schema::{Schema, PropertyFlags, ValueType, ScalarKind};
//!
//! # fn main() -> typegraph::Result<()> {
//! let mut schema = Schema::new();
//! let parent = schema.declare_type("Parent", None)?;
//! let child = schema.declare_type("Child", None)?;
//! schema.register_attribute(parent, "children", ValueType::Entity(child), PropertyFlags::COLLECTION)?;
//! schema.register_attribute(child, "parent", ValueType::Entity(parent), PropertyFlags::NONE)?;
//! schema.register_attribute(child, "name", ValueType::Scalar(ScalarKind::String), PropertyFlags::NONE)?;
//! schema.mark_dependent(parent, "children", None)?;
//!
//! let owner = schema.registry(child).resolve("parent")?;
//! assert!(owner.is_owner());
//! # Ok(())
//! # }
//! ```

pub mod property;
pub mod registry;
pub mod introspect;
pub mod owner;

use hashbrown::HashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::model::Value;
use crate::{Error, Result};

pub use property::{Property, PropertyFlags, PropertyId, ScalarKind, TypeRef, ValueType};
pub use registry::{KeyKind, Registry, TypeRegistry};
pub use introspect::{AttributeDescriptor, DeclaredType, Introspector};
pub use owner::{OwnerGraph, OwnerLink};

use registry::Derived;

/// Overrides applied by [`Schema::restrict`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Restriction {
    /// Narrowed entity type; must be a subtype of the inherited one.
    pub value_type: Option<TypeRef>,
    /// Flags added on top of the inherited ones.
    pub flags: PropertyFlags,
}

// ============================================================================
// Schema
// ============================================================================

/// All types and properties of one domain.
#[derive(Debug, Default)]
pub struct Schema {
    types: Vec<TypeRegistry>,
    type_names: HashMap<String, TypeRef>,
    properties: Vec<Property>,
    frozen: bool,
    pub(crate) derived: RwLock<HashMap<(TypeRef, Derived), Arc<[PropertyId]>>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// End the setup phase. Everything except [`restrict`](Self::restrict)
    /// fails with [`Error::Frozen`] afterwards.
    pub fn freeze(&mut self) {
        self.frozen = true;
        debug!(types = self.types.len(), properties = self.properties.len(), "schema frozen");
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn ensure_mutable(&self, what: &str) -> Result<()> {
        if self.frozen {
            return Err(Error::Frozen(what.to_string()));
        }
        Ok(())
    }

    fn invalidate(&mut self) {
        self.derived.get_mut().clear();
    }

    // ========================================================================
    // Types
    // ========================================================================

    /// Declare a domain type, optionally extending an existing one.
    pub fn declare_type(&mut self, name: &str, supertype: Option<TypeRef>) -> Result<TypeRef> {
        self.ensure_mutable("declare_type")?;
        if self.type_names.contains_key(name) {
            return Err(Error::DuplicateType(name.to_string()));
        }
        if let Some(sup) = supertype {
            self.check_type(sup)?;
        }
        let ty = TypeRef(self.types.len() as u32);
        self.types.push(TypeRegistry::new(ty, name, supertype));
        self.type_names.insert(name.to_string(), ty);
        debug!(type_name = name, %ty, "declared type");
        Ok(ty)
    }

    pub fn type_ref(&self, name: &str) -> Result<TypeRef> {
        self.type_names
            .get(name)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("type '{name}'")))
    }

    pub fn type_name(&self, ty: TypeRef) -> &str {
        &self.type_registry(ty).name
    }

    pub fn supertype(&self, ty: TypeRef) -> Option<TypeRef> {
        self.type_registry(ty).supertype
    }

    pub fn types(&self) -> impl Iterator<Item = TypeRef> + '_ {
        self.types.iter().map(|t| t.type_ref)
    }

    pub fn contains_type(&self, ty: TypeRef) -> bool {
        (ty.0 as usize) < self.types.len()
    }

    pub(crate) fn check_type(&self, ty: TypeRef) -> Result<()> {
        if self.contains_type(ty) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("type {ty}")))
        }
    }

    /// Reflexive subtype test.
    pub fn is_subtype(&self, sub: TypeRef, sup: TypeRef) -> bool {
        let mut cur = Some(sub);
        while let Some(ty) = cur {
            if ty == sup {
                return true;
            }
            cur = self.supertype(ty);
        }
        false
    }

    /// Whether either type extends the other.
    pub fn related(&self, a: TypeRef, b: TypeRef) -> bool {
        self.is_subtype(a, b) || self.is_subtype(b, a)
    }

    /// The topmost supertype of `ty`.
    pub fn hierarchy_root(&self, ty: TypeRef) -> TypeRef {
        let mut cur = ty;
        while let Some(sup) = self.supertype(cur) {
            cur = sup;
        }
        cur
    }

    pub(crate) fn type_registry(&self, ty: TypeRef) -> &TypeRegistry {
        &self.types[ty.0 as usize]
    }

    pub(crate) fn type_registry_mut(&mut self, ty: TypeRef) -> &mut TypeRegistry {
        &mut self.types[ty.0 as usize]
    }

    /// Composed registry view for `ty`.
    ///
    /// # Panics
    /// If `ty` was not issued by this schema.
    pub fn registry(&self, ty: TypeRef) -> Registry<'_> {
        assert!((ty.0 as usize) < self.types.len(), "unknown type {ty}");
        Registry { schema: self, ty }
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// # Panics
    /// If `id` was not issued by this schema.
    pub fn property(&self, id: PropertyId) -> &Property {
        &self.properties[id.0 as usize]
    }

    /// Like [`Schema::property`], but `NotFound` for a foreign id.
    pub fn try_property(&self, id: PropertyId) -> Result<&Property> {
        self.properties
            .get(id.0 as usize)
            .ok_or_else(|| Error::NotFound(format!("property {id}")))
    }

    fn property_mut(&mut self, id: PropertyId) -> &mut Property {
        &mut self.properties[id.0 as usize]
    }

    /// Resolve `name` (or an alias) on `ty` and return its id.
    pub fn resolve(&self, ty: TypeRef, name: &str) -> Result<PropertyId> {
        self.check_type(ty)?;
        self.registry(ty).resolve(name).map(|p| p.id)
    }

    /// Root of the restriction tree `id` belongs to. Attribute slots and
    /// inverse bindings are keyed by this id.
    pub fn canonical(&self, id: PropertyId) -> PropertyId {
        let mut cur = id;
        while let Some(orig) = self.property(cur).restricted_from {
            cur = orig;
        }
        cur
    }

    /// Canonical inverse of `id`, if bound.
    pub fn inverse(&self, id: PropertyId) -> Option<PropertyId> {
        self.property(self.canonical(id)).inverse
    }

    /// Register a new attribute on `ty`.
    pub fn register_attribute(
        &mut self,
        ty: TypeRef,
        name: &str,
        value_type: ValueType,
        flags: PropertyFlags,
    ) -> Result<PropertyId> {
        self.ensure_mutable("register_attribute")?;
        self.check_type(ty)?;
        if let ValueType::Entity(target) = value_type {
            self.check_type(target)?;
        }
        if !flags.is_consistent() {
            return Err(Error::FlagConflict(format!(
                "'{}.{}' cannot be both dependent and owner",
                self.type_name(ty), name
            )));
        }
        if self.registry(ty).declares(name) {
            return Err(Error::DuplicateAttribute {
                type_name: self.type_name(ty).to_string(),
                name: name.to_string(),
            });
        }
        if let Some(sup) = self.supertype(ty) {
            if self.registry(sup).lookup(name).is_some() {
                // Shadowing an inherited attribute must go through `restrict`.
                return Err(Error::DuplicateAttribute {
                    type_name: self.type_name(ty).to_string(),
                    name: name.to_string(),
                });
            }
        }

        let id = PropertyId(self.properties.len() as u32);
        let property = Property::new(id, name, ty, value_type, flags);
        self.type_registry_mut(ty).insert(&property)?;
        self.properties.push(property);
        self.invalidate();
        debug!(type_name = self.type_name(ty), attribute = name, %id, "registered attribute");
        Ok(id)
    }

    /// Map `alias` onto the attribute `name` for resolution on `ty` and its subtypes.
    pub fn add_alias(&mut self, ty: TypeRef, alias: &str, name: &str) -> Result<()> {
        self.ensure_mutable("add_alias")?;
        let target = self.resolve(ty, name)?;
        let target_name = self.property(target).name.clone();
        let data = self.type_registry_mut(ty);
        if data.by_name.contains_key(alias) || data.aliases.contains_key(alias) {
            return Err(Error::DuplicateAttribute { type_name: data.name.clone(), name: alias.to_string() });
        }
        data.aliases.insert(alias.to_string(), target_name);
        Ok(())
    }

    /// Apply `update` to the flags of `id` and of every restriction below it.
    pub(crate) fn update_flags(&mut self, id: PropertyId, update: impl Fn(&mut PropertyFlags)) -> Result<()> {
        let mut pending = vec![id];
        let mut touched = Vec::new();
        while let Some(cur) = pending.pop() {
            let mut flags = self.property(cur).flags;
            update(&mut flags);
            if !flags.is_consistent() {
                let p = self.property(cur);
                return Err(Error::FlagConflict(format!(
                    "'{}.{}' cannot be both dependent and owner",
                    self.type_name(p.declaring_type), p.name
                )));
            }
            touched.push((cur, flags));
            pending.extend(self.property(cur).restrictions.iter().copied());
        }
        for (cur, flags) in touched {
            self.property_mut(cur).flags = flags;
        }
        self.invalidate();
        Ok(())
    }

    // ========================================================================
    // Inverses
    // ========================================================================

    /// Bind `ty.name` and the attribute `inverse_name` of its value type as
    /// mutual inverses.
    pub fn set_inverse(&mut self, ty: TypeRef, name: &str, inverse_name: &str) -> Result<()> {
        self.ensure_mutable("set_inverse")?;
        let forward = self.resolve(ty, name)?;
        let target = self.entity_type_of(forward)?;
        let inverse = self.resolve(target, inverse_name)?;
        self.bind_inverse(forward, inverse)
    }

    /// Bind two properties as mutual inverses. Idempotent for an existing
    /// binding; a self-inverse binding (`a == b`) is allowed.
    pub fn bind_inverse(&mut self, a: PropertyId, b: PropertyId) -> Result<()> {
        self.ensure_mutable("bind_inverse")?;
        let (a, b) = (self.canonical(a), self.canonical(b));
        let (pa, pb) = (self.property(a), self.property(b));

        let (Some(ea), Some(eb)) = (pa.entity_type(), pb.entity_type()) else {
            return Err(Error::TypeMismatch {
                expected: "entity-valued attributes".into(),
                got: format!("{} / {}", self.describe(a), self.describe(b)),
            });
        };
        if !self.related(ea, pb.declaring_type) || !self.related(eb, pa.declaring_type) {
            return Err(Error::TypeMismatch {
                expected: format!("inverse of {}", self.describe(a)),
                got: self.describe(b),
            });
        }

        for (this, other) in [(a, b), (b, a)] {
            if let Some(bound) = self.property(this).inverse {
                if bound != other {
                    return Err(Error::InverseConflict {
                        attribute: self.describe(this),
                        bound: self.describe(bound),
                        requested: self.describe(other),
                    });
                }
            }
        }

        self.property_mut(a).inverse = Some(b);
        self.property_mut(b).inverse = Some(a);
        self.invalidate();
        debug!(forward = %self.describe(a), inverse = %self.describe(b), "bound inverse");
        Ok(())
    }

    fn entity_type_of(&self, id: PropertyId) -> Result<TypeRef> {
        self.property(id).entity_type().ok_or_else(|| Error::TypeMismatch {
            expected: "entity-valued attribute".into(),
            got: self.describe(id),
        })
    }

    /// `Type.attribute`, for messages.
    pub fn describe(&self, id: PropertyId) -> String {
        let p = self.property(id);
        format!("{}.{}", self.type_name(p.declaring_type), p.name)
    }

    // ========================================================================
    // Dependency / ownership
    // ========================================================================

    /// Allow `ty.name` to be marked dependent without an owner back-reference.
    pub fn declare_unidirectional(&mut self, ty: TypeRef, name: &str) -> Result<()> {
        self.ensure_mutable("declare_unidirectional")?;
        let canonical = self.canonical(self.resolve(ty, name)?);
        self.type_registry_mut(ty).unidirectional.insert(canonical);
        self.invalidate();
        Ok(())
    }

    /// Qualify `ty.name` as dependent and its reciprocal attribute as owner.
    ///
    /// The reciprocal is `inverse_name` when given. Otherwise it is inferred
    /// on the referenced type: the single non-collection attribute whose
    /// value type this type conforms to, or failing that the attribute named
    /// after this type (`Parent` → `parent`). Fails with
    /// [`Error::MissingInverse`] if neither resolves and the attribute was
    /// not declared unidirectional.
    pub fn mark_dependent(&mut self, ty: TypeRef, name: &str, inverse_name: Option<&str>) -> Result<PropertyId> {
        self.ensure_mutable("mark_dependent")?;
        let forward = self.canonical(self.resolve(ty, name)?);
        let target = self.entity_type_of(forward)?;

        let inverse = match inverse_name {
            Some(inv) => Some(self.resolve(target, inv)?),
            None => self.infer_owner_attribute(ty, target, forward),
        };

        let mut snapshot = self.flag_snapshot(forward);
        if let Some(inv) = inverse {
            snapshot.extend(self.flag_snapshot(inv));
        }
        if let Err(err) = self.qualify_dependent(ty, target, forward, inverse) {
            // A failed declaration leaves no trace.
            self.restore_flags(snapshot);
            return Err(err);
        }
        Ok(forward)
    }

    fn qualify_dependent(
        &mut self,
        ty: TypeRef,
        target: TypeRef,
        forward: PropertyId,
        inverse: Option<PropertyId>,
    ) -> Result<()> {
        self.update_flags(forward, |f| f.dependent = true)?;
        match inverse {
            Some(inv) => {
                self.update_flags(inv, |f| f.owner = true)?;
                self.bind_inverse(forward, inv)?;
                debug!(dependent = %self.describe(forward), owner = %self.describe(inv), "marked dependent");
                Ok(())
            }
            None if self.registry(ty).is_unidirectional(forward) => {
                debug!(dependent = %self.describe(forward), "marked dependent (unidirectional)");
                Ok(())
            }
            None => Err(Error::MissingInverse {
                attribute: self.describe(forward),
                owner_type: self.type_name(target).to_string(),
            }),
        }
    }

    /// Current flags of `id` and of every restriction below it.
    fn flag_snapshot(&self, id: PropertyId) -> Vec<(PropertyId, PropertyFlags)> {
        let mut pending = vec![id];
        let mut out = Vec::new();
        while let Some(cur) = pending.pop() {
            let p = self.property(cur);
            out.push((cur, p.flags));
            pending.extend(p.restrictions.iter().copied());
        }
        out
    }

    fn restore_flags(&mut self, snapshot: Vec<(PropertyId, PropertyFlags)>) {
        for (id, flags) in snapshot.into_iter().rev() {
            self.property_mut(id).flags = flags;
        }
        self.invalidate();
    }

    fn infer_owner_attribute(&self, ty: TypeRef, target: TypeRef, forward: PropertyId) -> Option<PropertyId> {
        let registry = self.registry(target);
        let candidates = registry.attributes_matching(|p| {
            p.id != forward
                && !p.is_collection()
                && p.entity_type().is_some_and(|e| self.is_subtype(ty, e))
        });
        if let [only] = candidates.as_slice() {
            return Some(self.canonical(*only));
        }

        let type_name = self.type_name(ty);
        let mut chars = type_name.chars();
        let by_name: String = match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => return None,
        };
        registry
            .lookup(&by_name)
            .filter(|p| p.id != forward && p.is_reference())
            .map(|p| self.canonical(p.id))
    }

    /// Derived ownership structure of `ty`.
    pub fn owner_graph(&self, ty: TypeRef) -> OwnerGraph {
        OwnerGraph::derive(self, ty)
    }

    // ========================================================================
    // Keys, defaults, mandatory
    // ========================================================================

    /// Declare the key of the given kind on `ty` as an ordered attribute list.
    pub fn add_key(&mut self, ty: TypeRef, kind: KeyKind, names: &[&str]) -> Result<()> {
        self.ensure_mutable("add_key")?;
        let ids = names
            .iter()
            .map(|n| self.resolve(ty, n).map(|id| self.canonical(id)))
            .collect::<Result<Vec<_>>>()?;
        self.type_registry_mut(ty).keys.insert(kind, ids);
        Ok(())
    }

    /// Default value assigned to `ty.name` when a node is created.
    pub fn add_default(&mut self, ty: TypeRef, name: &str, value: impl Into<Value>) -> Result<()> {
        self.ensure_mutable("add_default")?;
        let id = self.canonical(self.resolve(ty, name)?);
        let value = value.into();
        let data = self.type_registry_mut(ty);
        data.defaults.retain(|(p, _)| *p != id);
        data.defaults.push((id, value));
        Ok(())
    }

    /// Require the named attributes on `ty` (and its subtypes).
    pub fn add_mandatory(&mut self, ty: TypeRef, names: &[&str]) -> Result<()> {
        self.ensure_mutable("add_mandatory")?;
        let ids = names
            .iter()
            .map(|n| self.resolve(ty, n).map(|id| self.canonical(id)))
            .collect::<Result<Vec<_>>>()?;
        let data = self.type_registry_mut(ty);
        for id in ids {
            if !data.mandatory.contains(&id) {
                data.mandatory.push(id);
            }
        }
        self.invalidate();
        Ok(())
    }

    // ========================================================================
    // Restriction
    // ========================================================================

    /// Narrow the attribute `name` inherited by `subtype`.
    ///
    /// The restriction shares its original's slot and inverse; flag changes
    /// on the original later propagate to it. Allowed after [`freeze`](Self::freeze).
    pub fn restrict(&mut self, subtype: TypeRef, name: &str, overrides: Restriction) -> Result<PropertyId> {
        self.check_type(subtype)?;
        if self.registry(subtype).declares(name) {
            return Err(Error::DuplicateAttribute {
                type_name: self.type_name(subtype).to_string(),
                name: name.to_string(),
            });
        }
        let inherited = self
            .supertype(subtype)
            .and_then(|sup| self.registry(sup).lookup(name))
            .ok_or_else(|| Error::NotFound(format!(
                "inherited attribute '{}' on {}", name, self.type_name(subtype)
            )))?;

        let value_type = match (overrides.value_type, inherited.value_type) {
            (None, vt) => vt,
            (Some(narrow), ValueType::Entity(wide)) if self.is_subtype(narrow, wide) => ValueType::Entity(narrow),
            (Some(narrow), vt) => {
                return Err(Error::TypeMismatch {
                    expected: format!("subtype of {:?}", vt),
                    got: self.type_name(narrow).to_string(),
                });
            }
        };
        let flags = inherited.flags | overrides.flags;
        if !flags.is_consistent() {
            return Err(Error::FlagConflict(format!(
                "restriction of '{}' cannot be both dependent and owner", self.describe(inherited.id)
            )));
        }

        let original = inherited.id;
        let id = PropertyId(self.properties.len() as u32);
        let mut property = Property::new(id, name, subtype, value_type, flags);
        property.restricted_from = Some(original);
        self.type_registry_mut(subtype).insert(&property)?;
        self.properties.push(property);
        self.property_mut(original).restrictions.push(id);
        self.invalidate();
        debug!(restriction = %self.describe(id), original = %self.describe(original), "restricted attribute");
        Ok(id)
    }
}

// ============================================================================
// Tests
// ============================================================================
