//! Property — the metadata descriptor for one attribute of a domain type.

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Handle of a registered domain type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeRef(pub u32);

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Handle of a registered property. Property identity is handle identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId(pub u32);

impl std::fmt::Display for PropertyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Scalar value kinds an attribute may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    String,
    /// Accepts any scalar.
    Any,
}

/// The declared element type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Scalar(ScalarKind),
    /// A reference to a node of the given domain type (or a subtype).
    Entity(TypeRef),
}

impl ValueType {
    pub fn entity(&self) -> Option<TypeRef> {
        match self {
            ValueType::Entity(t) => Some(*t),
            ValueType::Scalar(_) => None,
        }
    }
}

// ============================================================================
// Flags
// ============================================================================

/// Structural qualifiers of a property.
///
/// Combine with `|`:
///
/// ```
/// use typegraph::schema::PropertyFlags;
/// let flags = PropertyFlags::COLLECTION | PropertyFlags::MANDATORY;
/// assert!(flags.collection && flags.mandatory);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyFlags {
    pub collection: bool,
    /// References objects whose lifecycle is scoped to the declaring node.
    pub dependent: bool,
    /// Points back at the node this one depends on.
    pub owner: bool,
    pub disjoint: bool,
    pub mandatory: bool,
    /// Exempts an owner attribute from the "must have an owner" check.
    pub optional: bool,
}

impl PropertyFlags {
    pub const NONE: Self = Self {
        collection: false, dependent: false, owner: false,
        disjoint: false, mandatory: false, optional: false,
    };
    pub const COLLECTION: Self = Self { collection: true, ..Self::NONE };
    pub const DEPENDENT: Self = Self { dependent: true, ..Self::NONE };
    pub const OWNER: Self = Self { owner: true, ..Self::NONE };
    pub const DISJOINT: Self = Self { disjoint: true, ..Self::NONE };
    pub const MANDATORY: Self = Self { mandatory: true, ..Self::NONE };
    pub const OPTIONAL: Self = Self { optional: true, ..Self::NONE };

    /// `dependent` and `owner` are mutually exclusive.
    pub fn is_consistent(&self) -> bool {
        !(self.dependent && self.owner)
    }
}

impl BitOr for PropertyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            collection: self.collection || rhs.collection,
            dependent: self.dependent || rhs.dependent,
            owner: self.owner || rhs.owner,
            disjoint: self.disjoint || rhs.disjoint,
            mandatory: self.mandatory || rhs.mandatory,
            optional: self.optional || rhs.optional,
        }
    }
}

// ============================================================================
// Property
// ============================================================================

/// A registered attribute of a domain type.
///
/// Inverse bindings and attribute slots are always keyed by the canonical
/// property, i.e. the root of the restriction tree. Use
/// [`Schema::canonical`](super::Schema::canonical) and
/// [`Schema::inverse`](super::Schema::inverse) rather than the raw fields
/// when a property may be a restriction.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub id: PropertyId,
    pub name: String,
    pub declaring_type: TypeRef,
    pub value_type: ValueType,
    pub flags: PropertyFlags,
    pub(crate) inverse: Option<PropertyId>,
    pub(crate) restricted_from: Option<PropertyId>,
    pub(crate) restrictions: Vec<PropertyId>,
}

impl Property {
    pub(crate) fn new(
        id: PropertyId,
        name: impl Into<String>,
        declaring_type: TypeRef,
        value_type: ValueType,
        flags: PropertyFlags,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            declaring_type,
            value_type,
            flags,
            inverse: None,
            restricted_from: None,
            restrictions: Vec::new(),
        }
    }

    pub fn is_collection(&self) -> bool { self.flags.collection }
    pub fn is_dependent(&self) -> bool { self.flags.dependent }
    pub fn is_owner(&self) -> bool { self.flags.owner }
    pub fn is_mandatory(&self) -> bool { self.flags.mandatory }

    /// Whether values of this property are node references.
    pub fn is_reference(&self) -> bool {
        matches!(self.value_type, ValueType::Entity(_))
    }

    pub fn entity_type(&self) -> Option<TypeRef> {
        self.value_type.entity()
    }

    /// The property this one narrows, if it is a restriction.
    pub fn restricted_from(&self) -> Option<PropertyId> {
        self.restricted_from
    }

    /// Direct restrictions declared by subtypes.
    pub fn restrictions(&self) -> &[PropertyId] {
        &self.restrictions
    }
}
