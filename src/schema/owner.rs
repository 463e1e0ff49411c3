//! Ownership structure derived from dependent/owner flags.

use serde::{Deserialize, Serialize};

use super::{PropertyId, Schema, TypeRef};

/// One way a type can be owned: through `property`, pointing at `owner_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerLink {
    pub owner_type: TypeRef,
    pub property: PropertyId,
    /// The owner's dependent attribute pointing back, when bidirectional.
    pub inverse: Option<PropertyId>,
    /// Whether a node of this type must have an owner through this link.
    pub required: bool,
}

/// The (owner type, owner property) pairs of one type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerGraph {
    pub owned_type: Option<TypeRef>,
    pub links: Vec<OwnerLink>,
}

impl OwnerGraph {
    pub(crate) fn derive(schema: &Schema, ty: TypeRef) -> Self {
        let registry = schema.registry(ty);
        let links = registry
            .owners()
            .iter()
            .filter_map(|id| {
                let p = schema.property(*id);
                let inverse = schema.inverse(*id);
                Some(OwnerLink {
                    owner_type: p.entity_type()?,
                    property: schema.canonical(*id),
                    inverse,
                    required: inverse.is_some() && !p.flags.optional,
                })
            })
            .collect();
        Self { owned_type: Some(ty), links }
    }

    /// Whether instances of the type are dependents of some owner.
    pub fn is_dependent(&self) -> bool {
        !self.links.is_empty()
    }

    /// Whether some owner link must be populated.
    pub fn requires_owner(&self) -> bool {
        self.links.iter().any(|l| l.required)
    }

    pub fn owner_types(&self) -> impl Iterator<Item = TypeRef> + '_ {
        self.links.iter().map(|l| l.owner_type)
    }
}
