//! AttributeMap — the slot store on nodes.

use hashbrown::HashMap;

use crate::schema::PropertyId;

/// A map of canonical property ids to values.
pub type AttributeMap = HashMap<PropertyId, super::Value>;
