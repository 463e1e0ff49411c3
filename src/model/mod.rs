//! # Object Graph Model
//!
//! Plain DTOs for nodes and their attribute values. These types cross every
//! boundary: schema ↔ integrity ↔ visitor ↔ match/merge ↔ user.
//!
//! This module is pure data: no schema lookups, no integrity rules.

pub mod node;
pub mod value;
pub mod attribute_map;

pub use node::{Node, NodeId, Identifier};
pub use value::Value;
pub use attribute_map::AttributeMap;
