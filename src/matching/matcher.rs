//! Pairing residual nodes.

use tracing::debug;

use crate::graph::ObjectGraph;
use crate::model::{NodeId, Value};
use crate::schema::KeyKind;
use crate::Result;
use super::MatchContext;

/// Decides which residual source nodes correspond to which residual target
/// nodes under one attribute.
///
/// Implementations return `(source, target)` pairs; each target should appear
/// at most once. Sources left out stay unmatched (and are copied when the
/// engine has a [`Copier`](super::Copier)).
pub trait NodeMatcher {
    fn match_nodes(
        &self,
        source: &ObjectGraph,
        sources: &[NodeId],
        target: &ObjectGraph,
        targets: &[NodeId],
        ctx: &MatchContext,
    ) -> Result<Vec<(NodeId, NodeId)>>;
}

/// Matches by identifier, then by business key.
///
/// Categories are tried in order: identifier (when both nodes have one),
/// then the primary, secondary and alternate keys of the source node's type.
/// The first category fully populated on both sides decides; later ones are
/// never consulted. Reference-valued key attributes compare through the
/// matches already recorded in the [`MatchContext`].
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyMatcher;

impl KeyMatcher {
    pub fn is_match(
        &self,
        source: &ObjectGraph,
        s: NodeId,
        target: &ObjectGraph,
        t: NodeId,
        ctx: &MatchContext,
    ) -> Result<bool> {
        let (from, to) = (source.node(s)?, target.node(t)?);
        let schema = source.schema();
        if !schema.related(from.type_ref, to.type_ref) {
            return Ok(false);
        }
        if let (Some(a), Some(b)) = (&from.identifier, &to.identifier) {
            return Ok(a == b);
        }

        let registry = schema.registry(from.type_ref);
        for kind in KeyKind::ORDER {
            let Some(key) = registry.key(kind) else { continue };
            let values: Vec<(&Value, &Value)> = key.iter().map(|p| (source.slot(s, *p), target.slot(t, *p))).collect();
            if values.iter().any(|(a, b)| a.is_empty() || b.is_empty()) {
                continue;
            }
            let equal = values.iter().all(|(a, b)| same_value(a, b, ctx));
            debug!(source = %s, target = %t, ?kind, equal, "key match");
            return Ok(equal);
        }
        Ok(false)
    }
}

impl NodeMatcher for KeyMatcher {
    fn match_nodes(
        &self,
        source: &ObjectGraph,
        sources: &[NodeId],
        target: &ObjectGraph,
        targets: &[NodeId],
        ctx: &MatchContext,
    ) -> Result<Vec<(NodeId, NodeId)>> {
        let mut taken = vec![false; targets.len()];
        let mut pairs = Vec::new();
        for s in sources {
            for (i, t) in targets.iter().enumerate() {
                if !taken[i] && self.is_match(source, *s, target, *t, ctx)? {
                    taken[i] = true;
                    pairs.push((*s, *t));
                    break;
                }
            }
        }
        Ok(pairs)
    }
}

/// Value equality across graphs: references are equal when the source side
/// is matched to the target side.
fn same_value(a: &Value, b: &Value, ctx: &MatchContext) -> bool {
    match (a, b) {
        (Value::Ref(x), Value::Ref(y)) => ctx.target_of(*x) == Some(*y),
        (Value::List(xs), Value::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y, ctx))
        }
        _ => a == b,
    }
}
