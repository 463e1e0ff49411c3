//! Folding matched source nodes into their targets.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::graph::ObjectGraph;
use crate::model::{NodeId, Value};
use crate::visitor::{Children, VisitOptions, Visitor};
use crate::Result;
use super::{Copier, DefaultCopier, MatchContext, MatchMerge, Selector};

impl MatchMerge {
    /// Match, then merge `source_root`'s graph into `target_root`'s. Returns
    /// the target root.
    pub fn merge(
        &self,
        source: &ObjectGraph,
        source_root: NodeId,
        target: &mut ObjectGraph,
        target_root: NodeId,
    ) -> Result<NodeId> {
        let mut ctx = MatchContext::new();
        self.merge_with(source, source_root, target, target_root, &mut ctx)
    }

    /// Like [`merge`](Self::merge), reusing and extending `ctx`.
    ///
    /// Populated scalar references are paired with the target's current value
    /// during the match, so the referenced node is merged in place instead of
    /// being replaced.
    pub fn merge_with(
        &self,
        source: &ObjectGraph,
        source_root: NodeId,
        target: &mut ObjectGraph,
        target_root: NodeId,
        ctx: &mut MatchContext,
    ) -> Result<NodeId> {
        self.match_into(source, source_root, target, target_root, ctx, true)?;

        let order: Vec<NodeId> = {
            let matched = &*ctx;
            let selector = &self.selector;
            let navigator = |s: NodeId| -> Children<NodeId> {
                let Ok(ty) = source.type_of(s) else {
                    return Children::new();
                };
                selector
                    .select(source.schema(), ty)
                    .into_iter()
                    .flat_map(|p| source.slot(s, p).refs())
                    .filter(|r| matched.is_matched(*r))
                    .collect()
            };
            Visitor::new(navigator, VisitOptions::children_first()).walk(source_root).collect()
        };

        for s in order {
            if let Some(t) = ctx.target_of(s) {
                self.merge_node(source, s, target, t, ctx)?;
            }
        }
        let root = ctx.target_of(source_root).unwrap_or(target_root);
        debug!(source = %source_root, target = %root, merged = ctx.len(), "merge complete");
        Ok(root)
    }

    fn merge_node(
        &self,
        source: &ObjectGraph,
        s: NodeId,
        target: &mut ObjectGraph,
        t: NodeId,
        ctx: &mut MatchContext,
    ) -> Result<()> {
        let schema = Arc::clone(source.schema());
        let ty = source.type_of(s)?;

        if target.identifier(t)?.is_none() {
            if let Some(identifier) = source.identifier(s)?.cloned() {
                target.set_identifier(t, Some(identifier))?;
            }
        }

        for property in schema.registry(ty).scalars().iter() {
            let canonical = schema.canonical(*property);
            let value = source.slot(s, canonical);
            if value.is_empty() {
                continue;
            }
            let absent = match target.get(t, canonical) {
                Ok(existing) => existing.is_empty(),
                Err(_) => false,
            };
            if absent {
                target.set(t, canonical, value.clone())?;
            }
        }

        for property in self.selector.select(&schema, ty) {
            let values = source.slot(s, property).refs();
            if values.is_empty() || target.get(t, property).is_err() {
                continue;
            }
            if schema.property(property).is_collection() {
                for r in values {
                    match ctx.target_of(r) {
                        Some(m) => target.add(t, property, m)?,
                        None => trace!(source = %r, attribute = %schema.describe(property), "dropped unmatched member"),
                    }
                }
                continue;
            }

            let Some(m) = values.first().and_then(|r| ctx.target_of(*r)) else {
                continue;
            };
            match target.slot(t, property).as_ref_id() {
                None => target.set(t, property, Value::Ref(m))?,
                Some(current) if current == m => {}
                Some(current) => {
                    debug!(node = %t, attribute = %schema.describe(property), %current, candidate = %m, "kept populated reference");
                }
            }
        }
        ctx.mark_merged(t);
        Ok(())
    }
}

/// Copy the subgraph selected from `root` into `target`; returns the copy of
/// `root`.
pub fn copy(source: &ObjectGraph, root: NodeId, target: &mut ObjectGraph, selector: Selector) -> Result<NodeId> {
    let target_root = DefaultCopier.copy(source, root, target)?;
    MatchMerge::new(selector)
        .with_copier(DefaultCopier)
        .merge(source, root, target, target_root)
}

// ============================================================================
// Tests
// ============================================================================
