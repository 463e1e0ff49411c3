//! # Match/Merge engine
//!
//! Reconciles a source graph into a target graph that shares its [`Schema`].
//!
//! **Match** walks the source in pre-order from a seeded root pair. At each
//! matched source node, for each selected reference attribute, the source's
//! referenced nodes are split into those already matched (earlier in the
//! walk, or through the identifier cache) and the residual ones. Residual
//! sources are offered to the [`NodeMatcher`] together with the target's
//! still unclaimed references; whatever is left is handed to the [`Copier`].
//! The walk then descends into every source child that ended up matched.
//!
//! **Merge** runs a match, then visits the matched source nodes children
//! first and folds each into its target: absent scalars and identifiers are
//! filled in, collection members are appended without duplicates, and empty
//! scalar references are set. All reference writes go through the integrity
//! layer.
//!
//! ```
//! use std::sync::Arc;
//! use typegraph::{copy, ObjectGraph, Selector, Value};
//! use typegraph::schema::{Schema, PropertyFlags, ScalarKind, ValueType};
//!
//! # fn main() -> typegraph::Result<()> {
//! let mut schema = Schema::new();
//! let folder = schema.declare_type("Folder", None)?;
//! let file = schema.declare_type("File", None)?;
//! schema.register_attribute(file, "name", ValueType::Scalar(ScalarKind::String), PropertyFlags::NONE)?;
//! schema.register_attribute(folder, "files", ValueType::Entity(file), PropertyFlags::COLLECTION)?;
//! schema.register_attribute(file, "folder", ValueType::Entity(folder), PropertyFlags::NONE)?;
//! schema.mark_dependent(folder, "files", None)?;
//! schema.freeze();
//! let schema = Arc::new(schema);
//!
//! let mut source = ObjectGraph::new(schema.clone());
//! let root = source.create(folder)?;
//! let readme = source.create(file)?;
//! source.set_by_name(readme, "name", Value::from("README"))?;
//! source.add_by_name(root, "files", readme)?;
//!
//! let mut target = ObjectGraph::new(schema);
//! let copied = copy(&source, root, &mut target, Selector::Dependents)?;
//! let files = target.refs_by_name(copied, "files")?;
//! assert_eq!(files.len(), 1);
//! assert_eq!(target.get_by_name(files[0], "name")?, &Value::from("README"));
//! assert_eq!(target.get_by_name(files[0], "folder")?, &Value::Ref(copied));
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod matcher;
pub mod copier;
pub mod merge;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::graph::ObjectGraph;
use crate::model::NodeId;
use crate::schema::{PropertyId, Schema, TypeRef};
use crate::visitor::{Children, VisitOptions, Visitor};
use crate::{Error, Result};

pub use context::MatchContext;
pub use matcher::{KeyMatcher, NodeMatcher};
pub use copier::{Copier, DefaultCopier};
pub use merge::copy;

// ============================================================================
// Selector
// ============================================================================

/// Which reference attributes a match/merge follows.
#[derive(Clone)]
pub enum Selector {
    /// Dependent attributes only: the owned subtree.
    Dependents,
    /// Every reference attribute except owner back-links.
    References,
    /// Every reference attribute.
    All,
    /// Caller-defined selection per type.
    Custom(Rc<dyn Fn(&Schema, TypeRef) -> Vec<PropertyId>>),
}

impl Selector {
    pub fn custom(select: impl Fn(&Schema, TypeRef) -> Vec<PropertyId> + 'static) -> Self {
        Selector::Custom(Rc::new(select))
    }

    /// Selected attributes of `ty`, as canonical ids without duplicates.
    pub fn select(&self, schema: &Schema, ty: TypeRef) -> Vec<PropertyId> {
        let registry = schema.registry(ty);
        let raw: Vec<PropertyId> = match self {
            Selector::Dependents => registry.dependents().to_vec(),
            Selector::References => registry.attributes_matching(|p| p.is_reference() && !p.is_owner()),
            Selector::All => registry.references().to_vec(),
            Selector::Custom(select) => select(schema, ty),
        };
        let mut out = Vec::with_capacity(raw.len());
        for property in raw {
            let canonical = schema.canonical(property);
            if !out.contains(&canonical) {
                out.push(canonical);
            }
        }
        out
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Dependents => f.write_str("Dependents"),
            Selector::References => f.write_str("References"),
            Selector::All => f.write_str("All"),
            Selector::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// ============================================================================
// MatchMerge
// ============================================================================

/// A configured match/merge engine: a [`Selector`] plus an optional
/// [`NodeMatcher`] and [`Copier`].
///
/// Without a matcher, residual nodes are never matched; without a copier,
/// unmatched ones are dropped.
pub struct MatchMerge {
    selector: Selector,
    matcher: Option<Box<dyn NodeMatcher>>,
    copier: Option<Box<dyn Copier>>,
}

impl fmt::Debug for MatchMerge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchMerge")
            .field("selector", &self.selector)
            .field("matcher", &self.matcher.is_some())
            .field("copier", &self.copier.is_some())
            .finish()
    }
}

impl MatchMerge {
    pub fn new(selector: Selector) -> Self {
        Self { selector, matcher: None, copier: None }
    }

    /// [`KeyMatcher`] and [`DefaultCopier`] over `selector`.
    pub fn keyed(selector: Selector) -> Self {
        Self::new(selector).with_matcher(KeyMatcher).with_copier(DefaultCopier)
    }

    pub fn with_matcher(mut self, matcher: impl NodeMatcher + 'static) -> Self {
        self.matcher = Some(Box::new(matcher));
        self
    }

    pub fn with_copier(mut self, copier: impl Copier + 'static) -> Self {
        self.copier = Some(Box::new(copier));
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Match the graph under `source_root` against the graph under
    /// `target_root`. Copies made for unmatched sources land in `target`.
    pub fn match_graphs(
        &self,
        source: &ObjectGraph,
        source_root: NodeId,
        target: &mut ObjectGraph,
        target_root: NodeId,
    ) -> Result<MatchContext> {
        let mut ctx = MatchContext::new();
        self.match_into(source, source_root, target, target_root, &mut ctx, false)?;
        Ok(ctx)
    }

    /// Match pass recording into `ctx`. With `pair_scalars`, a residual
    /// source under a scalar attribute is paired with the target's residual
    /// value before the matcher is consulted.
    pub(crate) fn match_into(
        &self,
        source: &ObjectGraph,
        source_root: NodeId,
        target: &mut ObjectGraph,
        target_root: NodeId,
        ctx: &mut MatchContext,
        pair_scalars: bool,
    ) -> Result<()> {
        check_compatible(source, source_root, target, target_root)?;
        if !ctx.is_matched(source_root) {
            self.register(source, source_root, target, target_root, ctx)?;
        }
        self.seed_identifiers(target, target_root, ctx)?;

        // Children are only known after the node itself has been matched, so
        // the navigator reads what the pre-order pass has just recorded.
        let expanded: RefCell<HashMap<NodeId, Children<NodeId>>> = RefCell::new(HashMap::new());
        let visitor = Visitor::new(
            |id: NodeId| expanded.borrow_mut().remove(&id).unwrap_or_default(),
            VisitOptions::preorder(),
        );
        for s in visitor.walk(source_root) {
            let children = self.match_node(source, s, target, ctx, pair_scalars)?;
            expanded.borrow_mut().insert(s, children);
        }
        debug!(root = %source_root, matched = ctx.len(), "match complete");
        Ok(())
    }

    /// Match the selected references of one matched source node and return
    /// the source children that now have a counterpart.
    fn match_node(
        &self,
        source: &ObjectGraph,
        s: NodeId,
        target: &mut ObjectGraph,
        ctx: &mut MatchContext,
        pair_scalars: bool,
    ) -> Result<Children<NodeId>> {
        let Some(t) = ctx.target_of(s) else {
            return Ok(Children::new());
        };
        let schema = Arc::clone(source.schema());
        let mut children = Children::new();

        for property in self.selector.select(&schema, source.type_of(s)?) {
            let sources = source.slot(s, property).refs();
            if sources.is_empty() {
                continue;
            }
            let targets = match target.get(t, property) {
                Ok(value) => value.refs(),
                Err(_) => Default::default(),
            };
            for existing in &targets {
                self.remember_target(target, *existing, ctx)?;
            }

            let mut residual = Vec::new();
            for r in &sources {
                if ctx.is_matched(*r) {
                    continue;
                }
                match self.cached(source, *r, ctx)? {
                    Some(hit) => self.register(source, *r, target, hit, ctx)?,
                    None => residual.push(*r),
                }
            }
            let mut open: Vec<NodeId> = targets.iter().copied().filter(|x| !ctx.is_claimed(*x)).collect();

            if pair_scalars && !schema.property(property).is_collection() {
                if let ([r], [x]) = (residual.as_slice(), open.as_slice()) {
                    if schema.related(source.type_of(*r)?, target.type_of(*x)?) {
                        trace!(source = %r, target = %x, "paired scalar reference");
                        self.register(source, *r, target, *x, ctx)?;
                        residual.clear();
                        open.clear();
                    }
                }
            }

            if let Some(matcher) = &self.matcher {
                if !residual.is_empty() && !open.is_empty() {
                    for (r, x) in matcher.match_nodes(source, &residual, target, &open, ctx)? {
                        if !ctx.is_matched(r) && !ctx.is_claimed(x) {
                            self.register(source, r, target, x, ctx)?;
                        }
                    }
                }
            }

            for r in residual {
                if ctx.is_matched(r) {
                    continue;
                }
                // an earlier copy in this loop may carry the same identifier
                if let Some(hit) = self.cached(source, r, ctx)? {
                    self.register(source, r, target, hit, ctx)?;
                    continue;
                }
                match &self.copier {
                    Some(copier) => {
                        let copy = copier.copy(source, r, target)?;
                        self.register(source, r, target, copy, ctx)?;
                    }
                    None => trace!(source = %r, attribute = %schema.describe(property), "unmatched"),
                }
            }

            children.extend(sources.into_iter().filter(|r| ctx.is_matched(*r)));
        }
        Ok(children)
    }

    fn register(
        &self,
        source: &ObjectGraph,
        s: NodeId,
        target: &ObjectGraph,
        t: NodeId,
        ctx: &mut MatchContext,
    ) -> Result<()> {
        ctx.register(s, t);
        let node = source.node(s)?;
        if let Some(identifier) = &node.identifier {
            let root = source.schema().hierarchy_root(node.type_ref);
            ctx.remember(root, identifier.clone(), t);
        }
        self.remember_target(target, t, ctx)?;
        trace!(source = %s, target = %t, "matched");
        Ok(())
    }

    /// Cache every identified target node reachable through the selector, so
    /// an identifier hit does not depend on which source path gets there first.
    fn seed_identifiers(&self, target: &ObjectGraph, target_root: NodeId, ctx: &mut MatchContext) -> Result<()> {
        let visitor = Visitor::new(
            |id: NodeId| target.children_through(id, |schema, ty| self.selector.select(schema, ty)),
            VisitOptions::preorder(),
        );
        for t in visitor.walk(target_root) {
            self.remember_target(target, t, ctx)?;
        }
        Ok(())
    }

    fn remember_target(&self, target: &ObjectGraph, t: NodeId, ctx: &mut MatchContext) -> Result<()> {
        let node = target.node(t)?;
        if let Some(identifier) = &node.identifier {
            let root = target.schema().hierarchy_root(node.type_ref);
            ctx.remember(root, identifier.clone(), t);
        }
        Ok(())
    }

    fn cached(&self, source: &ObjectGraph, s: NodeId, ctx: &MatchContext) -> Result<Option<NodeId>> {
        let node = source.node(s)?;
        Ok(node.identifier.as_ref().and_then(|identifier| {
            let root = source.schema().hierarchy_root(node.type_ref);
            ctx.cached(root, identifier)
        }))
    }
}

fn check_compatible(source: &ObjectGraph, s: NodeId, target: &ObjectGraph, t: NodeId) -> Result<()> {
    if !Arc::ptr_eq(source.schema(), target.schema()) {
        return Err(Error::TypeMismatch {
            expected: "graphs sharing one schema".into(),
            got: "graphs with different schemas".into(),
        });
    }
    let (ts, tt) = (source.type_of(s)?, target.type_of(t)?);
    if !source.schema().related(ts, tt) {
        let schema = source.schema();
        return Err(Error::TypeMismatch {
            expected: format!("root related to {}", schema.type_name(ts)),
            got: schema.type_name(tt).to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::model::Value;
    use crate::schema::{KeyKind, PropertyFlags, ScalarKind, ValueType};
    use super::*;

    struct Fixture {
        schema: Arc<Schema>,
        dept: TypeRef,
        emp: TypeRef,
    }

    fn fixture() -> Fixture {
        let mut s = Schema::new();
        let dept = s.declare_type("Department", None).unwrap();
        let emp = s.declare_type("Employee", None).unwrap();
        s.register_attribute(dept, "name", ValueType::Scalar(ScalarKind::String), PropertyFlags::NONE).unwrap();
        s.register_attribute(dept, "staff", ValueType::Entity(emp), PropertyFlags::COLLECTION).unwrap();
        s.register_attribute(dept, "head", ValueType::Entity(emp), PropertyFlags::NONE).unwrap();
        s.register_attribute(emp, "email", ValueType::Scalar(ScalarKind::String), PropertyFlags::NONE).unwrap();
        s.register_attribute(emp, "department", ValueType::Entity(dept), PropertyFlags::NONE).unwrap();
        s.mark_dependent(dept, "staff", None).unwrap();
        s.add_key(emp, KeyKind::Primary, &["email"]).unwrap();
        s.freeze();
        Fixture { schema: Arc::new(s), dept, emp }
    }

    #[test]
    fn test_selectors() {
        let Fixture { schema, dept, emp } = fixture();
        let staff = schema.resolve(dept, "staff").unwrap();
        let head = schema.resolve(dept, "head").unwrap();
        let department = schema.resolve(emp, "department").unwrap();

        assert_eq!(Selector::Dependents.select(&schema, dept), vec![staff]);
        assert_eq!(Selector::All.select(&schema, dept), vec![staff, head]);
        assert_eq!(Selector::References.select(&schema, emp), Vec::<PropertyId>::new());
        assert_eq!(Selector::All.select(&schema, emp), vec![department]);
        let custom = Selector::custom(move |_, _| vec![head, head]);
        assert_eq!(custom.select(&schema, dept), vec![head]);
    }

    #[test]
    fn test_match_by_key_without_copier() {
        let Fixture { schema, dept, emp } = fixture();
        let mut source = ObjectGraph::new(schema.clone());
        let mut target = ObjectGraph::new(schema);
        let sd = source.create(dept).unwrap();
        let td = target.create(dept).unwrap();
        let ann = source.create(emp).unwrap();
        let bob = source.create(emp).unwrap();
        let ann_t = target.create(emp).unwrap();
        source.set_by_name(ann, "email", Value::from("ann@x")).unwrap();
        source.set_by_name(bob, "email", Value::from("bob@x")).unwrap();
        target.set_by_name(ann_t, "email", Value::from("ann@x")).unwrap();
        source.set_by_name(sd, "staff", Value::from(vec![ann, bob])).unwrap();
        target.add_by_name(td, "staff", ann_t).unwrap();

        let engine = MatchMerge::new(Selector::Dependents).with_matcher(KeyMatcher);
        let ctx = engine.match_graphs(&source, sd, &mut target, td).unwrap();
        assert_eq!(ctx.pairs(), vec![(sd, td), (ann, ann_t)]);
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn test_no_matcher_matches_nothing_residual() {
        let Fixture { schema, dept, emp } = fixture();
        let mut source = ObjectGraph::new(schema.clone());
        let mut target = ObjectGraph::new(schema);
        let sd = source.create(dept).unwrap();
        let td = target.create(dept).unwrap();
        let e = source.create(emp).unwrap();
        let f = target.create(emp).unwrap();
        source.add_by_name(sd, "staff", e).unwrap();
        target.add_by_name(td, "staff", f).unwrap();

        let ctx = MatchMerge::new(Selector::Dependents).match_graphs(&source, sd, &mut target, td).unwrap();
        assert_eq!(ctx.len(), 1);
        assert!(!ctx.is_matched(e));
    }

    #[test]
    fn test_mismatched_roots() {
        let Fixture { schema, dept, emp } = fixture();
        let mut source = ObjectGraph::new(schema.clone());
        let mut target = ObjectGraph::new(schema.clone());
        let sd = source.create(dept).unwrap();
        let te = target.create(emp).unwrap();
        let engine = MatchMerge::new(Selector::All);
        assert!(matches!(
            engine.match_graphs(&source, sd, &mut target, te),
            Err(Error::TypeMismatch { .. })
        ));

        let mut foreign = Schema::new();
        let other = foreign.declare_type("Department", None).unwrap();
        let mut elsewhere = ObjectGraph::new(Arc::new(foreign));
        let od = elsewhere.create(other).unwrap();
        assert!(engine.match_graphs(&source, sd, &mut elsewhere, od).is_err());
    }
}
