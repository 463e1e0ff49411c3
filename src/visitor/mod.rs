//! # Visitor — generic lazy graph traversal
//!
//! A [`Visitor`] is a navigator (`node → ordered children`) plus
//! [`VisitOptions`]. It knows nothing about object graphs: any `Copy + Eq +
//! Hash` handle works, including the `(Option<A>, Option<B>)` pairs produced
//! by [`Visitor::sync`].
//!
//! Every node is entered at most once per traversal. A child that is already
//! visited (memoized) or still on the current lineage (a cycle) is skipped.
//! With [`VisitOptions::prune_cycles`] the interior of each cycle is held
//! back until the acyclic rest of the graph has been visited.
//! The operator runs either before a node's children (pre-order) or after
//! them (`depth_first`, the default).
//!
//! Operators return [`ControlFlow`]: `Break` stops the traversal and is
//! handed back to the caller. All traversal state lives in the [`Walk`]
//! created for one call, so nothing survives an early exit.
//!
//! ```
//! use std::ops::ControlFlow;
//! use typegraph::visitor::{Children, Visitor, VisitOptions};
//!
//! // a → {b, c}, b → d, c → d
//! let nav = |n: char| -> Children<char> {
//!     match n {
//!         'a' => ['b', 'c'].into_iter().collect(),
//!         'b' | 'c' => ['d'].into_iter().collect(),
//!         _ => Children::new(),
//!     }
//! };
//! let visitor = Visitor::new(nav, VisitOptions::children_first());
//! let order: Vec<char> = visitor.walk('a').collect();
//! assert_eq!(order, vec!['d', 'b', 'c', 'a']);
//!
//! let mut applied = Vec::new();
//! let result = visitor.visit('a', |n| {
//!     applied.push(n);
//!     ControlFlow::<(), usize>::Continue(applied.len())
//! });
//! assert_eq!(result, ControlFlow::Continue(4));
//! ```

pub mod walk;
pub mod cycles;
pub mod sync;

use std::fmt::Debug;
use std::hash::Hash;
use std::ops::ControlFlow;
use std::rc::Rc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub use walk::Walk;
pub use cycles::CycleScan;
pub use sync::Pair;

/// Ordered children returned by a navigator.
pub type Children<N> = SmallVec<[N; 8]>;

pub(crate) type Navigator<'a, N> = Rc<dyn Fn(N) -> Children<N> + 'a>;

// ============================================================================
// Options
// ============================================================================

/// Traversal options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct VisitOptions {
    /// Apply the operator after a node's children (post-order) instead of
    /// before them.
    pub depth_first: bool,
    /// Keep nodes lying strictly inside a cycle out of the main pass. An
    /// auxiliary scan finds them first; they are visited after the main pass
    /// is exhausted, and cycle-closing edges are never followed.
    pub prune_cycles: bool,
    /// Emit a `trace` event per visited node.
    pub verbose: bool,
}

impl Default for VisitOptions {
    fn default() -> Self {
        Self::children_first()
    }
}

impl VisitOptions {
    /// Post-order: children before their parent.
    pub fn children_first() -> Self {
        Self { depth_first: true, prune_cycles: false, verbose: false }
    }

    /// Pre-order: parent before its children.
    pub fn preorder() -> Self {
        Self { depth_first: false, prune_cycles: false, verbose: false }
    }

    pub fn pruning_cycles(mut self) -> Self {
        self.prune_cycles = true;
        self
    }

    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }
}

// ============================================================================
// Visitor
// ============================================================================

/// A reusable traversal definition. Cheap to clone; each call to
/// [`visit`](Self::visit) or [`walk`](Self::walk) starts from scratch.
pub struct Visitor<'a, N> {
    pub(crate) navigator: Navigator<'a, N>,
    pub(crate) options: VisitOptions,
}

impl<N> Clone for Visitor<'_, N> {
    fn clone(&self) -> Self {
        Self { navigator: Rc::clone(&self.navigator), options: self.options }
    }
}

impl<N> std::fmt::Debug for Visitor<'_, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visitor").field("options", &self.options).finish_non_exhaustive()
    }
}

impl<'a, N> Visitor<'a, N>
where
    N: Copy + Eq + Hash + Debug + 'a,
{
    pub fn new(navigator: impl Fn(N) -> Children<N> + 'a, options: VisitOptions) -> Self {
        Self { navigator: Rc::new(navigator), options }
    }

    pub fn options(&self) -> VisitOptions {
        self.options
    }

    pub fn with_options(&self, options: VisitOptions) -> Self {
        Self { navigator: Rc::clone(&self.navigator), options }
    }

    /// Raw navigator output for `node`.
    pub fn children(&self, node: N) -> Children<N> {
        (self.navigator)(node)
    }

    /// Apply `operator` to every node reachable from `root` and return the
    /// root's result.
    pub fn visit<T, B>(&self, root: N, operator: impl FnMut(N) -> ControlFlow<B, T>) -> ControlFlow<B, T>
    where
        T: Clone,
    {
        let mut visited = HashMap::new();
        self.visit_with(root, &mut visited, operator)
    }

    /// Like [`visit`](Self::visit), but memoizes into a caller-owned map.
    /// Nodes already present are neither re-entered nor re-applied, which
    /// lets several traversals share one pass.
    pub fn visit_with<T, B>(
        &self,
        root: N,
        visited: &mut HashMap<N, T>,
        mut operator: impl FnMut(N) -> ControlFlow<B, T>,
    ) -> ControlFlow<B, T>
    where
        T: Clone,
    {
        let walk = Walk::new(self, root, visited.keys().copied().collect());
        for node in walk {
            match operator(node) {
                ControlFlow::Continue(result) => {
                    visited.insert(node, result);
                }
                ControlFlow::Break(stop) => return ControlFlow::Break(stop),
            }
        }
        match visited.get(&root) {
            Some(result) => ControlFlow::Continue(result.clone()),
            None => match operator(root) {
                ControlFlow::Continue(result) => {
                    visited.insert(root, result.clone());
                    ControlFlow::Continue(result)
                }
                stop => stop,
            },
        }
    }

    /// Pull-based traversal from `root`, yielding nodes in the order the
    /// operator would be applied.
    pub fn walk(&self, root: N) -> Walk<'a, N> {
        Walk::new(self, root, Default::default())
    }

    /// Nodes lying strictly inside a cycle reachable from `root` (the node
    /// where the traversal first enters the cycle is excluded).
    pub fn cycle_members(&self, root: N) -> hashbrown::HashSet<N> {
        CycleScan::run(&self.navigator, root).members
    }

    /// A visitor whose navigator post-processes children through
    /// `selector(node, children)`; it may reorder, drop or replace them.
    pub fn filter(&self, selector: impl Fn(N, Children<N>) -> Children<N> + 'a) -> Visitor<'a, N> {
        let inner = Rc::clone(&self.navigator);
        Visitor {
            navigator: Rc::new(move |node| selector(node, inner(node))),
            options: self.options,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
