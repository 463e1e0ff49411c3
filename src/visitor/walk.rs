//! Pull-based traversal.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use hashbrown::HashSet;
use tracing::trace;

use super::{Children, CycleScan, Navigator, Visitor};

struct Frame<N> {
    node: N,
    /// `None` until the node's children are first needed.
    children: Option<smallvec::IntoIter<[N; 8]>>,
}

/// Iterator over the nodes of one traversal, in operator order.
///
/// The frame stack is the current lineage. A node's children are computed
/// only when the iterator advances past it, so in pre-order a caller may act
/// on a yielded node before the navigator is asked about its children.
///
/// With cycle pruning the walk runs in two phases. The main pass skips every
/// node lying strictly inside a cycle and never follows a cycle-closing edge.
/// Once it is exhausted, the walk resumes from each skipped node in discovery
/// order, so every reachable node is still yielded exactly once.
pub struct Walk<'a, N> {
    navigator: Navigator<'a, N>,
    depth_first: bool,
    verbose: bool,
    pruned: HashSet<(N, N)>,
    /// Cycle interiors kept out of the main pass.
    excluded: HashSet<N>,
    deferred: Vec<N>,
    seen: HashSet<N>,
    stack: Vec<Frame<N>>,
    roots: VecDeque<N>,
}

impl<'a, N> Walk<'a, N>
where
    N: Copy + Eq + Hash + Debug + 'a,
{
    pub(crate) fn new(visitor: &Visitor<'a, N>, root: N, seen: HashSet<N>) -> Self {
        let options = visitor.options;
        let (pruned, excluded, deferred) = if options.prune_cycles {
            let scan = CycleScan::run(&visitor.navigator, root);
            if options.verbose {
                trace!(members = scan.members.len(), edges = scan.closing_edges.len(), "cycle scan");
            }
            (scan.closing_edges, scan.members, scan.discovered)
        } else {
            Default::default()
        };
        Self {
            navigator: Rc::clone(&visitor.navigator),
            depth_first: options.depth_first,
            verbose: options.verbose,
            pruned,
            excluded,
            deferred,
            seen,
            stack: Vec::new(),
            roots: VecDeque::from([root]),
        }
    }

    /// Current lineage, root first.
    pub fn lineage(&self) -> impl Iterator<Item = N> + '_ {
        self.stack.iter().map(|f| f.node)
    }

    fn expand(&self, node: N) -> Children<N> {
        let mut children = (self.navigator)(node);
        if !self.pruned.is_empty() {
            children.retain(|child| !self.pruned.contains(&(node, *child)));
        }
        children
    }

    fn enter(&mut self, node: N) {
        if self.verbose {
            trace!(?node, depth = self.stack.len(), "enter");
        }
        self.stack.push(Frame { node, children: None });
    }

    /// Next node to start a fresh lineage from. When the main pass is done,
    /// the cycle interiors it skipped take their turn.
    fn next_root(&mut self) -> Option<N> {
        if self.roots.is_empty() && !self.deferred.is_empty() {
            if self.verbose {
                trace!(count = self.deferred.len(), "resuming at cycle members");
            }
            self.excluded.clear();
            self.roots.extend(self.deferred.drain(..));
        }
        self.roots.pop_front()
    }
}

impl<'a, N> Iterator for Walk<'a, N>
where
    N: Copy + Eq + Hash + Debug + 'a,
{
    type Item = N;

    fn next(&mut self) -> Option<N> {
        loop {
            let Some(top) = self.stack.last() else {
                let root = self.next_root()?;
                // memoized by a previous pass or phase
                if !self.seen.insert(root) {
                    continue;
                }
                self.enter(root);
                if !self.depth_first {
                    return Some(root);
                }
                continue;
            };
            if top.children.is_none() {
                let children = self.expand(top.node);
                if let Some(frame) = self.stack.last_mut() {
                    frame.children = Some(children.into_iter());
                }
            }
            let next_child = self
                .stack
                .last_mut()
                .and_then(|frame| frame.children.as_mut())
                .and_then(|children| children.next());

            match next_child {
                Some(child) => {
                    if self.excluded.contains(&child) {
                        continue;
                    }
                    // memoized, or still on the lineage
                    if !self.seen.insert(child) {
                        continue;
                    }
                    self.enter(child);
                    if !self.depth_first {
                        return Some(child);
                    }
                }
                None => {
                    let frame = self.stack.pop()?;
                    if self.depth_first {
                        return Some(frame.node);
                    }
                }
            }
        }
    }
}
