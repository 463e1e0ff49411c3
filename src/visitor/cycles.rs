//! Auxiliary cycle detection used by cycle pruning.

use std::hash::Hash;

use hashbrown::HashSet;

use super::{Children, Navigator};

/// Result of a depth-first scan for back edges.
#[derive(Debug, Clone)]
pub struct CycleScan<N: Eq + Hash> {
    /// Nodes strictly inside a cycle: on the lineage between the cycle's entry
    /// node and the node closing it.
    pub members: HashSet<N>,
    /// `members` in the order the scan discovered them.
    pub discovered: Vec<N>,
    /// `(from, to)` edges that lead back onto the lineage.
    pub closing_edges: HashSet<(N, N)>,
}

impl<N> CycleScan<N>
where
    N: Copy + Eq + Hash,
{
    pub(crate) fn run(navigator: &Navigator<'_, N>, root: N) -> Self {
        let mut scan = Self { members: HashSet::new(), discovered: Vec::new(), closing_edges: HashSet::new() };
        let mut done: HashSet<N> = HashSet::new();
        let mut lineage: Vec<N> = vec![root];
        let mut on_lineage: HashSet<N> = HashSet::from_iter([root]);
        let mut pending: Vec<smallvec::IntoIter<[N; 8]>> = vec![navigator(root).into_iter()];

        while let Some(children) = pending.last_mut() {
            let Some(&node) = lineage.last() else { break };
            match children.next() {
                Some(child) if on_lineage.contains(&child) => {
                    scan.closing_edges.insert((node, child));
                    let entry = lineage.iter().position(|n| *n == child).unwrap_or(0);
                    for member in &lineage[entry + 1..] {
                        if scan.members.insert(*member) {
                            scan.discovered.push(*member);
                        }
                    }
                }
                Some(child) if done.contains(&child) => {}
                Some(child) => {
                    lineage.push(child);
                    on_lineage.insert(child);
                    let next: Children<N> = navigator(child);
                    pending.push(next.into_iter());
                }
                None => {
                    pending.pop();
                    if let Some(finished) = lineage.pop() {
                        on_lineage.remove(&finished);
                        done.insert(finished);
                    }
                }
            }
        }
        scan
    }
}
