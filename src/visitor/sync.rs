//! Lock-step traversal of two graphs.
//!
//! A synchronized visitor walks pairs `(Option<A>, Option<B>)`. The children
//! of a pair are the children of both sides, paired either by position or by
//! a caller-supplied matcher. A side without a counterpart is `None`; a pair
//! is never `(None, None)`.

use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use super::{Children, Visitor};

/// A node of a synchronized traversal.
pub type Pair<A, B> = (Option<A>, Option<B>);

type PairMatcher<'a, A, B> = Rc<dyn Fn(&[A], &[B]) -> Vec<(A, B)> + 'a>;

fn pair_children<A, B>(left: &[A], right: &[B], matcher: Option<&PairMatcher<'_, A, B>>) -> Children<Pair<A, B>>
where
    A: Copy + Eq,
    B: Copy + Eq,
{
    let Some(matcher) = matcher else {
        let len = left.len().max(right.len());
        return (0..len).map(|i| (left.get(i).copied(), right.get(i).copied())).collect();
    };
    let matched = matcher(left, right);
    let mut out: Children<Pair<A, B>> = left
        .iter()
        .map(|a| (Some(*a), matched.iter().find(|(m, _)| m == a).map(|(_, b)| *b)))
        .collect();
    out.extend(
        right
            .iter()
            .filter(|b| !matched.iter().any(|(_, m)| m == *b))
            .map(|b| (None, Some(*b))),
    );
    out
}

impl<'a, A> Visitor<'a, A>
where
    A: Copy + Eq + Hash + Debug + 'a,
{
    /// Walk this graph in lock-step with itself from two roots, pairing
    /// children by position.
    pub fn sync(&self) -> Visitor<'a, Pair<A, A>> {
        self.sync_with(self)
    }

    /// Like [`sync`](Self::sync), pairing children through `matcher`.
    pub fn sync_by(&self, matcher: impl Fn(&[A], &[A]) -> Vec<(A, A)> + 'a) -> Visitor<'a, Pair<A, A>> {
        self.sync_with_by(self, matcher)
    }

    /// Walk this visitor's graph in lock-step with `other`'s, pairing
    /// children by position.
    pub fn sync_with<B>(&self, other: &Visitor<'a, B>) -> Visitor<'a, Pair<A, B>>
    where
        B: Copy + Eq + Hash + Debug + 'a,
    {
        self.synchronized(other, None)
    }

    /// Walk in lock-step with `other`, pairing children through `matcher`.
    /// Children left unmatched on either side are paired with `None`.
    pub fn sync_with_by<B>(
        &self,
        other: &Visitor<'a, B>,
        matcher: impl Fn(&[A], &[B]) -> Vec<(A, B)> + 'a,
    ) -> Visitor<'a, Pair<A, B>>
    where
        B: Copy + Eq + Hash + Debug + 'a,
    {
        self.synchronized(other, Some(Rc::new(matcher)))
    }

    fn synchronized<B>(&self, other: &Visitor<'a, B>, matcher: Option<PairMatcher<'a, A, B>>) -> Visitor<'a, Pair<A, B>>
    where
        B: Copy + Eq + Hash + Debug + 'a,
    {
        let left = Rc::clone(&self.navigator);
        let right = Rc::clone(&other.navigator);
        let navigator = move |(a, b): Pair<A, B>| {
            let la = a.map(|a| left(a)).unwrap_or_default();
            let rb = b.map(|b| right(b)).unwrap_or_default();
            pair_children(&la, &rb, matcher.as_ref())
        };
        Visitor { navigator: Rc::new(navigator), options: self.options }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::VisitOptions;
    use super::*;

    fn tree(edges: &'static [(u32, u32)]) -> Visitor<'static, u32> {
        Visitor::new(
            move |n| edges.iter().filter(|(f, _)| *f == n).map(|(_, t)| *t).collect(),
            VisitOptions::preorder(),
        )
    }

    #[test]
    fn test_positional_pairing_pads_with_none() {
        let left = tree(&[(1, 2), (1, 3)]);
        let right = tree(&[(10, 20), (10, 30), (10, 40)]);
        let pairs: Vec<Pair<u32, u32>> = left.sync_with(&right).walk((Some(1), Some(10))).collect();
        assert_eq!(
            pairs,
            vec![(Some(1), Some(10)), (Some(2), Some(20)), (Some(3), Some(30)), (None, Some(40))]
        );
    }

    #[test]
    fn test_matcher_pairing() {
        let left = tree(&[(1, 2), (1, 3), (1, 5)]);
        let right = tree(&[(10, 30), (10, 20), (10, 70)]);
        // pair a with b when b == a * 10
        let synced = left.sync_with_by(&right, |a, b| {
            a.iter()
                .filter_map(|x| b.iter().find(|y| **y == x * 10).map(|y| (*x, *y)))
                .collect()
        });
        let pairs: Vec<Pair<u32, u32>> = synced.walk((Some(1), Some(10))).collect();
        assert_eq!(
            pairs,
            vec![
                (Some(1), Some(10)),
                (Some(2), Some(20)),
                (Some(3), Some(30)),
                (Some(5), None),
                (None, Some(70)),
            ]
        );
        assert!(pairs.iter().all(|p| p.0.is_some() || p.1.is_some()));
    }

    #[test]
    fn test_one_sided_subtree_continues() {
        let left = tree(&[(1, 2), (2, 4)]);
        let right = tree(&[]);
        let pairs: Vec<Pair<u32, u32>> = left.sync_with(&right).walk((Some(1), Some(9))).collect();
        assert_eq!(pairs, vec![(Some(1), Some(9)), (Some(2), None), (Some(4), None)]);
    }

    #[test]
    fn test_self_sync() {
        let v = tree(&[(1, 2), (5, 6), (5, 7)]);
        let pairs: Vec<Pair<u32, u32>> = v.sync().walk((Some(1), Some(5))).collect();
        assert_eq!(pairs, vec![(Some(1), Some(5)), (Some(2), Some(6)), (None, Some(7))]);
    }
}
