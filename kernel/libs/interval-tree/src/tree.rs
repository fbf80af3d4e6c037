// SPDX-License-Identifier: MPL-2.0

use core::{fmt::Debug, marker::PhantomData};

use aug_rbtree::{Augment, Dir, Iter, NodeId, RbTree};

use crate::Interval;

/// The augmentation of an interval tree: the largest `last` in a subtree.
#[derive(Debug)]
pub struct SubtreeLast<K>(PhantomData<K>);

impl<K, T> Augment<T> for SubtreeLast<K>
where
    K: Copy + Ord + Debug,
    T: Interval<K>,
{
    type Value = K;

    fn compute(tree: &RbTree<T, Self>, node: NodeId) -> K {
        let mut max = tree.get(node).last();
        for child in [tree.left(node), tree.right(node)].into_iter().flatten() {
            max = max.max(tree.aug(child));
        }
        max
    }
}

/// A collection of items covering closed intervals, indexed for overlap
/// queries.
///
/// Items are named by the [`NodeId`] returned on insertion, which stays valid
/// until the item is removed. Using it afterwards panics.
pub struct IntervalTree<K, T>
where
    K: Copy + Ord + Debug,
    T: Interval<K>,
{
    tree: RbTree<T, SubtreeLast<K>>,
}

impl<K, T> Default for IntervalTree<K, T>
where
    K: Copy + Ord + Debug,
    T: Interval<K>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> Debug for IntervalTree<K, T>
where
    K: Copy + Ord + Debug,
    T: Interval<K> + Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.tree.fmt(f)
    }
}

impl<K, T> IntervalTree<K, T>
where
    K: Copy + Ord + Debug,
    T: Interval<K>,
{
    /// Creates an empty interval tree.
    pub const fn new() -> Self {
        Self {
            tree: RbTree::new(),
        }
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns whether `id` names an item in the tree.
    pub fn contains(&self, id: NodeId) -> bool {
        self.tree.contains(id)
    }

    /// Returns an item.
    pub fn get(&self, id: NodeId) -> &T {
        self.tree.get(id)
    }

    /// Returns the largest `last` in the subtree rooted at `id`.
    pub fn subtree_last(&self, id: NodeId) -> K {
        self.tree.aug(id)
    }

    /// Inserts an item.
    ///
    /// An item whose `start` equals that of items already in the tree is
    /// ordered after all of them.
    pub fn insert(&mut self, item: T) -> NodeId {
        let start = item.start();
        let last = item.last();
        debug_assert!(start <= last, "an interval cannot end before it starts");

        let mut parent = None;
        let mut dir = Dir::Left;
        let mut link = self.tree.root();
        while let Some(node) = link {
            parent = Some(node);
            // Raise the subtree maximum on the way down, so no upward pass is
            // needed after linking.
            if self.tree.aug(node) < last {
                self.tree.set_aug(node, last);
            }
            dir = if start < self.tree.get(node).start() {
                Dir::Left
            } else {
                Dir::Right
            };
            link = self.tree.child(node, dir);
        }

        let id = self.tree.link_node(item, last, parent, dir);
        self.tree.insert_augmented(id);
        id
    }

    /// Inserts an item immediately after `prev` in tree order.
    ///
    /// This keeps the relative order of items sharing the same `start`, which
    /// [`Self::insert`] alone cannot do for an item that must not go last.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if `item` and `prev` do not start at the same
    /// point.
    pub fn insert_after(&mut self, item: T, prev: NodeId) -> NodeId {
        let last = item.last();
        debug_assert_eq!(
            item.start(),
            self.tree.get(prev).start(),
            "an item can only be inserted after one with the same start"
        );

        let (parent, dir) = match self.tree.right(prev) {
            None => (prev, Dir::Right),
            Some(right) => {
                // The in-order successor slot is the left end of the right
                // subtree.
                let mut parent = right;
                self.raise_subtree_last(parent, last);
                while let Some(left) = self.tree.left(parent) {
                    parent = left;
                    self.raise_subtree_last(parent, last);
                }
                (parent, Dir::Left)
            }
        };
        // `prev` and its ancestors cover the new item as well.
        let mut ancestor = Some(prev);
        while let Some(node) = ancestor {
            if self.tree.aug(node) >= last {
                break;
            }
            self.tree.set_aug(node, last);
            ancestor = self.tree.parent(node);
        }

        let id = self.tree.link_node(item, last, Some(parent), dir);
        self.tree.insert_augmented(id);
        id
    }

    /// Removes an item and returns it.
    pub fn remove(&mut self, id: NodeId) -> T {
        self.tree.erase_augmented(id)
    }

    /// Removes all the items.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Returns the first item, in tree order, that overlaps `[start, last]`.
    pub fn iter_first(&self, start: K, last: K) -> Option<NodeId> {
        let root = self.tree.root()?;
        if self.tree.aug(root) < start {
            // Even the item that ends last ends before the range.
            return None;
        }
        self.subtree_search(root, start, last)
    }

    /// Returns the next item after `node`, in tree order, that overlaps
    /// `[start, last]`.
    ///
    /// Together with [`Self::iter_first`] this visits the overlapping items in
    /// non-decreasing order of `start`. Their `last`s are in no particular
    /// order.
    pub fn iter_next(&self, mut node: NodeId, start: K, last: K) -> Option<NodeId> {
        let mut right = self.tree.right(node);
        loop {
            // Here `right` is always the right child of `node`.
            if let Some(right) = right
                && start <= self.tree.aug(right)
            {
                return self.subtree_search(right, start, last);
            }

            // Go up until we come from a left child.
            loop {
                let prev = node;
                node = self.tree.parent(node)?;
                right = self.tree.right(node);
                if right != Some(prev) {
                    break;
                }
            }

            let item = self.tree.get(node);
            if last < item.start() {
                return None;
            }
            if start <= item.last() {
                return Some(node);
            }
        }
    }

    /// Returns an iterator over the items overlapping `[start, last]`.
    pub fn iter(&self, start: K, last: K) -> IntervalIter<'_, K, T> {
        IntervalIter {
            tree: self,
            next: self.iter_first(start, last),
            start,
            last,
        }
    }

    /// Returns an iterator over all the items in tree order.
    pub fn iter_all(&self) -> Iter<'_, T, SubtreeLast<K>> {
        self.tree.iter()
    }

    /// Checks the tree structure, panicking on the first violation.
    ///
    /// Besides the red-black properties this verifies that the items are in
    /// non-decreasing order of `start` and that every cached subtree maximum
    /// is exact.
    pub fn validate(&self) {
        self.tree.validate();
        let mut prev_start = None;
        for (id, item) in self.tree.iter() {
            let start = item.start();
            assert!(
                start <= item.last(),
                "{:?} ends before it starts",
                id
            );
            if let Some(prev_start) = prev_start {
                assert!(prev_start <= start, "{:?} is out of order", id);
            }
            prev_start = Some(start);
        }
    }

    /// Finds the leftmost item overlapping `[start, last]` below `node`.
    fn subtree_search(&self, mut node: NodeId, start: K, last: K) -> Option<NodeId> {
        loop {
            // Anything overlapping in the left subtree comes first.
            if let Some(left) = self.tree.left(node)
                && start <= self.tree.aug(left)
            {
                node = left;
                continue;
            }
            let item = self.tree.get(node);
            if item.start() <= last {
                if start <= item.last() {
                    return Some(node);
                }
                if let Some(right) = self.tree.right(node)
                    && start <= self.tree.aug(right)
                {
                    node = right;
                    continue;
                }
            }
            return None;
        }
    }

    fn raise_subtree_last(&mut self, node: NodeId, last: K) {
        if self.tree.aug(node) < last {
            self.tree.set_aug(node, last);
        }
    }
}

/// An iterator over the items of an [`IntervalTree`] overlapping a range.
///
/// It yields the items in the same order as repeated
/// [`IntervalTree::iter_next`] calls.
pub struct IntervalIter<'a, K, T>
where
    K: Copy + Ord + Debug,
    T: Interval<K>,
{
    tree: &'a IntervalTree<K, T>,
    next: Option<NodeId>,
    start: K,
    last: K,
}

impl<'a, K, T> Iterator for IntervalIter<'a, K, T>
where
    K: Copy + Ord + Debug,
    T: Interval<K>,
{
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.tree.iter_next(current, self.start, self.last);
        Some((current, self.tree.get(current)))
    }
}
