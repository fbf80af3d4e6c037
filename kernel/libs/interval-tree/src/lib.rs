// SPDX-License-Identifier: MPL-2.0

//! Interval trees.
//!
//! An [`IntervalTree`] stores items covering closed intervals `[start, last]`
//! and answers "which items overlap `[start, last]`" in O(log n + k) time for
//! k results. It is an augmented red-black tree ordered by `start` in which
//! every node caches the largest `last` found in its subtree, which lets a
//! query skip whole subtrees that end before the queried range begins.
//!
//! Items with equal `start` are kept in insertion order, except that
//! [`IntervalTree::insert_after`] can place an item right after a chosen one.
//!
//! The tree is generic over the item type; what an item covers is told by its
//! [`Interval`] implementation. The same engine therefore serves any number of
//! differently keyed indexes.

#![no_std]
#![deny(unsafe_code)]

extern crate alloc;

mod node;
mod tree;

use core::ops::RangeInclusive;

pub use aug_rbtree::NodeId;
pub use node::IntervalTreeNode;
pub use tree::{IntervalIter, IntervalTree, SubtreeLast};

/// The interval of an item in an interval tree.
///
/// The interval is closed: both `start` and `last` belong to it. An item must
/// report the same interval for as long as it is in a tree.
pub trait Interval<K> {
    /// Returns the first point of the interval.
    fn start(&self) -> K;

    /// Returns the last point of the interval.
    fn last(&self) -> K;
}

impl<K: Copy> Interval<K> for RangeInclusive<K> {
    fn start(&self) -> K {
        *RangeInclusive::start(self)
    }

    fn last(&self) -> K {
        *RangeInclusive::end(self)
    }
}
