// SPDX-License-Identifier: MPL-2.0

use crate::Interval;

/// A bare interval record, for trees that index nothing but intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntervalTreeNode<K> {
    pub start: K,
    pub last: K,
}

impl<K: Copy + Ord> IntervalTreeNode<K> {
    /// Creates an interval record.
    ///
    /// # Panics
    ///
    /// Panics if `start > last`.
    pub fn new(start: K, last: K) -> Self {
        assert!(start <= last, "an interval cannot end before it starts");
        Self { start, last }
    }

    /// Returns whether the interval overlaps `[start, last]`.
    pub fn overlaps(&self, start: K, last: K) -> bool {
        self.start <= last && start <= self.last
    }
}

impl<K: Copy> Interval<K> for IntervalTreeNode<K> {
    fn start(&self) -> K {
        self.start
    }

    fn last(&self) -> K {
        self.last
    }
}
