// SPDX-License-Identifier: MPL-2.0

use core::ops::Range;

use super::{AddressSpace, AddressSpaceInner};
use crate::{prelude::*, vm::vma::VmArea};

impl AddressSpace {
    /// Finds the first area that ends above `addr`.
    ///
    /// The area contains `addr` if `addr` is mapped; otherwise it is the
    /// closest area above `addr`.
    pub fn find_vma(&self, addr: Vaddr) -> Option<Arc<VmArea>> {
        let inner = self.inner.read();
        inner.find_node(addr).map(|node| inner.vma(node).clone())
    }

    /// Finds the first area that intersects `range`.
    pub fn find_vma_intersection(&self, range: Range<Vaddr>) -> Option<Arc<VmArea>> {
        let inner = self.inner.read();
        inner
            .find_node(range.start)
            .map(|node| inner.vma(node))
            .filter(|vma| vma.start() < range.end)
            .cloned()
    }

    /// Returns all the areas, in address order.
    pub fn vmas(&self) -> Vec<Arc<VmArea>> {
        self.inner.read().vmas().cloned().collect()
    }

    /// Finds all the areas that intersect with the specified range.
    ///
    /// The address space cannot change while the returned guard is alive.
    pub fn query(&self, range: Range<Vaddr>) -> QueryGuard<'_> {
        QueryGuard {
            inner: self.inner.read(),
            range,
        }
    }
}

impl AddressSpaceInner {
    /// Returns the areas, in address order.
    fn vmas(&self) -> impl Iterator<Item = &Arc<VmArea>> {
        self.mm_rb.iter().map(|(_, mapped)| &mapped.vma)
    }

    /// Returns the areas that intersect `range`, in address order.
    fn query(&self, range: &Range<Vaddr>) -> impl Iterator<Item = &Arc<VmArea>> {
        let mut node = self.find_node(range.start);
        core::iter::from_fn(move || {
            let current = node?;
            let vma = self.vma(current);
            if vma.start() >= range.end {
                return None;
            }
            node = self.mm_rb.next(current);
            Some(vma)
        })
    }
}

/// The result of [`AddressSpace::query`].
pub struct QueryGuard<'a> {
    inner: RwLockReadGuard<'a, AddressSpaceInner>,
    range: Range<Vaddr>,
}

impl QueryGuard<'_> {
    /// Returns an iterator over the [`VmArea`]s that intersect with the
    /// provided range when calling [`AddressSpace::query`].
    pub fn iter(&self) -> impl Iterator<Item = &Arc<VmArea>> {
        self.inner.query(&self.range)
    }

    /// Returns whether the range is fully mapped.
    ///
    /// In other words, this method will return `false` if and only if the
    /// range contains pages that are not mapped.
    pub fn is_fully_mapped(&self) -> bool {
        let mut last_vma_end = self.range.start;

        for vma in self.iter() {
            if last_vma_end < vma.start() {
                return false;
            }
            last_vma_end = vma.end();
        }

        last_vma_end >= self.range.end
    }
}

#[cfg(test)]
mod test {
    use super::{
        super::test::{map_fixed, page, rw},
        *,
    };

    #[test]
    fn find_vma_looks_above() {
        let space = AddressSpace::new();
        map_fixed(&space, 2, 2, rw());
        map_fixed(&space, 8, 2, rw());

        assert_eq!(space.find_vma(page(3)).unwrap().range(), page(2)..page(4));
        assert_eq!(space.find_vma(page(4)).unwrap().range(), page(8)..page(10));
        assert_eq!(space.find_vma(0).unwrap().range(), page(2)..page(4));
        assert!(space.find_vma(page(10)).is_none());
    }

    #[test]
    fn find_vma_intersection_is_exact() {
        let space = AddressSpace::new();
        map_fixed(&space, 2, 2, rw());
        map_fixed(&space, 8, 2, rw());

        assert!(space.find_vma_intersection(page(4)..page(8)).is_none());
        let found = space.find_vma_intersection(page(4)..page(9)).unwrap();
        assert_eq!(found.start(), page(8));
        let found = space.find_vma_intersection(page(0)..page(20)).unwrap();
        assert_eq!(found.start(), page(2));
    }

    #[test]
    fn query_reports_holes() {
        let space = AddressSpace::new();
        map_fixed(&space, 0, 2, rw());
        map_fixed(&space, 2, 2, rw());
        map_fixed(&space, 6, 2, rw());

        let guard = space.query(page(1)..page(4));
        assert_eq!(guard.iter().count(), 2);
        assert!(guard.is_fully_mapped());
        drop(guard);

        let guard = space.query(page(1)..page(7));
        assert_eq!(guard.iter().count(), 3);
        assert!(!guard.is_fully_mapped());
        drop(guard);

        assert!(!space.query(page(6)..page(9)).is_fully_mapped());
        assert_eq!(space.query(page(4)..page(6)).iter().count(), 0);
    }
}
