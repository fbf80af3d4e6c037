// SPDX-License-Identifier: MPL-2.0

//! Files that can be mapped, and the reverse mappings of their pages.

use core::sync::atomic::{AtomicUsize, Ordering};

use interval_tree::NodeId;

use super::{
    interval_tree::{
        VmaIntervalTree, vma_interval_tree_insert, vma_interval_tree_insert_after,
        vma_interval_tree_remove,
    },
    vma::VmArea,
};
use crate::prelude::*;

/// A file that can be mapped into address spaces.
pub struct MappedFile {
    mapping: AddressMapping,
}

impl MappedFile {
    /// Creates a file that is not mapped anywhere.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            mapping: AddressMapping::new(),
        })
    }

    /// Returns the reverse mapping of the pages of the file.
    pub fn mapping(&self) -> &AddressMapping {
        &self.mapping
    }
}

impl Debug for MappedFile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MappedFile")
            .field("nr_vmas", &self.mapping.nr_vmas())
            .finish()
    }
}

/// The reverse mapping from the pages of a file to the [`VmArea`]s mapping
/// them.
pub struct AddressMapping {
    /// The areas mapping the file, by page offset.
    i_mmap: RwLock<VmaIntervalTree>,
    /// The number of shared areas mapping the file.
    i_mmap_writable: AtomicUsize,
}

impl AddressMapping {
    const fn new() -> Self {
        Self {
            i_mmap: RwLock::new(VmaIntervalTree::new()),
            i_mmap_writable: AtomicUsize::new(0),
        }
    }

    /// Links `vma` into the `i_mmap` tree.
    ///
    /// `vma` must be backed by this file and not be linked yet.
    pub(crate) fn link_vma(&self, vma: &Arc<VmArea>) {
        let mut i_mmap = self.i_mmap.write();
        let node = vma_interval_tree_insert(vma, &mut i_mmap);
        self.account_link(vma, node);
    }

    /// Links `vma` into the `i_mmap` tree right after `prev`.
    ///
    /// `vma` must start at the same page offset as `prev`, which must be
    /// linked already.
    pub(crate) fn link_vma_after(&self, vma: &Arc<VmArea>, prev: &VmArea) {
        let Some(prev_node) = prev.links().shared else {
            panic!("linking an area after one that is not linked");
        };
        let mut i_mmap = self.i_mmap.write();
        let node = vma_interval_tree_insert_after(vma, prev_node, &mut i_mmap);
        self.account_link(vma, node);
    }

    /// Unlinks `vma` from the `i_mmap` tree.
    ///
    /// Unlinking an area that is not linked does nothing.
    pub(crate) fn unlink_vma(&self, vma: &VmArea) {
        let mut i_mmap = self.i_mmap.write();
        let Some(node) = vma.links().shared.take() else {
            return;
        };
        debug_assert!(i_mmap.get(node).is(vma));
        vma_interval_tree_remove(node, &mut i_mmap);
        if vma.flags().is_shared() {
            self.i_mmap_writable.fetch_sub(1, Ordering::Relaxed);
        }
        trace!("unlink vma {:?} from file", vma);
    }

    fn account_link(&self, vma: &VmArea, node: NodeId) {
        let mut links = vma.links();
        debug_assert!(links.shared.is_none(), "the area is linked twice");
        links.shared = Some(node);
        if vma.flags().is_shared() {
            self.i_mmap_writable.fetch_add(1, Ordering::Relaxed);
        }
        trace!("link vma {:?} to file", vma);
    }

    /// Returns the areas mapping any of the file pages `[first, last]`, in
    /// order of page offset.
    pub fn vmas_in(&self, first: usize, last: usize) -> Vec<Arc<VmArea>> {
        let i_mmap = self.i_mmap.read();
        i_mmap.iter(first, last).map(|(_, link)| link.vma()).collect()
    }

    /// Returns the number of areas mapping the file.
    pub fn nr_vmas(&self) -> usize {
        self.i_mmap.read().len()
    }

    /// Returns whether any area maps the file.
    pub fn is_mapped(&self) -> bool {
        !self.i_mmap.read().is_empty()
    }

    /// Returns whether any shared area maps the file, so that writes through
    /// memory may reach the file.
    pub fn is_writably_mapped(&self) -> bool {
        self.i_mmap_writable.load(Ordering::Relaxed) > 0
    }

    /// Checks the `i_mmap` tree, panicking on the first violation.
    ///
    /// Every area in the tree must know its node.
    pub fn validate(&self) {
        let i_mmap = self.i_mmap.read();
        i_mmap.validate();
        for (node, link) in i_mmap.iter_all() {
            let vma = link.vma();
            assert_eq!(vma.links().shared, Some(node), "{:?} lost its node", vma);
        }
    }

    /// Checks that the node `node` of the `i_mmap` tree is that of `vma`.
    pub(crate) fn verify_link(&self, vma: &VmArea, node: NodeId) {
        let i_mmap = self.i_mmap.read();
        assert!(i_mmap.contains(node), "{:?} has a stale node", vma);
        assert!(i_mmap.get(node).is(vma), "{:?} has the node of another area", vma);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::perms::VmFlags;

    fn map(file: &Arc<MappedFile>, start_page: usize, pages: usize, pgoff: usize) -> Arc<VmArea> {
        let start = (start_page + 16) * PAGE_SIZE;
        let vma = VmArea::new(
            start..start + pages * PAGE_SIZE,
            pgoff,
            VmFlags::READ,
            Some(file.clone()),
        );
        file.mapping().link_vma(&vma);
        vma
    }

    #[test]
    fn rmap_walk_finds_overlapping_areas() {
        let file = MappedFile::new();
        let head = map(&file, 0, 4, 0);
        let middle = map(&file, 10, 8, 2);
        let _tail = map(&file, 30, 2, 20);
        file.mapping().validate();

        let found = file.mapping().vmas_in(3, 3);
        assert_eq!(found.len(), 2);
        assert!(Arc::ptr_eq(&found[0], &head));
        assert!(Arc::ptr_eq(&found[1], &middle));

        assert!(file.mapping().vmas_in(10, 19).is_empty());
    }

    #[test]
    fn unlink_keeps_others() {
        let file = MappedFile::new();
        let first = map(&file, 0, 4, 0);
        let second = map(&file, 10, 4, 0);
        assert_eq!(file.mapping().nr_vmas(), 2);

        file.mapping().unlink_vma(&first);
        assert!(!first.is_file_linked());
        file.mapping().unlink_vma(&first);
        file.mapping().validate();

        let found = file.mapping().vmas_in(0, 3);
        assert_eq!(found.len(), 1);
        assert!(Arc::ptr_eq(&found[0], &second));

        file.mapping().unlink_vma(&second);
        assert!(!file.mapping().is_mapped());
    }

    #[test]
    fn link_after_keeps_order() {
        let file = MappedFile::new();
        let first = map(&file, 0, 1, 5);
        let second = map(&file, 10, 1, 5);
        let copy = VmArea::new(first.range(), 5, VmFlags::READ, Some(file.clone()));
        file.mapping().link_vma_after(&copy, &first);
        file.mapping().validate();

        let found = file.mapping().vmas_in(5, 5);
        let expected = [&first, &copy, &second];
        assert_eq!(found.len(), expected.len());
        for (found, expected) in found.iter().zip(expected) {
            assert!(Arc::ptr_eq(found, expected));
        }
    }

    #[test]
    fn shared_areas_are_counted() {
        let file = MappedFile::new();
        let vma = VmArea::new(
            0x10000..0x11000,
            0,
            VmFlags::READ | VmFlags::WRITE | VmFlags::SHARED,
            Some(file.clone()),
        );
        file.mapping().link_vma(&vma);
        assert!(file.mapping().is_writably_mapped());

        file.mapping().unlink_vma(&vma);
        assert!(!file.mapping().is_writably_mapped());
    }
}
