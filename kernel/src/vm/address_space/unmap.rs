// SPDX-License-Identifier: MPL-2.0

use core::ops::Range;

use super::AddressSpace;
use crate::{
    prelude::*,
    vm::layout::{is_page_aligned, is_userspace_vaddr_range},
};

impl AddressSpace {
    /// Unmaps the given range.
    ///
    /// An area only partly in the range is split, and the parts outside of
    /// the range stay mapped. Unmapping a range where nothing is mapped
    /// succeeds and does nothing.
    ///
    /// The range must be non-empty, page-aligned and in the user address
    /// range.
    pub fn unmap(&self, range: Range<Vaddr>) -> Result<()> {
        if range.is_empty() || !is_page_aligned(range.start) || !is_page_aligned(range.end) {
            return_errno_with_message!(Errno::EINVAL, "invalid range to unmap");
        }
        if !is_userspace_vaddr_range(range.start, range.len()) {
            return_errno_with_message!(Errno::EINVAL, "the range exceeds userspace");
        }

        let mut inner = self.inner.write();
        inner.unmap_range(&range);
        inner.debug_validate();
        debug!("unmapped {:#x?}", range);
        Ok(())
    }

    /// Unmaps everything.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.clear();
        inner.debug_validate();
    }
}

#[cfg(test)]
mod test {
    use super::{
        super::{
            OffsetType,
            test::{map_fixed, page, ranges, rw},
        },
        *,
    };
    use crate::vm::file::MappedFile;

    #[test]
    fn unmap_middle_splits() {
        let space = AddressSpace::new();
        map_fixed(&space, 0, 8, rw());

        space.unmap(page(2)..page(5)).unwrap();
        assert_eq!(ranges(&space), vec![page(0)..page(2), page(5)..page(8)]);
        assert_eq!(space.map_count(), 2);
        assert_eq!(space.total_vm(), 5 * PAGE_SIZE);

        let tail = space.find_vma(page(5)).unwrap();
        assert_eq!(tail.pgoff(), page(5) >> PAGE_SHIFT);
        space.validate();
    }

    #[test]
    fn unmap_across_areas() {
        let space = AddressSpace::new();
        map_fixed(&space, 0, 4, rw());
        map_fixed(&space, 4, 4, rw());
        map_fixed(&space, 10, 4, rw());

        space.unmap(page(2)..page(12)).unwrap();
        assert_eq!(ranges(&space), vec![page(0)..page(2), page(12)..page(14)]);
        assert_eq!(space.highest_vm_end(), page(14));
        space.validate();

        space.unmap(page(12)..page(14)).unwrap();
        assert_eq!(space.highest_vm_end(), page(2));
        space.validate();
    }

    #[test]
    fn unmap_hole_does_nothing() {
        let space = AddressSpace::new();
        map_fixed(&space, 0, 2, rw());
        space.unmap(page(4)..page(8)).unwrap();
        assert_eq!(ranges(&space), vec![page(0)..page(2)]);
    }

    #[test]
    fn unmap_rejects_invalid_range() {
        let space = AddressSpace::new();
        let errno = |range: Range<Vaddr>| space.unmap(range).unwrap_err().error();
        assert_eq!(errno(page(1)..page(1)), Errno::EINVAL);
        assert_eq!(errno(page(0) + 1..page(1)), Errno::EINVAL);
        assert_eq!(errno(0..page(1)), Errno::EINVAL);
    }

    #[test]
    fn unmap_file_backed_updates_rmap() {
        let space = AddressSpace::new();
        let file = MappedFile::new();
        space
            .new_map(8 * PAGE_SIZE, rw())
            .unwrap()
            .offset(page(0), OffsetType::Fixed)
            .file(file.clone(), 0)
            .build()
            .unwrap();

        space.unmap(page(2)..page(4)).unwrap();
        assert!(file.mapping().vmas_in(2, 3).is_empty());
        assert_eq!(file.mapping().nr_vmas(), 2);

        let found = file.mapping().vmas_in(0, 7);
        assert_eq!(found[0].range(), page(0)..page(2));
        assert_eq!(found[1].range(), page(4)..page(8));
        assert_eq!(found[1].pgoff(), 4);
        file.mapping().validate();
        space.validate();
    }

    #[test]
    fn unmap_keeps_anon_pages_of_the_rest() {
        let space = AddressSpace::new();
        map_fixed(&space, 0, 8, rw());
        let anon_vma = space.prepare_anon(page(0)).unwrap();
        let first_pgoff = page(0) >> PAGE_SHIFT;

        space.unmap(page(0)..page(3)).unwrap();
        assert!(anon_vma.vmas_in(first_pgoff, first_pgoff + 2).is_empty());

        let found = anon_vma.vmas_in(first_pgoff, first_pgoff + 7);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].range(), page(3)..page(8));
        assert!(Arc::ptr_eq(&found[0].anon_vma().unwrap(), &anon_vma));
        anon_vma.validate();
    }

    #[test]
    fn clear_unlinks_everything() {
        let space = AddressSpace::new();
        let file = MappedFile::new();
        map_fixed(&space, 0, 4, rw());
        space
            .new_map(4 * PAGE_SIZE, rw())
            .unwrap()
            .file(file.clone(), 0)
            .build()
            .unwrap();
        let anon_vma = space.prepare_anon(page(0)).unwrap();

        space.clear();
        assert_eq!(space.map_count(), 0);
        assert_eq!(space.total_vm(), 0);
        assert_eq!(space.highest_vm_end(), 0);
        assert!(!file.mapping().is_mapped());
        assert_eq!(anon_vma.nr_chains(), 0);
        space.validate();
    }
}
