// SPDX-License-Identifier: MPL-2.0

use core::ops::Range;

use super::{AddressSpace, AddressSpaceInner};
use crate::{
    prelude::*,
    vm::{layout::is_page_aligned, perms::VmFlags},
};

impl AddressSpace {
    /// Changes the access permissions of the areas in the specified range.
    ///
    /// `perms` may only contain access permissions. The range's start and end
    /// addresses must be page-aligned. An area only partly in the range is
    /// split, and only its part in the range gets the new permissions.
    ///
    /// If the range contains unmapped pages, an [`ENOMEM`] error will be
    /// returned. If the `MAY*` flags of an area do not allow the new
    /// permissions, an [`EACCES`] error will be returned. Note that the areas
    /// before the unmapped hole or the failing area are still protected.
    ///
    /// [`ENOMEM`]: Errno::ENOMEM
    /// [`EACCES`]: Errno::EACCES
    pub fn protect(&self, perms: VmFlags, range: Range<Vaddr>) -> Result<()> {
        if !is_page_aligned(range.start) || !is_page_aligned(range.end) {
            return_errno_with_message!(Errno::EINVAL, "the range is not page-aligned");
        }
        if !VmFlags::ACCESS_MASK.contains(perms) {
            return_errno_with_message!(Errno::EINVAL, "invalid permissions");
        }
        if range.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.write();
        let result = inner.protect_range(perms, &range);
        inner.debug_validate();
        result
    }
}

impl AddressSpaceInner {
    fn protect_range(&mut self, perms: VmFlags, range: &Range<Vaddr>) -> Result<()> {
        let mut last_vma_end = range.start;
        for node in self.intersecting_nodes(range) {
            let vma = self.vma(node).clone();
            if last_vma_end < vma.start() {
                return_errno_with_message!(
                    Errno::ENOMEM,
                    "the range contains pages that are not mapped"
                );
            }
            last_vma_end = vma.end();

            let new_flags = (vma.flags() - VmFlags::ACCESS_MASK) | perms;
            if new_flags == vma.flags() {
                continue;
            }
            if !new_flags.is_access_allowed() {
                return_errno_with_message!(
                    Errno::EACCES,
                    "the permissions are not allowed by the may flags"
                );
            }

            // Protects the part of the area in the range.
            let taken = range.start.max(vma.start())..range.end.min(vma.end());
            let mut parts = Vec::new();
            if vma.start() < taken.start {
                parts.push((vma.start()..taken.start, vma.flags()));
            }
            let taken_end = taken.end;
            parts.push((taken, new_flags));
            if taken_end < vma.end() {
                parts.push((taken_end..vma.end(), vma.flags()));
            }
            self.replace(node, &parts);
        }

        if last_vma_end < range.end {
            return_errno_with_message!(
                Errno::ENOMEM,
                "the range contains pages that are not mapped"
            );
        }
        Ok(())
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
    fn protect_middle_splits_in_three() {
        let space = AddressSpace::new();
        map_fixed(&space, 0, 8, rw());

        space.protect(VmFlags::READ, page(2)..page(5)).unwrap();
        assert_eq!(
            ranges(&space),
            vec![page(0)..page(2), page(2)..page(5), page(5)..page(8)]
        );
        let flags: Vec<_> = space.vmas().iter().map(|vma| vma.flags().access()).collect();
        assert_eq!(flags, vec![rw(), VmFlags::READ, rw()]);
        assert_eq!(space.total_vm(), 8 * PAGE_SIZE);
        space.validate();
    }

    #[test]
    fn protect_whole_area_keeps_one() {
        let space = AddressSpace::new();
        map_fixed(&space, 0, 4, rw());

        space.protect(VmFlags::READ | VmFlags::EXEC, page(0)..page(4)).unwrap();
        assert_eq!(space.map_count(), 1);
        let vma = space.find_vma(page(0)).unwrap();
        assert_eq!(vma.flags().access(), VmFlags::READ | VmFlags::EXEC);
        assert!(vma.flags().contains(VmFlags::MAY_MASK));
    }

    #[test]
    fn protect_same_permissions_does_nothing() {
        let space = AddressSpace::new();
        map_fixed(&space, 0, 4, rw());
        let vma = space.find_vma(page(0)).unwrap();

        space.protect(rw(), page(1)..page(2)).unwrap();
        assert!(Arc::ptr_eq(&space.find_vma(page(0)).unwrap(), &vma));
    }

    #[test]
    fn protect_stops_at_hole() {
        let space = AddressSpace::new();
        map_fixed(&space, 0, 2, rw());
        map_fixed(&space, 3, 2, rw());

        let error = space.protect(VmFlags::READ, page(0)..page(5)).unwrap_err();
        assert_eq!(error.error(), Errno::ENOMEM);
        let flags: Vec<_> = space.vmas().iter().map(|vma| vma.flags().access()).collect();
        assert_eq!(flags, vec![VmFlags::READ, rw()]);

        let error = space.protect(VmFlags::READ, page(3)..page(6)).unwrap_err();
        assert_eq!(error.error(), Errno::ENOMEM);
        space.validate();
    }

    #[test]
    fn protect_respects_may_flags() {
        let space = AddressSpace::new();
        space
            .new_map(2 * PAGE_SIZE, VmFlags::READ)
            .unwrap()
            .offset(page(0), OffsetType::FixedNoReplace)
            .may_flags(VmFlags::MAYREAD)
            .build()
            .unwrap();

        let error = space.protect(rw(), page(0)..page(1)).unwrap_err();
        assert_eq!(error.error(), Errno::EACCES);
        assert_eq!(space.map_count(), 1);

        space.protect(VmFlags::empty(), page(0)..page(1)).unwrap();
        assert_eq!(space.map_count(), 2);

        let error = space.protect(VmFlags::SHARED, page(0)..page(1)).unwrap_err();
        assert_eq!(error.error(), Errno::EINVAL);
    }

    #[test]
    fn protect_file_backed_keeps_offsets() {
        let space = AddressSpace::new();
        let file = MappedFile::new();
        space
            .new_map(8 * PAGE_SIZE, rw())
            .unwrap()
            .offset(page(0), OffsetType::FixedNoReplace)
            .file(file.clone(), 100)
            .build()
            .unwrap();

        space.protect(VmFlags::READ, page(4)..page(8)).unwrap();
        let found = file.mapping().vmas_in(100, 107);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].pgoff(), 100);
        assert_eq!(found[1].pgoff(), 104);
        assert_eq!(found[1].flags().access(), VmFlags::READ);
        file.mapping().validate();
        space.validate();
    }
}
