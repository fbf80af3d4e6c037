// SPDX-License-Identifier: MPL-2.0

use align_ext::AlignExt;

use super::{AddressSpace, AddressSpaceInner};
use crate::{
    prelude::*,
    vm::{
        file::MappedFile,
        layout::{MMAP_MIN_ADDR, TASK_SIZE, is_page_aligned, is_userspace_vaddr_range},
        perms::VmFlags,
        vma::VmArea,
    },
};

impl AddressSpace {
    /// Creates a mapping into the address space through a set of mapping
    /// options.
    ///
    /// # Examples
    ///
    /// ```
    /// use vma_index::{AddressSpace, MappedFile, OffsetType, VmFlags};
    ///
    /// let space = AddressSpace::new();
    /// let file = MappedFile::new();
    /// let addr = space
    ///     // Create a 4-page, read-only mapping
    ///     .new_map(4 * 4096, VmFlags::READ).unwrap()
    ///     // Place it at a fixed address
    ///     .offset(0x1234000, OffsetType::FixedNoReplace)
    ///     // Back it with the file, starting at page 2
    ///     .file(file.clone(), 2)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(addr, 0x1234000);
    /// assert!(file.mapping().is_mapped());
    /// ```
    ///
    /// `size` must be a non-zero multiple of the page size. For more details
    /// on the available options, see [`MapOptions`].
    pub fn new_map(&self, size: usize, flags: VmFlags) -> Result<MapOptions<'_>> {
        if size == 0 || !is_page_aligned(size) {
            return_errno_with_message!(Errno::EINVAL, "the size is not a multiple of pages");
        }
        Ok(MapOptions::new(self, size, flags))
    }

    /// Finds the lowest free range of `len` bytes aligned to `align`.
    ///
    /// The range lies above [`MMAP_MIN_ADDR`] and below [`TASK_SIZE`]. An
    /// [`Errno::ENOMEM`] error is returned if there is no such range.
    pub fn unmapped_area(&self, len: usize, align: usize) -> Result<Vaddr> {
        check_size_and_align(len, align)?;
        self.inner.read().unmapped_area(len, align)
    }
}

/// Options for creating a new mapping.
///
/// Unless specified otherwise, the mapping may not overlap any existing
/// mapping.
#[derive(Debug)]
pub struct MapOptions<'a> {
    parent: &'a AddressSpace,
    size: usize,
    flags: VmFlags,
    may_flags: VmFlags,
    file: Option<(Arc<MappedFile>, usize)>,
    offset: Option<(Vaddr, OffsetType)>,
    align: usize,
}

impl<'a> MapOptions<'a> {
    fn new(parent: &'a AddressSpace, size: usize, flags: VmFlags) -> Self {
        Self {
            parent,
            size,
            flags,
            may_flags: VmFlags::MAY_MASK,
            file: None,
            offset: None,
            align: PAGE_SIZE,
        }
    }

    /// Sets the `MAY*` flags of the mapping.
    ///
    /// The default value is `MAYREAD | MAYWRITE | MAYEXEC`. The access flags
    /// of the mapping, then and later, must be allowed by them.
    pub fn may_flags(mut self, may_flags: VmFlags) -> Self {
        self.may_flags = may_flags;
        self
    }

    /// Backs the mapping with `file`, starting at the page offset `pgoff`.
    ///
    /// Without a file, the mapping is anonymous.
    pub fn file(mut self, file: Arc<MappedFile>, pgoff: usize) -> Self {
        self.file = Some((file, pgoff));
        self
    }

    /// Sets the mapping's alignment.
    ///
    /// The default value is the page size.
    ///
    /// The provided alignment must be a power of two and a multiple of the
    /// page size.
    pub fn align(mut self, align: usize) -> Self {
        self.align = align;
        self
    }

    /// Sets the mapping's address.
    ///
    /// The address must satisfy the alignment requirement, and the mapping's
    /// range `[offset, offset + size)` must be in the user address range.
    ///
    /// If not set, the lowest suitable free range is chosen.
    pub fn offset(mut self, offset: Vaddr, typ: OffsetType) -> Self {
        self.offset = Some((offset, typ));
        self
    }

    /// Creates the mapping and adds it to the address space.
    ///
    /// All options will be checked at this point.
    ///
    /// On success, the address of the new mapping is returned.
    pub fn build(self) -> Result<Vaddr> {
        self.check_options()?;
        let Self {
            parent,
            size,
            flags,
            may_flags,
            file,
            offset,
            align,
        } = self;

        let mut flags = flags | may_flags;
        if flags.is_shared() {
            flags |= VmFlags::MAYSHARE;
        }

        let mut inner = parent.inner.write();
        let addr = match offset {
            None => inner.unmapped_area(size, align)?,
            Some((offset, OffsetType::Fixed)) => {
                inner.unmap_range(&(offset..offset + size));
                offset
            }
            Some((offset, OffsetType::FixedNoReplace)) => {
                if inner.is_intersected(&(offset..offset + size)) {
                    return_errno_with_message!(
                        Errno::EEXIST,
                        "the specified range is already mapped"
                    );
                }
                offset
            }
            Some((offset, OffsetType::Hint)) => {
                if inner.is_intersected(&(offset..offset + size)) {
                    inner.unmapped_area(size, align)?
                } else {
                    offset
                }
            }
        };

        debug!(
            "size = {:#x}, offset = {:x?}, align = {:#x}; mapped to {:#x}",
            size, offset, align, addr
        );

        let (file, pgoff) = match file {
            Some((file, pgoff)) => (Some(file), pgoff),
            None => (None, addr >> PAGE_SHIFT),
        };
        inner.attach(VmArea::new(addr..addr + size, pgoff, flags, file));
        inner.debug_validate();

        Ok(addr)
    }

    /// Checks whether all options are valid.
    fn check_options(&self) -> Result<()> {
        check_size_and_align(self.size, self.align)?;

        if let Some((offset, _)) = self.offset {
            if !offset.is_multiple_of(self.align) {
                return_errno_with_message!(Errno::EINVAL, "the offset is not aligned");
            }
            if !is_userspace_vaddr_range(offset, self.size) {
                return_errno_with_message!(
                    Errno::EINVAL,
                    "the specified offset and size exceed userspace address range"
                );
            }
        }

        if let Some((_, pgoff)) = self.file
            && pgoff.checked_add(self.size >> PAGE_SHIFT).is_none()
        {
            return_errno_with_message!(Errno::EOVERFLOW, "the file page offsets overflow");
        }

        self.check_flags()
    }

    /// Checks whether the flags of the mapping are valid.
    fn check_flags(&self) -> Result<()> {
        if !VmFlags::MAY_MASK.contains(self.may_flags) {
            return_errno_with_message!(Errno::EINVAL, "invalid may flags");
        }
        if !(self.flags | self.may_flags).is_access_allowed() {
            return_errno_with_message!(Errno::EACCES, "the flags exceed the may flags");
        }
        Ok(())
    }
}

/// The type of offset specified in [`MapOptions::offset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetType {
    /// The address is preferred, but another one is chosen if it is taken.
    Hint,
    /// The address is used, unmapping whatever is mapped there.
    Fixed,
    /// The address is used, failing if anything is mapped there.
    FixedNoReplace,
}

fn check_size_and_align(size: usize, align: usize) -> Result<()> {
    if size == 0 || !is_page_aligned(size) {
        return_errno_with_message!(Errno::EINVAL, "the size is not a multiple of pages");
    }
    if !align.is_power_of_two() || !is_page_aligned(align) {
        return_errno_with_message!(Errno::EINVAL, "invalid alignment");
    }
    Ok(())
}

impl AddressSpaceInner {
    /// Finds the lowest free range of `len` bytes aligned to `align`.
    ///
    /// The search looks for the lowest gap of at least `len + align - PAGE_SIZE`
    /// bytes, which fits the range wherever the alignment puts it. Subtrees
    /// whose largest gap is too small are skipped.
    pub(super) fn unmapped_area(&self, len: usize, align: usize) -> Result<Vaddr> {
        let Some(length) = len.checked_add(align - PAGE_SIZE) else {
            return_errno!(Errno::ENOMEM);
        };
        let Some(high_limit) = TASK_SIZE.checked_sub(length) else {
            return_errno!(Errno::ENOMEM);
        };
        if high_limit < MMAP_MIN_ADDR {
            return_errno!(Errno::ENOMEM);
        }
        // Gaps ending below this are too small once clipped to `MMAP_MIN_ADDR`.
        let low_limit = MMAP_MIN_ADDR + length;

        let tree = &self.mm_rb;
        let gap_start = 'search: {
            let Some(mut node) = tree.root().filter(|&root| tree.aug(root) >= length) else {
                break 'search self.highest_vm_end;
            };

            'descend: loop {
                let mut gap_end = self.vma(node).start();
                if gap_end >= low_limit
                    && let Some(left) = tree.left(node)
                    && tree.aug(left) >= length
                {
                    node = left;
                    continue;
                }

                let mut gap_start = gap_end - tree.get(node).gap;
                'check: loop {
                    if gap_start > high_limit {
                        return_errno!(Errno::ENOMEM);
                    }
                    if gap_end >= low_limit && gap_end > gap_start && gap_end - gap_start >= length
                    {
                        break 'search gap_start;
                    }

                    if let Some(right) = tree.right(node)
                        && tree.aug(right) >= length
                    {
                        node = right;
                        continue 'descend;
                    }

                    // Go back up to the first ancestor reached from the left.
                    loop {
                        let child = node;
                        let Some(parent) = tree.parent(node) else {
                            break 'search self.highest_vm_end;
                        };
                        node = parent;
                        if tree.left(node) == Some(child) {
                            gap_end = self.vma(node).start();
                            gap_start = gap_end - tree.get(node).gap;
                            continue 'check;
                        }
                    }
                }
            }
        };

        if gap_start > high_limit {
            return_errno!(Errno::ENOMEM);
        }
        Ok(gap_start.max(MMAP_MIN_ADDR).align_up(align))
    }
}

#[cfg(test)]
mod test {
    use rand::{Rng, SeedableRng, rngs::SmallRng};

    use super::{
        super::test::{map_fixed, page, ranges, rw},
        *,
    };

    #[test]
    fn map_at_lowest_free_address() {
        let space = AddressSpace::new();
        let first = space.new_map(4 * PAGE_SIZE, rw()).unwrap().build().unwrap();
        let second = space.new_map(2 * PAGE_SIZE, rw()).unwrap().build().unwrap();
        assert_eq!(first, MMAP_MIN_ADDR);
        assert_eq!(second, page(4));

        let vma = space.find_vma(second).unwrap();
        assert_eq!(vma.pgoff(), second >> PAGE_SHIFT);
        assert_eq!(vma.flags(), rw() | VmFlags::MAY_MASK);
        assert_eq!(space.map_count(), 2);
        assert_eq!(space.total_vm(), 6 * PAGE_SIZE);
        assert_eq!(space.highest_vm_end(), page(6));
        space.validate();
    }

    #[test]
    fn map_shared_file() {
        let space = AddressSpace::new();
        let file = MappedFile::new();
        let flags = VmFlags::READ | VmFlags::WRITE | VmFlags::SHARED;
        let addr = space
            .new_map(4 * PAGE_SIZE, flags)
            .unwrap()
            .file(file.clone(), 8)
            .build()
            .unwrap();

        let vma = space.find_vma(addr).unwrap();
        assert!(vma.flags().contains(VmFlags::MAYSHARE));
        assert_eq!(vma.pgoff(), 8);
        assert!(file.mapping().is_writably_mapped());

        let found = file.mapping().vmas_in(11, 20);
        assert_eq!(found.len(), 1);
        assert!(Arc::ptr_eq(&found[0], &vma));
        assert!(file.mapping().vmas_in(12, 20).is_empty());
    }

    #[test]
    fn map_fixed_no_replace_conflicts() {
        let space = AddressSpace::new();
        map_fixed(&space, 4, 4, rw());

        let error = space
            .new_map(2 * PAGE_SIZE, rw())
            .unwrap()
            .offset(page(7), OffsetType::FixedNoReplace)
            .build()
            .unwrap_err();
        assert_eq!(error.error(), Errno::EEXIST);
        assert_eq!(space.map_count(), 1);

        map_fixed(&space, 8, 2, rw());
        assert_eq!(ranges(&space), vec![page(4)..page(8), page(8)..page(10)]);
    }

    #[test]
    fn map_fixed_replaces() {
        let space = AddressSpace::new();
        map_fixed(&space, 0, 8, rw());

        space
            .new_map(2 * PAGE_SIZE, VmFlags::READ)
            .unwrap()
            .offset(page(3), OffsetType::Fixed)
            .build()
            .unwrap();
        assert_eq!(
            ranges(&space),
            vec![page(0)..page(3), page(3)..page(5), page(5)..page(8)]
        );
        assert_eq!(space.total_vm(), 8 * PAGE_SIZE);
        assert_eq!(space.find_vma(page(5)).unwrap().pgoff(), page(5) >> PAGE_SHIFT);
        space.validate();
    }

    #[test]
    fn map_hint_falls_back() {
        let space = AddressSpace::new();
        map_fixed(&space, 0, 4, rw());

        let addr = space
            .new_map(PAGE_SIZE, rw())
            .unwrap()
            .offset(page(10), OffsetType::Hint)
            .build()
            .unwrap();
        assert_eq!(addr, page(10));

        let addr = space
            .new_map(PAGE_SIZE, rw())
            .unwrap()
            .offset(page(2), OffsetType::Hint)
            .build()
            .unwrap();
        assert_eq!(addr, page(4));
    }

    #[test]
    fn map_rejects_invalid_options() {
        let space = AddressSpace::new();
        let errno = |result: Result<Vaddr>| result.unwrap_err().error();

        assert_eq!(space.new_map(0, rw()).unwrap_err().error(), Errno::EINVAL);
        assert_eq!(space.new_map(100, rw()).unwrap_err().error(), Errno::EINVAL);

        let map = || MapOptions::new(&space, PAGE_SIZE, rw());
        assert_eq!(errno(map().align(3 * PAGE_SIZE).build()), Errno::EINVAL);
        assert_eq!(
            errno(map().offset(page(0) + 1, OffsetType::Fixed).build()),
            Errno::EINVAL
        );
        assert_eq!(
            errno(map().offset(TASK_SIZE, OffsetType::Fixed).build()),
            Errno::EINVAL
        );
        assert_eq!(
            errno(map().offset(0, OffsetType::Fixed).build()),
            Errno::EINVAL
        );
        assert_eq!(
            errno(map().file(MappedFile::new(), usize::MAX).build()),
            Errno::EOVERFLOW
        );
        assert_eq!(
            errno(map().may_flags(VmFlags::MAYREAD).build()),
            Errno::EACCES
        );
        assert_eq!(
            errno(map().may_flags(VmFlags::MAYSHARE).build()),
            Errno::EINVAL
        );
        assert_eq!(space.map_count(), 0);
    }

    #[test]
    fn unmapped_area_finds_lowest_fit() {
        let space = AddressSpace::new();
        map_fixed(&space, 0, 2, rw());
        map_fixed(&space, 3, 2, rw());
        map_fixed(&space, 8, 2, rw());
        map_fixed(&space, 20, 2, rw());

        assert_eq!(space.unmapped_area(PAGE_SIZE, PAGE_SIZE).unwrap(), page(2));
        assert_eq!(space.unmapped_area(3 * PAGE_SIZE, PAGE_SIZE).unwrap(), page(5));
        assert_eq!(space.unmapped_area(4 * PAGE_SIZE, PAGE_SIZE).unwrap(), page(10));
        assert_eq!(space.unmapped_area(16 * PAGE_SIZE, PAGE_SIZE).unwrap(), page(22));

        let aligned = space.unmapped_area(PAGE_SIZE, 4 * PAGE_SIZE).unwrap();
        assert!(aligned.is_multiple_of(4 * PAGE_SIZE));
        assert!(space.find_vma_intersection(aligned..aligned + PAGE_SIZE).is_none());

        let error = space.unmapped_area(TASK_SIZE, PAGE_SIZE).unwrap_err();
        assert_eq!(error.error(), Errno::ENOMEM);
    }

    #[test]
    fn unmapped_area_near_the_top() {
        let space = AddressSpace::new();
        let top = TASK_SIZE - 2 * PAGE_SIZE;
        space
            .new_map(2 * PAGE_SIZE, rw())
            .unwrap()
            .offset(top, OffsetType::Fixed)
            .build()
            .unwrap();

        assert_eq!(space.highest_vm_end(), TASK_SIZE);
        assert_eq!(space.unmapped_area(PAGE_SIZE, PAGE_SIZE).unwrap(), MMAP_MIN_ADDR);

        let whole = top - MMAP_MIN_ADDR;
        assert_eq!(space.unmapped_area(whole, PAGE_SIZE).unwrap(), MMAP_MIN_ADDR);
        let error = space
            .unmapped_area(whole + PAGE_SIZE, PAGE_SIZE)
            .unwrap_err();
        assert_eq!(error.error(), Errno::ENOMEM);
    }

    /// Returns what [`AddressSpace::unmapped_area`] should find, by scanning
    /// every gap in address order.
    fn unmapped_area_by_scan(space: &AddressSpace, len: usize, align: usize) -> Option<Vaddr> {
        let length = len + align - PAGE_SIZE;
        let fits = |gap_start: Vaddr, gap_end: Vaddr| {
            gap_end >= MMAP_MIN_ADDR + length
                && gap_end > gap_start
                && gap_end - gap_start >= length
        };

        let mut gap_start = 0;
        for vma in space.vmas() {
            if fits(gap_start, vma.start()) {
                return Some(gap_start.max(MMAP_MIN_ADDR).align_up(align));
            }
            gap_start = vma.end();
        }
        (gap_start <= TASK_SIZE - length).then(|| gap_start.max(MMAP_MIN_ADDR).align_up(align))
    }

    #[test]
    fn unmapped_area_matches_scan() {
        const WINDOW: usize = 512;

        let mut rng = SmallRng::seed_from_u64(11);
        let space = AddressSpace::new();
        for round in 0..300 {
            let first = rng.random_range(0..WINDOW);
            let pages = rng.random_range(1..=(WINDOW - first).min(24));
            if round % 3 == 2 {
                space.unmap(page(first)..page(first + pages)).unwrap();
            } else {
                space
                    .new_map(pages * PAGE_SIZE, rw())
                    .unwrap()
                    .offset(page(first), OffsetType::Fixed)
                    .build()
                    .unwrap();
            }

            for _ in 0..8 {
                let len = rng.random_range(1..=32) * PAGE_SIZE;
                let align = PAGE_SIZE << rng.random_range(0..4);
                assert_eq!(
                    space.unmapped_area(len, align).ok(),
                    unmapped_area_by_scan(&space, len, align),
                    "len = {:#x}, align = {:#x}",
                    len,
                    align
                );
            }
        }
        space.validate();
    }
}
