// SPDX-License-Identifier: MPL-2.0

use core::ops::Range;

use interval_tree::NodeId;

use super::{anon_vma::AnonVma, file::MappedFile, perms::VmFlags};
use crate::prelude::*;

/// A virtual memory area (VMA).
///
/// A `VmArea` maps the virtual addresses `start..end` with uniform flags. A
/// file-backed area maps the file pages starting at page offset `pgoff`; an
/// anonymous area uses its own page offset, `start >> PAGE_SHIFT` when it was
/// created, to place its pages in the anonymous reverse mapping.
///
/// The range, the page offset, the flags and the backing file never change
/// once the area exists. Operations that would change them, like splitting or
/// changing the permissions of part of an area, create new areas and retire
/// the old one. As a result, the interval of an area in every index it belongs
/// to is fixed for as long as it is there.
pub struct VmArea {
    start: Vaddr,
    end: Vaddr,
    pgoff: usize,
    flags: VmFlags,
    file: Option<Arc<MappedFile>>,
    /// The memberships of the area in the reverse indexes.
    links: Mutex<VmaLinks>,
}

/// Where a [`VmArea`] is linked in the reverse indexes.
#[derive(Default)]
pub(crate) struct VmaLinks {
    /// The node of the area in the `i_mmap` tree of its file.
    pub(crate) shared: Option<NodeId>,
    /// The anonymous reverse mapping new anonymous pages of the area go to.
    pub(crate) anon_vma: Option<Arc<AnonVma>>,
    /// The chains linking the area into the [`AnonVma`]s its pages may belong
    /// to, oldest ancestor first.
    pub(crate) anon_vma_chain: Vec<ChainLink>,
}

/// The node of a [`VmArea`] in the interval tree of an [`AnonVma`].
pub(crate) struct ChainLink {
    pub(crate) anon_vma: Arc<AnonVma>,
    pub(crate) node: NodeId,
}

impl VmArea {
    /// Creates an area mapping `range` that no index knows of yet.
    ///
    /// # Panics
    ///
    /// Panics if `range` is empty or not page-aligned, or if the page offsets
    /// of the area would overflow.
    pub fn new(
        range: Range<Vaddr>,
        pgoff: usize,
        flags: VmFlags,
        file: Option<Arc<MappedFile>>,
    ) -> Arc<Self> {
        assert!(range.start < range.end, "an area maps at least one page");
        assert!(range.start.is_multiple_of(PAGE_SIZE) && range.end.is_multiple_of(PAGE_SIZE));
        assert!(
            pgoff
                .checked_add((range.end - range.start) >> PAGE_SHIFT)
                .is_some(),
            "the page offsets of the area overflow"
        );

        Arc::new(Self {
            start: range.start,
            end: range.end,
            pgoff,
            flags,
            file,
            links: Mutex::new(VmaLinks::default()),
        })
    }

    /// Creates an area for part of `self`, with the given flags.
    ///
    /// The new area maps the same pages of the same file, or shares the
    /// anonymous reverse mapping of `self`, for the addresses in `range`. It
    /// does not belong to any index yet.
    pub(crate) fn new_partial(&self, range: Range<Vaddr>, flags: VmFlags) -> Arc<Self> {
        debug_assert!(self.start <= range.start && range.end <= self.end);

        let pgoff = self.vma_pgoff(range.start);
        let partial = Self::new(range, pgoff, flags, self.file.clone());
        partial.links().anon_vma = self.anon_vma();
        partial
    }

    /// Creates a copy of `self` for a forked address space.
    ///
    /// The copy does not belong to any index yet, and has no anonymous
    /// reverse mapping.
    pub(crate) fn new_fork(&self) -> Arc<Self> {
        Self::new(self.range(), self.pgoff, self.flags, self.file.clone())
    }

    /// Returns the first address of the area.
    pub fn start(&self) -> Vaddr {
        self.start
    }

    /// Returns the address right after the area.
    pub fn end(&self) -> Vaddr {
        self.end
    }

    /// Returns the address range of the area.
    pub fn range(&self) -> Range<Vaddr> {
        self.start..self.end
    }

    /// Returns the size of the area in bytes.
    pub fn size(&self) -> usize {
        self.end - self.start
    }

    /// Returns the number of pages of the area.
    pub fn pages(&self) -> usize {
        self.size() >> PAGE_SHIFT
    }

    /// Returns the page offset of the first page of the area.
    pub fn pgoff(&self) -> usize {
        self.pgoff
    }

    /// Returns the flags of the area.
    pub fn flags(&self) -> VmFlags {
        self.flags
    }

    /// Returns the backing file, if any.
    pub fn file(&self) -> Option<&Arc<MappedFile>> {
        self.file.as_ref()
    }

    /// Returns whether the area is anonymous.
    pub fn is_anonymous(&self) -> bool {
        self.file.is_none()
    }

    /// Returns whether `addr` is in the area.
    pub fn contains(&self, addr: Vaddr) -> bool {
        self.range().contains(&addr)
    }

    /// Returns the anonymous reverse mapping of the area, if prepared.
    pub fn anon_vma(&self) -> Option<Arc<AnonVma>> {
        self.links().anon_vma.clone()
    }

    /// Returns the number of [`AnonVma`]s the area is linked into.
    pub fn anon_vma_chain_len(&self) -> usize {
        self.links().anon_vma_chain.len()
    }

    /// Returns whether the area is linked into the `i_mmap` tree of its file.
    pub fn is_file_linked(&self) -> bool {
        self.links().shared.is_some()
    }

    /// Returns the first page offset covered by the area.
    pub fn vma_start_pgoff(&self) -> usize {
        self.pgoff
    }

    /// Returns the last page offset covered by the area.
    pub fn vma_last_pgoff(&self) -> usize {
        self.pgoff + self.pages() - 1
    }

    /// Returns the address at which the area maps page offset `pgoff`.
    ///
    /// The caller must make sure that `pgoff` lies in the area.
    pub fn vma_address(&self, pgoff: usize) -> Vaddr {
        debug_assert!((self.vma_start_pgoff()..=self.vma_last_pgoff()).contains(&pgoff));
        self.start + ((pgoff - self.pgoff) << PAGE_SHIFT)
    }

    /// Returns the page offset mapped at `addr`.
    ///
    /// The caller must make sure that `addr` lies in the area.
    pub fn vma_pgoff(&self, addr: Vaddr) -> usize {
        debug_assert!(self.contains(addr));
        ((addr - self.start) >> PAGE_SHIFT) + self.pgoff
    }

    pub(crate) fn links(&self) -> MutexGuard<'_, VmaLinks> {
        self.links.lock()
    }
}

impl Debug for VmArea {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VmArea")
            .field("range", &format_args!("{:#x}..{:#x}", self.start, self.end))
            .field("pgoff", &self.pgoff)
            .field("flags", &self.flags)
            .field("anonymous", &self.is_anonymous())
            .finish()
    }
}
