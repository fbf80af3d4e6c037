// SPDX-License-Identifier: MPL-2.0

//! The interval trees indexing [`VmArea`]s by page offset.
//!
//! Two trees are built from the same [`IntervalTree`]:
//! - [`VmaIntervalTree`], the `i_mmap` tree of a file, whose items are the
//!   areas mapping the file;
//! - [`AnonVmaIntervalTree`], the tree of an [`AnonVma`], whose items are the
//!   chains linking areas to it.
//!
//! Items only refer to the areas. The owner of an area must remove it from
//! every tree before dropping it.

use interval_tree::{Interval, IntervalTree, NodeId};

use super::{anon_vma::AnonVma, vma::VmArea};
use crate::prelude::*;

/// The `i_mmap` tree of a file.
pub type VmaIntervalTree = IntervalTree<usize, SharedVmaLink>;

/// The tree of an [`AnonVma`].
pub type AnonVmaIntervalTree = IntervalTree<usize, AnonVmaChain>;

/// An item of a [`VmaIntervalTree`].
pub struct SharedVmaLink(Weak<VmArea>);

impl SharedVmaLink {
    /// Returns the area.
    ///
    /// # Panics
    ///
    /// Panics if the area has been dropped without being removed first.
    pub fn vma(&self) -> Arc<VmArea> {
        self.0.upgrade().expect("an area is dropped while still in a tree")
    }

    /// Returns whether the link refers to `vma`.
    pub fn is(&self, vma: &VmArea) -> bool {
        core::ptr::eq(self.0.as_ptr(), vma)
    }
}

impl Interval<usize> for SharedVmaLink {
    fn start(&self) -> usize {
        self.vma().vma_start_pgoff()
    }

    fn last(&self) -> usize {
        self.vma().vma_last_pgoff()
    }
}

/// An item of an [`AnonVmaIntervalTree`], linking an area to an [`AnonVma`]
/// its anonymous pages may belong to.
///
/// The interval of a chain is that of its area.
pub struct AnonVmaChain {
    vma: Weak<VmArea>,
    anon_vma: Weak<AnonVma>,
    #[cfg(any(test, feature = "debug_vm_rb"))]
    cached_vma_start: usize,
    #[cfg(any(test, feature = "debug_vm_rb"))]
    cached_vma_last: usize,
}

impl AnonVmaChain {
    pub(crate) fn new(vma: &Arc<VmArea>, anon_vma: &Arc<AnonVma>) -> Self {
        Self {
            vma: Arc::downgrade(vma),
            anon_vma: Arc::downgrade(anon_vma),
            #[cfg(any(test, feature = "debug_vm_rb"))]
            cached_vma_start: 0,
            #[cfg(any(test, feature = "debug_vm_rb"))]
            cached_vma_last: 0,
        }
    }

    /// Returns the area.
    ///
    /// # Panics
    ///
    /// Panics if the area has been dropped without being unlinked first.
    pub fn vma(&self) -> Arc<VmArea> {
        self.vma
            .upgrade()
            .expect("an area is dropped while still in a tree")
    }

    /// Returns the [`AnonVma`] the chain links to, if it is still alive.
    pub fn anon_vma(&self) -> Option<Arc<AnonVma>> {
        self.anon_vma.upgrade()
    }

    /// Returns whether the chain belongs to `vma`.
    pub fn is(&self, vma: &VmArea) -> bool {
        core::ptr::eq(self.vma.as_ptr(), vma)
    }

    /// Checks the interval recorded at insertion against that of the area.
    ///
    /// A mismatch means the area changed while in the tree, which breaks the
    /// tree order. It is reported with a warning and `false`. Without the
    /// `debug_vm_rb` feature nothing is recorded and the check always passes.
    pub fn verify_cached_bounds(&self) -> bool {
        #[cfg(any(test, feature = "debug_vm_rb"))]
        {
            let (start, last) = (self.start(), self.last());
            if self.cached_vma_start != start || self.cached_vma_last != last {
                warn!(
                    "anon vma chain caches [{:#x}, {:#x}] but maps [{:#x}, {:#x}]",
                    self.cached_vma_start, self.cached_vma_last, start, last
                );
                return false;
            }
        }
        true
    }
}

impl Interval<usize> for AnonVmaChain {
    fn start(&self) -> usize {
        self.vma().vma_start_pgoff()
    }

    fn last(&self) -> usize {
        self.vma().vma_last_pgoff()
    }
}

/// Inserts `vma` into an `i_mmap` tree.
pub fn vma_interval_tree_insert(vma: &Arc<VmArea>, root: &mut VmaIntervalTree) -> NodeId {
    root.insert(SharedVmaLink(Arc::downgrade(vma)))
}

/// Inserts `vma` into an `i_mmap` tree right after the node `prev`.
///
/// `vma` must start at the same page offset as the area of `prev`. This keeps
/// a forked area next to its original, so that a reverse-mapping walk that
/// started before the fork still visits the copy.
pub fn vma_interval_tree_insert_after(
    vma: &Arc<VmArea>,
    prev: NodeId,
    root: &mut VmaIntervalTree,
) -> NodeId {
    root.insert_after(SharedVmaLink(Arc::downgrade(vma)), prev)
}

/// Removes the node `node` from an `i_mmap` tree.
pub fn vma_interval_tree_remove(node: NodeId, root: &mut VmaIntervalTree) {
    root.remove(node);
}

/// Returns the first node of an `i_mmap` tree whose area overlaps the page
/// offsets `[first, last]`.
pub fn vma_interval_tree_iter_first(
    root: &VmaIntervalTree,
    first: usize,
    last: usize,
) -> Option<NodeId> {
    root.iter_first(first, last)
}

/// Returns the node after `node` whose area overlaps the page offsets
/// `[first, last]`.
pub fn vma_interval_tree_iter_next(
    root: &VmaIntervalTree,
    node: NodeId,
    first: usize,
    last: usize,
) -> Option<NodeId> {
    root.iter_next(node, first, last)
}

/// Inserts a chain into the tree of an [`AnonVma`].
pub fn anon_vma_interval_tree_insert(
    chain: AnonVmaChain,
    root: &mut AnonVmaIntervalTree,
) -> NodeId {
    #[cfg(any(test, feature = "debug_vm_rb"))]
    let chain = AnonVmaChain {
        cached_vma_start: chain.start(),
        cached_vma_last: chain.last(),
        ..chain
    };
    root.insert(chain)
}

/// Removes the node `node` from the tree of an [`AnonVma`].
pub fn anon_vma_interval_tree_remove(
    node: NodeId,
    root: &mut AnonVmaIntervalTree,
) -> AnonVmaChain {
    root.remove(node)
}

/// Returns the first chain whose area overlaps the page offsets
/// `[first, last]`.
pub fn anon_vma_interval_tree_iter_first(
    root: &AnonVmaIntervalTree,
    first: usize,
    last: usize,
) -> Option<NodeId> {
    root.iter_first(first, last)
}

/// Returns the chain after `node` whose area overlaps the page offsets
/// `[first, last]`.
pub fn anon_vma_interval_tree_iter_next(
    root: &AnonVmaIntervalTree,
    node: NodeId,
    first: usize,
    last: usize,
) -> Option<NodeId> {
    root.iter_next(node, first, last)
}

/// Checks the cached bounds of the chain `node`.
///
/// See [`AnonVmaChain::verify_cached_bounds`].
pub fn anon_vma_interval_tree_verify(root: &AnonVmaIntervalTree, node: NodeId) -> bool {
    root.get(node).verify_cached_bounds()
}
