// SPDX-License-Identifier: MPL-2.0

//! Process address spaces.

mod fork;
mod map;
mod protect;
mod query;
mod unmap;

use core::ops::Range;

use aug_rbtree::{Augment, Dir, NodeId, RbTree};

use super::{
    anon_vma::{AnonVma, anon_vma_clone, anon_vma_prepare, unlink_anon_vmas},
    perms::VmFlags,
    vma::VmArea,
};
use crate::prelude::*;

pub use map::{MapOptions, OffsetType};
pub use query::QueryGuard;

/// The address space of a process.
///
/// An address space owns the [`VmArea`]s mapped in it. Every area is also
/// linked into the `i_mmap` tree of its file, if any, and into the
/// [`AnonVma`]s of its anonymous pages, from the moment it is mapped to the
/// moment it is unmapped.
pub struct AddressSpace {
    /// The areas and the counters, behind the lock that serializes all the
    /// changes to the address space.
    inner: RwLock<AddressSpaceInner>,
}

impl AddressSpace {
    /// Creates an empty address space.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(AddressSpaceInner::new()),
        })
    }

    /// Returns the number of areas.
    pub fn map_count(&self) -> usize {
        self.inner.read().map_count
    }

    /// Returns the total size of the areas in bytes.
    pub fn total_vm(&self) -> usize {
        self.inner.read().total_vm
    }

    /// Returns the end of the highest area, or zero if there is none.
    pub fn highest_vm_end(&self) -> Vaddr {
        self.inner.read().highest_vm_end
    }

    /// Makes sure that the area containing `addr` has an [`AnonVma`] for its
    /// new anonymous pages, and returns it.
    ///
    /// This is the first step of creating an anonymous page at `addr`. An
    /// [`Errno::EFAULT`] error is returned if `addr` is not mapped.
    pub fn prepare_anon(&self, addr: Vaddr) -> Result<Arc<AnonVma>> {
        let inner = self.inner.write();
        let Some(node) = inner
            .find_node(addr)
            .filter(|&node| inner.vma(node).start() <= addr)
        else {
            return_errno_with_message!(Errno::EFAULT, "the address is not mapped");
        };

        let prev = inner.mm_rb.prev(node).map(|prev| inner.vma(prev));
        let next = inner.mm_rb.next(node).map(|next| inner.vma(next));
        Ok(anon_vma_prepare(inner.vma(node), prev, next))
    }

    /// Checks the consistency of the address space, panicking on the first
    /// violation.
    ///
    /// The address tree must be a valid red-black tree whose cached gaps are
    /// exact, the areas must not overlap, the counters must match the areas,
    /// and every area must be linked into the reverse indexes it belongs to,
    /// at nodes that refer back to it.
    pub fn validate(&self) {
        self.inner.read().validate();
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        self.inner.get_mut().clear();
    }
}

impl Debug for AddressSpace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("AddressSpace")
            .field("map_count", &inner.map_count)
            .field("total_vm", &inner.total_vm)
            .field("highest_vm_end", &inner.highest_vm_end)
            .finish()
    }
}

/// An area in the address tree.
struct MappedVma {
    vma: Arc<VmArea>,
    /// The free space between the previous area, or address zero, and this
    /// one.
    gap: usize,
}

/// The augmentation of the address tree: the largest gap in a subtree.
struct FreeGap;

impl Augment<MappedVma> for FreeGap {
    type Value = usize;

    fn compute(tree: &RbTree<MappedVma, Self>, node: NodeId) -> usize {
        let mut max = tree.get(node).gap;
        for child in [tree.left(node), tree.right(node)].into_iter().flatten() {
            max = max.max(tree.aug(child));
        }
        max
    }
}

struct AddressSpaceInner {
    /// The areas by address.
    mm_rb: RbTree<MappedVma, FreeGap>,
    /// The number of areas.
    map_count: usize,
    /// The total mapped memory in bytes.
    total_vm: usize,
    /// The end of the highest area.
    highest_vm_end: Vaddr,
}

impl AddressSpaceInner {
    const fn new() -> Self {
        Self {
            mm_rb: RbTree::new(),
            map_count: 0,
            total_vm: 0,
            highest_vm_end: 0,
        }
    }

    fn vma(&self, node: NodeId) -> &Arc<VmArea> {
        &self.mm_rb.get(node).vma
    }

    /// Finds the first area that ends above `addr`.
    fn find_node(&self, addr: Vaddr) -> Option<NodeId> {
        let mut found = None;
        let mut link = self.mm_rb.root();
        while let Some(node) = link {
            let vma = self.vma(node);
            if vma.end() > addr {
                found = Some(node);
                if vma.start() <= addr {
                    break;
                }
                link = self.mm_rb.left(node);
            } else {
                link = self.mm_rb.right(node);
            }
        }
        found
    }

    /// Returns the areas intersecting `range`, in address order.
    fn intersecting_nodes(&self, range: &Range<Vaddr>) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        let mut node = self.find_node(range.start);
        while let Some(current) = node {
            if self.vma(current).start() >= range.end {
                break;
            }
            nodes.push(current);
            node = self.mm_rb.next(current);
        }
        nodes
    }

    /// Returns whether any area intersects `range`.
    fn is_intersected(&self, range: &Range<Vaddr>) -> bool {
        self.find_node(range.start)
            .is_some_and(|node| self.vma(node).start() < range.end)
    }

    /// Adds `vma` to the address tree.
    ///
    /// `vma` must not overlap any area in the tree.
    fn insert(&mut self, vma: Arc<VmArea>) -> NodeId {
        let mut parent = None;
        let mut dir = Dir::Left;
        let mut prev = None;
        let mut next = None;
        let mut link = self.mm_rb.root();
        while let Some(node) = link {
            parent = Some(node);
            if vma.start() < self.vma(node).start() {
                next = Some(node);
                dir = Dir::Left;
            } else {
                prev = Some(node);
                dir = Dir::Right;
            }
            link = self.mm_rb.child(node, dir);
        }

        let prev_end = prev.map_or(0, |prev| self.vma(prev).end());
        debug_assert!(prev_end <= vma.start(), "{:?} overlaps its predecessor", vma);
        debug_assert!(
            next.is_none_or(|next| vma.end() <= self.vma(next).start()),
            "{:?} overlaps its successor",
            vma
        );

        self.map_count += 1;
        self.total_vm += vma.size();
        let end = vma.end();
        let gap = vma.start() - prev_end;
        let node = self.mm_rb.link_node(MappedVma { vma, gap }, gap, parent, dir);
        FreeGap::propagate(&mut self.mm_rb, parent, None);
        match next {
            Some(next) => self.update_gap(next),
            None => self.highest_vm_end = end,
        }
        self.mm_rb.insert_augmented(node);
        node
    }

    /// Takes the area `node` out of the address tree.
    fn remove(&mut self, node: NodeId) -> Arc<VmArea> {
        let next = self.mm_rb.next(node);
        let MappedVma { vma, .. } = self.mm_rb.erase_augmented(node);
        match next {
            Some(next) => self.update_gap(next),
            None => {
                self.highest_vm_end = self
                    .mm_rb
                    .last()
                    .map_or(0, |last| self.vma(last).end());
            }
        }
        self.map_count -= 1;
        self.total_vm -= vma.size();
        vma
    }

    /// Recomputes the gap below the area `node` after its predecessor changed.
    fn update_gap(&mut self, node: NodeId) {
        let prev_end = self
            .mm_rb
            .prev(node)
            .map_or(0, |prev| self.vma(prev).end());
        let item = self.mm_rb.get_mut(node);
        item.gap = item.vma.start() - prev_end;
        FreeGap::propagate(&mut self.mm_rb, Some(node), None);
    }

    /// Maps `vma`: adds it to the address tree and links it to its file.
    fn attach(&mut self, vma: Arc<VmArea>) {
        if let Some(file) = vma.file() {
            file.mapping().link_vma(&vma);
        }
        trace!("attach {:?}", vma);
        self.insert(vma);
    }

    /// Unmaps the area `node`: takes it out of every index.
    fn detach(&mut self, node: NodeId) -> Arc<VmArea> {
        let vma = self.remove(node);
        if let Some(file) = vma.file() {
            file.mapping().unlink_vma(&vma);
        }
        unlink_anon_vmas(&vma);
        trace!("detach {:?}", vma);
        vma
    }

    /// Replaces the area `node` with new areas for the given parts of it.
    ///
    /// The parts keep the file pages and the anonymous pages of the area.
    fn replace(&mut self, node: NodeId, parts: &[(Range<Vaddr>, VmFlags)]) {
        let old = self.vma(node).clone();
        let parts: Vec<Arc<VmArea>> = parts
            .iter()
            .map(|(range, flags)| {
                let part = old.new_partial(range.clone(), *flags);
                anon_vma_clone(&part, &old);
                part
            })
            .collect();
        debug!("split {:?} into {} parts", old, parts.len());

        self.detach(node);
        for part in parts {
            self.attach(part);
        }
    }

    /// Unmaps `range`, splitting the areas that are only partly in it.
    fn unmap_range(&mut self, range: &Range<Vaddr>) {
        for node in self.intersecting_nodes(range) {
            let vma = self.vma(node).clone();
            let mut parts = Vec::new();
            if vma.start() < range.start {
                parts.push((vma.start()..range.start, vma.flags()));
            }
            if range.end < vma.end() {
                parts.push((range.end..vma.end(), vma.flags()));
            }
            self.replace(node, &parts);
        }
    }

    fn clear(&mut self) {
        while let Some(node) = self.mm_rb.first() {
            self.detach(node);
        }
    }

    /// Runs [`Self::validate`] after a change if the `debug_vm_rb` feature is
    /// enabled.
    fn debug_validate(&self) {
        if cfg!(feature = "debug_vm_rb") {
            self.validate();
        }
    }

    fn validate(&self) {
        self.mm_rb.validate();

        let mut prev_end = 0;
        let mut total_vm = 0;
        for (_, mapped) in self.mm_rb.iter() {
            let vma = &mapped.vma;
            assert!(prev_end <= vma.start(), "{:?} overlaps its predecessor", vma);
            assert_eq!(mapped.gap, vma.start() - prev_end, "{:?} has a stale gap", vma);
            prev_end = vma.end();
            total_vm += vma.size();

            // Copy the links out, as linking takes a tree lock before them.
            let (shared, anon_vma, chain) = {
                let links = vma.links();
                let chain: Vec<_> = links
                    .anon_vma_chain
                    .iter()
                    .map(|link| (link.anon_vma.clone(), link.node))
                    .collect();
                (links.shared, links.anon_vma.clone(), chain)
            };

            if let Some(file) = vma.file() {
                let Some(node) = shared else {
                    panic!("{:?} is not linked to its file", vma);
                };
                file.mapping().verify_link(vma, node);
            }
            if let Some(anon_vma) = anon_vma {
                assert!(
                    chain.iter().any(|(linked, _)| Arc::ptr_eq(linked, &anon_vma)),
                    "{:?} is not linked to its anon vma",
                    vma
                );
            }
            for (anon_vma, node) in chain {
                anon_vma.verify_chain(vma, node);
            }
        }

        assert_eq!(self.map_count, self.mm_rb.len());
        assert_eq!(self.total_vm, total_vm);
        assert_eq!(self.highest_vm_end, prev_end);
    }
}
