// SPDX-License-Identifier: MPL-2.0

//! The reverse mapping of anonymous pages.
//!
//! An anonymous page is created in the [`AnonVma`] of the area it is first
//! touched through. After a `fork`, the page may be mapped by the copies of
//! that area in every descendant address space as well, until one of them
//! writes to it. So every area is linked, by an [`AnonVmaChain`], into the
//! `AnonVma` of its own and into the `AnonVma`s of all the areas it was forked
//! from. Finding the areas that may map an anonymous page then means querying
//! one interval tree by the page offset of the page.
//!
//! [`AnonVmaChain`]: super::interval_tree::AnonVmaChain

use core::sync::atomic::{AtomicUsize, Ordering};

use interval_tree::NodeId;

use super::{
    interval_tree::{
        AnonVmaChain, AnonVmaIntervalTree, anon_vma_interval_tree_insert,
        anon_vma_interval_tree_remove, anon_vma_interval_tree_verify,
    },
    vma::{ChainLink, VmArea},
};
use crate::prelude::*;

/// The reverse mapping of the anonymous pages of a family of areas.
pub struct AnonVma {
    /// The oldest ancestor, or `None` if this is it.
    root: Option<Arc<AnonVma>>,
    /// The `AnonVma` of the area this one's area was forked from, or `None`
    /// for a root.
    parent: Option<Arc<AnonVma>>,
    /// The number of child `AnonVma`s plus the number of areas using this one
    /// for their new anonymous pages.
    ///
    /// A root counts itself as its own child, so it is never reused.
    degree: AtomicUsize,
    /// The chains of the areas that may map the pages.
    rb_root: RwLock<AnonVmaIntervalTree>,
}

impl AnonVma {
    /// Creates the root of a new family.
    pub(crate) fn new_root() -> Arc<Self> {
        Arc::new(Self {
            root: None,
            parent: None,
            degree: AtomicUsize::new(1),
            rb_root: RwLock::new(AnonVmaIntervalTree::new()),
        })
    }

    /// Creates a child of `parent`.
    fn new_child(parent: &Arc<AnonVma>) -> Arc<Self> {
        parent.degree.fetch_add(1, Ordering::Relaxed);
        Arc::new(Self {
            root: Some(parent.root()),
            parent: Some(parent.clone()),
            degree: AtomicUsize::new(0),
            rb_root: RwLock::new(AnonVmaIntervalTree::new()),
        })
    }

    /// Returns the root of the family.
    pub fn root(self: &Arc<Self>) -> Arc<AnonVma> {
        self.root.clone().unwrap_or_else(|| self.clone())
    }

    /// Returns the parent, or `None` for a root.
    pub fn parent(&self) -> Option<&Arc<AnonVma>> {
        self.parent.as_ref()
    }

    /// Returns whether this is the root of its family.
    pub fn is_root(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the number of children plus the number of areas using this
    /// `AnonVma` for their new anonymous pages.
    pub fn degree(&self) -> usize {
        self.degree.load(Ordering::Relaxed)
    }

    /// Returns the number of areas linked to this `AnonVma`.
    pub fn nr_chains(&self) -> usize {
        self.rb_root.read().len()
    }

    /// Returns the areas that may map any of the page offsets `[first, last]`,
    /// in order of page offset.
    pub fn vmas_in(&self, first: usize, last: usize) -> Vec<Arc<VmArea>> {
        let rb_root = self.rb_root.read();
        rb_root
            .iter(first, last)
            .map(|(_, chain)| chain.vma())
            .collect()
    }

    /// Checks the tree of chains, panicking on the first violation.
    pub fn validate(&self) {
        let rb_root = self.rb_root.read();
        rb_root.validate();
        for (_, chain) in rb_root.iter_all() {
            assert!(chain.verify_cached_bounds());
        }
    }

    /// Checks that the chain `node` links `vma` to this `AnonVma` and still
    /// has the bounds it was inserted with.
    pub(crate) fn verify_chain(&self, vma: &VmArea, node: NodeId) {
        let rb_root = self.rb_root.read();
        assert!(rb_root.contains(node), "{:?} has a stale chain", vma);
        assert!(rb_root.get(node).is(vma), "{:?} has the chain of another area", vma);
        assert!(
            anon_vma_interval_tree_verify(&rb_root, node),
            "{:?} moved while in an anon vma tree",
            vma
        );
    }

    /// Takes a reference for a new user if fewer than two areas or children
    /// use this `AnonVma`.
    ///
    /// The check and the increment are a single atomic step.
    fn try_adopt(&self) -> bool {
        self.degree
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |degree| {
                (degree < 2).then_some(degree + 1)
            })
            .is_ok()
    }

    fn put_degree(&self) {
        let old = self.degree.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(old > 0, "the degree of an anon vma underflows");
    }
}

impl Debug for AnonVma {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AnonVma")
            .field("is_root", &self.is_root())
            .field("degree", &self.degree())
            .finish_non_exhaustive()
    }
}

/// Makes sure that `vma` has an [`AnonVma`] for its new anonymous pages, and
/// returns it.
///
/// `prev` and `next` are the neighboring areas in the address space. If one
/// of them is adjacent and compatible, and its `AnonVma` is not shared with
/// any other family member, that `AnonVma` is reused so that the two areas
/// could later be merged.
pub fn anon_vma_prepare(
    vma: &Arc<VmArea>,
    prev: Option<&Arc<VmArea>>,
    next: Option<&Arc<VmArea>>,
) -> Arc<AnonVma> {
    if let Some(anon_vma) = vma.anon_vma() {
        return anon_vma;
    }

    let anon_vma = find_mergeable_anon_vma(vma, prev, next).unwrap_or_else(AnonVma::new_root);
    anon_vma_chain_link(vma, &anon_vma);
    anon_vma.degree.fetch_add(1, Ordering::Relaxed);
    vma.links().anon_vma = Some(anon_vma.clone());
    debug!("prepared {:?} for {:?}", anon_vma, vma);
    anon_vma
}

/// Links `dst` into every [`AnonVma`] `src` is linked into.
///
/// Used when `dst` takes over part of `src`, and as the first step of
/// [`anon_vma_fork`]. If `dst` has no `AnonVma` of its own yet, an ancestor
/// that no area uses anymore and that has at most one child may be adopted.
pub fn anon_vma_clone(dst: &Arc<VmArea>, src: &VmArea) {
    let src_anon_vma = src.anon_vma();
    let ancestors: Vec<Arc<AnonVma>> = src
        .links()
        .anon_vma_chain
        .iter()
        .map(|link| link.anon_vma.clone())
        .collect();

    let preset = dst.anon_vma();
    let mut adopted = None;
    for anon_vma in ancestors {
        anon_vma_chain_link(dst, &anon_vma);

        // Never adopt the `AnonVma` of `src` itself, or every first child
        // would. A root always has a degree of at least two.
        let is_src = src_anon_vma
            .as_ref()
            .is_some_and(|src_anon_vma| Arc::ptr_eq(src_anon_vma, &anon_vma));
        if preset.is_none() && adopted.is_none() && !is_src && anon_vma.try_adopt() {
            adopted = Some(anon_vma);
        }
    }

    if let Some(anon_vma) = preset {
        anon_vma.degree.fetch_add(1, Ordering::Relaxed);
    } else if let Some(anon_vma) = adopted {
        trace!("{:?} adopts {:?}", dst, anon_vma);
        dst.links().anon_vma = Some(anon_vma);
    }
}

/// Sets up the anonymous reverse mapping of `vma`, forked from `pvma`.
///
/// `vma` is linked into every [`AnonVma`] of `pvma`, and gets an `AnonVma` of
/// its own for the pages it will create, a child of the one of `pvma`, unless
/// [`anon_vma_clone`] found one to reuse. Nothing is done if `pvma` has no
/// anonymous pages.
pub fn anon_vma_fork(vma: &Arc<VmArea>, pvma: &VmArea) {
    let Some(parent_anon_vma) = pvma.anon_vma() else {
        return;
    };

    vma.links().anon_vma = None;
    anon_vma_clone(vma, pvma);
    if vma.anon_vma().is_some() {
        return;
    }

    let anon_vma = AnonVma::new_child(&parent_anon_vma);
    anon_vma.degree.fetch_add(1, Ordering::Relaxed);
    vma.links().anon_vma = Some(anon_vma.clone());
    anon_vma_chain_link(vma, &anon_vma);
    trace!("forked {:?} from {:?}", anon_vma, parent_anon_vma);
}

/// Unlinks `vma` from every [`AnonVma`], before it is destroyed.
pub fn unlink_anon_vmas(vma: &VmArea) {
    let chain_links = core::mem::take(&mut vma.links().anon_vma_chain);
    for ChainLink { anon_vma, node } in chain_links {
        let mut rb_root = anon_vma.rb_root.write();
        let chain = anon_vma_interval_tree_remove(node, &mut rb_root);
        debug_assert!(chain.is(vma));

        // An `AnonVma` without areas no longer counts as a child.
        if rb_root.is_empty() {
            anon_vma.parent.as_ref().unwrap_or(&anon_vma).put_degree();
        }
    }

    if let Some(anon_vma) = vma.links().anon_vma.take() {
        anon_vma.put_degree();
    }
}

fn anon_vma_chain_link(vma: &Arc<VmArea>, anon_vma: &Arc<AnonVma>) {
    let node = {
        let mut rb_root = anon_vma.rb_root.write();
        anon_vma_interval_tree_insert(AnonVmaChain::new(vma, anon_vma), &mut rb_root)
    };
    vma.links().anon_vma_chain.push(ChainLink {
        anon_vma: anon_vma.clone(),
        node,
    });
}

fn find_mergeable_anon_vma(
    vma: &VmArea,
    prev: Option<&Arc<VmArea>>,
    next: Option<&Arc<VmArea>>,
) -> Option<Arc<AnonVma>> {
    if let Some(next) = next
        && let Some(anon_vma) = reusable_anon_vma(next, vma, next)
    {
        return Some(anon_vma);
    }
    let prev = prev?;
    reusable_anon_vma(prev, prev, vma)
}

/// Returns the `AnonVma` of `old` if the adjacent `a` and `b` could share one,
/// and `old` does not share its own with other family members.
fn reusable_anon_vma(old: &VmArea, a: &VmArea, b: &VmArea) -> Option<Arc<AnonVma>> {
    if !anon_vma_compatible(a, b) {
        return None;
    }
    let links = old.links();
    if links.anon_vma_chain.len() != 1 {
        return None;
    }
    links.anon_vma.clone()
}

fn anon_vma_compatible(a: &VmArea, b: &VmArea) -> bool {
    let same_file = match (a.file(), b.file()) {
        (Some(a_file), Some(b_file)) => Arc::ptr_eq(a_file, b_file),
        (None, None) => true,
        _ => false,
    };
    a.end() == b.start()
        && same_file
        && (a.flags() ^ b.flags()).access() == (a.flags() ^ b.flags())
        && b.pgoff() == a.pgoff() + ((b.start() - a.start()) >> PAGE_SHIFT)
}
