// SPDX-License-Identifier: MPL-2.0

use super::AddressSpace;
use crate::{
    prelude::*,
    vm::{
        anon_vma::{anon_vma_fork, anon_vma_prepare},
        perms::VmFlags,
    },
};

impl AddressSpace {
    /// Creates a new address space whose areas are inherited from another.
    ///
    /// Every area is copied, except those with [`VmFlags::DONTCOPY`]. A copy
    /// maps the same file pages as its original and is linked right after it
    /// in the file's `i_mmap` tree. Its anonymous pages may be those of the
    /// original, so it joins every [`AnonVma`] of the original and gets a new
    /// one of its own; with [`VmFlags::WIPEONFORK`], it starts from a fresh
    /// [`AnonVma`] instead.
    ///
    /// [`AnonVma`]: crate::vm::anon_vma::AnonVma
    pub fn fork_from(parent: &Self) -> Arc<Self> {
        let new_space = Self::new();

        {
            let inner = parent.inner.read();
            let mut new_inner = new_space.inner.write();

            for (_, mapped) in inner.mm_rb.iter() {
                let vma = &mapped.vma;
                if vma.flags().contains(VmFlags::DONTCOPY) {
                    continue;
                }

                // Clone the `VmArea` to the new address space.
                let new_vma = vma.new_fork();
                if vma.flags().contains(VmFlags::WIPEONFORK) {
                    anon_vma_prepare(&new_vma, None, None);
                } else {
                    anon_vma_fork(&new_vma, vma);
                }
                if let Some(file) = vma.file() {
                    file.mapping().link_vma_after(&new_vma, vma);
                }
                new_inner.insert(new_vma);
            }

            new_inner.debug_validate();
            debug!("forked {} of {} areas", new_inner.map_count, inner.map_count);
        }

        new_space
    }
}
