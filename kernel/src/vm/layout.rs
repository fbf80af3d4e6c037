// SPDX-License-Identifier: MPL-2.0

//! The layout of a user address space.

/// A virtual address.
pub type Vaddr = usize;

/// The number of bits of an in-page offset.
pub const PAGE_SHIFT: usize = 12;
/// The size of a base page.
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// The lowest address a mapping may start at.
///
/// 64 KiB is the Linux configurable default.
pub const MMAP_MIN_ADDR: Vaddr = 0x001_0000;
/// The end of the user address space, for a 48-bit virtual address layout.
pub const TASK_SIZE: Vaddr = 1 << 47;

/// Returns whether the input `vaddr` is a legal user space virtual address.
pub fn is_userspace_vaddr(vaddr: Vaddr) -> bool {
    (MMAP_MIN_ADDR..TASK_SIZE).contains(&vaddr)
}

/// Returns whether `vaddr` and `len` specify a legal user space virtual address range.
pub fn is_userspace_vaddr_range(vaddr: Vaddr, len: usize) -> bool {
    vaddr >= MMAP_MIN_ADDR && TASK_SIZE.checked_sub(vaddr).is_some_and(|gap| gap >= len)
}

/// Returns whether `vaddr` is page-aligned.
pub const fn is_page_aligned(vaddr: Vaddr) -> bool {
    vaddr.is_multiple_of(PAGE_SIZE)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn userspace_range_bounds() {
        assert!(is_userspace_vaddr_range(MMAP_MIN_ADDR, PAGE_SIZE));
        assert!(is_userspace_vaddr_range(TASK_SIZE - PAGE_SIZE, PAGE_SIZE));
        assert!(!is_userspace_vaddr_range(TASK_SIZE - PAGE_SIZE, 2 * PAGE_SIZE));
        assert!(!is_userspace_vaddr_range(0, PAGE_SIZE));
        assert!(!is_userspace_vaddr_range(usize::MAX - PAGE_SIZE, PAGE_SIZE));
        assert!(is_userspace_vaddr(MMAP_MIN_ADDR));
        assert!(!is_userspace_vaddr(TASK_SIZE));
    }
}
