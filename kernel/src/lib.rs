// SPDX-License-Identifier: MPL-2.0

//! Virtual memory area (VMA) indexes of a process address space.
//!
//! A process address space ([`AddressSpace`]) is a set of non-overlapping
//! regions ([`VmArea`]), each mapping a page-aligned range of virtual
//! addresses either to a window of a file or to anonymous memory. Besides the
//! address-ordered tree an address space keeps of its own regions, every
//! region is reachable from two reverse indexes:
//!
//! - the `i_mmap` interval tree of its backing file ([`AddressMapping`]),
//!   which answers "which regions map pages `[first, last]` of this file";
//! - the interval trees of the [`AnonVma`]s its anonymous pages may belong
//!   to, which answer the same question for anonymous pages shared across
//!   `fork`.
//!
//! Both reverse indexes are instances of the generic [`interval_tree`] crate
//! keyed by page offset, so a region is found in O(log n + k) time.
//!
//! [`AddressSpace`]: vm::address_space::AddressSpace
//! [`VmArea`]: vm::vma::VmArea
//! [`AddressMapping`]: vm::file::AddressMapping
//! [`AnonVma`]: vm::anon_vma::AnonVma

#![no_std]
#![deny(unsafe_code)]

extern crate alloc;

pub mod error;
mod prelude;
pub mod vm;

pub use error::{Errno, Error};
pub use vm::{
    address_space::{AddressSpace, MapOptions, OffsetType, QueryGuard},
    anon_vma::AnonVma,
    file::{AddressMapping, MappedFile},
    perms::VmFlags,
    vma::VmArea,
};

pub type Result<T> = core::result::Result<T, Error>;
