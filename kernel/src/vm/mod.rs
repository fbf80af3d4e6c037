// SPDX-License-Identifier: MPL-2.0

//! Virtual memory (VM).
//!
//! There are several core concepts in this module:
//! - [`VmArea`]: a contiguous range of virtual addresses mapped with uniform
//!   flags, either to a window of a file or to anonymous memory;
//! - [`AddressSpace`]: the set of `VmArea`s of one process;
//! - [`AddressMapping`]: the reverse index from the pages of a file to the
//!   `VmArea`s mapping them;
//! - [`AnonVma`]: the reverse index from anonymous pages to the `VmArea`s
//!   that may map them, across `fork`.
//!
//! [`VmArea`]: vma::VmArea
//! [`AddressSpace`]: address_space::AddressSpace
//! [`AddressMapping`]: file::AddressMapping
//! [`AnonVma`]: anon_vma::AnonVma

pub mod address_space;
pub mod anon_vma;
pub mod file;
pub mod interval_tree;
pub mod layout;
pub mod perms;
pub mod vma;
