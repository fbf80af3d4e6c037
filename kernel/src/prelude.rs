// SPDX-License-Identifier: MPL-2.0

#![expect(unused_imports)]

pub(crate) use alloc::{
    sync::{Arc, Weak},
    vec,
    vec::Vec,
};
pub(crate) use core::fmt::Debug;

pub(crate) use bitflags::bitflags;
pub(crate) use log::{debug, error, info, log_enabled, trace, warn};
pub(crate) use spin::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) use crate::{
    error::{Errno, Error},
    vm::layout::{PAGE_SHIFT, PAGE_SIZE, Vaddr},
};
pub(crate) type Result<T> = core::result::Result<T, Error>;
pub(crate) use crate::{return_errno, return_errno_with_message};
