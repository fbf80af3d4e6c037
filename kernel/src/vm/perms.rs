// SPDX-License-Identifier: MPL-2.0

use bitflags::bitflags;

bitflags! {
    /// The flags of a virtual memory area.
    ///
    /// The bit values are those of Linux's `VM_*` flags.
    pub struct VmFlags: u32 {
        /// Readable.
        const READ       = 0x0000_0001;
        /// Writable.
        const WRITE      = 0x0000_0002;
        /// Executable.
        const EXEC       = 0x0000_0004;
        /// Shared with other address spaces and carried through to the file.
        const SHARED     = 0x0000_0008;
        /// May be made readable.
        const MAYREAD    = 0x0000_0010;
        /// May be made writable.
        const MAYWRITE   = 0x0000_0020;
        /// May be made executable.
        const MAYEXEC    = 0x0000_0040;
        /// May be shared.
        const MAYSHARE   = 0x0000_0080;
        /// A stack that grows towards lower addresses.
        const GROWSDOWN  = 0x0000_0100;
        /// Not inherited by a forked address space.
        const DONTCOPY   = 0x0002_0000;
        /// Inherited by a forked address space without its anonymous pages.
        const WIPEONFORK = 0x0200_0000;
    }
}

impl VmFlags {
    /// The access permissions.
    pub const ACCESS_MASK: Self = Self {
        bits: Self::READ.bits | Self::WRITE.bits | Self::EXEC.bits,
    };

    /// The permissions an area may be given.
    pub const MAY_MASK: Self = Self {
        bits: Self::MAYREAD.bits | Self::MAYWRITE.bits | Self::MAYEXEC.bits,
    };

    /// Returns the access permissions.
    pub fn access(&self) -> Self {
        *self & Self::ACCESS_MASK
    }

    /// Returns the `MAY*` counterparts of the access permissions.
    pub fn to_may(&self) -> Self {
        // Each `MAY*` bit sits four bits above its access bit.
        Self::from_bits_truncate(self.access().bits << 4)
    }

    /// Returns whether every access permission is allowed by a `MAY*` flag.
    pub fn is_access_allowed(&self) -> bool {
        self.contains(self.to_may())
    }

    /// Returns whether the area is shared.
    pub fn is_shared(&self) -> bool {
        self.contains(Self::SHARED)
    }
}
