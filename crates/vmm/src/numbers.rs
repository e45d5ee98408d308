//! Identifier newtypes for the paging engine.
//!
//! This module provides newtypes for address-space identifiers, virtual page
//! numbers, and swap-pool frame indices, which are used throughout the
//! virtual memory subsystem.

use crate::{PAGE_SIZE, PAGE_TABLE_SIZE, STACK_VPN, SWAP_POOL_BASE};
use core::fmt;

/// Macro to define common identifier-newtype functionality.
///
/// This macro generates the basic structure and methods common to the
/// number types in this module, reducing code duplication.
macro_rules! impl_number_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Returns the raw value.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

impl_number_common!(
    Asid,
    "An address-space identifier.\n\n\
     Tags one U-proc's page table and TLB entries, distinguishing them from\n\
     every other process's. ASID 0 is reserved for the kernel and is never a\n\
     valid U-proc identifier."
);

impl Asid {
    /// Creates a new ASID.
    ///
    /// # Panics
    ///
    /// Panics if the identifier does not fit the 6-bit ASID field or is the
    /// reserved kernel value 0.
    #[inline]
    pub const fn new(id: usize) -> Self {
        assert!(id != 0 && id < 64, "ASID must be in 1..=63");
        Self(id)
    }

    /// Returns the zero-based index of this ASID, used for per-process
    /// backing-store regions and registry slots.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 - 1
    }
}

impl_number_common!(
    Vpn,
    "A virtual page number.\n\n\
     The unit of addressable virtual memory being mapped. U-proc pages live\n\
     in kuseg, except for the single stack page which is keyed by the\n\
     distinguished [`STACK_VPN`](crate::STACK_VPN)."
);

impl Vpn {
    /// Creates a new virtual page number.
    #[inline]
    pub const fn new(vpn: usize) -> Self {
        Self(vpn)
    }

    /// Returns the VPN containing the given virtual address.
    #[inline]
    pub const fn containing(vaddr: usize) -> Self {
        Self(vaddr / PAGE_SIZE)
    }

    /// Returns true if this is the distinguished stack-page VPN.
    #[inline]
    pub const fn is_stack(self) -> bool {
        self.0 == STACK_VPN
    }

    /// Returns the page table slot this VPN maps to.
    ///
    /// The stack page always occupies the fixed last slot; every other VPN
    /// maps to its position modulo the table size.
    #[inline]
    pub const fn page_slot(self) -> usize {
        if self.is_stack() {
            PAGE_TABLE_SIZE - 1
        } else {
            self.0 % PAGE_TABLE_SIZE
        }
    }
}

impl_number_common!(
    FrameIndex,
    "A swap-pool frame index.\n\n\
     Identifies one physical frame of the paging area. Frame indices are\n\
     zero-based and correspond to PAGE_SIZE-aligned physical addresses\n\
     starting at [`SWAP_POOL_BASE`](crate::SWAP_POOL_BASE)."
);

impl FrameIndex {
    /// Creates a new frame index.
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the physical base address of this frame.
    #[inline]
    pub const fn base_address(self) -> u32 {
        SWAP_POOL_BASE + (self.0 * PAGE_SIZE) as u32
    }

    /// Returns the frame whose base address is `addr`, if `addr` lies on a
    /// frame boundary within the paging area.
    pub fn of_base_address(addr: u32) -> Option<Self> {
        let offset = addr.checked_sub(SWAP_POOL_BASE)? as usize;
        if offset % PAGE_SIZE != 0 {
            return None;
        }
        Some(Self(offset / PAGE_SIZE))
    }
}
