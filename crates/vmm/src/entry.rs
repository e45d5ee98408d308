//! Page table entry word encodings.
//!
//! An entry is a pair of 32-bit words with the hardware TLB layout: the high
//! word identifies the mapping (VPN and ASID at fixed offsets) and the low
//! word carries the translation (frame base address plus the dirty, valid,
//! and global bits).

use crate::{
    PAGE_SIZE,
    numbers::{Asid, FrameIndex, Vpn},
};
use core::fmt;

/// The high word of a page table entry: VPN and ASID at fixed bit offsets.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct EntryHi(u32);

impl EntryHi {
    const VPN_SHIFT: u32 = 12;
    const VPN_MASK: u32 = 0x000F_FFFF;
    const ASID_SHIFT: u32 = 6;
    const ASID_MASK: u32 = 0x3F;

    /// Creates a high word identifying `vpn` in address space `asid`.
    pub const fn new(vpn: Vpn, asid: Asid) -> Self {
        Self(
            ((vpn.as_usize() as u32 & Self::VPN_MASK) << Self::VPN_SHIFT)
                | ((asid.as_usize() as u32 & Self::ASID_MASK) << Self::ASID_SHIFT),
        )
    }

    /// Returns the virtual page number field.
    pub const fn vpn(self) -> Vpn {
        Vpn::new(((self.0 >> Self::VPN_SHIFT) & Self::VPN_MASK) as usize)
    }

    /// Returns the address-space identifier field.
    pub const fn asid(self) -> Asid {
        Asid::new(((self.0 >> Self::ASID_SHIFT) & Self::ASID_MASK) as usize)
    }

    /// Returns the raw word.
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for EntryHi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryHi(vpn={:#x}, asid={})", self.vpn().as_usize(), self.asid())
    }
}

/// The low word of a page table entry: frame base address and D/V/G bits.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct EntryLo(u32);

impl EntryLo {
    const DIRTY: u32 = 0x0000_0400;
    const VALID: u32 = 0x0000_0200;
    const GLOBAL: u32 = 0x0000_0100;
    const PFN_MASK: u32 = !(PAGE_SIZE as u32 - 1);

    /// Creates the initial low word for a freshly created page table entry:
    /// not valid, not global, dirty bit set.
    pub const fn invalid() -> Self {
        Self(Self::DIRTY)
    }

    /// Creates a low word mapping the given frame with the valid and dirty
    /// bits set, as the pager installs after a load.
    pub const fn mapped(frame: FrameIndex) -> Self {
        Self((frame.base_address() & Self::PFN_MASK) | Self::VALID | Self::DIRTY)
    }

    /// Returns whether the valid bit is set.
    pub const fn is_valid(self) -> bool {
        (self.0 & Self::VALID) != 0
    }

    /// Returns whether the dirty bit is set.
    pub const fn is_dirty(self) -> bool {
        (self.0 & Self::DIRTY) != 0
    }

    /// Returns whether the global bit is set.
    pub const fn is_global(self) -> bool {
        (self.0 & Self::GLOBAL) != 0
    }

    /// Returns the frame base address field.
    pub const fn frame_base(self) -> u32 {
        self.0 & Self::PFN_MASK
    }

    /// Clears the valid bit, preserving the other fields.
    pub const fn invalidated(self) -> Self {
        Self(self.0 & !Self::VALID)
    }

    /// Clears the valid bit and the frame base address field, as process
    /// termination does for every entry of the dead process's table.
    pub const fn cleared(self) -> Self {
        Self(self.0 & !(Self::PFN_MASK | Self::VALID))
    }

    /// Returns the raw word.
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for EntryLo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EntryLo(pfn={:#x}, d={}, v={}, g={})",
            self.frame_base(),
            self.is_dirty() as u8,
            self.is_valid() as u8,
            self.is_global() as u8
        )
    }
}

/// One per-process page table entry.
///
/// If the valid bit is set, the frame base address must name a swap-pool
/// frame whose record's owner is this entry's `(asid, vpn)`; the pager
/// maintains that invariant under the pool lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry {
    hi: EntryHi,
    lo: EntryLo,
}

impl PageTableEntry {
    /// Creates an invalid entry identifying `vpn` in address space `asid`.
    pub const fn new(vpn: Vpn, asid: Asid) -> Self {
        Self {
            hi: EntryHi::new(vpn, asid),
            lo: EntryLo::invalid(),
        }
    }

    /// Returns the high word.
    pub const fn hi(self) -> EntryHi {
        self.hi
    }

    /// Returns the low word.
    pub const fn lo(self) -> EntryLo {
        self.lo
    }

    /// Installs a translation to `frame`, marking the entry valid and dirty.
    pub fn map_to(&mut self, frame: FrameIndex) {
        self.lo = EntryLo::mapped(frame);
    }

    /// Clears the valid bit (eviction).
    pub fn invalidate(&mut self) {
        self.lo = self.lo.invalidated();
    }

    /// Clears the translation entirely (process termination).
    pub fn clear(&mut self) {
        self.lo = self.lo.cleared();
    }
}
