//! Per-process page tables.
//!
//! Each U-proc owns one flat, fixed-size table mapping its virtual pages to
//! swap-pool frames. The table is created once at process initialization
//! (every entry invalid) and its entries are only ever mutated by fault
//! handling: normally the owner's own, except when the owner is chosen as an
//! eviction victim by another process's fault.

use crate::{
    KUSEG_BASE_VPN, PAGE_TABLE_SIZE, STACK_VPN,
    entry::PageTableEntry,
    numbers::{Asid, Vpn},
};

/// A U-proc's private page table.
///
/// Slots `0..PAGE_TABLE_SIZE - 1` hold the text/data pages starting at the
/// kuseg base VPN; the last slot is reserved for the single stack page and
/// is keyed by the distinguished stack VPN rather than by arithmetic offset.
#[derive(Debug, Clone)]
pub struct PageTable {
    asid: Asid,
    entries: [PageTableEntry; PAGE_TABLE_SIZE],
}

impl PageTable {
    /// Creates the page table for address space `asid`.
    ///
    /// Every entry is pre-seeded with its VPN and the owner's ASID, marked
    /// dirty and not valid; the stack slot is keyed by the stack VPN.
    pub fn new(asid: Asid) -> Self {
        let entries = core::array::from_fn(|i| {
            let vpn = if i == PAGE_TABLE_SIZE - 1 {
                Vpn::new(STACK_VPN)
            } else {
                Vpn::new(KUSEG_BASE_VPN + i)
            };
            PageTableEntry::new(vpn, asid)
        });
        Self { asid, entries }
    }

    /// Returns the owning address space's identifier.
    pub fn asid(&self) -> Asid {
        self.asid
    }

    /// Returns the entry at `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    pub fn entry(&self, slot: usize) -> &PageTableEntry {
        &self.entries[slot]
    }

    /// Returns the entry at `slot`, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    pub fn entry_mut(&mut self, slot: usize) -> &mut PageTableEntry {
        &mut self.entries[slot]
    }

    /// Returns the entry `vpn` maps to.
    pub fn entry_for(&self, vpn: Vpn) -> &PageTableEntry {
        &self.entries[vpn.page_slot()]
    }

    /// Returns the entry `vpn` maps to, mutably.
    pub fn entry_for_mut(&mut self, vpn: Vpn) -> &mut PageTableEntry {
        &mut self.entries[vpn.page_slot()]
    }

    /// Clears every translation, as process termination requires.
    ///
    /// No physical deallocation happens here; the swap-pool records are
    /// released separately under the pool lock.
    pub fn invalidate_all(&mut self) {
        for entry in &mut self.entries {
            entry.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_every_slot_with_vpn_and_asid() {
        let table = PageTable::new(Asid::new(4));
        for i in 0..PAGE_TABLE_SIZE - 1 {
            let entry = table.entry(i);
            assert_eq!(entry.hi().vpn(), Vpn::new(KUSEG_BASE_VPN + i));
            assert_eq!(entry.hi().asid(), Asid::new(4));
            assert!(!entry.lo().is_valid());
            assert!(entry.lo().is_dirty());
        }
    }

    #[test]
    fn last_slot_is_the_stack_page() {
        let table = PageTable::new(Asid::new(1));
        let stack = table.entry(PAGE_TABLE_SIZE - 1);
        assert_eq!(stack.hi().vpn(), Vpn::new(STACK_VPN));
        assert_eq!(table.entry_for(Vpn::new(STACK_VPN)).hi().vpn(), Vpn::new(STACK_VPN));
    }

    #[test]
    fn invalidate_all_clears_translations() {
        let mut table = PageTable::new(Asid::new(2));
        table
            .entry_for_mut(Vpn::new(KUSEG_BASE_VPN))
            .map_to(crate::numbers::FrameIndex::new(0));
        table.invalidate_all();
        for i in 0..PAGE_TABLE_SIZE {
            assert!(!table.entry(i).lo().is_valid());
            assert_eq!(table.entry(i).lo().frame_base(), 0);
        }
    }
}
