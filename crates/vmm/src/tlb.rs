//! The emulated TLB and the refill fast path.
//!
//! The TLB is a small cache of `(EntryHi, EntryLo)` pairs. Entries cannot be
//! selectively invalidated by address space, so the pager always performs a
//! full flush when it rewrites a translation. The refill handler is the fast
//! path run on every hardware miss: a pure O(1) page table lookup with no
//! blocking and no I/O.

use crate::{
    TLB_ENTRIES,
    entry::{EntryHi, EntryLo},
    numbers::{Asid, Vpn},
    page_table::PageTable,
};
use alloc::{vec, vec::Vec};

/// One cached translation.
#[derive(Debug, Clone, Copy)]
struct TlbEntry {
    hi: EntryHi,
    lo: EntryLo,
}

/// The hardware translation cache.
pub struct Tlb {
    entries: Vec<Option<TlbEntry>>,
    /// Index the next write lands in, advanced round-robin.
    wired: usize,
}

impl Tlb {
    /// Creates an empty TLB with the default entry count.
    pub fn new() -> Self {
        Self::with_entry_count(TLB_ENTRIES)
    }

    /// Creates an empty TLB with `entries` slots.
    pub fn with_entry_count(entries: usize) -> Self {
        assert!(entries > 0, "TLB must have at least one entry");
        Self {
            entries: vec![None; entries],
            wired: 0,
        }
    }

    /// Writes a translation into the TLB, replacing whatever occupied the
    /// write slot.
    pub fn write(&mut self, hi: EntryHi, lo: EntryLo) {
        self.entries[self.wired] = Some(TlbEntry { hi, lo });
        self.wired = (self.wired + 1) % self.entries.len();
    }

    /// Looks up the translation for `vpn` in address space `asid`.
    ///
    /// An entry matches if its VPN matches and either its ASID matches or
    /// its global bit is set.
    pub fn probe(&self, asid: Asid, vpn: Vpn) -> Option<EntryLo> {
        self.entries.iter().flatten().find_map(|entry| {
            let matches = entry.hi.vpn() == vpn
                && (entry.lo.is_global() || entry.hi.asid() == asid);
            matches.then_some(entry.lo)
        })
    }

    /// Flushes every cached translation.
    pub fn clear(&mut self) {
        self.entries.fill(None);
    }
}

impl Default for Tlb {
    fn default() -> Self {
        Self::new()
    }
}

/// The TLB-refill handler.
///
/// Programs the faulting process's page table entry for `vpn` into the TLB.
/// The table is passed explicitly; there is no ambient current-process
/// state. This never fails: every slot always holds some entry, and an
/// invalid one raises a separate TLB-invalid exception on the retried
/// access, which the pager handles.
pub fn refill(table: &PageTable, vpn: Vpn, tlb: &mut Tlb) {
    let entry = table.entry_for(vpn);
    tlb.write(entry.hi(), entry.lo());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KUSEG_BASE_VPN, PAGE_TABLE_SIZE, STACK_VPN, numbers::FrameIndex};

    #[test]
    fn probe_misses_on_empty_tlb() {
        let tlb = Tlb::with_entry_count(4);
        assert!(tlb.probe(Asid::new(1), Vpn::new(KUSEG_BASE_VPN)).is_none());
    }

    #[test]
    fn refill_programs_the_slot_entry() {
        let mut table = PageTable::new(Asid::new(2));
        table.entry_for_mut(Vpn::new(KUSEG_BASE_VPN + 3)).map_to(FrameIndex::new(1));
        let mut tlb = Tlb::with_entry_count(4);

        refill(&table, Vpn::new(KUSEG_BASE_VPN + 3), &mut tlb);

        let lo = tlb.probe(Asid::new(2), Vpn::new(KUSEG_BASE_VPN + 3)).unwrap();
        assert!(lo.is_valid());
        assert_eq!(lo.frame_base(), FrameIndex::new(1).base_address());
    }

    #[test]
    fn refill_of_an_invalid_entry_still_lands_in_the_tlb() {
        let table = PageTable::new(Asid::new(1));
        let mut tlb = Tlb::with_entry_count(4);

        refill(&table, Vpn::new(KUSEG_BASE_VPN), &mut tlb);

        let lo = tlb.probe(Asid::new(1), Vpn::new(KUSEG_BASE_VPN)).unwrap();
        assert!(!lo.is_valid());
    }

    #[test]
    fn refill_maps_the_stack_vpn_to_the_last_slot() {
        let table = PageTable::new(Asid::new(1));
        let mut tlb = Tlb::with_entry_count(4);

        refill(&table, Vpn::new(STACK_VPN), &mut tlb);

        // The installed entry is the reserved last slot, whose EntryHi is
        // keyed by the stack VPN itself.
        assert!(tlb.probe(Asid::new(1), Vpn::new(STACK_VPN)).is_some());
        assert_eq!(table.entry(PAGE_TABLE_SIZE - 1).hi().vpn(), Vpn::new(STACK_VPN));
    }

    #[test]
    fn probe_is_per_address_space() {
        let table = PageTable::new(Asid::new(1));
        let mut tlb = Tlb::with_entry_count(4);
        refill(&table, Vpn::new(KUSEG_BASE_VPN), &mut tlb);

        assert!(tlb.probe(Asid::new(2), Vpn::new(KUSEG_BASE_VPN)).is_none());
    }

    #[test]
    fn writes_wrap_around_round_robin() {
        let table = PageTable::new(Asid::new(1));
        let mut tlb = Tlb::with_entry_count(2);
        for i in 0..3 {
            refill(&table, Vpn::new(KUSEG_BASE_VPN + i), &mut tlb);
        }
        // The first write has been displaced by the third.
        assert!(tlb.probe(Asid::new(1), Vpn::new(KUSEG_BASE_VPN)).is_none());
        assert!(tlb.probe(Asid::new(1), Vpn::new(KUSEG_BASE_VPN + 2)).is_some());
    }

    #[test]
    fn clear_flushes_everything() {
        let table = PageTable::new(Asid::new(1));
        let mut tlb = Tlb::with_entry_count(4);
        refill(&table, Vpn::new(KUSEG_BASE_VPN), &mut tlb);
        tlb.clear();
        assert!(tlb.probe(Asid::new(1), Vpn::new(KUSEG_BASE_VPN)).is_none());
    }
}
