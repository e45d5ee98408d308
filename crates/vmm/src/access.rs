//! User-space memory access through address translation.
//!
//! Models what the MMU does on each reference: probe the TLB, run the
//! refill fast path on a miss, raise a fault when the resolved entry is
//! invalid (or clean on a store), and retry the reference once the fault is
//! serviced. Transfers touch frame contents only under the pool lock, after
//! re-checking that the frame still belongs to the accessed page; a stale
//! hit from a racing eviction flushes the TLB and retries.

use crate::{
    PAGE_SIZE,
    entry::EntryHi,
    numbers::{Asid, FrameIndex, Vpn},
    pager::{FaultCause, FaultOutcome, TrapReason, Vmm},
    swap_pool::FrameOwner,
    tlb::refill,
};

/// Why a user-space access could not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// The referenced address falls outside the process's 32-page layout.
    OutsideAddressSpace,
    /// Fault servicing terminated the accessing process.
    Terminated(TrapReason),
}

impl Vmm {
    /// Reads `buffer.len()` bytes of address space `asid` starting at
    /// virtual address `vaddr`.
    pub fn read_bytes(
        &self,
        asid: Asid,
        vaddr: usize,
        mut buffer: &mut [u8],
    ) -> Result<(), AccessError> {
        let mut addr = vaddr;
        while !buffer.is_empty() {
            let offset = addr % PAGE_SIZE;
            let len = (PAGE_SIZE - offset).min(buffer.len());
            let (chunk, rest) = core::mem::take(&mut buffer).split_at_mut(len);
            self.page_op(asid, Vpn::containing(addr), false, |frame| {
                chunk.copy_from_slice(&frame[offset..offset + len]);
            })?;
            buffer = rest;
            addr += len;
        }
        Ok(())
    }

    /// Writes `data` into address space `asid` starting at virtual address
    /// `vaddr`.
    pub fn write_bytes(&self, asid: Asid, vaddr: usize, mut data: &[u8]) -> Result<(), AccessError> {
        let mut addr = vaddr;
        while !data.is_empty() {
            let offset = addr % PAGE_SIZE;
            let len = (PAGE_SIZE - offset).min(data.len());
            let (chunk, rest) = data.split_at(len);
            self.page_op(asid, Vpn::containing(addr), true, |frame| {
                frame[offset..offset + len].copy_from_slice(chunk);
            })?;
            data = rest;
            addr += len;
        }
        Ok(())
    }

    /// Translates one page reference and runs `op` on the resident frame.
    ///
    /// Loops through the hardware sequence until the reference lands:
    /// probe, refill on miss, fault on an unusable entry, retry.
    fn page_op(
        &self,
        asid: Asid,
        vpn: Vpn,
        write: bool,
        mut op: impl FnMut(&mut [u8]),
    ) -> Result<(), AccessError> {
        loop {
            let probed = self.tlb.lock().probe(asid, vpn);
            let Some(lo) = probed else {
                // TLB miss: the refill handler copies the entry for this
                // page out of the process's page table.
                let refilled = self.procs.with(asid, |p| {
                    if p.page_table().entry_for(vpn).hi().vpn() != vpn {
                        return false;
                    }
                    refill(p.page_table(), vpn, &mut self.tlb.lock());
                    true
                });
                match refilled {
                    Some(true) => continue,
                    Some(false) => return Err(AccessError::OutsideAddressSpace),
                    None => return Err(AccessError::Terminated(TrapReason::UnknownProcess)),
                }
            };

            if !lo.is_valid() || (write && !lo.is_dirty()) {
                let cause = if !lo.is_valid() {
                    if write {
                        FaultCause::InvalidStore
                    } else {
                        FaultCause::InvalidLoad
                    }
                } else {
                    FaultCause::Modification
                };
                match self.handle_fault(asid, cause, EntryHi::new(vpn, asid)) {
                    FaultOutcome::Resume => continue,
                    FaultOutcome::Terminated(reason) => {
                        return Err(AccessError::Terminated(reason));
                    }
                }
            }

            // Translation in hand: touch the frame under the pool lock,
            // re-checking occupancy in case an eviction won the race
            // between our probe and here.
            let mut pool = self.pool.lock();
            let current = FrameIndex::of_base_address(lo.frame_base())
                .filter(|f| f.as_usize() < pool.frame_count())
                .filter(|f| {
                    pool.record(*f).owner()
                        == Some(FrameOwner {
                            asid,
                            slot: vpn.page_slot(),
                        })
                });
            if let Some(frame) = current {
                op(pool.frame_mut(frame));
                return Ok(());
            }
            drop(pool);
            // Stale translation; discard it and re-run the sequence.
            self.tlb.lock().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        KUSEG_BASE_VPN, STACK_VPN,
        backing::{BackingStore, DeviceClass},
        device::FlashDevice,
        pager::Vmm,
    };
    use std::{boxed::Box, vec::Vec};

    fn vmm(frames: usize) -> Vmm {
        let mut store = BackingStore::new();
        store.attach(DeviceClass::Flash, Box::new(FlashDevice::new(256)));
        Vmm::with_frame_count(store, frames)
    }

    fn kuseg_addr(page: usize, offset: usize) -> usize {
        (KUSEG_BASE_VPN + page) * crate::PAGE_SIZE + offset
    }

    #[test]
    fn write_then_read_round_trips_in_memory() {
        let vmm = vmm(4);
        vmm.register_uproc(Asid::new(1), 0).unwrap();

        vmm.write_bytes(Asid::new(1), kuseg_addr(0, 100), b"hello").unwrap();
        let mut out = [0u8; 5];
        vmm.read_bytes(Asid::new(1), kuseg_addr(0, 100), &mut out).unwrap();
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn access_spanning_a_page_boundary() {
        let vmm = vmm(4);
        vmm.register_uproc(Asid::new(1), 0).unwrap();

        let data: Vec<u8> = (0u8..200).collect();
        let addr = kuseg_addr(1, crate::PAGE_SIZE - 80);
        vmm.write_bytes(Asid::new(1), addr, &data).unwrap();

        let mut out = vec![0u8; 200];
        vmm.read_bytes(Asid::new(1), addr, &mut out).unwrap();
        assert_eq!(out, data);
        // Both pages took a fault and are resident.
        assert!(vmm.resident_frame(Asid::new(1), Vpn::new(KUSEG_BASE_VPN + 1)).is_some());
        assert!(vmm.resident_frame(Asid::new(1), Vpn::new(KUSEG_BASE_VPN + 2)).is_some());
    }

    #[test]
    fn data_survives_eviction_and_refault() {
        // One frame: every access to a different page forces the previous
        // page out through the backing store.
        let vmm = vmm(1);
        vmm.register_uproc(Asid::new(1), 0).unwrap();

        vmm.write_bytes(Asid::new(1), kuseg_addr(0, 0), b"first").unwrap();
        vmm.write_bytes(Asid::new(1), kuseg_addr(1, 0), b"second").unwrap();
        vmm.write_bytes(Asid::new(1), kuseg_addr(2, 0), b"third").unwrap();

        let mut out = [0u8; 5];
        vmm.read_bytes(Asid::new(1), kuseg_addr(0, 0), &mut out).unwrap();
        assert_eq!(&out, b"first");
        let mut out = [0u8; 6];
        vmm.read_bytes(Asid::new(1), kuseg_addr(1, 0), &mut out).unwrap();
        assert_eq!(&out, b"second");
    }

    #[test]
    fn stack_page_is_reachable() {
        let vmm = vmm(2);
        vmm.register_uproc(Asid::new(1), 0).unwrap();

        let sp = STACK_VPN * crate::PAGE_SIZE + 0xF00;
        vmm.write_bytes(Asid::new(1), sp, &[1, 2, 3, 4]).unwrap();
        let mut out = [0u8; 4];
        vmm.read_bytes(Asid::new(1), sp, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn two_processes_do_not_observe_each_other() {
        let vmm = vmm(2);
        vmm.register_uproc(Asid::new(1), 0).unwrap();
        vmm.register_uproc(Asid::new(2), 0).unwrap();

        vmm.write_bytes(Asid::new(1), kuseg_addr(0, 0), b"one").unwrap();
        vmm.write_bytes(Asid::new(2), kuseg_addr(0, 0), b"two").unwrap();

        let mut out = [0u8; 3];
        vmm.read_bytes(Asid::new(1), kuseg_addr(0, 0), &mut out).unwrap();
        assert_eq!(&out, b"one");
        vmm.read_bytes(Asid::new(2), kuseg_addr(0, 0), &mut out).unwrap();
        assert_eq!(&out, b"two");
    }

    #[test]
    fn address_outside_the_layout_is_rejected() {
        let vmm = vmm(2);
        vmm.register_uproc(Asid::new(1), 0).unwrap();

        // Page 40 of kuseg hashes onto slot 8, whose entry belongs to
        // page 8; the reference can never be satisfied.
        let err = vmm
            .read_bytes(Asid::new(1), kuseg_addr(40, 0), &mut [0u8; 4])
            .unwrap_err();
        assert_eq!(err, AccessError::OutsideAddressSpace);
    }

    #[test]
    fn access_by_unknown_process_is_rejected() {
        let vmm = vmm(2);
        let err = vmm
            .read_bytes(Asid::new(5), kuseg_addr(0, 0), &mut [0u8; 1])
            .unwrap_err();
        assert_eq!(err, AccessError::Terminated(TrapReason::UnknownProcess));
    }
}
