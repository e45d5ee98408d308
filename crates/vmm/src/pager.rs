//! The pager: page-fault servicing and the subsystem object.
//!
//! A fault is serviced under the single global swap-pool lock, which
//! totally orders eviction+load sequences across all processes: exactly one
//! fault is in flight at a time, because the multi-step update spans two
//! independently owned structures (the pool and an arbitrary page table)
//! and a second fault must never observe a frame mid-transition. The only
//! blocking points are that lock and the device waits inside the I/O
//! adapter.
//!
//! Lock order throughout the subsystem: swap pool, then a process slot,
//! then the TLB; never the reverse.

use crate::{
    SWAP_POOL_SIZE,
    backing::{BackingStore, IoError},
    entry::EntryHi,
    irq::Interrupts,
    numbers::{Asid, FrameIndex, Vpn},
    process::{ProcessTable, RegistryError},
    swap_pool::{FrameOwner, SwapPool},
    tlb::Tlb,
};
use spin::Mutex;

/// Why the hardware raised a TLB exception for a resolved-but-unusable
/// translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCause {
    /// A store hit an entry whose dirty (write-enable) bit is clear.
    Modification,
    /// A load hit an entry whose valid bit is clear.
    InvalidLoad,
    /// A store hit an entry whose valid bit is clear.
    InvalidStore,
}

/// Why a process was terminated by fault handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapReason {
    /// TLB-modification exceptions are unrecoverable by design.
    TlbModification,
    /// The faulting ASID names no registered process.
    UnknownProcess,
    /// Writing the victim page back to its owner's backing store failed.
    WriteBackFailed(IoError),
    /// Reading the missing page from the backing store failed.
    LoadFailed(IoError),
}

/// The result of servicing a fault. Every fault, once begun, runs to
/// completion: there is no retry loop and no cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// Re-execute the faulting instruction.
    Resume,
    /// The faulting process has been terminated.
    Terminated(TrapReason),
}

/// The virtual-memory subsystem instance.
///
/// Owns the swap pool (behind the global fault-serialization lock), the
/// U-proc registry, the backing-store adapter, the TLB, and the interrupt
/// mask.
pub struct Vmm {
    pub(crate) pool: Mutex<SwapPool>,
    pub(crate) procs: ProcessTable,
    pub(crate) store: BackingStore,
    pub(crate) tlb: Mutex<Tlb>,
    pub(crate) irq: Interrupts,
}

impl Vmm {
    /// Creates the subsystem with the default swap-pool size.
    pub fn new(store: BackingStore) -> Self {
        Self::with_frame_count(store, SWAP_POOL_SIZE)
    }

    /// Creates the subsystem with a swap pool of `frames` frames.
    pub fn with_frame_count(store: BackingStore, frames: usize) -> Self {
        Self {
            pool: Mutex::new(SwapPool::with_frame_count(frames)),
            procs: ProcessTable::new(),
            store,
            tlb: Mutex::new(Tlb::new()),
            irq: Interrupts::new(),
        }
    }

    /// Registers a U-proc whose backing store lives on `device`.
    pub fn register_uproc(&self, asid: Asid, device: usize) -> Result<(), RegistryError> {
        self.procs.register(asid, device)
    }

    /// Returns the number of swap-pool frames.
    pub fn frame_count(&self) -> usize {
        self.pool.lock().frame_count()
    }

    /// Returns the occupant recorded for `frame`.
    pub fn frame_owner(&self, frame: FrameIndex) -> Option<FrameOwner> {
        self.pool.lock().record(frame).owner()
    }

    /// Returns the frame where `vpn` of address space `asid` is resident,
    /// if it is.
    pub fn resident_frame(&self, asid: Asid, vpn: Vpn) -> Option<FrameIndex> {
        self.pool.lock().frame_of(FrameOwner {
            asid,
            slot: vpn.page_slot(),
        })
    }

    /// Services a TLB exception for the process `asid`, whose saved
    /// exception state carried `entry_hi`.
    ///
    /// Every path either terminates the process (with all locks released
    /// first) or resumes it at the faulting instruction.
    pub fn handle_fault(&self, asid: Asid, cause: FaultCause, entry_hi: EntryHi) -> FaultOutcome {
        // A TLB-modification exception is treated as a program trap.
        if cause == FaultCause::Modification {
            log::debug!("asid {asid}: TLB-modification fault, terminating");
            self.terminate(asid);
            return FaultOutcome::Terminated(TrapReason::TlbModification);
        }

        // Serialize all fault servicing system-wide.
        let mut pool = self.pool.lock();

        let vpn = entry_hi.vpn();
        let slot = vpn.page_slot();
        log::trace!("asid {asid}: page fault on vpn {:#x} (slot {slot})", vpn.as_usize());

        let Some(device) = self.procs.with(asid, |p| p.device()) else {
            drop(pool);
            return FaultOutcome::Terminated(TrapReason::UnknownProcess);
        };

        // A spurious fault on a page that is already resident needs no
        // I/O and must not claim a second frame; reinstall the
        // translation and resume. The reference path never produces one,
        // but direct callers can.
        if let Some(frame) = pool.frame_of(FrameOwner { asid, slot }) {
            self.irq.masked(|| {
                self.procs
                    .with(asid, |p| p.page_table_mut().entry_mut(slot).map_to(frame));
                self.tlb.lock().clear();
            });
            drop(pool);
            return FaultOutcome::Resume;
        }

        let victim = pool.select_victim();

        if let Some(owner) = pool.record(victim).owner() {
            if let Err(err) = self.evict(&mut pool, victim, owner) {
                // Observed behavior, preserved deliberately: a failing
                // write-back is fatal to the faulting process, not to the
                // victim's owner.
                drop(pool);
                log::debug!("asid {asid}: write-back of victim frame {victim} failed: {err:?}");
                self.terminate(asid);
                return FaultOutcome::Terminated(TrapReason::WriteBackFailed(err));
            }
        }

        // Load the missing page from the faulter's backing store.
        let block = BackingStore::page_block(asid, slot);
        if let Err(err) = self
            .store
            .read_page(&self.irq, device, block, pool.frame_mut(victim))
        {
            drop(pool);
            log::debug!("asid {asid}: load of vpn {:#x} failed: {err:?}", vpn.as_usize());
            self.terminate(asid);
            return FaultOutcome::Terminated(TrapReason::LoadFailed(err));
        }

        // Publish the new occupancy, then install the translation and
        // flush the TLB with interrupts masked so a device-completion
        // interrupt cannot observe the half-written state.
        pool.assign(victim, FrameOwner { asid, slot });
        self.irq.masked(|| {
            self.procs
                .with(asid, |p| p.page_table_mut().entry_mut(slot).map_to(victim));
            self.tlb.lock().clear();
        });

        log::trace!("asid {asid}: vpn {:#x} resident in frame {victim}", vpn.as_usize());
        FaultOutcome::Resume
    }

    /// Evicts the occupant of `victim`, leaving the frame free.
    ///
    /// Clears the owner's page table entry and flushes the TLB under
    /// interrupt masking, then writes the frame back to the owner's
    /// backing-store slot if the entry was dirty. An owner that no longer
    /// resolves, or whose entry no longer names this frame, is stale: the
    /// frame is reused without invalidation or write-back.
    fn evict(
        &self,
        pool: &mut SwapPool,
        victim: FrameIndex,
        owner: FrameOwner,
    ) -> Result<(), IoError> {
        let resolved = self.irq.masked(|| {
            let resolved = self
                .procs
                .with(owner.asid, |p| {
                    let entry = p.page_table_mut().entry_mut(owner.slot);
                    let lo = entry.lo();
                    if lo.is_valid() && lo.frame_base() == victim.base_address() {
                        entry.invalidate();
                        Some((p.device(), lo.is_dirty()))
                    } else {
                        None
                    }
                })
                .flatten();
            if resolved.is_some() {
                // Entries cannot be invalidated selectively by address
                // space, so the whole TLB goes.
                self.tlb.lock().clear();
            }
            resolved
        });

        if let Some((device, dirty)) = resolved {
            if dirty {
                let block = BackingStore::page_block(owner.asid, owner.slot);
                log::trace!(
                    "evicting frame {victim} (asid {} slot {}), writing back",
                    owner.asid,
                    owner.slot
                );
                self.store
                    .write_page(&self.irq, device, block, pool.frame(victim))?;
            }
        }
        pool.release(victim);
        Ok(())
    }

    /// Terminates the process `asid`: frees its swap-pool frames, clears
    /// its page table, removes it from the registry, and flushes the TLB.
    pub fn terminate(&self, asid: Asid) {
        let mut pool = self.pool.lock();
        pool.release_frames_of(asid);
        self.irq.masked(|| {
            if let Some(mut proc) = self.procs.remove(asid) {
                proc.page_table_mut().invalidate_all();
            }
            self.tlb.lock().clear();
        });
        log::debug!("asid {asid}: terminated, frames released");
    }
}
