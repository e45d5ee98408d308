//! The U-proc registry.
//!
//! The registry maps ASIDs to live processes and their page tables. The
//! swap pool's frame records name their occupants indirectly as
//! `(asid, slot)` pairs; resolving one goes through this registry at use
//! time and is re-confirmed against the entry itself, so a record can never
//! dangle after its process has terminated.

use crate::{MAX_UPROCS, numbers::Asid, page_table::PageTable};
use spin::Mutex;

/// Errors raised when registering a U-proc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The ASID does not name one of the registry's slots.
    AsidOutOfRange,
    /// A process with that ASID is already registered.
    AlreadyRegistered,
}

/// A registered user process, from the paging engine's point of view: its
/// identity, its backing-store device, and its private page table.
pub struct UProc {
    asid: Asid,
    device: usize,
    page_table: PageTable,
}

impl UProc {
    /// Creates a U-proc with a freshly seeded page table.
    pub fn new(asid: Asid, device: usize) -> Self {
        Self {
            asid,
            device,
            page_table: PageTable::new(asid),
        }
    }

    /// Returns the process's address-space identifier.
    pub fn asid(&self) -> Asid {
        self.asid
    }

    /// Returns the number of the device holding this process's backing
    /// store.
    pub fn device(&self) -> usize {
        self.device
    }

    /// Returns the process's page table.
    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    /// Returns the process's page table, mutably.
    pub fn page_table_mut(&mut self) -> &mut PageTable {
        &mut self.page_table
    }
}

/// The fixed-capacity table of registered U-procs, one independently
/// locked slot per ASID.
pub struct ProcessTable {
    slots: [Mutex<Option<UProc>>; MAX_UPROCS],
}

impl ProcessTable {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Mutex::new(None)),
        }
    }

    /// Registers a new U-proc under `asid`, paging against `device`.
    pub fn register(&self, asid: Asid, device: usize) -> Result<(), RegistryError> {
        let slot = self
            .slots
            .get(asid.index())
            .ok_or(RegistryError::AsidOutOfRange)?;
        let mut slot = slot.lock();
        if slot.is_some() {
            return Err(RegistryError::AlreadyRegistered);
        }
        *slot = Some(UProc::new(asid, device));
        Ok(())
    }

    /// Runs `f` on the process registered under `asid`, if any, holding
    /// its slot lock for the duration.
    pub fn with<R>(&self, asid: Asid, f: impl FnOnce(&mut UProc) -> R) -> Option<R> {
        let slot = self.slots.get(asid.index())?;
        let mut slot = slot.lock();
        slot.as_mut().map(f)
    }

    /// Removes and returns the process registered under `asid`.
    pub fn remove(&self, asid: Asid) -> Option<UProc> {
        let slot = self.slots.get(asid.index())?;
        slot.lock().take()
    }

    /// Returns whether a process is registered under `asid`.
    pub fn is_registered(&self, asid: Asid) -> bool {
        self.slots
            .get(asid.index())
            .is_some_and(|slot| slot.lock().is_some())
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_look_up() {
        let procs = ProcessTable::new();
        procs.register(Asid::new(1), 0).unwrap();
        assert!(procs.is_registered(Asid::new(1)));
        assert!(!procs.is_registered(Asid::new(2)));

        let asid = procs.with(Asid::new(1), |p| p.asid()).unwrap();
        assert_eq!(asid, Asid::new(1));
    }

    #[test]
    fn double_registration_is_rejected() {
        let procs = ProcessTable::new();
        procs.register(Asid::new(3), 0).unwrap();
        assert_eq!(
            procs.register(Asid::new(3), 1),
            Err(RegistryError::AlreadyRegistered)
        );
    }

    #[test]
    fn asid_beyond_capacity_is_rejected() {
        let procs = ProcessTable::new();
        assert_eq!(
            procs.register(Asid::new(MAX_UPROCS + 1), 0),
            Err(RegistryError::AsidOutOfRange)
        );
    }

    #[test]
    fn remove_unregisters() {
        let procs = ProcessTable::new();
        procs.register(Asid::new(2), 0).unwrap();
        let proc = procs.remove(Asid::new(2)).unwrap();
        assert_eq!(proc.asid(), Asid::new(2));
        assert!(!procs.is_registered(Asid::new(2)));
        assert!(procs.remove(Asid::new(2)).is_none());
    }

    #[test]
    fn uproc_starts_with_an_invalid_table() {
        let proc = UProc::new(Asid::new(5), 2);
        assert_eq!(proc.device(), 2);
        for i in 0..crate::PAGE_TABLE_SIZE {
            assert!(!proc.page_table().entry(i).lo().is_valid());
        }
    }
}
