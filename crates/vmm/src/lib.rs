#![cfg_attr(not(test), no_std)]

//! # Procyon Virtual Memory Manager (VMM)
//!
//! The paging engine for the Procyon kernel's user processes (U-procs).
//! It transparently services references to pages that are not resident by
//! evicting a swap-pool frame (writing it back if modified) and loading the
//! needed page from the process's backing store, while keeping every page
//! table and the TLB consistent under concurrent faults. It provides:
//!
//! - Per-process flat page tables and the TLB-refill fast path.
//! - A globally locked swap pool with FIFO frame replacement.
//! - A register-level backing-store I/O adapter for flash and disk devices.
//! - An emulated machine model (RAM, TLB, devices) for testing on a host.

extern crate alloc;

mod access;
mod backing;
mod device;
mod entry;
mod irq;
mod numbers;
mod page_table;
mod pager;
mod process;
mod swap_pool;
mod tlb;

pub use access::AccessError;
pub use backing::{BackingStore, DeviceClass, IoError};
pub use device::{BackingDevice, DeviceCommand, DeviceStatus, DiskDevice, FlashDevice};
pub use entry::{EntryHi, EntryLo, PageTableEntry};
pub use irq::Interrupts;
pub use numbers::{Asid, FrameIndex, Vpn};
pub use page_table::PageTable;
pub use pager::{FaultCause, FaultOutcome, TrapReason, Vmm};
pub use process::{ProcessTable, RegistryError, UProc};
pub use swap_pool::{FrameOwner, FrameRecord, SwapPool};
pub use tlb::{Tlb, refill};

/// Size of one page and one frame, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Number of entries in each per-process page table.
///
/// The last slot is reserved for the process's single stack page.
pub const PAGE_TABLE_SIZE: usize = 32;

/// Number of frames in the swap pool at subsystem start-up.
pub const SWAP_POOL_SIZE: usize = 32;

/// Physical base address of the (contiguous) swap-pool paging area.
pub const SWAP_POOL_BASE: u32 = 0x2003_0000;

/// VPN of the first page of a U-proc's text/data area (start of kuseg).
pub const KUSEG_BASE_VPN: usize = 0x80000;

/// Distinguished VPN of a U-proc's single stack page.
///
/// The stack page is keyed by this VPN and always maps to the last page
/// table slot, not to its arithmetic modulo position.
pub const STACK_VPN: usize = 0xBFFFF;

/// Maximum number of concurrently registered U-procs.
pub const MAX_UPROCS: usize = 8;

/// Number of entries in the emulated TLB.
pub const TLB_ENTRIES: usize = 16;
