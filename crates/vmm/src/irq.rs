//! The interrupt mask primitive.
//!
//! The pager masks interrupts around the handful of instructions that write
//! a page table entry and flush the TLB, and the I/O adapter masks them
//! while a device's registers are being programmed, so an asynchronous
//! device-completion interrupt can never observe a half-written state. The
//! mask is distinct from every lock in the subsystem.

use core::sync::atomic::{AtomicBool, Ordering};

/// Processor interrupt mask state.
pub struct Interrupts {
    masked: AtomicBool,
}

impl Interrupts {
    /// Creates the mask state with interrupts enabled.
    pub const fn new() -> Self {
        Self {
            masked: AtomicBool::new(false),
        }
    }

    /// Runs `f` with interrupts masked, restoring the previous state after.
    pub fn masked<R>(&self, f: impl FnOnce() -> R) -> R {
        let was = self.masked.swap(true, Ordering::AcqRel);
        let result = f();
        self.masked.store(was, Ordering::Release);
        result
    }

    /// Returns whether interrupts are currently masked.
    pub fn is_masked(&self) -> bool {
        self.masked.load(Ordering::Acquire)
    }
}

impl Default for Interrupts {
    fn default() -> Self {
        Self::new()
    }
}
