//! The swap pool: frame-ownership bookkeeping and FIFO replacement.
//!
//! The pool is the one globally locked structure of the paging engine. Its
//! records say which `(asid, page)` occupies each physical frame of the
//! paging area, and its replacement cursor is the only state the FIFO
//! eviction policy needs. The frame contents themselves live here too, so
//! that every byte of the paging area is mutated under the pool lock.

use crate::{
    PAGE_SIZE, SWAP_POOL_SIZE,
    numbers::{Asid, FrameIndex},
};
use alloc::{vec, vec::Vec};

/// The occupant of a swap-pool frame.
///
/// This is a lookup aid, not an owning reference: it is resolved through the
/// process registry at use time, and re-confirmed against the named page
/// table entry before anything is done with it. A record can therefore
/// outlive its process without dangling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOwner {
    /// The occupying process's address space.
    pub asid: Asid,
    /// The slot of the occupying page in that process's page table.
    pub slot: usize,
}

/// Bookkeeping for one physical frame of the paging area.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameRecord {
    owner: Option<FrameOwner>,
}

impl FrameRecord {
    /// Returns the occupant, or `None` if the frame is free.
    pub fn owner(&self) -> Option<FrameOwner> {
        self.owner
    }

    /// Returns true if no page occupies the frame.
    pub fn is_free(&self) -> bool {
        self.owner.is_none()
    }
}

/// The swap pool: one record per physical frame, the paging-area RAM, and
/// the FIFO replacement cursor.
///
/// Records are created once at subsystem start-up (all free) and are only
/// ever reassigned after that, never destroyed. Invariant: no two occupied
/// records name the same `(asid, slot)` pair.
pub struct SwapPool {
    records: Vec<FrameRecord>,
    /// Paging-area RAM, one page-sized buffer per frame.
    data: Vec<u8>,
    /// Next frame the FIFO policy will consider. Advances by one on every
    /// selection it satisfies; no other writer exists.
    cursor: usize,
}

impl SwapPool {
    /// Creates a pool with the default frame count.
    pub fn new() -> Self {
        Self::with_frame_count(SWAP_POOL_SIZE)
    }

    /// Creates a pool of `frames` physical frames, all free, with the
    /// replacement cursor at frame 0.
    pub fn with_frame_count(frames: usize) -> Self {
        assert!(frames > 0, "swap pool must have at least one frame");
        Self {
            records: vec![FrameRecord::default(); frames],
            data: vec![0u8; frames * PAGE_SIZE],
            cursor: 0,
        }
    }

    /// Returns the number of frames in the pool.
    pub fn frame_count(&self) -> usize {
        self.records.len()
    }

    /// Returns the record for `frame`.
    ///
    /// # Panics
    ///
    /// Panics if `frame` is out of range.
    pub fn record(&self, frame: FrameIndex) -> &FrameRecord {
        &self.records[frame.as_usize()]
    }

    /// Iterates over `(frame, record)` pairs.
    pub fn records(&self) -> impl Iterator<Item = (FrameIndex, &FrameRecord)> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| (FrameIndex::new(i), r))
    }

    /// Selects the frame the next page-in will use.
    ///
    /// A free frame is taken first, in scan order; when the scan hands out
    /// the frame the cursor points at, the cursor advances so the frame only
    /// comes up for replacement again after a full circulation. With no free
    /// frame, the cursor's frame is selected and the cursor advances: pure
    /// FIFO, not LRU. A hot page can still be evicted on its turn; that is
    /// an accepted approximation of this policy.
    pub fn select_victim(&mut self) -> FrameIndex {
        for (i, record) in self.records.iter().enumerate() {
            if record.is_free() {
                if i == self.cursor {
                    self.cursor = (self.cursor + 1) % self.records.len();
                }
                return FrameIndex::new(i);
            }
        }

        let selected = self.cursor;
        self.cursor = (self.cursor + 1) % self.records.len();
        FrameIndex::new(selected)
    }

    /// Records that `owner` now occupies `frame`.
    ///
    /// # Panics
    ///
    /// Panics if `frame` is out of range. Debug builds additionally check
    /// the uniqueness invariant: no other occupied record may already name
    /// the same owner.
    pub fn assign(&mut self, frame: FrameIndex, owner: FrameOwner) {
        debug_assert!(
            !self
                .records
                .iter()
                .enumerate()
                .any(|(i, r)| i != frame.as_usize() && r.owner == Some(owner)),
            "swap pool already holds a frame for {owner:?}"
        );
        self.records[frame.as_usize()].owner = Some(owner);
    }

    /// Marks `frame` free.
    pub fn release(&mut self, frame: FrameIndex) {
        self.records[frame.as_usize()].owner = None;
    }

    /// Marks every frame occupied by `asid` free, as process termination
    /// requires.
    pub fn release_frames_of(&mut self, asid: Asid) {
        for record in &mut self.records {
            if record.owner.map(|o| o.asid) == Some(asid) {
                record.owner = None;
            }
        }
    }

    /// Returns the frame occupied by `owner`, if any.
    pub fn frame_of(&self, owner: FrameOwner) -> Option<FrameIndex> {
        self.records
            .iter()
            .position(|r| r.owner == Some(owner))
            .map(FrameIndex::new)
    }

    /// Returns the contents of `frame`.
    pub fn frame(&self, frame: FrameIndex) -> &[u8] {
        let start = frame.as_usize() * PAGE_SIZE;
        &self.data[start..start + PAGE_SIZE]
    }

    /// Returns the contents of `frame`, mutably.
    pub fn frame_mut(&mut self, frame: FrameIndex) -> &mut [u8] {
        let start = frame.as_usize() * PAGE_SIZE;
        &mut self.data[start..start + PAGE_SIZE]
    }
}

impl Default for SwapPool {
    fn default() -> Self {
        Self::new()
    }
}
