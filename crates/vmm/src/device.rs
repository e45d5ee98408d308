//! Secondary-storage devices at the register level.
//!
//! A device is driven through a command word encoding the operation and the
//! target block, and reports a status word whose READY value signals
//! success. The DATA1 register carries the device's capacity or geometry;
//! the DATA0 register would carry the physical DMA buffer address, which
//! the emulated devices receive as the page-sized buffer passed to
//! [`BackingDevice::issue`]. Two emulated device types are provided: a
//! flash device addressed directly by block number, and a disk addressed by
//! cylinder/head/sector with an explicit seek.

use crate::PAGE_SIZE;
use alloc::{vec, vec::Vec};

/// Completion status of a device operation.
///
/// Anything other than `Ready` surfaces as an error to the pager, which
/// treats it as fatal for the requesting process. There is exactly one
/// attempt, no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// The operation completed successfully.
    Ready,
    /// The command word named an operation the device does not have.
    IllegalOperation,
    /// The device was already executing a command.
    Busy,
    /// A disk seek named a cylinder beyond the last one.
    SeekError,
    /// The device could not read the addressed block.
    ReadError,
    /// The device could not write the addressed block.
    WriteError,
}

impl DeviceStatus {
    /// Returns the raw status-register value.
    pub const fn code(self) -> u32 {
        match self {
            Self::Ready => 1,
            Self::IllegalOperation => 2,
            Self::Busy => 3,
            Self::SeekError => 4,
            Self::ReadError => 5,
            Self::WriteError => 6,
        }
    }
}

/// A device command word: `(blockNumber << shift) | opcode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct DeviceCommand(u32);

impl DeviceCommand {
    const OPCODE_MASK: u32 = 0xFF;
    const BLOCK_SHIFT: u32 = 8;
    const SECT_SHIFT: u32 = 8;
    const SECT_MASK: u32 = 0xFF;
    const HEAD_SHIFT: u32 = 16;
    const HEAD_MASK: u32 = 0xFF;

    /// Flash: read one block.
    pub const READ_BLOCK: u32 = 2;
    /// Flash: write one block.
    pub const WRITE_BLOCK: u32 = 3;
    /// Disk: seek to a cylinder.
    pub const SEEK_CYL: u32 = 2;
    /// Disk: read the addressed sector of the current cylinder.
    pub const DISK_READ: u32 = 3;
    /// Disk: write the addressed sector of the current cylinder.
    pub const DISK_WRITE: u32 = 4;

    /// Encodes a flash block read.
    pub const fn read_block(block: usize) -> Self {
        Self(((block as u32) << Self::BLOCK_SHIFT) | Self::READ_BLOCK)
    }

    /// Encodes a flash block write.
    pub const fn write_block(block: usize) -> Self {
        Self(((block as u32) << Self::BLOCK_SHIFT) | Self::WRITE_BLOCK)
    }

    /// Encodes a disk seek.
    pub const fn seek(cylinder: usize) -> Self {
        Self(((cylinder as u32) << Self::BLOCK_SHIFT) | Self::SEEK_CYL)
    }

    /// Encodes a disk sector read.
    pub const fn disk_read(head: usize, sector: usize) -> Self {
        Self(
            ((head as u32) << Self::HEAD_SHIFT)
                | ((sector as u32) << Self::SECT_SHIFT)
                | Self::DISK_READ,
        )
    }

    /// Encodes a disk sector write.
    pub const fn disk_write(head: usize, sector: usize) -> Self {
        Self(
            ((head as u32) << Self::HEAD_SHIFT)
                | ((sector as u32) << Self::SECT_SHIFT)
                | Self::DISK_WRITE,
        )
    }

    /// Returns the opcode field.
    pub const fn opcode(self) -> u32 {
        self.0 & Self::OPCODE_MASK
    }

    /// Returns the block (or cylinder) field.
    pub const fn block(self) -> usize {
        (self.0 >> Self::BLOCK_SHIFT) as usize
    }

    /// Returns the sector field of a disk transfer command.
    pub const fn sector(self) -> usize {
        ((self.0 >> Self::SECT_SHIFT) & Self::SECT_MASK) as usize
    }

    /// Returns the head field of a disk transfer command.
    pub const fn head(self) -> usize {
        ((self.0 >> Self::HEAD_SHIFT) & Self::HEAD_MASK) as usize
    }

    /// Returns the raw command word.
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// The register-level interface of a secondary-storage device.
///
/// Implementations execute synchronously: `issue` returns once the
/// operation the caller would block on has completed. The buffer stands in
/// for the DMA target the DATA0 register would name and must be one page.
pub trait BackingDevice: Send {
    /// Returns the DATA1 register: capacity for a flash device, packed
    /// geometry for a disk.
    fn data1(&self) -> u32;

    /// Programs the command register and waits for completion, returning
    /// the final status-register value.
    fn issue(&mut self, command: DeviceCommand, buffer: &mut [u8]) -> DeviceStatus;
}

/// An emulated flash device: a flat array of page-sized blocks, addressed
/// directly by block number.
pub struct FlashDevice {
    data: Vec<u8>,
    blocks: usize,
    fail_next: Option<DeviceStatus>,
}

impl FlashDevice {
    /// Creates a flash device of `blocks` zeroed blocks.
    pub fn new(blocks: usize) -> Self {
        Self {
            data: vec![0u8; blocks * PAGE_SIZE],
            blocks,
            fail_next: None,
        }
    }

    /// Seeds `block` with up to one page of `contents`, as flashing an
    /// image would.
    ///
    /// # Panics
    ///
    /// Panics if `block` is out of range or `contents` exceeds one page.
    pub fn load_block(&mut self, block: usize, contents: &[u8]) {
        assert!(block < self.blocks, "block out of range");
        assert!(contents.len() <= PAGE_SIZE, "contents exceed one block");
        let start = block * PAGE_SIZE;
        self.data[start..start + contents.len()].copy_from_slice(contents);
    }

    /// Returns the stored contents of `block`.
    ///
    /// # Panics
    ///
    /// Panics if `block` is out of range.
    pub fn block(&self, block: usize) -> &[u8] {
        assert!(block < self.blocks, "block out of range");
        &self.data[block * PAGE_SIZE..(block + 1) * PAGE_SIZE]
    }

    /// Makes the next issued command complete with `status` instead of
    /// executing.
    pub fn fail_next(&mut self, status: DeviceStatus) {
        self.fail_next = Some(status);
    }
}

impl BackingDevice for FlashDevice {
    fn data1(&self) -> u32 {
        self.blocks as u32
    }

    fn issue(&mut self, command: DeviceCommand, buffer: &mut [u8]) -> DeviceStatus {
        debug_assert_eq!(buffer.len(), PAGE_SIZE, "DMA buffer must be one page");
        if let Some(status) = self.fail_next.take() {
            return status;
        }

        let block = command.block();
        match command.opcode() {
            DeviceCommand::READ_BLOCK if block < self.blocks => {
                let start = block * PAGE_SIZE;
                buffer.copy_from_slice(&self.data[start..start + PAGE_SIZE]);
                DeviceStatus::Ready
            }
            DeviceCommand::READ_BLOCK => DeviceStatus::ReadError,
            DeviceCommand::WRITE_BLOCK if block < self.blocks => {
                let start = block * PAGE_SIZE;
                self.data[start..start + PAGE_SIZE].copy_from_slice(buffer);
                DeviceStatus::Ready
            }
            DeviceCommand::WRITE_BLOCK => DeviceStatus::WriteError,
            _ => DeviceStatus::IllegalOperation,
        }
    }
}

/// An emulated cylinder/head/sector disk.
///
/// Transfers address a sector of the cylinder last seeked to; the seek is a
/// separate command, as on the real controller.
pub struct DiskDevice {
    cylinders: usize,
    heads: usize,
    sectors: usize,
    current_cylinder: usize,
    data: Vec<u8>,
    fail_next: Option<DeviceStatus>,
}

impl DiskDevice {
    const MAXCYL_SHIFT: u32 = 16;
    const MAXHEAD_SHIFT: u32 = 8;

    /// Creates a zeroed disk with the given geometry.
    pub fn new(cylinders: usize, heads: usize, sectors: usize) -> Self {
        assert!(
            cylinders > 0 && heads > 0 && sectors > 0,
            "disk geometry must be non-zero"
        );
        Self {
            cylinders,
            heads,
            sectors,
            current_cylinder: 0,
            data: vec![0u8; cylinders * heads * sectors * PAGE_SIZE],
            fail_next: None,
        }
    }

    /// Makes the next issued command complete with `status` instead of
    /// executing.
    pub fn fail_next(&mut self, status: DeviceStatus) {
        self.fail_next = Some(status);
    }

    fn sector_range(&self, head: usize, sector: usize) -> Option<core::ops::Range<usize>> {
        if head >= self.heads || sector >= self.sectors {
            return None;
        }
        let linear = (self.current_cylinder * self.heads + head) * self.sectors + sector;
        let start = linear * PAGE_SIZE;
        Some(start..start + PAGE_SIZE)
    }
}

impl BackingDevice for DiskDevice {
    fn data1(&self) -> u32 {
        ((self.cylinders as u32) << Self::MAXCYL_SHIFT)
            | ((self.heads as u32) << Self::MAXHEAD_SHIFT)
            | self.sectors as u32
    }

    fn issue(&mut self, command: DeviceCommand, buffer: &mut [u8]) -> DeviceStatus {
        debug_assert_eq!(buffer.len(), PAGE_SIZE, "DMA buffer must be one page");
        if let Some(status) = self.fail_next.take() {
            return status;
        }

        match command.opcode() {
            DeviceCommand::SEEK_CYL => {
                let cylinder = command.block();
                if cylinder >= self.cylinders {
                    return DeviceStatus::SeekError;
                }
                self.current_cylinder = cylinder;
                DeviceStatus::Ready
            }
            DeviceCommand::DISK_READ => match self.sector_range(command.head(), command.sector()) {
                Some(range) => {
                    buffer.copy_from_slice(&self.data[range]);
                    DeviceStatus::Ready
                }
                None => DeviceStatus::ReadError,
            },
            DeviceCommand::DISK_WRITE => match self.sector_range(command.head(), command.sector()) {
                Some(range) => {
                    self.data[range].copy_from_slice(buffer);
                    DeviceStatus::Ready
                }
                None => DeviceStatus::WriteError,
            },
            _ => DeviceStatus::IllegalOperation,
        }
    }
}
