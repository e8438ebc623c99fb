//! `gpt_disk_io::BlockIo` adapter for an initialized [`SdDevice`].
//!
//! Lets any `gpt_disk_io::Disk` consumer (partition scanners, filesystem
//! readers) use the card. Every call becomes one single-fragment block
//! request, so the adapter adds no buffering of its own.
//!
//! ```ignore
//! let mut io = SdBlockIo::new(&mut device)?;
//! let mut disk = gpt_disk_io::Disk::new(io)?;
//! let header = disk.read_primary_gpt_header(&mut [0u8; 512])?;
//! ```

use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};

use super::{DeviceError, SdDevice};
use crate::disk::gpt::BLOCK_SIZE;
use crate::log_warn;
use crate::logger::LogSource;
use crate::mmio::MmioMapper;
use crate::transfer::{Direction, Fragment};

/// Error type for SD BlockIo operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdBlockIoError {
    /// Underlying device error
    Device(DeviceError),
    /// Buffer is not a whole number of blocks
    BufferAlignment,
    /// Request runs past the last block
    OutOfRange { lba: u64, blocks: u64 },
}

impl core::fmt::Display for SdBlockIoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Device(e) => write!(f, "SD device error: {}", e),
            Self::BufferAlignment => write!(f, "Buffer is not a multiple of the block size"),
            Self::OutOfRange { lba, blocks } => {
                write!(f, "Blocks {}+{} past end of device", lba, blocks)
            }
        }
    }
}

impl From<DeviceError> for SdBlockIoError {
    fn from(e: DeviceError) -> Self {
        Self::Device(e)
    }
}

pub struct SdBlockIo<'a, M: MmioMapper> {
    device: &'a mut SdDevice<M>,
    num_blocks: u64,
}

impl<'a, M: MmioMapper> SdBlockIo<'a, M> {
    /// Fails with `NotReady` unless the device is fully mapped.
    pub fn new(device: &'a mut SdDevice<M>) -> Result<Self, SdBlockIoError> {
        let num_blocks = device
            .capacity()
            .map(|c| c.blocks)
            .ok_or(DeviceError::NotReady)?;
        Ok(Self { device, num_blocks })
    }

    fn check(&self, start_lba: Lba, len: usize) -> Result<(), SdBlockIoError> {
        if len % BLOCK_SIZE != 0 {
            log_warn!(LogSource::Block, "buffer of {} bytes is not whole blocks", len);
            return Err(SdBlockIoError::BufferAlignment);
        }
        let blocks = (len / BLOCK_SIZE) as u64;
        let in_range = start_lba
            .0
            .checked_add(blocks)
            .map_or(false, |end| end <= self.num_blocks);
        if !in_range {
            log_warn!(
                LogSource::Block,
                "lba {}+{} past {} blocks",
                start_lba.0,
                blocks,
                self.num_blocks
            );
            return Err(SdBlockIoError::OutOfRange {
                lba: start_lba.0,
                blocks,
            });
        }
        Ok(())
    }
}

impl<'a, M: MmioMapper> BlockIo for SdBlockIo<'a, M> {
    type Error = SdBlockIoError;

    fn block_size(&self) -> BlockSize {
        BlockSize::BS_512
    }

    fn num_blocks(&mut self) -> Result<u64, Self::Error> {
        Ok(self.num_blocks)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> Result<(), Self::Error> {
        self.check(start_lba, dst.len())?;
        if dst.is_empty() {
            return Ok(());
        }
        self.device
            .submit_block_io(Direction::Read, start_lba.0, Fragment::Read(dst))?;
        Ok(())
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> Result<(), Self::Error> {
        self.check(start_lba, src.len())?;
        if src.is_empty() {
            return Ok(());
        }
        self.device
            .submit_block_io(Direction::Write, start_lba.0, Fragment::Write(src))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        // Writes land in device memory directly
        Ok(())
    }
}
