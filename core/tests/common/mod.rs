//! Common test utilities: GPT image builder, simulated bus and a plain
//! memory block device for cross-checking.

#![allow(dead_code)]

pub mod builder;
pub use builder::GptImageBuilder;

use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};
use piton_core::mmio::SimulatedBus;
use piton_core::{SdConfig, SdDevice};
use std::io;

/// Physical base used for simulated devices
pub const BASE: u64 = 0xf0_0000_0000;

/// Simulated card holding `image`.
pub fn bus_with_image(image: Vec<u8>) -> SimulatedBus {
    SimulatedBus::from_image(BASE, image)
}

/// Device over `image` plus a second handle on its bus.
pub fn device_with_image(image: Vec<u8>, config: SdConfig) -> (SimulatedBus, SdDevice<SimulatedBus>) {
    let bus = bus_with_image(image);
    let device = SdDevice::new(bus.clone(), config.with_base(BASE));
    (bus, device)
}

/// Deterministic pseudo-random bytes
pub fn pattern(len: usize, seed: u32) -> Vec<u8> {
    let mut x = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            x as u8
        })
        .collect()
}

/// In-memory block device for testing
#[derive(Debug, Clone)]
pub struct MemoryBlockDevice {
    pub data: Vec<u8>,
}

impl MemoryBlockDevice {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl BlockIo for MemoryBlockDevice {
    type Error = io::Error;

    fn block_size(&self) -> BlockSize {
        BlockSize::BS_512
    }

    fn num_blocks(&mut self) -> Result<u64, Self::Error> {
        Ok((self.data.len() / 512) as u64)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> Result<(), Self::Error> {
        let offset = start_lba.0 as usize * 512;
        if offset + dst.len() > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read beyond end of device",
            ));
        }
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
        Ok(())
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> Result<(), Self::Error> {
        let offset = start_lba.0 as usize * 512;
        if offset + src.len() > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write beyond end of device",
            ));
        }
        self.data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
