//! Piton SD Core Library
//!
//! Storage core for the SD card region of the Piton FPGA system. The card
//! is exposed as a memory-mapped byte range; this crate discovers its size
//! from the GPT header and moves data between host buffers and the mapped
//! range.
//! Designed to be no_std compatible.

#![no_std]
#![allow(clippy::new_without_default)]

extern crate alloc;

pub mod device;
pub mod disk;
pub mod logger;
pub mod mmio;
pub mod transfer;

pub use device::block_io::{SdBlockIo, SdBlockIoError};
pub use device::{
    Capacity, DeviceError, DeviceStats, MappingState, SdConfig, SdDevice, SharedDevice,
};
pub use transfer::{Direction, Fragment, ScatterOutcome, ShortTransfer, TransferError};
