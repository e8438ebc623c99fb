//! Memory-mapped window abstraction.
//!
//! The transfer engine never touches a raw device pointer. It talks to an
//! [`MmioWindow`], which moves one 8-byte unit per call, and windows are
//! created and released only through an [`MmioMapper`] (the ioremap /
//! iounmap pair of the platform).
//!
//! Two implementations ship with the crate:
//! - [`volatile::VolatileWindow`] / [`volatile::IdentityMapper`] for real
//!   hardware reachable through an identity mapping
//! - [`sim::SimulatedBus`] for host-side tests, backed by a byte array

pub mod sim;
pub mod volatile;

use core::fmt;

pub use sim::{BusAccess, SimulatedBus, SimulatedWindow};
pub use volatile::{IdentityMapper, VolatileWindow};

/// Native transfer granularity in bytes.
pub const UNIT_SIZE: usize = 8;

/// Size of the probe window (one page).
pub const PAGE_SIZE: usize = 4096;

/// A contiguous window of device address space.
///
/// Offsets are relative to the start of the window. Units are exchanged as
/// little-endian `u64` values so that a unit read followed by
/// `to_le_bytes()` reproduces the device's byte order on any host.
pub trait MmioWindow {
    /// Window length in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one unit.
    ///
    /// # Safety
    /// `offset` must be a multiple of [`UNIT_SIZE`] and
    /// `offset + UNIT_SIZE <= self.len()`.
    unsafe fn read_unit(&self, offset: usize) -> u64;

    /// Write one unit.
    ///
    /// # Safety
    /// Same contract as [`MmioWindow::read_unit`].
    unsafe fn write_unit(&mut self, offset: usize, value: u64);
}

/// Creates and releases windows over the device address space.
///
/// `unmap` consumes the window, so a released window cannot be touched or
/// released twice.
pub trait MmioMapper {
    type Window: MmioWindow;

    fn map(&mut self, base: u64, len: usize) -> Result<Self::Window, MapError>;

    fn unmap(&mut self, window: Self::Window);
}

/// Reasons a window could not be established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// Zero-length window requested
    ZeroLength,
    /// Base address is null or not unit-aligned
    BadAddress(u64),
    /// `base + len` wraps the address space
    AddressOverflow,
    /// Range not backed by the device
    BeyondDevice { base: u64, len: usize },
    /// The platform refused the mapping
    Unavailable,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroLength => write!(f, "Zero-length mapping requested"),
            Self::BadAddress(base) => write!(f, "Bad mapping base address {:#x}", base),
            Self::AddressOverflow => write!(f, "Mapping wraps the address space"),
            Self::BeyondDevice { base, len } => {
                write!(f, "Mapping {:#x}+{:#x} is beyond the device", base, len)
            }
            Self::Unavailable => write!(f, "Platform could not establish mapping"),
        }
    }
}

/// Shared sanity checks for mapper implementations.
pub(crate) fn check_map_request(base: u64, len: usize) -> Result<u64, MapError> {
    if len == 0 {
        return Err(MapError::ZeroLength);
    }
    if base % UNIT_SIZE as u64 != 0 {
        return Err(MapError::BadAddress(base));
    }
    base.checked_add(len as u64).ok_or(MapError::AddressOverflow)
}
