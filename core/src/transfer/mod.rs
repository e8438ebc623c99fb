//! Data movement between host buffers and the mapped device.
//!
//! - [`engine`] moves one contiguous buffer, unit by unit
//! - [`scatter`] walks an ordered fragment list over a linear device range

pub mod engine;
pub mod scatter;

use core::fmt;

pub use scatter::{ScatterOutcome, ShortTransfer};

/// Result type for transfer operations
pub type Result<T> = core::result::Result<T, TransferError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device to host
    Read,
    /// Host to device
    Write,
}

impl Direction {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// One host buffer of a transfer. The variant fixes the direction and the
/// slice length is the number of bytes to move.
#[derive(Debug)]
pub enum Fragment<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

impl Fragment<'_> {
    pub fn direction(&self) -> Direction {
        match self {
            Self::Read(_) => Direction::Read,
            Self::Write(_) => Direction::Write,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Read(buf) => buf.len(),
            Self::Write(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Errors from a transfer call. None of them are retried at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// Length is not a multiple of the transfer unit
    InvalidLength { len: usize },
    /// Device offset is not unit-aligned
    UnalignedOffset { offset: u64 },
    /// Range falls outside the mapped window
    OutOfRange { offset: u64, len: usize, window: usize },
    /// Fragment direction differs from the request direction
    DirectionMismatch { index: usize },
    /// Scatter fragment is not a whole number of units. `short` is the
    /// accounting mismatch of the rejected list, if any.
    FragmentLength {
        index: usize,
        len: usize,
        short: Option<ShortTransfer>,
    },
    /// Fragment accounting mismatch, raised only by strict callers
    ShortTransfer(ShortTransfer),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength { len } => {
                write!(f, "Transfer length {} is not a multiple of the unit size", len)
            }
            Self::UnalignedOffset { offset } => {
                write!(f, "Device offset {:#x} is not unit-aligned", offset)
            }
            Self::OutOfRange { offset, len, window } => write!(
                f,
                "Transfer {:#x}+{:#x} outside {:#x}-byte window",
                offset, len, window
            ),
            Self::DirectionMismatch { index } => {
                write!(f, "Fragment {} direction differs from request", index)
            }
            Self::FragmentLength { index, len, short } => {
                write!(f, "Fragment {} length {} is not a multiple of the unit size", index, len)?;
                match short {
                    Some(short) => write!(f, " ({})", short),
                    None => Ok(()),
                }
            }
            Self::ShortTransfer(short) => write!(f, "{}", short),
        }
    }
}
