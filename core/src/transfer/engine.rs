//! MMIO transfer engine.
//!
//! Copies between one host buffer and a range of the mapped window, one
//! 8-byte unit at a time, in strictly increasing device address order.
//! The whole range is validated before the first unit is touched, so a
//! rejected call leaves both host and device memory untouched.

use super::{Direction, Fragment, Result, TransferError};
use crate::mmio::{MmioWindow, UNIT_SIZE};

/// Validate a `(offset, len)` request against `window`.
///
/// Returns the window-relative start offset.
pub fn check_range<W: MmioWindow>(window: &W, offset: u64, len: usize) -> Result<usize> {
    if len % UNIT_SIZE != 0 {
        return Err(TransferError::InvalidLength { len });
    }
    if offset % UNIT_SIZE as u64 != 0 {
        return Err(TransferError::UnalignedOffset { offset });
    }

    let out_of_range = TransferError::OutOfRange {
        offset,
        len,
        window: window.len(),
    };
    let start = usize::try_from(offset).map_err(|_| out_of_range)?;
    let end = start.checked_add(len).ok_or(out_of_range)?;
    if end > window.len() {
        return Err(out_of_range);
    }
    Ok(start)
}

/// Copy `dst.len()` bytes from the device at `offset` into `dst`.
pub fn read<W: MmioWindow>(window: &W, offset: u64, dst: &mut [u8]) -> Result<usize> {
    let start = check_range(window, offset, dst.len())?;

    for (i, unit) in dst.chunks_exact_mut(UNIT_SIZE).enumerate() {
        // Safety: check_range proved the range is aligned and inside the window.
        let value = unsafe { window.read_unit(start + i * UNIT_SIZE) };
        unit.copy_from_slice(&value.to_le_bytes());
    }
    Ok(dst.len())
}

/// Copy `src` to the device at `offset`.
pub fn write<W: MmioWindow>(window: &mut W, offset: u64, src: &[u8]) -> Result<usize> {
    let start = check_range(window, offset, src.len())?;

    for (i, unit) in src.chunks_exact(UNIT_SIZE).enumerate() {
        let mut bytes = [0u8; UNIT_SIZE];
        bytes.copy_from_slice(unit);
        // Safety: check_range proved the range is aligned and inside the window.
        unsafe { window.write_unit(start + i * UNIT_SIZE, u64::from_le_bytes(bytes)) };
    }
    Ok(src.len())
}

/// Run one fragment in its own direction.
pub fn transfer<W: MmioWindow>(
    window: &mut W,
    offset: u64,
    fragment: &mut Fragment<'_>,
) -> Result<usize> {
    match fragment {
        Fragment::Read(dst) => read(window, offset, dst),
        Fragment::Write(src) => write(window, offset, src),
    }
}

/// Like [`transfer`], but rejects a fragment whose direction is not
/// `direction`. The buffer is reported as fragment 0 of a one-element
/// request.
pub fn transfer_checked<W: MmioWindow>(
    window: &mut W,
    direction: Direction,
    offset: u64,
    fragment: &mut Fragment<'_>,
) -> Result<usize> {
    if fragment.direction() != direction {
        return Err(TransferError::DirectionMismatch { index: 0 });
    }
    transfer(window, offset, fragment)
}
