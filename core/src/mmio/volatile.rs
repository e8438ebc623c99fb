//! Volatile window over real device memory.
//!
//! # Safety
//! - Address must be valid MMIO address
//! - Address must be properly aligned
//! - Address must be mapped with device (uncached) attributes
//!
//! Every unit is a single `read_volatile` / `write_volatile` of a `u64`, so
//! the compiler can neither elide nor merge accesses, and they are issued
//! in program order.

use core::ptr::{self, NonNull};

use super::{check_map_request, MapError, MmioMapper, MmioWindow, UNIT_SIZE};

/// Raw pointer window with volatile 64-bit accesses.
pub struct VolatileWindow {
    base: NonNull<u8>,
    len: usize,
}

// Safety: the window is the only handle to its device range (the mapper
// hands out one window per range and takes it back on unmap), so moving it
// to another context cannot create aliased access.
unsafe impl Send for VolatileWindow {}

impl VolatileWindow {
    /// Wrap an already-mapped range.
    ///
    /// Returns `None` if `base` is null or not unit-aligned.
    ///
    /// # Safety
    /// `base..base + len` must be mapped device memory that stays mapped
    /// for the lifetime of the window, with no other live handle to it.
    pub unsafe fn new(base: *mut u8, len: usize) -> Option<Self> {
        if (base as usize) % UNIT_SIZE != 0 {
            return None;
        }
        NonNull::new(base).map(|base| Self { base, len })
    }
}

impl MmioWindow for VolatileWindow {
    fn len(&self) -> usize {
        self.len
    }

    #[inline]
    unsafe fn read_unit(&self, offset: usize) -> u64 {
        debug_assert!(offset % UNIT_SIZE == 0 && offset + UNIT_SIZE <= self.len);
        let addr = self.base.as_ptr().add(offset) as *const u64;
        u64::from_le(ptr::read_volatile(addr))
    }

    #[inline]
    unsafe fn write_unit(&mut self, offset: usize, value: u64) {
        debug_assert!(offset % UNIT_SIZE == 0 && offset + UNIT_SIZE <= self.len);
        let addr = self.base.as_ptr().add(offset) as *mut u64;
        ptr::write_volatile(addr, value.to_le());
    }
}

/// Mapper for platforms where device physical addresses are reachable at
/// the same virtual address (physical = virtual).
pub struct IdentityMapper {
    live: usize,
}

impl IdentityMapper {
    /// # Safety
    /// Every range later passed to [`MmioMapper::map`] must be identity
    /// mapped with device attributes and backed by the device.
    pub unsafe fn new() -> Self {
        Self { live: 0 }
    }

    /// Windows handed out and not yet returned.
    pub fn live_mappings(&self) -> usize {
        self.live
    }
}

impl MmioMapper for IdentityMapper {
    type Window = VolatileWindow;

    fn map(&mut self, base: u64, len: usize) -> Result<VolatileWindow, MapError> {
        let end = check_map_request(base, len)?;
        if usize::try_from(end).is_err() {
            return Err(MapError::AddressOverflow);
        }

        // Safety: `new` made the caller vouch for the identity mapping.
        let window = unsafe { VolatileWindow::new(base as usize as *mut u8, len) }
            .ok_or(MapError::BadAddress(base))?;
        self.live += 1;
        Ok(window)
    }

    fn unmap(&mut self, window: VolatileWindow) {
        drop(window);
        self.live = self.live.saturating_sub(1);
    }
}
