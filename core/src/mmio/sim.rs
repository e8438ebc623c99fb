//! Host-side simulation of the mapped SD region.
//!
//! A [`SimulatedBus`] owns a byte array standing in for the device and acts
//! as the mapper. Every window it hands out views the same array, so data
//! written through the full-size window is visible through a later probe
//! window and vice versa. The bus also keeps the bookkeeping tests need:
//! live mapping count, map/unmap calls, unit writes and an optional
//! access trace.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use super::{check_map_request, MapError, MmioMapper, MmioWindow, UNIT_SIZE};

/// One recorded unit access, as an offset from the device base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusAccess {
    Read(usize),
    Write(usize),
}

struct BusState {
    memory: Vec<u8>,
    live: usize,
    map_calls: usize,
    unmap_calls: usize,
    unit_writes: usize,
    /// Successful maps allowed before `map` starts failing
    map_budget: Option<usize>,
    mapped_lens: Vec<usize>,
    trace: Option<Vec<BusAccess>>,
}

/// Simulated device region plus mapper.
///
/// Cloning yields another handle to the same device, which is how a test
/// keeps inspecting memory after handing the mapper to a device instance.
#[derive(Clone)]
pub struct SimulatedBus {
    base: u64,
    state: Arc<Mutex<BusState>>,
}

impl SimulatedBus {
    /// Zero-filled device of `size` bytes at `base`.
    pub fn new(base: u64, size: usize) -> Self {
        Self::from_image(base, vec![0u8; size])
    }

    /// Device whose contents are `image`.
    pub fn from_image(base: u64, image: Vec<u8>) -> Self {
        Self {
            base,
            state: Arc::new(Mutex::new(BusState {
                memory: image,
                live: 0,
                map_calls: 0,
                unmap_calls: 0,
                unit_writes: 0,
                map_budget: None,
                mapped_lens: Vec::new(),
                trace: None,
            })),
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.state.lock().memory.len()
    }

    /// Allow `count` more successful maps, then fail with
    /// [`MapError::Unavailable`]. `None` removes the limit.
    pub fn set_map_budget(&self, count: Option<usize>) {
        self.state.lock().map_budget = count;
    }

    pub fn live_mappings(&self) -> usize {
        self.state.lock().live
    }

    pub fn map_calls(&self) -> usize {
        self.state.lock().map_calls
    }

    pub fn unmap_calls(&self) -> usize {
        self.state.lock().unmap_calls
    }

    /// Lengths of every successful mapping, in order.
    pub fn mapped_lens(&self) -> Vec<usize> {
        self.state.lock().mapped_lens.clone()
    }

    /// Unit writes performed through any window.
    pub fn unit_writes(&self) -> usize {
        self.state.lock().unit_writes
    }

    /// Start recording unit accesses (clears any previous trace).
    pub fn enable_trace(&self) {
        self.state.lock().trace = Some(Vec::new());
    }

    pub fn take_trace(&self) -> Vec<BusAccess> {
        self.state.lock().trace.take().unwrap_or_default()
    }

    /// Copy device bytes at `offset` into `dst`, bypassing any window.
    pub fn peek(&self, offset: usize, dst: &mut [u8]) {
        let state = self.state.lock();
        dst.copy_from_slice(&state.memory[offset..offset + dst.len()]);
    }

    /// Overwrite device bytes at `offset`, bypassing any window.
    pub fn poke(&self, offset: usize, src: &[u8]) {
        let mut state = self.state.lock();
        state.memory[offset..offset + src.len()].copy_from_slice(src);
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.state.lock().memory.clone()
    }
}

impl MmioMapper for SimulatedBus {
    type Window = SimulatedWindow;

    fn map(&mut self, base: u64, len: usize) -> Result<SimulatedWindow, MapError> {
        let end = check_map_request(base, len)?;
        let mut state = self.state.lock();
        state.map_calls += 1;

        if let Some(budget) = state.map_budget {
            if budget == 0 {
                return Err(MapError::Unavailable);
            }
            state.map_budget = Some(budget - 1);
        }

        let device_end = self.base + state.memory.len() as u64;
        if base < self.base || end > device_end {
            return Err(MapError::BeyondDevice { base, len });
        }

        state.live += 1;
        state.mapped_lens.push(len);
        Ok(SimulatedWindow {
            state: self.state.clone(),
            start: (base - self.base) as usize,
            len,
        })
    }

    fn unmap(&mut self, window: SimulatedWindow) {
        let mut state = self.state.lock();
        state.unmap_calls += 1;
        state.live = state.live.saturating_sub(1);
        drop(window);
    }
}

/// A window handed out by [`SimulatedBus`].
pub struct SimulatedWindow {
    state: Arc<Mutex<BusState>>,
    /// Offset of the window inside the device
    start: usize,
    len: usize,
}

impl MmioWindow for SimulatedWindow {
    fn len(&self) -> usize {
        self.len
    }

    unsafe fn read_unit(&self, offset: usize) -> u64 {
        debug_assert!(offset % UNIT_SIZE == 0 && offset + UNIT_SIZE <= self.len);
        let mut state = self.state.lock();
        let at = self.start + offset;
        if let Some(trace) = state.trace.as_mut() {
            trace.push(BusAccess::Read(at));
        }
        let mut unit = [0u8; UNIT_SIZE];
        unit.copy_from_slice(&state.memory[at..at + UNIT_SIZE]);
        u64::from_le_bytes(unit)
    }

    unsafe fn write_unit(&mut self, offset: usize, value: u64) {
        debug_assert!(offset % UNIT_SIZE == 0 && offset + UNIT_SIZE <= self.len);
        let mut state = self.state.lock();
        let at = self.start + offset;
        if let Some(trace) = state.trace.as_mut() {
            trace.push(BusAccess::Write(at));
        }
        state.unit_writes += 1;
        state.memory[at..at + UNIT_SIZE].copy_from_slice(&value.to_le_bytes());
    }
}
