//! Device capacity and mapping manager.
//!
//! One [`SdDevice`] per attached card region. It owns the mapper and the
//! single live window, and walks the mapping state machine:
//!
//! ```text
//!   Unmapped --map one page--> ProbeMapped --read LBA 1, parse-->
//!       unmap probe, map (backup_lba + 1) * 512 --> FullyMapped
//!   FullyMapped --teardown--> Unmapped
//! ```
//!
//! A failed probe read or parse releases the probe window before the error
//! is returned, so the device never reaches `FullyMapped` without a valid
//! header. Teardown can be called any number of times.

pub mod block_io;

use alloc::vec;
use core::fmt;

use crate::disk::gpt::{
    self, GptHeader, GptPolicy, ParseError, BLOCK_SIZE, GPT_HEADER_LBA,
};
use crate::disk::partition::{self, PartitionTable};
use crate::logger::LogSource;
use crate::mmio::{MapError, MmioMapper, MmioWindow, PAGE_SIZE};
use crate::transfer::{
    engine, scatter, Direction, Fragment, ScatterOutcome, ShortTransfer, TransferError,
};
use crate::{log_debug, log_error, log_info, log_warn};

/// Physical base of the SD region on the reference FPGA system
pub const DEFAULT_BASE_ADDR: u64 = 0xf0_0000_0000;

/// Result type for device operations
pub type Result<T> = core::result::Result<T, DeviceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// The platform could not establish a window
    MapFailed(MapError),
    /// GPT header or entry array rejected
    Gpt(ParseError),
    /// A transfer call violated its contract
    Transfer(TransferError),
    /// `init_device` called on a mapped device
    AlreadyInitialized,
    /// Request issued before a successful `init_device`
    NotReady,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MapFailed(e) => write!(f, "Mapping failed: {}", e),
            Self::Gpt(e) => write!(f, "GPT error: {}", e),
            Self::Transfer(e) => write!(f, "Transfer error: {}", e),
            Self::AlreadyInitialized => write!(f, "Device already initialized"),
            Self::NotReady => write!(f, "Device not initialized"),
        }
    }
}

impl From<MapError> for DeviceError {
    fn from(e: MapError) -> Self {
        Self::MapFailed(e)
    }
}

impl From<ParseError> for DeviceError {
    fn from(e: ParseError) -> Self {
        Self::Gpt(e)
    }
}

impl From<TransferError> for DeviceError {
    fn from(e: TransferError) -> Self {
        Self::Transfer(e)
    }
}

/// Device configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdConfig {
    /// Physical base of the device region
    pub base_address: u64,
    /// Size of the window used to read the GPT header
    pub probe_window_size: usize,
    pub gpt: GptPolicy,
}

impl SdConfig {
    pub const fn new() -> Self {
        Self {
            base_address: DEFAULT_BASE_ADDR,
            probe_window_size: PAGE_SIZE,
            gpt: GptPolicy::relaxed(),
        }
    }

    pub const fn with_base(mut self, base_address: u64) -> Self {
        self.base_address = base_address;
        self
    }

    pub const fn with_probe_size(mut self, size: usize) -> Self {
        self.probe_window_size = size;
        self
    }

    pub const fn with_gpt_policy(mut self, gpt: GptPolicy) -> Self {
        self.gpt = gpt;
        self
    }
}

impl Default for SdConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Device size, fixed once the header has been validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub blocks: u64,
}

impl Capacity {
    pub const BLOCK_SIZE: usize = BLOCK_SIZE;

    pub fn from_header(header: &GptHeader) -> Option<Self> {
        let blocks = header.capacity_blocks()?;
        header.capacity_bytes(BLOCK_SIZE)?;
        Some(Self { blocks })
    }

    pub fn bytes(&self) -> u64 {
        self.blocks * BLOCK_SIZE as u64
    }

    pub fn size_mb(&self) -> u64 {
        self.bytes() / (1024 * 1024)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingState {
    Unmapped,
    ProbeMapped,
    FullyMapped,
}

impl MappingState {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unmapped => "unmapped",
            Self::ProbeMapped => "probe",
            Self::FullyMapped => "full",
        }
    }
}

/// Request counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub block_ios: u64,
    pub scatter_requests: u64,
    pub short_transfers: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

impl DeviceStats {
    fn record(&mut self, direction: Direction, bytes: usize) {
        match direction {
            Direction::Read => self.bytes_read += bytes as u64,
            Direction::Write => self.bytes_written += bytes as u64,
        }
    }
}

/// One SD card region
pub struct SdDevice<M: MmioMapper> {
    mapper: M,
    config: SdConfig,
    window: Option<M::Window>,
    state: MappingState,
    header: Option<GptHeader>,
    capacity: Option<Capacity>,
    last_short: Option<ShortTransfer>,
    stats: DeviceStats,
}

/// Device shared between contexts; every operation runs under the lock.
pub type SharedDevice<M> = spin::Mutex<SdDevice<M>>;

impl<M: MmioMapper> SdDevice<M> {
    pub fn new(mapper: M, config: SdConfig) -> Self {
        Self {
            mapper,
            config,
            window: None,
            state: MappingState::Unmapped,
            header: None,
            capacity: None,
            last_short: None,
            stats: DeviceStats::default(),
        }
    }

    pub fn into_shared(self) -> SharedDevice<M> {
        spin::Mutex::new(self)
    }

    /// Initialize from the configured base address and probe size.
    pub fn init(&mut self) -> Result<Capacity> {
        self.init_device(self.config.base_address, self.config.probe_window_size)
    }

    /// Probe the GPT header through a small window, then map the whole
    /// device.
    pub fn init_device(&mut self, base_address: u64, probe_window_size: usize) -> Result<Capacity> {
        if self.state != MappingState::Unmapped {
            return Err(DeviceError::AlreadyInitialized);
        }

        let probe = self.mapper.map(base_address, probe_window_size).map_err(|e| {
            log_error!(LogSource::Map, "probe map at {:#x} failed: {}", base_address, e);
            DeviceError::MapFailed(e)
        })?;
        self.window = Some(probe);
        self.state = MappingState::ProbeMapped;
        log_debug!(
            LogSource::Map,
            "probe window {:#x}+{:#x}",
            base_address,
            probe_window_size
        );

        let header = match self.probe_header() {
            Ok(header) => header,
            Err(e) => {
                log_error!(LogSource::Gpt, "probe failed: {}", e);
                self.release_window();
                return Err(e);
            }
        };
        self.release_window();

        let capacity = Capacity::from_header(&header).ok_or(ParseError::InvalidCapacity)?;
        let full_len =
            usize::try_from(capacity.bytes()).map_err(|_| ParseError::InvalidCapacity)?;

        let full = self.mapper.map(base_address, full_len).map_err(|e| {
            log_error!(
                LogSource::Map,
                "full map {:#x}+{:#x} failed: {}",
                base_address,
                full_len,
                e
            );
            DeviceError::MapFailed(e)
        })?;
        self.window = Some(full);
        self.state = MappingState::FullyMapped;
        self.header = Some(header);
        self.capacity = Some(capacity);

        if self.config.gpt.verify_crc {
            if let Err(e) = self.verify_entry_array() {
                log_error!(LogSource::Gpt, "entry array rejected: {}", e);
                self.teardown_device();
                return Err(e);
            }
        }

        log_info!(
            LogSource::Map,
            "sd card: {} blocks ({} MiB)",
            capacity.blocks,
            capacity.size_mb()
        );
        Ok(capacity)
    }

    /// Read and validate LBA 1 through the probe window.
    fn probe_header(&mut self) -> Result<GptHeader> {
        let window = self.window.as_ref().ok_or(DeviceError::NotReady)?;
        let mut block = [0u8; BLOCK_SIZE];
        engine::read(window, GPT_HEADER_LBA * BLOCK_SIZE as u64, &mut block)?;

        GptHeader::from_bytes(&block).log_summary();
        Ok(gpt::parse_and_validate(&block, &self.config.gpt)?)
    }

    /// Read the raw entry array, rounded up to whole blocks.
    fn read_entry_array(&mut self) -> Result<(GptHeader, vec::Vec<u8>)> {
        let header = self.header.ok_or(DeviceError::NotReady)?;
        let capacity = self.capacity.ok_or(DeviceError::NotReady)?;

        let len = header
            .entry_array_storage_len(BLOCK_SIZE)
            .ok_or(ParseError::EntryArrayOutOfRange)?;
        let offset = header
            .partition_entry_lba
            .checked_mul(BLOCK_SIZE as u64)
            .ok_or(ParseError::EntryArrayOutOfRange)?;
        let end = offset
            .checked_add(len as u64)
            .ok_or(ParseError::EntryArrayOutOfRange)?;
        if end > capacity.bytes() {
            return Err(ParseError::EntryArrayOutOfRange.into());
        }

        let window = self.window.as_ref().ok_or(DeviceError::NotReady)?;
        let mut storage = vec![0u8; len];
        engine::read(window, offset, &mut storage)?;
        Ok((header, storage))
    }

    fn verify_entry_array(&mut self) -> Result<()> {
        let (header, mut storage) = self.read_entry_array()?;
        gpt::verify_entry_array(&header, &mut storage)?;
        Ok(())
    }

    /// Decode the partition entries of the mapped device.
    pub fn read_partition_table(&mut self) -> Result<PartitionTable> {
        self.ready()?;
        let (header, mut storage) = self.read_entry_array()?;
        let table = partition::decode_entries(&header, &mut storage)?;
        if table.truncated {
            log_warn!(
                LogSource::Gpt,
                "more than {} partitions, table truncated",
                partition::MAX_PARTITIONS
            );
        }
        Ok(table)
    }

    /// Single-buffer request at `start_lba`.
    pub fn submit_block_io(
        &mut self,
        direction: Direction,
        start_lba: u64,
        mut buffer: Fragment<'_>,
    ) -> Result<usize> {
        self.ready()?;
        let window = self.window.as_mut().ok_or(DeviceError::NotReady)?;
        let offset = start_lba
            .checked_mul(BLOCK_SIZE as u64)
            .ok_or(TransferError::OutOfRange {
                offset: start_lba.saturating_mul(BLOCK_SIZE as u64),
                len: buffer.len(),
                window: window.len(),
            })?;

        let moved = engine::transfer_checked(window, direction, offset, &mut buffer)?;
        self.stats.record(direction, moved);
        self.stats.block_ios += 1;
        Ok(moved)
    }

    /// Ordered fragment list over the range starting at `start_block`.
    ///
    /// A fragment list that does not add up to `expected_bytes` still
    /// completes; the mismatch is in the returned outcome and is kept for
    /// [`SdDevice::take_short_transfer`]. A list rejected before any unit
    /// moved keeps its mismatch the same way.
    pub fn submit_scatter_request(
        &mut self,
        direction: Direction,
        start_block: u64,
        fragments: &mut [Fragment<'_>],
        expected_bytes: usize,
    ) -> Result<ScatterOutcome> {
        self.ready()?;
        let window = self.window.as_mut().ok_or(DeviceError::NotReady)?;
        let result = scatter::run(
            window,
            direction,
            start_block,
            fragments,
            expected_bytes,
            BLOCK_SIZE,
        );

        let short = match &result {
            Ok(outcome) => outcome.short,
            Err(TransferError::FragmentLength { short, .. }) => *short,
            Err(_) => None,
        };
        if let Some(short) = short {
            self.stats.short_transfers += 1;
            self.last_short = Some(short);
        }

        let outcome = result?;
        self.stats.record(direction, outcome.bytes_transferred);
        self.stats.scatter_requests += 1;
        Ok(outcome)
    }

    /// Release the mapping. Safe to call in any state, any number of times.
    pub fn teardown_device(&mut self) {
        if self.release_window() {
            log_info!(LogSource::Map, "sd card unmapped");
        }
        self.header = None;
        self.capacity = None;
    }

    /// Returns true if a window was released.
    fn release_window(&mut self) -> bool {
        let released = match self.window.take() {
            Some(window) => {
                log_debug!(LogSource::Map, "unmap {} window", self.state.name());
                self.mapper.unmap(window);
                true
            }
            None => false,
        };
        self.state = MappingState::Unmapped;
        released
    }

    fn ready(&self) -> Result<()> {
        if self.state == MappingState::FullyMapped {
            Ok(())
        } else {
            Err(DeviceError::NotReady)
        }
    }

    pub fn state(&self) -> MappingState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == MappingState::FullyMapped
    }

    pub fn capacity(&self) -> Option<Capacity> {
        self.capacity
    }

    pub fn header(&self) -> Option<&GptHeader> {
        self.header.as_ref()
    }

    pub fn config(&self) -> &SdConfig {
        &self.config
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Last fragment accounting mismatch, cleared on read.
    pub fn take_short_transfer(&mut self) -> Option<ShortTransfer> {
        self.last_short.take()
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }
}

impl<M: MmioMapper> Drop for SdDevice<M> {
    fn drop(&mut self) {
        self.teardown_device();
    }
}
