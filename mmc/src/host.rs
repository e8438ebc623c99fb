//! Piton MMC host controller.
//!
//! The host does not map anything itself. It drives the card through the
//! shared [`SdDevice`], so the MMC path and the block path use the one
//! mapping the device owns. A data command's argument is the starting
//! block; its scatter list becomes one `submit_scatter_request`.

use core::fmt;

use piton_core::device::{Capacity, DeviceError, SharedDevice};
use piton_core::logger::LogSource;
use piton_core::mmio::MmioMapper;
use piton_core::transfer::ShortTransfer;
use piton_core::{log_debug, log_error, log_info};

use crate::caps::HostCaps;
use crate::request::MmcRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmcError {
    /// Device could not be brought up, or rejected the transfer
    Device(DeviceError),
    /// Request exceeds the advertised host limits
    RequestTooLarge { blocks: u32, blksz: u32 },
    /// Host already removed
    Removed,
}

impl fmt::Display for MmcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(e) => write!(f, "SD device error: {}", e),
            Self::RequestTooLarge { blocks, blksz } => {
                write!(f, "Request of {} x {} bytes exceeds host limits", blocks, blksz)
            }
            Self::Removed => write!(f, "Host removed"),
        }
    }
}

impl From<DeviceError> for MmcError {
    fn from(e: DeviceError) -> Self {
        Self::Device(e)
    }
}

/// Completion of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmcCompletion {
    pub opcode: u32,
    pub bytes_transferred: usize,
    /// Scatter list did not add up to `blocks * blksz`
    pub short: Option<ShortTransfer>,
}

pub struct PitonMmcHost<'d, M: MmioMapper> {
    device: &'d SharedDevice<M>,
    caps: HostCaps,
    requests: u64,
    removed: bool,
}

impl<'d, M: MmioMapper> PitonMmcHost<'d, M> {
    /// Attach to `device`, initializing it first if it is not mapped yet.
    pub fn probe(device: &'d SharedDevice<M>) -> Result<Self, MmcError> {
        let capacity = {
            let mut dev = device.lock();
            if !dev.is_ready() {
                dev.init().map_err(|e| {
                    log_error!(LogSource::Mmc, "card init failed: {}", e);
                    e
                })?;
            }
            dev.capacity().ok_or(DeviceError::NotReady)?
        };

        log_info!(
            LogSource::Mmc,
            "Piton MMC controller initialized, {} blocks",
            capacity.blocks
        );
        Ok(Self {
            device,
            caps: HostCaps::piton(),
            requests: 0,
            removed: false,
        })
    }

    /// Card detect. The slot is hard-wired.
    pub fn get_cd(&self) -> bool {
        true
    }

    pub fn caps(&self) -> &HostCaps {
        &self.caps
    }

    pub fn capacity(&self) -> Option<Capacity> {
        self.device.lock().capacity()
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Run one request to completion.
    pub fn request(&mut self, req: &mut MmcRequest<'_, '_>) -> Result<MmcCompletion, MmcError> {
        if self.removed {
            return Err(MmcError::Removed);
        }
        let opcode = req.cmd.opcode;

        let Some(data) = req.data.as_mut() else {
            self.requests += 1;
            return Ok(MmcCompletion {
                opcode,
                bytes_transferred: 0,
                short: None,
            });
        };

        log_debug!(
            LogSource::Mmc,
            "request: opcode={} arg={} blocks={} blksz={} {}",
            opcode,
            req.cmd.arg,
            data.blocks,
            data.blksz,
            data.direction.name()
        );

        let expected = self
            .caps
            .request_bytes(data.blocks, data.blksz)
            .ok_or(MmcError::RequestTooLarge {
                blocks: data.blocks,
                blksz: data.blksz,
            })?;

        let outcome = self.device.lock().submit_scatter_request(
            data.direction,
            u64::from(req.cmd.arg),
            data.sg,
            expected,
        )?;

        self.requests += 1;
        Ok(MmcCompletion {
            opcode,
            bytes_transferred: outcome.bytes_transferred,
            short: outcome.short,
        })
    }

    /// Detach from the device. Later requests fail with `Removed`; the
    /// mapping stays with the device owner.
    pub fn remove(&mut self) {
        if !self.removed {
            self.removed = true;
            log_info!(LogSource::Mmc, "host removed");
        }
    }
}
