//! Piton MMC host
//!
//! Host-side adapter between an MMC/SD command dispatcher and the Piton SD
//! region. The card is plain memory behind the FPGA, so there is no command
//! state machine: data-less commands complete at once, and each data
//! command is one scatter request on the shared [`SdDevice`], over the
//! mapping that device owns.
//!
//! [`SdDevice`]: piton_core::SdDevice
//!
//! ```ignore
//! let device = SdDevice::new(unsafe { IdentityMapper::new() }, SdConfig::new()).into_shared();
//! let mut host = PitonMmcHost::probe(&device)?;
//! let mut frags = [Fragment::Read(&mut buf)];
//! let mut req = MmcRequest::data(
//!     MmcCommand::new(MMC_READ_SINGLE_BLOCK, lba),
//!     MmcData::new(Direction::Read, 1, 512, &mut frags),
//! );
//! let done = host.request(&mut req)?;
//! ```

#![no_std]

pub mod caps;
pub mod host;
pub mod request;

pub use caps::HostCaps;
pub use host::{MmcCompletion, MmcError, PitonMmcHost};
pub use request::{MmcCommand, MmcData, MmcRequest};
