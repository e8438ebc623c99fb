// MMC request types as handed over by the command dispatcher

use piton_core::transfer::{Direction, Fragment};

pub const MMC_GO_IDLE_STATE: u32 = 0;
pub const MMC_SEND_STATUS: u32 = 13;
pub const MMC_SET_BLOCKLEN: u32 = 16;
pub const MMC_READ_SINGLE_BLOCK: u32 = 17;
pub const MMC_READ_MULTIPLE_BLOCK: u32 = 18;
pub const MMC_WRITE_BLOCK: u32 = 24;
pub const MMC_WRITE_MULTIPLE_BLOCK: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmcCommand {
    pub opcode: u32,
    /// For data commands, the starting block
    pub arg: u32,
}

impl MmcCommand {
    pub const fn new(opcode: u32, arg: u32) -> Self {
        Self { opcode, arg }
    }
}

/// Data phase of a command
#[derive(Debug)]
pub struct MmcData<'a, 'b> {
    pub direction: Direction,
    pub blocks: u32,
    pub blksz: u32,
    /// Host buffers in transfer order
    pub sg: &'a mut [Fragment<'b>],
}

impl<'a, 'b> MmcData<'a, 'b> {
    pub fn new(direction: Direction, blocks: u32, blksz: u32, sg: &'a mut [Fragment<'b>]) -> Self {
        Self {
            direction,
            blocks,
            blksz,
            sg,
        }
    }
}

#[derive(Debug)]
pub struct MmcRequest<'a, 'b> {
    pub cmd: MmcCommand,
    pub data: Option<MmcData<'a, 'b>>,
}

impl<'a, 'b> MmcRequest<'a, 'b> {
    pub fn command(cmd: MmcCommand) -> Self {
        Self { cmd, data: None }
    }

    pub fn data(cmd: MmcCommand, data: MmcData<'a, 'b>) -> Self {
        Self {
            cmd,
            data: Some(data),
        }
    }
}
