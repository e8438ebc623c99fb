// Host capabilities advertised to the MMC core

/// OCR voltage window bits
pub const MMC_VDD_32_33: u32 = 1 << 20;
pub const MMC_VDD_33_34: u32 = 1 << 21;

/// Host capability bits
pub const MMC_CAP_4_BIT_DATA: u32 = 1 << 0;

pub const MMC_CAP2_NO_WRITE_PROTECT: u32 = 1 << 18;
pub const MMC_CAP2_NO_SDIO: u32 = 1 << 19;
pub const MMC_CAP2_NO_MMC: u32 = 1 << 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCaps {
    pub ocr_avail: u32,
    /// Clock range in Hz
    pub f_min: u32,
    pub f_max: u32,
    pub caps: u32,
    pub caps2: u32,
    pub max_blk_size: u32,
    pub max_blk_count: u32,
    pub max_req_size: u32,
    pub max_seg_size: u32,
}

impl HostCaps {
    /// Limits of the Piton SD gateware. Only a 4-bit bus at 3.3 V is
    /// supported; the clock range is empirical.
    pub const fn piton() -> Self {
        let max_blk_size = 2048;
        let max_blk_count = 65535;
        Self {
            ocr_avail: MMC_VDD_32_33 | MMC_VDD_33_34,
            f_min: 12_500_000,
            f_max: 50_000_000,
            caps: MMC_CAP_4_BIT_DATA,
            caps2: MMC_CAP2_NO_WRITE_PROTECT | MMC_CAP2_NO_SDIO | MMC_CAP2_NO_MMC,
            max_blk_size,
            max_blk_count,
            max_req_size: max_blk_size * max_blk_count,
            max_seg_size: max_blk_size * max_blk_count,
        }
    }

    pub fn bus_width(&self) -> u32 {
        if self.caps & MMC_CAP_4_BIT_DATA != 0 {
            4
        } else {
            1
        }
    }

    /// Total bytes of a `blocks` x `blksz` request, if within limits.
    pub fn request_bytes(&self, blocks: u32, blksz: u32) -> Option<usize> {
        if blksz > self.max_blk_size || blocks > self.max_blk_count {
            return None;
        }
        let bytes = blocks.checked_mul(blksz)?;
        if bytes > self.max_req_size {
            return None;
        }
        Some(bytes as usize)
    }
}

impl Default for HostCaps {
    fn default() -> Self {
        Self::piton()
    }
}
