// GPT (GUID Partition Table) header parser
//
// Layout of the header at LBA 1, all integers little-endian:
//
//   0x00  signature               8   "EFI PART"
//   0x08  revision                4
//   0x0C  header_size             4   92
//   0x10  header_crc32            4
//   0x14  reserved                4   must be 0
//   0x18  current_lba             8
//   0x20  backup_lba              8   highest addressable LBA here
//   0x28  first_usable_lba        8
//   0x30  last_usable_lba         8
//   0x38  disk_guid              16
//   0x48  partition_entry_lba     8
//   0x50  num_partition_entries   4
//   0x54  partition_entry_size    4   usually 128
//   0x58  partition_array_crc32   4

use core::fmt;

use gpt_disk_types::{
    BlockSize, Crc32, GptHeaderRevision, GptHeaderSignature, GptPartitionEntryArray, LbaLe,
    U32Le, U64Le,
};
use uguid::Guid;

use crate::logger::LogSource;
use crate::{log_info, log_warn};

pub const BLOCK_SIZE: usize = 512;
pub const GPT_HEADER_LBA: u64 = 1;
pub const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";
pub const GPT_HEADER_SIZE: u32 = 92;
pub const GPT_ENTRY_SIZE: u32 = 128;
pub const GPT_REVISION_1_0: u32 = 0x0001_0000;

/// Result type for GPT parsing
pub type Result<T> = core::result::Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Signature is not "EFI PART"
    InvalidSignature,
    /// Header size field is not 92
    UnsupportedHeaderSize(u32),
    /// Reserved field is non-zero (fatal only under a strict policy)
    MalformedHeader { reserved: u32 },
    /// Backup LBA does not yield a representable capacity
    InvalidCapacity,
    /// Stored header CRC32 does not match the header contents
    HeaderCrcMismatch { stored: u32, computed: u32 },
    /// Stored entry-array CRC32 does not match the entries
    EntryArrayCrcMismatch { stored: u32, computed: u32 },
    /// Entry size is not a usable multiple of 128
    UnsupportedEntrySize(u32),
    /// Entry array does not fit the device
    EntryArrayOutOfRange,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSignature => write!(f, "Invalid GPT signature"),
            Self::UnsupportedHeaderSize(size) => {
                write!(f, "Unsupported GPT header size {}", size)
            }
            Self::MalformedHeader { reserved } => {
                write!(f, "GPT reserved field is {:#x}, expected 0", reserved)
            }
            Self::InvalidCapacity => write!(f, "GPT backup LBA gives no valid capacity"),
            Self::HeaderCrcMismatch { stored, computed } => write!(
                f,
                "GPT header CRC32 mismatch: stored {:#010x}, computed {:#010x}",
                stored, computed
            ),
            Self::EntryArrayCrcMismatch { stored, computed } => write!(
                f,
                "GPT entry array CRC32 mismatch: stored {:#010x}, computed {:#010x}",
                stored, computed
            ),
            Self::UnsupportedEntrySize(size) => {
                write!(f, "Unsupported GPT partition entry size {}", size)
            }
            Self::EntryArrayOutOfRange => write!(f, "GPT entry array outside the device"),
        }
    }
}

/// How strictly a header is checked.
///
/// The default matches the FPGA reference behaviour: no CRC checks, and a
/// non-zero reserved field is only warned about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GptPolicy {
    /// Check the header CRC32 (and the entry-array CRC32 once the whole
    /// device is mapped)
    pub verify_crc: bool,
    /// Reject a non-zero reserved field
    pub strict_reserved: bool,
}

impl GptPolicy {
    pub const fn relaxed() -> Self {
        Self {
            verify_crc: false,
            strict_reserved: false,
        }
    }

    pub const fn strict() -> Self {
        Self {
            verify_crc: true,
            strict_reserved: true,
        }
    }
}

/// Decoded partition table header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GptHeader {
    pub signature: [u8; 8],
    pub revision: u32,
    pub header_size: u32,
    pub header_crc32: u32,
    pub reserved: u32,
    pub current_lba: u64,
    pub backup_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: Guid,
    pub partition_entry_lba: u64,
    pub num_partition_entries: u32,
    pub partition_entry_size: u32,
    pub partition_array_crc32: u32,
}

fn le_u32(raw: &[u8; BLOCK_SIZE], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&raw[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn le_u64(raw: &[u8; BLOCK_SIZE], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&raw[at..at + 8]);
    u64::from_le_bytes(bytes)
}

impl GptHeader {
    /// Decode the header fields without validating them.
    pub fn from_bytes(raw: &[u8; BLOCK_SIZE]) -> Self {
        let mut signature = [0u8; 8];
        signature.copy_from_slice(&raw[0..8]);
        let mut guid = [0u8; 16];
        guid.copy_from_slice(&raw[56..72]);

        Self {
            signature,
            revision: le_u32(raw, 8),
            header_size: le_u32(raw, 12),
            header_crc32: le_u32(raw, 16),
            reserved: le_u32(raw, 20),
            current_lba: le_u64(raw, 24),
            backup_lba: le_u64(raw, 32),
            first_usable_lba: le_u64(raw, 40),
            last_usable_lba: le_u64(raw, 48),
            disk_guid: Guid::from_bytes(guid),
            partition_entry_lba: le_u64(raw, 72),
            num_partition_entries: le_u32(raw, 80),
            partition_entry_size: le_u32(raw, 84),
            partition_array_crc32: le_u32(raw, 88),
        }
    }

    pub fn signature_valid(&self) -> bool {
        &self.signature == GPT_SIGNATURE
    }

    /// Device size in blocks: the backup LBA is the last block, inclusive.
    pub fn capacity_blocks(&self) -> Option<u64> {
        self.backup_lba.checked_add(1)
    }

    pub fn capacity_bytes(&self, block_size: usize) -> Option<u64> {
        self.capacity_blocks()?.checked_mul(block_size as u64)
    }

    /// Exact size of the partition entry array in bytes.
    pub fn entry_array_len(&self) -> Option<usize> {
        (self.num_partition_entries as usize).checked_mul(self.partition_entry_size as usize)
    }

    /// Entry array size rounded up to whole blocks.
    pub fn entry_array_storage_len(&self, block_size: usize) -> Option<usize> {
        let exact = self.entry_array_len()?;
        exact
            .checked_add(block_size - 1)
            .map(|n| n / block_size * block_size)
    }

    /// Same header in `gpt_disk_types` form, for CRC computation.
    pub fn to_disk_header(&self) -> gpt_disk_types::GptHeader {
        gpt_disk_types::GptHeader {
            signature: GptHeaderSignature(U64Le::from_u64(u64::from_le_bytes(self.signature))),
            revision: GptHeaderRevision(U32Le::from_u32(self.revision)),
            header_size: U32Le::from_u32(self.header_size),
            header_crc32: Crc32(U32Le::from_u32(self.header_crc32)),
            reserved: U32Le::from_u32(self.reserved),
            my_lba: LbaLe::from_u64(self.current_lba),
            alternate_lba: LbaLe::from_u64(self.backup_lba),
            first_usable_lba: LbaLe::from_u64(self.first_usable_lba),
            last_usable_lba: LbaLe::from_u64(self.last_usable_lba),
            disk_guid: self.disk_guid,
            partition_entry_lba: LbaLe::from_u64(self.partition_entry_lba),
            number_of_partition_entries: U32Le::from_u32(self.num_partition_entries),
            size_of_partition_entry: U32Le::from_u32(self.partition_entry_size),
            partition_entry_array_crc32: Crc32(U32Le::from_u32(self.partition_array_crc32)),
        }
    }

    /// CRC32 of the header with its own CRC field zeroed.
    pub fn computed_header_crc32(&self) -> u32 {
        self.to_disk_header().calculate_header_crc32().0.to_u32()
    }

    pub fn header_crc_valid(&self) -> bool {
        self.computed_header_crc32() == self.header_crc32
    }

    /// Dump the header fields to the log
    pub fn log_summary(&self) {
        log_info!(LogSource::Gpt, "gpt partition table header:");
        log_info!(
            LogSource::Gpt,
            "signature: {:x}",
            u64::from_le_bytes(self.signature)
        );
        log_info!(LogSource::Gpt, "revision: {:x}", self.revision);
        log_info!(LogSource::Gpt, "size: {:x}", self.header_size);
        log_info!(LogSource::Gpt, "crc_header: {:x}", self.header_crc32);
        log_info!(LogSource::Gpt, "reserved: {:x}", self.reserved);
        log_info!(LogSource::Gpt, "current lba: {:x}", self.current_lba);
        log_info!(LogSource::Gpt, "backup lba: {:x}", self.backup_lba);
        log_info!(
            LogSource::Gpt,
            "partition entries lba: {:x}",
            self.partition_entry_lba
        );
        log_info!(
            LogSource::Gpt,
            "number partition entries: {:x}",
            self.num_partition_entries
        );
        log_info!(
            LogSource::Gpt,
            "size partition entries: {:x}",
            self.partition_entry_size
        );
    }
}

/// Decode and validate the header block read from LBA 1.
///
/// Checks run in order: signature, header size, reserved field, capacity,
/// then the header CRC32 when `policy.verify_crc` is set. Nothing derived
/// from a header is trusted until the signature and size have passed.
pub fn parse_and_validate(raw: &[u8; BLOCK_SIZE], policy: &GptPolicy) -> Result<GptHeader> {
    let header = GptHeader::from_bytes(raw);

    if !header.signature_valid() {
        return Err(ParseError::InvalidSignature);
    }
    if header.header_size != GPT_HEADER_SIZE {
        return Err(ParseError::UnsupportedHeaderSize(header.header_size));
    }

    if header.reserved != 0 {
        if policy.strict_reserved {
            return Err(ParseError::MalformedHeader {
                reserved: header.reserved,
            });
        }
        log_warn!(
            LogSource::Gpt,
            "reserved field is {:#x}, continuing",
            header.reserved
        );
    }
    if header.revision != GPT_REVISION_1_0 {
        log_warn!(LogSource::Gpt, "unexpected revision {:#x}", header.revision);
    }

    if header.capacity_blocks().is_none() {
        return Err(ParseError::InvalidCapacity);
    }

    if policy.verify_crc {
        let computed = header.computed_header_crc32();
        if computed != header.header_crc32 {
            return Err(ParseError::HeaderCrcMismatch {
                stored: header.header_crc32,
                computed,
            });
        }
    }

    Ok(header)
}

/// Check the entry-array CRC32 stored in `header` against `storage`, which
/// holds the array read from the device, rounded up to whole blocks.
pub fn verify_entry_array(header: &GptHeader, storage: &mut [u8]) -> Result<()> {
    let layout = header
        .to_disk_header()
        .get_partition_entry_array_layout()
        .map_err(|_| ParseError::UnsupportedEntrySize(header.partition_entry_size))?;

    let array = GptPartitionEntryArray::new(layout, BlockSize::BS_512, storage)
        .map_err(|_| ParseError::EntryArrayOutOfRange)?;

    let computed = array.calculate_crc32().0.to_u32();
    if computed != header.partition_array_crc32 {
        return Err(ParseError::EntryArrayCrcMismatch {
            stored: header.partition_array_crc32,
            computed,
        });
    }
    Ok(())
}
