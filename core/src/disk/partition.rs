// Partition information decoded from the GPT entry array

use gpt_disk_types::{BlockSize, GptPartitionEntryArray};
use uguid::Guid;

use super::gpt::{GptHeader, ParseError, Result, BLOCK_SIZE};
use crate::log_debug;
use crate::logger::LogSource;

/// Entries kept in a [`PartitionTable`]
pub const MAX_PARTITIONS: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Slot in the on-disk entry array
    pub index: u32,
    pub partition_type: PartitionType,
    pub type_guid: Guid,
    pub unique_guid: Guid,
    pub start_lba: u64,
    pub end_lba: u64,
    pub attributes: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PartitionType {
    EfiSystem,
    LinuxFilesystem,
    LinuxSwap,
    BasicData,
    Unknown,
}

impl PartitionInfo {
    /// Inclusive block count
    pub fn block_count(&self) -> u64 {
        self.end_lba.saturating_sub(self.start_lba) + 1
    }

    pub fn size_bytes(&self) -> u64 {
        self.block_count() * BLOCK_SIZE as u64
    }

    pub fn size_mb(&self) -> u64 {
        self.size_bytes() / (1024 * 1024)
    }

    pub fn type_name(&self) -> &'static str {
        self.partition_type.name()
    }
}

impl PartitionType {
    pub const fn name(&self) -> &'static str {
        match self {
            PartitionType::EfiSystem => "EFI System",
            PartitionType::LinuxFilesystem => "Linux FS",
            PartitionType::LinuxSwap => "Linux Swap",
            PartitionType::BasicData => "Basic Data",
            PartitionType::Unknown => "Unknown",
        }
    }

    /// Convert from gpt_disk_types GUID to PartitionType
    pub fn from_gpt_guid(guid: &gpt_disk_types::GptPartitionType) -> Self {
        use gpt_disk_types::GptPartitionType as GptType;

        if guid == &GptType::EFI_SYSTEM {
            PartitionType::EfiSystem
        } else if guid == &GptType::BASIC_DATA {
            PartitionType::BasicData
        } else if guid == &linux_filesystem() {
            PartitionType::LinuxFilesystem
        } else if guid == &linux_swap() {
            PartitionType::LinuxSwap
        } else {
            PartitionType::Unknown
        }
    }

    /// Convert to gpt_disk_types GUID
    pub fn to_gpt_guid(&self) -> gpt_disk_types::GptPartitionType {
        use gpt_disk_types::GptPartitionType as GptType;

        match self {
            PartitionType::EfiSystem => GptType::EFI_SYSTEM,
            PartitionType::BasicData => GptType::BASIC_DATA,
            PartitionType::LinuxFilesystem => linux_filesystem(),
            PartitionType::LinuxSwap => linux_swap(),
            PartitionType::Unknown => GptType::UNUSED,
        }
    }
}

fn linux_filesystem() -> gpt_disk_types::GptPartitionType {
    gpt_disk_types::GptPartitionType(gpt_disk_types::guid!(
        "0fc63daf-8483-4772-8e79-3d69d8477de4"
    ))
}

fn linux_swap() -> gpt_disk_types::GptPartitionType {
    gpt_disk_types::GptPartitionType(gpt_disk_types::guid!(
        "0657fd6d-a4ab-43c4-84e5-0933c84b4f4f"
    ))
}

/// Used partitions of one disk, in entry-array order
#[derive(Clone, Debug)]
pub struct PartitionTable {
    partitions: [Option<PartitionInfo>; MAX_PARTITIONS],
    count: usize,
    /// More used entries existed than fit in the table
    pub truncated: bool,
}

impl PartitionTable {
    pub const fn new() -> Self {
        Self {
            partitions: [None; MAX_PARTITIONS],
            count: 0,
            truncated: false,
        }
    }

    pub fn clear(&mut self) {
        self.partitions = [None; MAX_PARTITIONS];
        self.count = 0;
        self.truncated = false;
    }

    /// Returns false once the table is full.
    pub fn add_partition(&mut self, info: PartitionInfo) -> bool {
        if self.count >= MAX_PARTITIONS {
            self.truncated = true;
            return false;
        }

        self.partitions[self.count] = Some(info);
        self.count += 1;
        true
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, index: usize) -> Option<&PartitionInfo> {
        if index < self.count {
            self.partitions[index].as_ref()
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartitionInfo> {
        self.partitions[..self.count]
            .iter()
            .filter_map(|p| p.as_ref())
    }
}

impl Default for PartitionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode the used entries of the array held in `storage`.
///
/// `storage` is the entry array read from the device, rounded up to whole
/// blocks. Unused entries (zero type GUID) are skipped.
pub fn decode_entries(header: &GptHeader, storage: &mut [u8]) -> Result<PartitionTable> {
    let layout = header
        .to_disk_header()
        .get_partition_entry_array_layout()
        .map_err(|_| ParseError::UnsupportedEntrySize(header.partition_entry_size))?;

    let array = GptPartitionEntryArray::new(layout, BlockSize::BS_512, storage)
        .map_err(|_| ParseError::EntryArrayOutOfRange)?;

    let mut table = PartitionTable::new();
    for index in 0..header.num_partition_entries {
        let Some(entry) = array.get_partition_entry(index) else {
            break;
        };
        if !entry.is_used() {
            continue;
        }

        // Copy out of the entry to avoid unaligned references
        let type_guid = entry.partition_type_guid;
        let info = PartitionInfo {
            index,
            partition_type: PartitionType::from_gpt_guid(&type_guid),
            type_guid: type_guid.0,
            unique_guid: entry.unique_partition_guid,
            start_lba: entry.starting_lba.to_u64(),
            end_lba: entry.ending_lba.to_u64(),
            attributes: entry.attributes.0.to_u64(),
        };

        log_debug!(
            LogSource::Gpt,
            "partition {}: {} lba {:#x}-{:#x}",
            index,
            info.type_name(),
            info.start_lba,
            info.end_lba
        );

        if !table.add_partition(info) {
            break;
        }
    }

    Ok(table)
}
