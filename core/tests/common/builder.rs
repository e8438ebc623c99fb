use gpt_disk_types::{
    BlockSize, Crc32, GptHeader, GptHeaderRevision, GptHeaderSignature, GptPartitionEntryArray,
    LbaLe, U32Le, U64Le,
};
use piton_core::disk::PartitionType;
use uguid::Guid;

pub const BLOCK: usize = 512;
pub const ENTRY_SIZE: usize = 128;
pub const ENTRIES_LBA: u64 = 2;

struct Partition {
    ty: PartitionType,
    start: u64,
    end: u64,
    name: String,
}

/// Builds a disk image with a primary GPT header at LBA 1 and the entry
/// array at LBA 2. The backup header is not written.
pub struct GptImageBuilder {
    blocks: u64,
    num_entries: u32,
    reserved: u32,
    partitions: Vec<Partition>,
}

impl GptImageBuilder {
    pub fn new(blocks: u64) -> Self {
        Self {
            blocks,
            num_entries: 128,
            reserved: 0,
            partitions: Vec::new(),
        }
    }

    pub fn num_entries(mut self, n: u32) -> Self {
        self.num_entries = n;
        self
    }

    pub fn reserved(mut self, value: u32) -> Self {
        self.reserved = value;
        self
    }

    pub fn partition(mut self, ty: PartitionType, start: u64, end: u64, name: &str) -> Self {
        self.partitions.push(Partition {
            ty,
            start,
            end,
            name: name.to_string(),
        });
        self
    }

    pub fn entry_array_blocks(&self) -> u64 {
        ((self.num_entries as usize * ENTRY_SIZE + BLOCK - 1) / BLOCK) as u64
    }

    /// Header as `gpt_disk_types` sees it, CRCs filled in.
    pub fn header(&self, entry_array_crc: u32) -> GptHeader {
        let array_blocks = self.entry_array_blocks();
        let mut header = GptHeader {
            signature: GptHeaderSignature(U64Le::from_u64(u64::from_le_bytes(*b"EFI PART"))),
            revision: GptHeaderRevision(U32Le::from_u32(0x0001_0000)),
            header_size: U32Le::from_u32(92),
            header_crc32: Crc32(U32Le::from_u32(0)),
            reserved: U32Le::from_u32(self.reserved),
            my_lba: LbaLe::from_u64(1),
            alternate_lba: LbaLe::from_u64(self.blocks - 1),
            first_usable_lba: LbaLe::from_u64(ENTRIES_LBA + array_blocks),
            last_usable_lba: LbaLe::from_u64(self.blocks - 2 - array_blocks),
            disk_guid: Guid::from_bytes([0xd1; 16]),
            partition_entry_lba: LbaLe::from_u64(ENTRIES_LBA),
            number_of_partition_entries: U32Le::from_u32(self.num_entries),
            size_of_partition_entry: U32Le::from_u32(ENTRY_SIZE as u32),
            partition_entry_array_crc32: Crc32(U32Le::from_u32(entry_array_crc)),
        };
        header.update_header_crc32();
        header
    }

    pub fn build(self) -> Vec<u8> {
        let mut image = vec![0u8; self.blocks as usize * BLOCK];

        let array_len = self.entry_array_blocks() as usize * BLOCK;
        let mut array = vec![0u8; array_len];
        for (i, p) in self.partitions.iter().enumerate() {
            let e = &mut array[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE];
            e[0..16].copy_from_slice(&p.ty.to_gpt_guid().0.to_bytes());
            e[16..32].copy_from_slice(&[i as u8 + 1; 16]);
            e[32..40].copy_from_slice(&p.start.to_le_bytes());
            e[40..48].copy_from_slice(&p.end.to_le_bytes());
            for (j, unit) in p.name.encode_utf16().take(36).enumerate() {
                e[56 + j * 2..58 + j * 2].copy_from_slice(&unit.to_le_bytes());
            }
        }

        // Entry CRC through gpt_disk_types over the finished array
        let layout = self.header(0).get_partition_entry_array_layout().unwrap();
        let array_crc = GptPartitionEntryArray::new(layout, BlockSize::BS_512, &mut array)
            .unwrap()
            .calculate_crc32()
            .0
            .to_u32();

        let header = self.header(array_crc);
        let raw = serialize_header(&header);
        image[BLOCK..BLOCK + 92].copy_from_slice(&raw);

        let at = ENTRIES_LBA as usize * BLOCK;
        image[at..at + array_len].copy_from_slice(&array);
        image
    }
}

/// 92-byte little-endian header layout.
pub fn serialize_header(h: &GptHeader) -> [u8; 92] {
    let mut raw = [0u8; 92];
    raw[0..8].copy_from_slice(&h.signature.0.to_u64().to_le_bytes());
    raw[8..12].copy_from_slice(&h.revision.0.to_u32().to_le_bytes());
    raw[12..16].copy_from_slice(&h.header_size.to_u32().to_le_bytes());
    raw[16..20].copy_from_slice(&h.header_crc32.0.to_u32().to_le_bytes());
    raw[20..24].copy_from_slice(&h.reserved.to_u32().to_le_bytes());
    raw[24..32].copy_from_slice(&h.my_lba.to_u64().to_le_bytes());
    raw[32..40].copy_from_slice(&h.alternate_lba.to_u64().to_le_bytes());
    raw[40..48].copy_from_slice(&h.first_usable_lba.to_u64().to_le_bytes());
    raw[48..56].copy_from_slice(&h.last_usable_lba.to_u64().to_le_bytes());
    raw[56..72].copy_from_slice(&h.disk_guid.to_bytes());
    raw[72..80].copy_from_slice(&h.partition_entry_lba.to_u64().to_le_bytes());
    raw[80..84].copy_from_slice(&h.number_of_partition_entries.to_u32().to_le_bytes());
    raw[84..88].copy_from_slice(&h.size_of_partition_entry.to_u32().to_le_bytes());
    raw[88..92].copy_from_slice(&h.partition_entry_array_crc32.0.to_u32().to_le_bytes());
    raw
}
