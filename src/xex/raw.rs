//! On-disk XEX2 structures. Everything is big-endian.

use crate::raw::{ByteOrder, Bytes, RawStruct};

pub const MAGIC: &[u8; 4] = b"XEX2";

/// Most optional headers a file may declare.
pub const MAX_OPT_HEADERS: u32 = 256;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Header {
    pub magic: Bytes<4>,
    pub module_flags: u32,
    /// File offset of the (possibly encrypted and compressed) PE image.
    pub pe_offset: u32,
    pub reserved: u32,
    pub sec_info_offset: u32,
    pub opt_header_count: u32,
}

impl RawStruct for Header {
    const SIZE: usize = 0x18;
    const ORDER: ByteOrder = ByteOrder::Big;
}

/// An optional header table entry.
///
/// The low byte of `id` encodes where the data lives: `0x00` and `0x01` store
/// it in `value` directly, `0xFF` means `value` is the offset of a
/// length-prefixed blob, anything else is the size in 32-bit words of the
/// data at offset `value`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OptHeader {
    pub id: u32,
    pub value: u32,
}

impl RawStruct for OptHeader {
    const SIZE: usize = 8;
    const ORDER: ByteOrder = ByteOrder::Big;
}

pub mod opt {
    pub const RESOURCE_INFO: u32 = 0x0000_02FF;
    pub const FILE_FORMAT_INFO: u32 = 0x0000_03FF;
    pub const IMAGE_BASE_ADDRESS: u32 = 0x0001_0201;
    pub const ORIGINAL_PE_NAME: u32 = 0x0001_83FF;
    pub const EXECUTION_ID: u32 = 0x0004_0006;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityInfo {
    pub header_size: u32,
    pub image_size: u32,
    pub signature: Bytes<0x100>,
    pub image_info_size: u32,
    pub image_flags: u32,
    pub load_address: u32,
    pub section_digest: Bytes<0x14>,
    pub import_table_count: u32,
    pub import_table_digest: Bytes<0x14>,
    pub media_id: Bytes<0x10>,
    /// Title key, encrypted with the retail or debug common key.
    pub file_key: Bytes<0x10>,
    pub export_table: u32,
    pub header_digest: Bytes<0x14>,
    pub region: u32,
    pub allowed_media_types: u32,
    pub page_descriptor_count: u32,
}

impl RawStruct for SecurityInfo {
    const SIZE: usize = 0x184;
    const ORDER: ByteOrder = ByteOrder::Big;
}

pub const ENCRYPTION_NONE: u16 = 0;

pub const COMPRESSION_NONE: u16 = 0;
pub const COMPRESSION_BASIC: u16 = 1;
pub const COMPRESSION_NORMAL: u16 = 2;
pub const COMPRESSION_DELTA: u16 = 3;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileFormatInfo {
    /// Size of the whole optional header including this field.
    pub size: u32,
    pub encryption_type: u16,
    pub compression_type: u16,
}

impl RawStruct for FileFormatInfo {
    const SIZE: usize = 8;
    const ORDER: ByteOrder = ByteOrder::Big;
}

/// One block of a basic-compressed image: `data_size` stored bytes followed
/// by `zero_size` zero bytes that are not stored.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasicBlock {
    pub data_size: u32,
    pub zero_size: u32,
}

impl RawStruct for BasicBlock {
    const SIZE: usize = 8;
    const ORDER: ByteOrder = ByteOrder::Big;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionId {
    pub media_id: u32,
    pub version: u32,
    pub base_version: u32,
    pub title_id: u32,
    pub platform: u8,
    pub executable_type: u8,
    pub disc_number: u8,
    pub disc_count: u8,
    pub savegame_id: u32,
}

impl RawStruct for ExecutionId {
    const SIZE: usize = 24;
    const ORDER: ByteOrder = ByteOrder::Big;
}

/// An entry of the resource info header.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceEntry {
    /// Resource name, NUL-padded. The XDBF resource is named after the title
    /// id in upper-case hex.
    pub name: Bytes<8>,
    /// Virtual address of the resource.
    pub address: u32,
    pub size: u32,
}

impl RawStruct for ResourceEntry {
    const SIZE: usize = 16;
    const ORDER: ByteOrder = ByteOrder::Big;
}
