//! On-disk XDBF structures. Everything is big-endian.

use crate::raw::{ByteOrder, Bytes, RawStruct};

pub const MAGIC: &[u8; 4] = b"XDBF";
pub const VERSION: u32 = 0x10000;

pub const XSTR_MAGIC: &[u8; 4] = b"XSTR";
pub const XSTR_VERSION: u32 = 1;
pub const XSTC_MAGIC: &[u8; 4] = b"XSTC";
pub const XSTC_VERSION: u32 = 1;
pub const XACH_MAGIC: &[u8; 4] = b"XACH";

/// `'XSTC'` as a resource id in the metadata namespace.
pub const XSTC_RESOURCE_ID: u64 = 0x5853_5443;
/// `'XACH'` as a resource id in the metadata namespace.
pub const XACH_RESOURCE_ID: u64 = 0x5841_4348;

/// Resource id of the title string and the title icon.
pub const ID_TITLE: u64 = 0x8000;

pub const NAMESPACE_METADATA: u16 = 1;
pub const NAMESPACE_IMAGE: u16 = 2;
pub const NAMESPACE_STRING_TABLE: u16 = 3;

/// Size of a free space table entry (`offset: u32, length: u32`).
pub const FREE_SPACE_ENTRY_SIZE: u64 = 8;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Header {
    pub magic: Bytes<4>,
    pub version: u32,
    /// Number of slots in the entry table.
    pub entry_table_length: u32,
    /// Number of slots in use.
    pub entry_count: u32,
    pub free_space_table_length: u32,
    pub free_space_table_count: u32,
}

impl RawStruct for Header {
    const SIZE: usize = 0x18;
    const ORDER: ByteOrder = ByteOrder::Big;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Entry {
    pub namespace_id: u16,
    pub resource_id: u64,
    /// Offset relative to the start of the data area.
    pub offset: u32,
    pub length: u32,
}

impl RawStruct for Entry {
    const SIZE: usize = 0x12;
    const ORDER: ByteOrder = ByteOrder::Big;
}

/// String table header. `string_count` entries follow, each an
/// `XstrEntryHeader` plus `length` bytes of UTF-8.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct XstrHeader {
    pub magic: Bytes<4>,
    pub version: u32,
    pub size: u32,
    pub string_count: u16,
}

impl RawStruct for XstrHeader {
    const SIZE: usize = 14;
    const ORDER: ByteOrder = ByteOrder::Big;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct XstrEntryHeader {
    pub string_id: u16,
    pub length: u16,
}

impl RawStruct for XstrEntryHeader {
    const SIZE: usize = 4;
    const ORDER: ByteOrder = ByteOrder::Big;
}

/// Default language record.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Xstc {
    pub magic: Bytes<4>,
    pub version: u32,
    /// Size of the rest of the structure, always 12.
    pub size: u32,
    pub default_language: u32,
}

impl RawStruct for Xstc {
    const SIZE: usize = 16;
    const ORDER: ByteOrder = ByteOrder::Big;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct XachHeader {
    pub magic: Bytes<4>,
    pub version: u32,
    pub size: u32,
    pub achievement_count: u16,
}

impl RawStruct for XachHeader {
    const SIZE: usize = 14;
    const ORDER: ByteOrder = ByteOrder::Big;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct XachEntry {
    pub achievement_id: u16,
    /// String id of the achievement name.
    pub title_id: u16,
    pub locked_desc_id: u16,
    pub unlocked_desc_id: u16,
    /// Resource id of the icon in the image namespace.
    pub image_id: u32,
    pub gamerscore: u16,
    pub unknown1: u16,
    pub flags: u32,
    pub unknown2: [u32; 4],
}

impl RawStruct for XachEntry {
    const SIZE: usize = 36;
    const ORDER: ByteOrder = ByteOrder::Big;
}
