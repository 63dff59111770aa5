//! On-disk Nintendo 3DS structures.
//!
//! Everything is little-endian except the CIA ticket and TMD, which are
//! big-endian.

use crate::raw::{ByteOrder, Bytes, RawStruct, WideStr};

pub const SMDH_MAGIC: &[u8; 4] = b"SMDH";
pub const THREEDSX_MAGIC: &[u8; 4] = b"3DSX";
pub const NCSD_MAGIC: &[u8; 4] = b"NCSD";
pub const NCCH_MAGIC: &[u8; 4] = b"NCCH";

/// Size of a whole SMDH including both icons.
pub const SMDH_SIZE: usize = 0x36C0;
/// Offset of the NCSD magic. The header starts with an RSA signature.
pub const NCSD_MAGIC_OFFSET: usize = 0x100;
/// Size of an NCSD or NCCH header.
pub const HEADER_SIZE: usize = 0x200;

/// One of the 16 per-language title entries of an SMDH.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmdhTitle {
    pub short_desc: WideStr<0x40>,
    pub long_desc: WideStr<0x80>,
    pub publisher: WideStr<0x40>,
}

impl RawStruct for SmdhTitle {
    const SIZE: usize = 0x200;
    const ORDER: ByteOrder = ByteOrder::Little;
}

/// The application settings following the titles.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmdhSettings {
    pub ratings: Bytes<16>,
    pub region_lock: u32,
    pub match_maker_id: u32,
    pub match_maker_bit_id: u64,
    pub flags: u32,
    pub eula_version: u16,
    pub reserved: u16,
    pub animation_frame: u32,
    pub cec_id: u32,
}

impl RawStruct for SmdhSettings {
    const SIZE: usize = 0x30;
    const ORDER: ByteOrder = ByteOrder::Little;
}

pub mod smdh {
    pub const VERSION: usize = 0x04;
    pub const TITLES: usize = 0x08;
    pub const TITLE_COUNT: usize = 16;
    pub const SETTINGS: usize = 0x2008;
    pub const SMALL_ICON: usize = 0x2040;
    pub const SMALL_ICON_SIZE: usize = 24 * 24 * 2;
    pub const LARGE_ICON: usize = 0x24C0;
    pub const LARGE_ICON_SIZE: usize = 48 * 48 * 2;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThreedsxHeader {
    pub magic: Bytes<4>,
    pub header_size: u16,
    pub reloc_header_size: u16,
    pub format_version: u32,
    pub flags: u32,
    pub code_seg_size: u32,
    pub rodata_seg_size: u32,
    pub data_seg_size: u32,
    pub bss_seg_size: u32,
}

impl RawStruct for ThreedsxHeader {
    const SIZE: usize = 0x20;
    const ORDER: ByteOrder = ByteOrder::Little;
}

/// Extended 3DSX header, present when `header_size` covers it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThreedsxExtHeader {
    pub smdh_offset: u32,
    pub smdh_size: u32,
    pub romfs_offset: u32,
}

impl RawStruct for ThreedsxExtHeader {
    const SIZE: usize = 12;
    const ORDER: ByteOrder = ByteOrder::Little;
}

/// A partition table entry, in media units.
#[derive(Debug, Copy, Clone, Deserialize, Serialize)]
pub struct PartitionEntry {
    pub offset: u32,
    pub length: u32,
}

/// The NCSD header shared by CCI and eMMC images, from the magic on.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NcsdHeader {
    pub magic: Bytes<4>,
    /// Image size in media units.
    pub image_size: u32,
    pub media_id: u64,
    pub partition_fs_types: Bytes<8>,
    pub partition_crypt_types: Bytes<8>,
    pub partitions: [PartitionEntry; 8],
}

impl RawStruct for NcsdHeader {
    const SIZE: usize = 0x60;
    const ORDER: ByteOrder = ByteOrder::Little;
}

/// The CCI-specific part of the NCSD header, at offset 0x160.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CciHeader {
    pub exheader_hash: Bytes<0x20>,
    pub additional_header_size: u32,
    pub sector_zero_offset: u32,
    pub partition_flags: Bytes<8>,
    pub partition_ids: [u64; 8],
}

impl RawStruct for CciHeader {
    const SIZE: usize = 0x70;
    const ORDER: ByteOrder = ByteOrder::Little;
}

pub mod cci {
    pub const HEADER_OFFSET: usize = 0x160;
    /// Index of the media unit size in the partition flags.
    pub const FLAG_MEDIA_UNIT_SIZE: usize = 6;
    pub const FLAG_MEDIA_TYPE: usize = 5;
    pub const FLAG_MEDIA_PLATFORM: usize = 4;
}

/// Partition crypt types of an Old 3DS NAND.
pub const EMMC_CRYPT_OLD: [u8; 8] = [1, 2, 2, 2, 2, 0, 0, 0];
/// Partition crypt types of a New 3DS NAND.
pub const EMMC_CRYPT_NEW: [u8; 8] = [1, 2, 2, 2, 3, 0, 0, 0];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NcchHeader {
    pub signature: Bytes<0x100>,
    pub magic: Bytes<4>,
    /// Content size in media units.
    pub content_size: u32,
    pub partition_id: u64,
    pub maker_code: Bytes<2>,
    pub version: u16,
    pub seed_hash: u32,
    pub program_id: u64,
    pub reserved0: Bytes<0x10>,
    pub logo_hash: Bytes<0x20>,
    pub product_code: Bytes<0x10>,
    pub exheader_hash: Bytes<0x20>,
    pub exheader_size: u32,
    pub reserved1: u32,
    pub flags: Bytes<8>,
    pub plain: PartitionEntry,
    pub logo: PartitionEntry,
    pub exefs: PartitionEntry,
    pub exefs_hash_size: u32,
    pub reserved2: u32,
    pub romfs: PartitionEntry,
    pub romfs_hash_size: u32,
    pub reserved3: u32,
    pub exefs_super_hash: Bytes<0x20>,
    pub romfs_super_hash: Bytes<0x20>,
}

impl RawStruct for NcchHeader {
    const SIZE: usize = HEADER_SIZE;
    const ORDER: ByteOrder = ByteOrder::Little;
}

pub mod ncch {
    pub const FLAG_CRYPTO_METHOD: usize = 3;
    pub const FLAG_PLATFORM: usize = 4;
    pub const FLAG_CONTENT_TYPE: usize = 5;
    pub const FLAG_UNIT_SIZE: usize = 6;
    pub const FLAG_BITMASK: usize = 7;

    pub const BITMASK_FIXED_KEY: u8 = 0x01;
    pub const BITMASK_NO_ROMFS: u8 = 0x02;
    pub const BITMASK_NO_CRYPTO: u8 = 0x04;
    pub const BITMASK_SEED_CRYPTO: u8 = 0x20;

    /// Section bytes of the CTR counter.
    pub const SECTION_EXHEADER: u8 = 1;
    pub const SECTION_EXEFS: u8 = 2;

    pub const EXHEADER_OFFSET: u64 = 0x200;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExefsEntry {
    pub name: Bytes<8>,
    pub offset: u32,
    pub size: u32,
}

impl RawStruct for ExefsEntry {
    const SIZE: usize = 16;
    const ORDER: ByteOrder = ByteOrder::Little;
}

pub mod exefs {
    pub const ENTRY_COUNT: usize = 10;
    pub const HEADER_SIZE: u64 = 0x200;
}

/// The system control info at the start of the extended header.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExHeaderSci {
    pub process_name: Bytes<8>,
    pub reserved: Bytes<5>,
    pub flags: u8,
    pub remaster_version: u16,
}

impl RawStruct for ExHeaderSci {
    const SIZE: usize = 0x10;
    const ORDER: ByteOrder = ByteOrder::Little;
}

pub mod exheader {
    pub const SIZE: usize = 0x400;
    /// Offset of the program id in the ARM11 local system capabilities.
    pub const PROGRAM_ID: usize = 0x200;
    pub const CORE_VERSION: usize = 0x208;

    pub const FLAG_COMPRESSED_CODE: u8 = 0x01;
    pub const FLAG_SD_APPLICATION: u8 = 0x02;
}

/// The fixed part of a CIA header. The content index bitmap follows.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CiaHeader {
    pub header_size: u32,
    pub kind: u16,
    pub version: u16,
    pub cert_chain_size: u32,
    pub ticket_size: u32,
    pub tmd_size: u32,
    pub meta_size: u32,
    pub content_size: u64,
}

impl RawStruct for CiaHeader {
    const SIZE: usize = 0x20;
    const ORDER: ByteOrder = ByteOrder::Little;
}

/// The only CIA header size in use.
pub const CIA_HEADER_SIZE: u32 = 0x2020;
/// Offset of the SMDH in the CIA meta section.
pub const CIA_META_SMDH: u64 = 0x400;

/// TMD header following the signature.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TmdHeader {
    pub issuer: Bytes<0x40>,
    pub version: u8,
    pub ca_crl_version: u8,
    pub signer_crl_version: u8,
    pub reserved0: u8,
    pub system_version: u64,
    pub title_id: u64,
    pub title_type: u32,
    pub group_id: u16,
    pub save_data_size: u32,
    pub srl_private_save_size: u32,
    pub reserved1: u32,
    pub srl_flag: u8,
    pub reserved2: Bytes<0x31>,
    pub access_rights: u32,
    pub title_version: u16,
    pub content_count: u16,
    pub boot_content: u16,
    pub padding: u16,
    pub info_records_hash: Bytes<0x20>,
}

impl RawStruct for TmdHeader {
    const SIZE: usize = 0xC4;
    const ORDER: ByteOrder = ByteOrder::Big;
}

pub mod tmd {
    /// Size of the content info records between header and chunk records.
    pub const INFO_RECORDS_SIZE: u64 = 64 * 0x24;

    pub const CONTENT_ENCRYPTED: u16 = 0x0001;
    pub const CONTENT_OPTIONAL: u16 = 0x4000;

    /// Limit on the chunk records read from a TMD.
    pub const MAX_CONTENTS: u16 = 256;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContentChunk {
    pub id: u32,
    pub index: u16,
    pub kind: u16,
    pub size: u64,
    pub hash: Bytes<0x20>,
}

impl RawStruct for ContentChunk {
    const SIZE: usize = 0x30;
    const ORDER: ByteOrder = ByteOrder::Big;
}

/// Size of a signature block (type, signature and padding) by type.
pub fn signature_size(kind: u32) -> Option<u64> {
    match kind {
        0x0001_0000 | 0x0001_0003 => Some(4 + 0x200 + 0x3C),
        0x0001_0001 | 0x0001_0004 => Some(4 + 0x100 + 0x3C),
        0x0001_0002 | 0x0001_0005 => Some(4 + 0x3C + 0x40),
        _ => None,
    }
}
