//! Raw XBE structures.
//!
//! Generally, the structures in here don't try to verify their values if not
//! necessary and store most things as raw values instead of more convenient
//! types. That's left to the wrappers in the parent module.
//!
//! Everything is Little Endian.

use crate::raw::{ByteOrder, Bytes, RawStruct, WideStr};

use std::u32;

/// "XBEH"
pub const MAGIC: &[u8; 4] = b"XBEH";

// All addresses refer to the address *after* loading the XBE into memory

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Header {
    /// Magic number, must be equal to `MAGIC`.
    pub magic: Bytes<4>,
    /// MS signature.
    pub signature: Bytes<256>,
    /// Address at which the whole XBE image should be loaded.
    pub base_addr: u32,
    pub header_size: u32,
    pub image_size: u32,
    pub image_header_size: u32,
    /// Creation time of the file as a Unix timestamp.
    pub time_date: u32,
    /// Address of a `Certificate` struct.
    pub cert_addr: u32,
    pub num_sections: u32,
    /// Address of an array of `SectionHeader` structs.
    pub section_headers_addr: u32,
    /// Raw init flags.
    ///
    /// Can be converted to `InitFlags`, which contains the known flags.
    pub init_flags: u32,
    /// Start address of execution, XOR encoded.
    pub entry_point: u32,
    pub tls_addr: u32,
    pub pe_stack_commit: u32,
    pub pe_heap_reserve: u32,
    pub pe_heap_commit: u32,
    pub pe_base_addr: u32,
    pub pe_size: u32,
    pub pe_checksum: u32,
    pub pe_time_date: u32,
    /// Address of a C string for the debug pathname (full path to exec file).
    pub debug_pathname_addr: u32,
    /// Address of a C string for the debug filename (without the path).
    pub debug_filename_addr: u32,
    /// Same as `debug_filename_addr`, but as a "long string".
    pub debug_unicode_filename_addr: u32,
    /// Address of the kernel thunk, XOR encoded.
    pub kernel_thunk_addr: u32,
    pub non_kernel_import_dir_addr: u32,
    pub num_library_versions: u32,
    pub library_versions_addr: u32,
    pub kernel_library_version_addr: u32,
    pub xapi_library_version_addr: u32,
    /// Address of the logo bitmap.
    pub logo_bitmap_addr: u32,
    /// Logo bitmap size in Bytes.
    pub logo_bitmap_size: u32,
}

impl RawStruct for Header {
    const SIZE: usize = 0x178;
    const ORDER: ByteOrder = ByteOrder::Little;
}

impl Header {
    /// Translates an address inside a header to an address relative to the
    /// start of the XBE image (the "RVA" - Relative Virtual Address).
    ///
    /// Normally, addresses inside the XBE header refer to the address after the
    /// XBE has been mapped to the base address. Returns `None` for addresses
    /// at or below the base address, which never point at header data.
    pub fn rel_addr(&self, addr: u32) -> Option<u32> {
        if addr > self.base_addr {
            Some(addr - self.base_addr)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Certificate {
    /// Certificate size in Bytes.
    pub size: u32,
    pub time_date: u32,
    pub title_id: u32,
    /// Title name of the application, wide string of up to 40 code units.
    pub title_name: WideStr<40>,
    /// Array of alternative `title_id`s (or zeros).
    pub alt_title_ids: [u32; 16],
    /// Allowed media types.
    ///
    /// Known flags in this bitmask are listed as `MediaTypes`.
    pub allowed_media: u32,
    /// See `GameRegion`.
    pub game_region: u32,
    pub game_ratings: u32,
    pub disk_number: u32,
    pub version: u32,
    pub lan_key: [u8; 16],
    pub signature_key: [u8; 16],
    /// Alternative signature keys.
    pub alt_signature_keys: [[u8; 16]; 16],
}

impl RawStruct for Certificate {
    const SIZE: usize = 0x1D0;
    const ORDER: ByteOrder = ByteOrder::Little;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SectionHeader {
    /// See `SectionFlags`.
    pub section_flags: u32,
    /// Virtual address where this section should be mapped to.
    pub virt_addr: u32,
    pub virt_size: u32,
    /// Offset of the section content inside the XBE image.
    pub raw_addr: u32,
    pub raw_size: u32,
    /// Address of the section's name string. The string is zero terminated and
    /// probably ASCII.
    pub section_name_addr: u32,
    pub section_name_refcount: u32,
    pub head_shared_page_refcount_addr: u32,
    pub tail_shared_page_refcount_addr: u32,
    /// Signature digest.
    pub section_digest: [u8; 20],
}

impl RawStruct for SectionHeader {
    const SIZE: usize = 0x38;
    const ORDER: ByteOrder = ByteOrder::Little;
}
