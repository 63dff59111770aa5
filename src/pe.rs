//! Minimal PE/COFF header reader.
//!
//! Only the headers are decoded: the DOS stub's `e_lfanew`, the COFF file
//! header and the start of the optional header, which is enough to describe
//! an image embedded in another executable.

use crate::fields::Fields;
use crate::raw::{ByteOrder, Bytes, RawStruct};
use crate::source::{Source, SourceExt};
use crate::Error;

use std::time::{Duration, UNIX_EPOCH};

pub const DOS_MAGIC: &[u8; 2] = b"MZ";
pub const PE_MAGIC: &[u8; 4] = b"PE\0\0";

/// Offset of `e_lfanew` in the DOS header.
const LFANEW_OFFSET: u64 = 0x3C;
/// `e_lfanew` values past this are not believed.
const MAX_LFANEW: u32 = 0x1000_0000;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileHeader {
    pub magic: Bytes<4>,
    pub machine: u16,
    pub num_sections: u16,
    pub time_date: u32,
    pub symbol_table_addr: u32,
    pub num_symbols: u32,
    pub optional_header_size: u16,
    pub characteristics: u16,
}

impl RawStruct for FileHeader {
    const SIZE: usize = 24;
    const ORDER: ByteOrder = ByteOrder::Little;
}

/// The part of the optional header shared by PE32 and PE32+.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OptionalHeader {
    pub magic: u16,
    pub linker_major: u8,
    pub linker_minor: u8,
    pub code_size: u32,
    pub initialized_data_size: u32,
    pub uninitialized_data_size: u32,
    pub entry_point: u32,
    pub code_base: u32,
    /// `base_of_data` and `image_base` for PE32, the 64-bit `image_base` for
    /// PE32+.
    pub bases: [u32; 2],
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub os_version: [u16; 2],
    pub image_version: [u16; 2],
    pub subsystem_version: [u16; 2],
    pub win32_version: u32,
    pub image_size: u32,
    pub headers_size: u32,
    pub checksum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
}

impl RawStruct for OptionalHeader {
    const SIZE: usize = 72;
    const ORDER: ByteOrder = ByteOrder::Little;
}

bitflags! {
    /// COFF `Characteristics` field.
    pub struct Characteristics: u16 {
        const RELOCS_STRIPPED         = 0x0001;
        const EXECUTABLE_IMAGE        = 0x0002;
        const LINE_NUMS_STRIPPED      = 0x0004;
        const LOCAL_SYMS_STRIPPED     = 0x0008;
        const AGGRESSIVE_WS_TRIM      = 0x0010;
        const LARGE_ADDRESS_AWARE     = 0x0020;
        const BYTES_REVERSED_LO       = 0x0080;
        const MACHINE_32BIT           = 0x0100;
        const DEBUG_STRIPPED          = 0x0200;
        const REMOVABLE_RUN_FROM_SWAP = 0x0400;
        const NET_RUN_FROM_SWAP       = 0x0800;
        const SYSTEM                  = 0x1000;
        const DLL                     = 0x2000;
        const UP_SYSTEM_ONLY          = 0x4000;
        const BYTES_REVERSED_HI       = 0x8000;
    }
}

const CHARACTERISTIC_NAMES: [Option<&str>; 16] = [
    Some("Relocs Stripped"),
    Some("Executable"),
    Some("Line Numbers Stripped"),
    Some("Local Symbols Stripped"),
    Some("Aggressive WS Trim"),
    Some("Large Address Aware"),
    None,
    Some("Bytes Reversed (Lo)"),
    Some("32-bit"),
    Some("Debug Stripped"),
    Some("Removable Run From Swap"),
    Some("Net Run From Swap"),
    Some("System"),
    Some("DLL"),
    Some("Uniprocessor Only"),
    Some("Bytes Reversed (Hi)"),
];

const MACHINES: &[(u16, &str)] = &[
    (0x014C, "Intel i386"),
    (0x0166, "MIPS R4000"),
    (0x01C0, "ARM"),
    (0x01C2, "ARM Thumb"),
    (0x01C4, "ARM Thumb-2"),
    (0x01F0, "PowerPC"),
    (0x01F1, "PowerPC with FPU"),
    (0x01F2, "PowerPC (big-endian)"),
    (0x0200, "Intel Itanium"),
    (0x8664, "AMD64"),
    (0xAA64, "ARM64"),
];

const SUBSYSTEMS: &[(u16, &str)] = &[
    (1, "Native"),
    (2, "Windows GUI"),
    (3, "Windows Console"),
    (5, "OS/2 Console"),
    (7, "POSIX Console"),
    (9, "Windows CE GUI"),
    (10, "EFI Application"),
    (11, "EFI Boot Service Driver"),
    (12, "EFI Runtime Driver"),
    (13, "EFI ROM"),
    (14, "Xbox"),
    (16, "Windows Boot Application"),
];

fn lookup(table: &[(u16, &'static str)], value: u16) -> Option<&'static str> {
    table
        .binary_search_by_key(&value, |(v, _)| *v)
        .ok()
        .and_then(|idx| table.get(idx))
        .map(|(_, name)| *name)
}

/// Decoded PE headers.
#[derive(Debug)]
pub struct PeHeader {
    file: FileHeader,
    characteristics: Characteristics,
    optional: Option<OptionalHeader>,
}

impl PeHeader {
    /// Reads the headers of a PE image starting at `base` in `source`.
    pub fn read(source: &dyn Source, base: u64) -> Result<Self, Error> {
        let mut dos_magic = [0; 2];
        source.read_exact_at(base, &mut dos_magic)?;
        if &dos_magic != DOS_MAGIC {
            return Err(Error::Malformed("missing MZ signature".to_string()));
        }

        let mut lfanew = [0; 4];
        source.read_exact_at(base + LFANEW_OFFSET, &mut lfanew)?;
        let lfanew = u32::from_le_bytes(lfanew);
        if lfanew > MAX_LFANEW {
            return Err(Error::Malformed(format!("e_lfanew out of range: {:#X}", lfanew)));
        }

        let pe_offset = base + u64::from(lfanew);
        let file: FileHeader = source.read_struct(pe_offset)?;
        if file.magic.0 != *PE_MAGIC {
            return Err(Error::Malformed(format!("invalid PE signature {:?}", file.magic)));
        }

        let characteristics = Characteristics::from_bits_truncate(file.characteristics);
        if characteristics.bits() != file.characteristics {
            warn!(
                "unknown PE characteristics flags: known flags: {:#X}, raw flags: {:#X}",
                characteristics.bits(),
                file.characteristics
            );
        }

        let optional = if usize::from(file.optional_header_size) >= OptionalHeader::SIZE {
            match source.read_struct::<OptionalHeader>(pe_offset + FileHeader::SIZE as u64) {
                Ok(header) => Some(header),
                Err(e) => {
                    debug!("failed to read PE optional header: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            file,
            characteristics,
            optional,
        })
    }

    pub fn machine(&self) -> u16 {
        self.file.machine
    }

    pub fn characteristics(&self) -> Characteristics {
        self.characteristics
    }

    pub fn subsystem(&self) -> Option<u16> {
        self.optional.as_ref().map(|o| o.subsystem)
    }

    /// Builds a single-tab field list describing the headers.
    pub fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.reserve(5);

        let machine = match lookup(MACHINES, self.file.machine) {
            Some(name) => name.to_string(),
            None => format!("Unknown (0x{:04X})", self.file.machine),
        };
        fields.add_string("Machine", machine);

        if self.file.time_date != 0 {
            fields.add_datetime(
                "Timestamp",
                UNIX_EPOCH + Duration::from_secs(self.file.time_date.into()),
            );
        }

        if let Some(optional) = &self.optional {
            let subsystem = match lookup(SUBSYSTEMS, optional.subsystem) {
                Some(name) => name.to_string(),
                None => format!("Unknown ({})", optional.subsystem),
            };
            fields.add_string("Subsystem", subsystem);
            fields.add_string(
                "Linker Version",
                format!("{}.{}", optional.linker_major, optional.linker_minor),
            );
        }

        fields.add_bitfield(
            "Characteristics",
            &CHARACTERISTIC_NAMES,
            3,
            self.characteristics.bits().into(),
        );
        fields
    }
}
