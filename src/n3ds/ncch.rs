//! NCCH partitions: the header, the extended header and the ExeFS.
//!
//! Both the extended header and the ExeFS are encrypted with AES-CTR unless
//! the header says otherwise. The counter is the partition id (big-endian)
//! followed by a section byte, and the key comes from the key scrambler.

use super::raw::{self, exefs, exheader, ncch, ExHeaderSci, ExefsEntry, NcchHeader, PartitionEntry};
use crate::crypto::{ctr_scramble, Key, KeyStore};
use crate::fields::{Base, Fields, StrFlags};
use crate::raw::RawStruct;
use crate::source::{CtrSource, PartitionSource, Source, SourceExt};
use crate::utils::latin1_cstr;
use crate::Error;

use std::sync::Arc;

/// Key store entry of the KeyX for key slot 0x2C.
pub const SLOT_0X2C_KEY_X: &str = "ctr-Slot0x2CKeyX";
/// Key store entry of the key scrambler constant.
pub const SCRAMBLER: &str = "ctr-scrambler";
/// Key store entry of the fixed key used by system titles.
pub const FIXED_SYSTEM_KEY: &str = "ctr-FixedSystemKey";

/// Largest media unit shift accepted from a header.
const MAX_UNIT_SHIFT: u8 = 16;

const CONTENT_TYPE_NAMES: [Option<&str>; 6] = [
    Some("Data"),
    Some("Executable"),
    Some("System Update"),
    Some("Manual"),
    Some("Download Play Child"),
    Some("Trial"),
];

const EXHEADER_FLAG_NAMES: [Option<&str>; 2] = [Some("Compressed Code"), Some("SD Application")];

/// How the NCCH sections are encrypted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Crypto {
    None,
    /// All-zero key, or the fixed system key for system titles.
    FixedKey,
    /// Key slot 0x2C for the ExeFS header and icon; the byte selects the
    /// secondary key slot used for the rest.
    Standard(u8),
}

impl Crypto {
    pub fn name(self) -> String {
        match self {
            Crypto::None => "None".to_string(),
            Crypto::FixedKey => "Fixed Key".to_string(),
            Crypto::Standard(0x00) => "Standard (Slot 0x2C)".to_string(),
            Crypto::Standard(0x01) => "v7.x (Slot 0x25)".to_string(),
            Crypto::Standard(0x0A) => "New3DS 9.3 (Slot 0x18)".to_string(),
            Crypto::Standard(0x0B) => "New3DS 9.6 (Slot 0x1B)".to_string(),
            Crypto::Standard(other) => format!("Unknown (0x{:02X})", other),
        }
    }
}

/// Decoded parts of the extended header.
#[derive(Debug, Clone)]
pub struct ExHeader {
    pub process_name: String,
    pub flags: u8,
    pub remaster_version: u16,
    pub program_id: u64,
    pub core_version: u32,
}

/// An NCCH partition.
#[derive(Debug)]
pub struct Ncch {
    source: Arc<dyn Source>,
    keys: Arc<KeyStore>,
    header: NcchHeader,
    crypto: Crypto,
    media_unit: u64,
}

impl Ncch {
    /// Reads and validates the NCCH header at the start of `source`.
    pub fn new(source: Arc<dyn Source>, keys: Arc<KeyStore>) -> Result<Self, Error> {
        let header: NcchHeader = source.read_struct(0)?;
        if header.magic.0 != *raw::NCCH_MAGIC {
            return Err(Error::Malformed(format!(
                "invalid NCCH magic {:?}",
                header.magic
            )));
        }

        let shift = header.flags.0[ncch::FLAG_UNIT_SIZE];
        if shift > MAX_UNIT_SHIFT {
            return Err(Error::Malformed(format!("NCCH media unit shift {} too large", shift)));
        }
        let bitmask = header.flags.0[ncch::FLAG_BITMASK];
        let crypto = if bitmask & ncch::BITMASK_NO_CRYPTO != 0 {
            Crypto::None
        } else if bitmask & ncch::BITMASK_FIXED_KEY != 0 {
            Crypto::FixedKey
        } else {
            Crypto::Standard(header.flags.0[ncch::FLAG_CRYPTO_METHOD])
        };
        debug!(
            "NCCH {:016X}: version {}, crypto {:?}",
            header.program_id, header.version, crypto
        );

        Ok(Self {
            source,
            keys,
            header,
            crypto,
            media_unit: 0x200 << shift,
        })
    }

    pub fn header(&self) -> &NcchHeader {
        &self.header
    }

    pub fn crypto(&self) -> Crypto {
        self.crypto
    }

    pub fn program_id(&self) -> u64 {
        self.header.program_id
    }

    pub fn product_code(&self) -> String {
        latin1_cstr(&self.header.product_code.0)
    }

    fn is_system_title(&self) -> bool {
        self.header.program_id & (0x10 << 32) != 0
    }

    /// The key for the ExeFS header and the extended header, or `None` if
    /// the sections are stored unencrypted.
    fn key(&self) -> Result<Option<Key>, Error> {
        let lookup = |name: &str| {
            self.keys
                .get(name)
                .ok_or_else(|| Error::KeyUnavailable(name.to_string()))
        };
        match self.crypto {
            Crypto::None => Ok(None),
            Crypto::FixedKey if self.is_system_title() => lookup(FIXED_SYSTEM_KEY).map(Some),
            Crypto::FixedKey => Ok(Some([0; 16])),
            Crypto::Standard(_) => {
                let key_x = lookup(SLOT_0X2C_KEY_X)?;
                let scrambler = lookup(SCRAMBLER)?;
                let mut key_y = [0; 16];
                key_y.copy_from_slice(&self.header.signature.0[..16]);
                info!("NCCH {:016X}: using key slot 0x2C", self.header.program_id);
                Ok(Some(ctr_scramble(&key_x, &key_y, &scrambler)))
            }
        }
    }

    /// The initial CTR counter of a section.
    fn counter(&self, section: u8) -> u128 {
        u128::from(self.header.partition_id) << 64 | u128::from(section) << 56
    }

    /// Converts a partition entry in media units to a byte range.
    fn byte_range(&self, entry: PartitionEntry) -> Result<(u64, u64), Error> {
        let offset = u64::from(entry.offset) * self.media_unit;
        let len = u64::from(entry.length) * self.media_unit;
        if len == 0 {
            return Err(Error::NotFound("empty NCCH section".to_string()));
        }
        Ok((offset, len))
    }

    fn section(&self, offset: u64, len: u64, section: u8) -> Result<Arc<dyn Source>, Error> {
        let parent = Arc::clone(&self.source);
        Ok(match self.key()? {
            Some(key) => Arc::new(CtrSource::new(parent, offset, len, &key, self.counter(section))?),
            None => Arc::new(PartitionSource::new(parent, offset, len)?),
        })
    }

    /// The plaintext ExeFS.
    pub fn exefs(&self) -> Result<Arc<dyn Source>, Error> {
        let (offset, len) = self.byte_range(self.header.exefs)?;
        self.section(offset, len, ncch::SECTION_EXEFS)
    }

    /// Reads the ExeFS file table and checks that it decrypted to something
    /// sane.
    fn exefs_entries(&self, exefs: &dyn Source) -> Result<Vec<ExefsEntry>, Error> {
        let data = exefs.read_vec(0, exefs::ENTRY_COUNT * ExefsEntry::SIZE)?;
        let capacity = exefs.size().saturating_sub(exefs::HEADER_SIZE);
        let mut entries = Vec::new();
        for chunk in data.chunks_exact(ExefsEntry::SIZE) {
            let entry = ExefsEntry::parse(chunk)?;
            if entry.name.is_zero() {
                continue;
            }
            let name_ok = entry
                .name
                .0
                .iter()
                .take_while(|b| **b != 0)
                .all(|b| b.is_ascii_graphic());
            let end = u64::from(entry.offset) + u64::from(entry.size);
            if !name_ok || end > capacity {
                return Err(Error::Malformed(
                    "ExeFS header is invalid (wrong key?)".to_string(),
                ));
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Reads the ExeFS file `name`, refusing files larger than `max_size`.
    pub fn exefs_file(&self, name: &str, max_size: u32) -> Result<Vec<u8>, Error> {
        let exefs = self.exefs()?;
        let entry = self
            .exefs_entries(&*exefs)?
            .into_iter()
            .find(|e| latin1_cstr(&e.name.0) == name)
            .ok_or_else(|| Error::NotFound(format!("no ExeFS file `{}`", name)))?;
        if entry.size > max_size {
            return Err(Error::Malformed(format!(
                "ExeFS file `{}` is too large ({:#X} bytes)",
                name, entry.size
            )));
        }
        exefs.read_vec(exefs::HEADER_SIZE + u64::from(entry.offset), entry.size as usize)
    }

    /// Reads and decrypts the extended header.
    pub fn exheader(&self) -> Result<ExHeader, Error> {
        if (self.header.exheader_size as usize) < exheader::SIZE {
            return Err(Error::NotFound("NCCH has no extended header".to_string()));
        }
        let encrypted = self.crypto != Crypto::None;
        let source = self.section(
            ncch::EXHEADER_OFFSET,
            exheader::SIZE as u64,
            ncch::SECTION_EXHEADER,
        )?;
        let data = source.read_vec(0, exheader::SIZE)?;

        let sci = ExHeaderSci::parse(&data)?;
        let mut program_id = [0; 8];
        program_id.copy_from_slice(&data[exheader::PROGRAM_ID..exheader::PROGRAM_ID + 8]);
        let program_id = u64::from_le_bytes(program_id);
        if encrypted && program_id != self.header.program_id {
            return Err(Error::Malformed(
                "extended header did not decrypt (program id mismatch)".to_string(),
            ));
        }
        let mut core_version = [0; 4];
        core_version.copy_from_slice(&data[exheader::CORE_VERSION..exheader::CORE_VERSION + 4]);

        Ok(ExHeader {
            process_name: latin1_cstr(&sci.process_name.0),
            flags: sci.flags,
            remaster_version: sci.remaster_version,
            program_id,
            core_version: u32::from_le_bytes(core_version),
        })
    }

    /// Adds the NCCH header and extended header fields to the current tab.
    pub fn add_fields(&self, fields: &mut Fields) {
        let product_code = self.product_code();
        if !product_code.is_empty() {
            fields.add_string("Product Code", product_code);
        }
        fields.add_string_numeric(
            "Program ID",
            self.header.program_id,
            Base::Hex,
            16,
            StrFlags::MONOSPACE,
        );
        let maker = latin1_cstr(&self.header.maker_code.0);
        if !maker.is_empty() {
            fields.add_string("Maker Code", maker);
        }
        fields.add_string("NCCH Version", self.header.version.to_string());

        let platform = match self.header.flags.0[ncch::FLAG_PLATFORM] {
            1 => "Old 3DS".to_string(),
            2 => "New 3DS".to_string(),
            other => format!("Unknown ({})", other),
        };
        fields.add_string("Platform", platform);
        fields.add_bitfield(
            "Content Type",
            &CONTENT_TYPE_NAMES,
            3,
            self.header.flags.0[ncch::FLAG_CONTENT_TYPE].into(),
        );
        fields.add_string("Encryption", self.crypto.name());

        match self.exheader() {
            Ok(exheader) => {
                fields.add_string("Process Name", exheader.process_name);
                fields.add_bitfield(
                    "ExHeader Flags",
                    &EXHEADER_FLAG_NAMES,
                    2,
                    u32::from(exheader.flags) & 0x3,
                );
                fields.add_string("Remaster Version", exheader.remaster_version.to_string());
            }
            Err(Error::NotFound(_)) => {}
            Err(e) => {
                debug!("extended header unavailable: {}", e);
                let status = if e.is_not_found() {
                    "Encrypted (key unavailable)"
                } else {
                    "Unknown"
                };
                fields.add_string("ExHeader", status);
            }
        }
    }
}
