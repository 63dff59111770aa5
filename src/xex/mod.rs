//! Xbox 360 executables (XEX2).
//!
//! The fixed header is followed by a table of optional headers. The PE image
//! starts at `pe_offset` and may be encrypted with a per-title key (AES-CBC)
//! and compressed. Title strings and the icon live in an XDBF resource inside
//! the PE image, which is opened lazily as a nested reader.

mod basic;
pub mod raw;

use self::basic::BasicSource;
use crate::crypto::{ecb_decrypt_block, Key};
use crate::detect::DetectInfo;
use crate::fields::{join_names, Base, Fields, StrFlags};
use crate::image::{DecodedImage, ImageSize, ImageType, ImageTypes};
use crate::lazy::Lazy;
use crate::metadata::{MetaData, Property};
use crate::options::Options;
use crate::raw::RawStruct;
use crate::rom::{self, FileType, RomData, SystemName};
use crate::source::{CbcSource, PartitionSource, Source, SourceExt};
use crate::utils::{latin1_cstr, title_id_letters};
use crate::xdbf::Xdbf;
use crate::Error;

use std::sync::Arc;

const SYSTEM_NAMES: [&str; 3] = ["Microsoft Xbox 360", "Xbox 360", "X360"];

/// Key store entry holding the retail common key.
pub const RETAIL_KEY_NAME: &str = "xex-retail";
/// The debug common key is all zeros.
const DEBUG_KEY: Key = [0; 16];

/// Largest length-prefixed optional header that is read.
const MAX_OPT_HEADER_SIZE: u32 = 64 * 1024;
/// Limits of the original PE name header, including its length field.
const PE_NAME_SIZE: std::ops::RangeInclusive<u32> = 5..=264;

bitflags! {
    pub struct ModuleFlags: u32 {
        const TITLE        = 0x0000_0001;
        const EXPORTS      = 0x0000_0002;
        const DEBUGGER     = 0x0000_0004;
        const DLL          = 0x0000_0008;
        const MODULE_PATCH = 0x0000_0010;
        const PATCH_FULL   = 0x0000_0020;
        const PATCH_DELTA  = 0x0000_0040;
        const USER_MODE    = 0x0000_0080;
    }
}

bitflags! {
    pub struct ImageFlags: u32 {
        const MANUFACTURING_UTILITY      = 0x0000_0002;
        const MANUFACTURING_SUPPORT_TOOL = 0x0000_0004;
        const XGD2_MEDIA_ONLY            = 0x0000_0008;
        const CARDEA_KEY                 = 0x0000_0100;
        const XEIKA_KEY                  = 0x0000_0200;
        const USERMODE_TITLE             = 0x0000_0400;
        const USERMODE_SYSTEM            = 0x0000_0800;
        const ORANGE0                    = 0x0000_1000;
        const ORANGE1                    = 0x0000_2000;
        const ORANGE2                    = 0x0000_4000;
        const IPTV_SIGNUP_APPLICATION    = 0x0001_0000;
        const IPTV_TITLE_APPLICATION     = 0x0002_0000;
        const KEYVAULT_PRIVILEGES        = 0x0400_0000;
        const ONLINE_ACTIVATION_REQUIRED = 0x0800_0000;
        const SMALL_PAGES                = 0x1000_0000;
        const REGION_FREE                = 0x2000_0000;
        const REVOCATION_CHECK_OPTIONAL  = 0x4000_0000;
        const REVOCATION_CHECK_REQUIRED  = 0x8000_0000;
    }
}

/// Region bytes of the security info and the displayed region bits they set.
const REGIONS: &[(u32, u32)] = &[
    (0x0000_00FF, 1 << 0),          // NTSC-U
    (0x0000_0100, 1 << 1),          // NTSC-J Japan
    (0x0000_0200, 1 << 2),          // NTSC-J China
    (0x0000_FC00, 1 << 3),          // NTSC-J other
    (0x00FE_0000, 1 << 4),          // PAL other
    (0x0001_0000, 1 << 5 | 1 << 6), // PAL Australia/New Zealand
];

const REGION_NAMES: [Option<&str>; 7] = [
    Some("USA"),
    Some("Japan"),
    Some("China"),
    Some("Asia"),
    Some("Europe"),
    Some("Australia"),
    Some("New Zealand"),
];

const MODULE_FLAG_NAMES: [Option<&str>; 8] = [
    Some("Title"),
    Some("Exports"),
    Some("Debugger"),
    Some("DLL"),
    Some("Module Patch"),
    Some("Full Patch"),
    Some("Delta Patch"),
    Some("User Mode"),
];

const MEDIA_TYPE_NAMES: [Option<&str>; 29] = [
    Some("Hard Disk"),
    Some("DVD X2"),
    Some("DVD / CD"),
    Some("DVD (Single Layer)"),
    Some("DVD (Dual Layer)"),
    Some("Internal Flash Memory"),
    None,
    Some("Memory Unit"),
    Some("USB Mass Storage Device"),
    Some("Network"),
    Some("Direct from Memory"),
    Some("Hard RAM Drive"),
    Some("SVOD"),
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    Some("Insecure Package"),
    Some("Savegame Package"),
    Some("Locally Signed Package"),
    Some("Xbox Live Signed Package"),
    Some("Xbox Package"),
];

pub fn is_supported(info: &DetectInfo) -> bool {
    match raw::Header::parse(info.header) {
        Ok(header) => header.magic.0 == *raw::MAGIC,
        Err(_) => false,
    }
}

/// Which common key decrypted the title key.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EncryptionKey {
    None,
    Retail,
    Debug,
}

impl EncryptionKey {
    pub fn name(self) -> &'static str {
        match self {
            EncryptionKey::None => "None",
            EncryptionKey::Retail => "Retail",
            EncryptionKey::Debug => "Debug",
        }
    }
}

/// The decrypted and decompressed PE image.
#[derive(Debug)]
struct PeImage {
    source: Arc<dyn Source>,
    key: EncryptionKey,
}

/// Reader for XEX2 executables.
#[derive(Debug)]
pub struct Xex {
    source: Option<Arc<dyn Source>>,
    options: Options,
    valid: bool,
    header: raw::Header,
    module_flags: ModuleFlags,
    opt_headers: Vec<raw::OptHeader>,
    security: Option<raw::SecurityInfo>,
    file_format: Option<raw::FileFormatInfo>,
    pe: Lazy<PeImage>,
    xdbf: Lazy<Xdbf>,
    fields: Lazy<Fields>,
    metadata: Lazy<MetaData>,
}

impl Xex {
    pub fn new(source: Arc<dyn Source>, options: &Options) -> Self {
        let mut this = Self {
            source: None,
            options: options.clone(),
            valid: false,
            header: raw::Header {
                magic: Default::default(),
                module_flags: 0,
                pe_offset: 0,
                reserved: 0,
                sec_info_offset: 0,
                opt_header_count: 0,
            },
            module_flags: ModuleFlags::empty(),
            opt_headers: Vec::new(),
            security: None,
            file_format: None,
            pe: Lazy::new(),
            xdbf: Lazy::new(),
            fields: Lazy::new(),
            metadata: Lazy::new(),
        };

        match this.read_headers(&*source) {
            Ok(()) => {
                this.source = Some(source);
                this.valid = true;
            }
            Err(e) => debug!("not a usable XEX: {}", e),
        }
        this
    }

    fn read_headers(&mut self, source: &dyn Source) -> Result<(), Error> {
        let header: raw::Header = source.read_struct(0)?;
        if header.magic.0 != *raw::MAGIC {
            return Err(Error::Unsupported);
        }

        self.module_flags = ModuleFlags::from_bits_truncate(header.module_flags);
        if self.module_flags.bits() != header.module_flags {
            warn!(
                "unknown module flags: known flags: {:#X}, raw flags: {:#X}",
                self.module_flags.bits(),
                header.module_flags
            );
        }

        let count = header.opt_header_count.min(raw::MAX_OPT_HEADERS);
        let table = source.read_vec(
            raw::Header::SIZE as u64,
            count as usize * raw::OptHeader::SIZE,
        )?;
        self.opt_headers = table
            .chunks_exact(raw::OptHeader::SIZE)
            .map(raw::OptHeader::parse)
            .collect::<Result<_, _>>()?;

        // The security info is needed for most fields but a broken one does
        // not make the file unreadable.
        match source.read_struct::<raw::SecurityInfo>(header.sec_info_offset.into()) {
            Ok(security) => {
                let flags = ImageFlags::from_bits_truncate(security.image_flags);
                if flags.bits() != security.image_flags {
                    warn!(
                        "unknown image flags: known flags: {:#X}, raw flags: {:#X}",
                        flags.bits(),
                        security.image_flags
                    );
                }
                self.security = Some(security);
            }
            Err(e) => warn!("failed to read XEX security info: {}", e),
        }

        self.header = header;
        self.file_format = match self.opt_header_data(source, raw::opt::FILE_FORMAT_INFO) {
            Ok(Some(data)) => match raw::FileFormatInfo::parse(&data) {
                Ok(format) => Some(format),
                Err(e) => {
                    warn!("invalid file format info: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("failed to read file format info: {}", e);
                None
            }
        };
        debug!("XEX: {:?}, file format {:?}", self.header, self.file_format);
        Ok(())
    }

    fn find_opt_header(&self, id: u32) -> Option<&raw::OptHeader> {
        self.opt_headers.iter().find(|h| h.id == id)
    }

    /// Returns the data of an optional header, or `None` if it is absent.
    ///
    /// Length-prefixed headers are returned including their length field.
    fn opt_header_data(&self, source: &dyn Source, id: u32) -> Result<Option<Vec<u8>>, Error> {
        let entry = match self.find_opt_header(id) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let data = match id & 0xFF {
            0x00 | 0x01 => entry.value.to_be_bytes().to_vec(),
            0xFF => {
                let mut len = [0; 4];
                source.read_exact_at(entry.value.into(), &mut len)?;
                let len = u32::from_be_bytes(len);
                if len < 4 || len > MAX_OPT_HEADER_SIZE {
                    return Err(Error::Malformed(format!(
                        "optional header {:#010X} has invalid size {:#X}",
                        id, len
                    )));
                }
                source.read_vec(entry.value.into(), len as usize)?
            }
            words => source.read_vec(entry.value.into(), words as usize * 4)?,
        };
        Ok(Some(data))
    }

    fn read_opt_header(&self, id: u32) -> Result<Option<Vec<u8>>, Error> {
        let source = rom::live_source(&self.source)?;
        self.opt_header_data(&**source, id)
    }

    fn execution_id(&self) -> Option<raw::ExecutionId> {
        match self.read_opt_header(raw::opt::EXECUTION_ID) {
            Ok(Some(data)) => raw::ExecutionId::parse(&data).ok(),
            Ok(None) => None,
            Err(e) => {
                debug!("no execution id: {}", e);
                None
            }
        }
    }

    /// Builds the plaintext view of the PE image, trying the retail key first.
    fn load_pe(&self) -> Result<PeImage, Error> {
        let source = rom::live_source(&self.source)?;
        let format = self
            .file_format
            .as_ref()
            .ok_or_else(|| Error::NotFound("file format info".to_string()))?;

        let base = u64::from(self.header.pe_offset);
        let len = source
            .size()
            .checked_sub(base)
            .ok_or(Error::OutOfRange {
                offset: base,
                len: 0,
                size: source.size(),
            })?;

        let candidates: Vec<(EncryptionKey, Option<Key>)> =
            if format.encryption_type == raw::ENCRYPTION_NONE {
                vec![(EncryptionKey::None, None)]
            } else {
                let security = self
                    .security
                    .as_ref()
                    .ok_or_else(|| Error::NotFound("security info".to_string()))?;
                let mut keys = Vec::new();
                match self.options.keys.get(RETAIL_KEY_NAME) {
                    Some(common) => keys.push((
                        EncryptionKey::Retail,
                        Some(ecb_decrypt_block(&common, &security.file_key.0)),
                    )),
                    None => debug!("no {} key, trying the debug key only", RETAIL_KEY_NAME),
                }
                keys.push((
                    EncryptionKey::Debug,
                    Some(ecb_decrypt_block(&DEBUG_KEY, &security.file_key.0)),
                ));
                keys
            };

        for (kind, key) in candidates {
            let stored: Arc<dyn Source> =
                Arc::new(CbcSource::new(Arc::clone(source), base, len, key.as_ref(), [0; 16])?);
            let image = self.decompress(stored)?;

            let mut magic = [0; 2];
            image.read_exact_at(0, &mut magic)?;
            if &magic == b"MZ" {
                info!("XEX PE image decrypted using the {} key", kind.name());
                return Ok(PeImage { source: image, key: kind });
            }
            debug!("{} key did not produce a PE image", kind.name());
        }

        Err(Error::KeyUnavailable(
            "no key decrypts the XEX PE image".to_string(),
        ))
    }

    fn decompress(&self, stored: Arc<dyn Source>) -> Result<Arc<dyn Source>, Error> {
        let format = match &self.file_format {
            Some(format) => format,
            None => return Ok(stored),
        };
        match format.compression_type {
            raw::COMPRESSION_NONE => Ok(stored),
            raw::COMPRESSION_BASIC => {
                let data = self
                    .read_opt_header(raw::opt::FILE_FORMAT_INFO)?
                    .unwrap_or_default();
                let blocks = data
                    .get(raw::FileFormatInfo::SIZE..)
                    .unwrap_or_default()
                    .chunks_exact(raw::BasicBlock::SIZE)
                    .map(raw::BasicBlock::parse)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Arc::new(BasicSource::new(stored, &blocks)?))
            }
            other => Err(Error::Malformed(format!(
                "{} compression is not supported",
                compression_name(other)
            ))),
        }
    }

    fn pe(&mut self) -> Result<&PeImage, Error> {
        if self.pe.is_pending() {
            rom::live_source(&self.source)?;
            let result = self.load_pe();
            self.pe.resolve(result);
        }
        self.pe.get()
    }

    fn image_base(&self) -> Option<u32> {
        match self.find_opt_header(raw::opt::IMAGE_BASE_ADDRESS) {
            Some(entry) => Some(entry.value),
            None => self.security.as_ref().map(|s| s.load_address),
        }
    }

    fn load_xdbf(&mut self) -> Result<Xdbf, Error> {
        let data = self
            .read_opt_header(raw::opt::RESOURCE_INFO)?
            .ok_or_else(|| Error::NotFound("resource info".to_string()))?;
        let entries = data
            .get(4..)
            .unwrap_or_default()
            .chunks_exact(raw::ResourceEntry::SIZE)
            .map(raw::ResourceEntry::parse)
            .collect::<Result<Vec<_>, _>>()?;

        let wanted = self.execution_id().map(|id| format!("{:08X}", id.title_id));
        let entry = entries
            .iter()
            .find(|e| match &wanted {
                Some(name) => latin1_cstr(&e.name.0) == *name,
                None => true,
            })
            .ok_or_else(|| Error::NotFound("XDBF resource".to_string()))?
            .clone();

        let base = self
            .image_base()
            .ok_or_else(|| Error::NotFound("image base address".to_string()))?;
        if entry.address <= base {
            return Err(Error::NotFound(format!(
                "XDBF resource at {:#X} is below the image base {:#X}",
                entry.address, base
            )));
        }
        let offset = u64::from(entry.address - base);

        let pe = Arc::clone(&self.pe()?.source);
        let section: Arc<dyn Source> =
            Arc::new(PartitionSource::new(pe, offset, entry.size.into())?);
        let xdbf = Xdbf::embedded(section, &self.options);
        if xdbf.is_valid() {
            Ok(xdbf)
        } else {
            Err(Error::Malformed("embedded XDBF is invalid".to_string()))
        }
    }

    fn xdbf(&mut self) -> Result<&mut Xdbf, Error> {
        if self.xdbf.is_pending() {
            rom::live_source(&self.source)?;
            let result = self.load_xdbf();
            self.xdbf.resolve(result);
        }
        self.xdbf.get_mut()
    }

    fn pe_filename(&self) -> Option<String> {
        let data = self.read_opt_header(raw::opt::ORIGINAL_PE_NAME).ok()??;
        let len = data.len() as u32;
        if !PE_NAME_SIZE.contains(&len) {
            return None;
        }
        let name = latin1_cstr(data.get(4..)?);
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    fn load_fields(&mut self) -> Result<Fields, Error> {
        rom::live_source(&self.source)?;
        let mut fields = Fields::new();
        fields.reserve(12);
        fields.set_tab_name(0, "XEX");

        let title = match self.xdbf() {
            Ok(xdbf) => xdbf.title(),
            Err(e) => {
                debug!("no XDBF resource: {}", e);
                String::new()
            }
        };
        if !title.is_empty() {
            fields.add_string("Title", title);
        }

        if let Some(name) = self.pe_filename() {
            fields.add_string("PE Filename", name);
        }

        fields.add_bitfield(
            "Module Flags",
            &MODULE_FLAG_NAMES,
            4,
            self.module_flags.bits(),
        );

        if let Some(security) = &self.security {
            let image_flags = ImageFlags::from_bits_truncate(security.image_flags);
            let media = if image_flags.contains(ImageFlags::XGD2_MEDIA_ONLY) {
                "XGD2 only".to_string()
            } else {
                join_names(&media_type_names(security.allowed_media_types), 4)
            };
            fields.add_string("Media Types", media);
            fields.add_bitfield("Region Code", &REGION_NAMES, 4, region_bits(security.region));
        }

        if let Some(id) = self.execution_id() {
            fields.add_string_numeric(
                "Media ID",
                id.media_id.into(),
                Base::Hex,
                8,
                StrFlags::MONOSPACE,
            );
            fields.add_string_flags(
                "Title ID",
                format!(
                    "0x{:08X} ({}-{})",
                    id.title_id,
                    title_id_letters(id.title_id),
                    id.title_id & 0xFFFF
                ),
                StrFlags::MONOSPACE,
            );
            fields.add_string_numeric(
                "Savegame ID",
                id.savegame_id.into(),
                Base::Hex,
                8,
                StrFlags::MONOSPACE,
            );
            if id.disc_number != 0 && id.disc_count > 1 {
                fields.add_string(
                    "Disc #",
                    format!("{} of {}", id.disc_number, id.disc_count),
                );
            }
            fields.add_string("Version", format_version(id.version));
        }

        // Present but unparseable: neither encryption nor compression is known.
        let format_unknown = self.file_format.is_none()
            && self.find_opt_header(raw::opt::FILE_FORMAT_INFO).is_some();
        let encrypted = format_unknown
            || self
                .file_format
                .as_ref()
                .map_or(false, |f| f.encryption_type != raw::ENCRYPTION_NONE);
        let key = match self.pe() {
            Ok(pe) => pe.key.name(),
            Err(e) => {
                debug!("PE image unavailable: {}", e);
                if encrypted {
                    "Unknown"
                } else {
                    "None"
                }
            }
        };
        fields.add_string("Encryption Key", key);

        match &self.file_format {
            Some(format) => {
                fields.add_string("Compression", compression_name(format.compression_type))
            }
            None if format_unknown => fields.add_string("Compression", "Unknown"),
            None => {}
        }

        if let Ok(xdbf) = self.xdbf() {
            if let Ok(xdbf_fields) = xdbf.fields() {
                if !xdbf_fields.is_empty() {
                    fields.add_fields_from(xdbf_fields, "XDBF");
                }
            }
        }

        Ok(fields)
    }

    fn load_metadata(&mut self) -> Result<MetaData, Error> {
        rom::live_source(&self.source)?;
        let mut metadata = MetaData::new();
        if let Ok(xdbf) = self.xdbf() {
            metadata.add_string(Property::Title, xdbf.title());
        }
        Ok(metadata)
    }

    fn check_valid(&self) -> Result<(), Error> {
        if self.valid {
            Ok(())
        } else {
            Err(Error::Malformed("not a valid XEX file".to_string()))
        }
    }
}

fn region_bits(region: u32) -> u32 {
    REGIONS
        .iter()
        .filter(|(mask, _)| region & mask != 0)
        .fold(0, |bits, (_, shown)| bits | shown)
}

fn media_type_names(media: u32) -> Vec<String> {
    (0..32)
        .filter(|bit| media & (1 << bit) != 0)
        .map(|bit| match MEDIA_TYPE_NAMES.get(bit as usize).copied().flatten() {
            Some(name) => name.to_string(),
            None => bit.to_string(),
        })
        .collect()
}

fn compression_name(compression: u16) -> String {
    match compression {
        raw::COMPRESSION_NONE => "None".to_string(),
        raw::COMPRESSION_BASIC => "Basic (Sparse)".to_string(),
        raw::COMPRESSION_NORMAL => "Normal (LZX)".to_string(),
        raw::COMPRESSION_DELTA => "Delta".to_string(),
        other => format!("Unknown (0x{:02X})", other),
    }
}

/// Formats a packed `major.minor.build.qfe` version.
fn format_version(version: u32) -> String {
    format!(
        "{}.{}.{}.{}",
        version >> 28,
        (version >> 24) & 0xF,
        (version >> 8) & 0xFFFF,
        version & 0xFF
    )
}

impl RomData for Xex {
    fn is_valid(&self) -> bool {
        self.valid
    }

    fn close(&mut self) {
        if let Ok(xdbf) = self.xdbf.get_mut() {
            xdbf.close();
        }
        // Both hold sources derived from the file.
        self.xdbf.clear();
        self.pe.clear();
        self.source = None;
    }

    fn system_name(&self, kind: SystemName) -> Option<&'static str> {
        if self.valid {
            Some(kind.pick(&SYSTEM_NAMES))
        } else {
            None
        }
    }

    fn file_type(&self) -> FileType {
        FileType::Executable
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[".xex"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["application/x-xbox360-xex"]
    }

    fn fields(&mut self) -> Result<&Fields, Error> {
        if self.fields.is_pending() {
            self.check_valid()?;
            rom::live_source(&self.source)?;
            let result = self.load_fields();
            self.fields.resolve(result);
        }
        self.fields.get()
    }

    fn metadata(&mut self) -> Result<&MetaData, Error> {
        if self.metadata.is_pending() {
            self.check_valid()?;
            rom::live_source(&self.source)?;
            let result = self.load_metadata();
            self.metadata.resolve(result);
        }
        self.metadata.get()
    }

    fn supported_image_types(&mut self) -> ImageTypes {
        ImageTypes::INT_ICON
    }

    fn image_sizes(&mut self, kind: ImageType) -> Vec<ImageSize> {
        match kind {
            ImageType::IntIcon => vec![ImageSize::new(64, 64)],
            _ => Vec::new(),
        }
    }

    fn image(&mut self, kind: ImageType) -> Result<&DecodedImage, Error> {
        if kind != ImageType::IntIcon {
            return Err(rom::not_found_image(kind));
        }
        self.check_valid()?;
        self.xdbf()?.image(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{encode, ByteOrder, Bytes};
    use crate::source::MemSource;
    use crate::xdbf;

    const LOAD_ADDRESS: u32 = 0x8200_0000;
    const PE_OFFSET: usize = 0x1000;
    const TITLE_ID: u32 = 0x4D53_07E6;

    /// `"MZ"` plus 30 zero bytes, encrypted with title key `00 01 .. 0F`.
    const ENCRYPTED_PE: [u8; 32] = [
        0x37, 0x42, 0x24, 0x41, 0x9A, 0x8F, 0xA4, 0xD2, 0x97, 0xA9, 0x9A, 0x08, 0x1C, 0x90, 0xFC,
        0x05, 0x23, 0x45, 0x00, 0x78, 0x92, 0x95, 0x93, 0x6F, 0x7A, 0x40, 0x97, 0x58, 0x92, 0xD7,
        0x32, 0x6B,
    ];
    /// Title key `00 01 .. 0F` encrypted with the debug key.
    const DEBUG_FILE_KEY: [u8; 16] = [
        0x7A, 0xCA, 0x0F, 0xD9, 0xBC, 0xD6, 0xEC, 0x7C, 0x9F, 0x97, 0x46, 0x66, 0x16, 0xE6, 0xA2,
        0x82,
    ];

    struct Builder {
        encryption: u16,
        file_key: [u8; 16],
        pe: Vec<u8>,
        with_resource: bool,
        resource_address: u32,
        format_size: u32,
    }

    impl Builder {
        fn new() -> Self {
            let xdbf = xdbf::tests::build(&[(
                xdbf::raw::NAMESPACE_STRING_TABLE,
                1,
                xdbf::tests::string_table(&[(0x8000, "Halo Test")]),
            )]);
            let mut pe = b"MZ".to_vec();
            pe.resize(0x1000, 0);
            pe.extend(xdbf);
            Self {
                encryption: 0,
                file_key: [0; 16],
                pe,
                with_resource: true,
                resource_address: LOAD_ADDRESS + 0x1000,
                format_size: 8,
            }
        }

        fn build(&self) -> Vec<u8> {
            let mut opt = vec![
                (raw::opt::EXECUTION_ID, 0x300),
                (raw::opt::FILE_FORMAT_INFO, 0x320),
                (raw::opt::ORIGINAL_PE_NAME, 0x360),
            ];
            if self.with_resource {
                opt.push((raw::opt::RESOURCE_INFO, 0x340));
            }

            let header = raw::Header {
                magic: Bytes(*raw::MAGIC),
                module_flags: 0x1,
                pe_offset: PE_OFFSET as u32,
                reserved: 0,
                sec_info_offset: 0x100,
                opt_header_count: opt.len() as u32,
            };
            let mut out = encode(&header, ByteOrder::Big).unwrap();
            for (id, value) in &opt {
                out.extend(encode(&raw::OptHeader { id: *id, value: *value }, ByteOrder::Big).unwrap());
            }
            out.resize(0x100, 0);

            let security = raw::SecurityInfo {
                header_size: PE_OFFSET as u32,
                image_size: self.pe.len() as u32,
                signature: Bytes([0; 0x100]),
                image_info_size: 0x174,
                image_flags: 0,
                load_address: LOAD_ADDRESS,
                section_digest: Bytes([0; 0x14]),
                import_table_count: 0,
                import_table_digest: Bytes([0; 0x14]),
                media_id: Bytes([0; 0x10]),
                file_key: Bytes(self.file_key),
                export_table: 0,
                header_digest: Bytes([0; 0x14]),
                region: 0x00FF_00FF,
                allowed_media_types: 0x0000_0005,
                page_descriptor_count: 0,
            };
            out.extend(encode(&security, ByteOrder::Big).unwrap());
            out.resize(0x300, 0);

            let id = raw::ExecutionId {
                media_id: 0x1234_5678,
                version: 0x1002_0304,
                base_version: 0,
                title_id: TITLE_ID,
                platform: 0,
                executable_type: 0,
                disc_number: 1,
                disc_count: 2,
                savegame_id: 0x4D53_07E6,
            };
            out.extend(encode(&id, ByteOrder::Big).unwrap());
            out.resize(0x320, 0);

            let format = raw::FileFormatInfo {
                size: self.format_size,
                encryption_type: self.encryption,
                compression_type: raw::COMPRESSION_NONE,
            };
            out.extend(encode(&format, ByteOrder::Big).unwrap());
            out.resize(0x340, 0);

            let xdbf_len = (self.pe.len() as u32).saturating_sub(0x1000);
            out.extend(&20u32.to_be_bytes());
            out.extend(encode(
                &raw::ResourceEntry {
                    name: Bytes(*b"4D5307E6"),
                    address: self.resource_address,
                    size: xdbf_len,
                },
                ByteOrder::Big,
            ).unwrap());
            out.resize(0x360, 0);

            out.extend(&16u32.to_be_bytes());
            out.extend(b"default.exe\0");
            out.resize(PE_OFFSET, 0);
            out.extend(&self.pe);
            out
        }

        fn open(&self) -> Xex {
            Xex::new(Arc::new(MemSource::new(self.build())), &Options::default())
        }
    }

    #[test]
    fn plain_image_fields() {
        let mut xex = Builder::new().open();
        assert!(xex.is_valid());
        let fields = xex.fields().unwrap();
        assert_eq!(fields.get_str("Title"), Some("Halo Test"));
        assert_eq!(fields.get_str("PE Filename"), Some("default.exe"));
        assert_eq!(fields.get_str("Media Types"), Some("Hard Disk, DVD / CD"));
        assert_eq!(fields.get_str("Title ID"), Some("0x4D5307E6 (MS-2022)"));
        assert_eq!(fields.get_str("Media ID"), Some("0x12345678"));
        assert_eq!(fields.get_str("Disc #"), Some("1 of 2"));
        assert_eq!(fields.get_str("Version"), Some("1.0.515.4"));
        assert_eq!(fields.get_str("Encryption Key"), Some("None"));
        assert_eq!(fields.get_str("Compression"), Some("None"));
        match &fields.get("Region Code").unwrap().value {
            crate::fields::FieldValue::Bitfield { value, .. } => assert_eq!(*value, 0b111_0001),
            other => panic!("unexpected value {:?}", other),
        }

        assert_eq!(
            xex.metadata().unwrap().get(Property::Title),
            Some(&crate::metadata::MetaValue::String("Halo Test".to_string()))
        );
    }

    #[test]
    fn debug_encrypted_image() {
        let mut builder = Builder::new();
        builder.encryption = 1;
        builder.file_key = DEBUG_FILE_KEY;
        builder.pe = ENCRYPTED_PE.to_vec();
        builder.with_resource = false;
        let mut xex = builder.open();
        assert_eq!(xex.fields().unwrap().get_str("Encryption Key"), Some("Debug"));
    }

    #[test]
    fn encrypted_without_key_is_reported() {
        let mut builder = Builder::new();
        builder.encryption = 1;
        let mut xex = builder.open();
        let fields = xex.fields().unwrap();
        assert_eq!(fields.get_str("Encryption Key"), Some("Unknown"));
        assert_eq!(fields.get_str("Title"), None);
        assert_eq!(fields.get_str("PE Filename"), Some("default.exe"));
        assert!(xex.image(ImageType::IntIcon).is_err());
    }

    #[test]
    fn media_type_names_cover_unnamed_bits() {
        assert_eq!(media_type_names(1 << 6 | 1 << 24), vec!["6", "Insecure Package"]);
        assert_eq!(compression_name(7), "Unknown (0x07)");
    }

    #[test]
    fn close_keeps_loaded_fields() {
        let mut xex = Builder::new().open();
        xex.fields().unwrap();
        xex.close();
        assert!(xex.fields().is_ok());
        assert!(matches!(xex.metadata(), Err(Error::Closed)));
    }

    #[test]
    fn close_releases_the_source() {
        let source = Arc::new(MemSource::new(Builder::new().build()));
        let mut xex = Xex::new(source.clone(), &Options::default());
        assert_eq!(xex.fields().unwrap().get_str("Title"), Some("Halo Test"));
        assert!(Arc::strong_count(&source) > 1);

        xex.close();
        assert_eq!(Arc::strong_count(&source), 1);
        assert!(matches!(xex.image(ImageType::IntIcon), Err(Error::Closed)));
    }

    #[test]
    fn short_file_format_info_keeps_reader_valid() {
        let mut builder = Builder::new();
        builder.format_size = 6;
        let mut xex = builder.open();
        assert!(xex.is_valid());
        let fields = xex.fields().unwrap();
        assert_eq!(fields.get_str("Title ID"), Some("0x4D5307E6 (MS-2022)"));
        assert_eq!(fields.get_str("Encryption Key"), Some("Unknown"));
        assert_eq!(fields.get_str("Compression"), Some("Unknown"));
        assert_eq!(fields.get_str("Title"), None);
    }

    #[test]
    fn resource_at_image_base_is_not_found() {
        let mut builder = Builder::new();
        builder.resource_address = LOAD_ADDRESS;
        let mut xex = builder.open();
        assert!(xex.is_valid());
        let fields = xex.fields().unwrap();
        assert_eq!(fields.get_str("Title"), None);
        assert_eq!(fields.get_str("Encryption Key"), Some("None"));
        assert!(xex.image(ImageType::IntIcon).unwrap_err().is_not_found());
    }
}
