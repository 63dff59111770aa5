//! Original Xbox executables (XBE).
//!
//! An XBE starts with an image header that is mapped to `base_addr` when the
//! executable is loaded. All addresses in the header are virtual addresses
//! into that mapping; since the header itself is stored uncompressed at the
//! start of the file, subtracting `base_addr` yields a file offset.
//!
//! The certificate holds the title name, title id, regions and media types.
//! The `$$XTIMAGE` section contains the title image shown by the dashboard,
//! and the header embeds a small RLE-compressed Microsoft logo.

pub mod cert;
pub mod logo;
pub mod raw;

use self::cert::{media_type_names, Certificate, REGION_NAMES};
use self::logo::LogoBitmap;
use crate::detect::DetectInfo;
use crate::fields::{join_names, Base, Fields, StrFlags};
use crate::image::{self, DecodedImage, ImageSize, ImageType, ImageTypes};
use crate::lazy::Lazy;
use crate::metadata::{MetaData, Property};
use crate::options::Options;
use crate::pe::PeHeader;
use crate::raw::RawStruct;
use crate::rom::{self, FileType, RomData, SystemName};
use crate::source::{Source, SourceExt};
use crate::utils::{latin1_cstr, title_id_letters, SliceExt};
use crate::Error;

use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

const SYSTEM_NAMES: [&str; 3] = ["Microsoft Xbox", "Xbox", "Xbox"];

/// Name of the section holding the dashboard title image.
const TITLE_IMAGE_SECTION: &str = "$$XTIMAGE";

/// Header structures are only looked up inside this many leading bytes.
const HEADER_WINDOW: u64 = 64 * 1024;
/// Upper bound for the title image section.
const MAX_TITLE_IMAGE_SIZE: u32 = 4 * 1024 * 1024;

bitflags! {
    /// Flags that specify how the kernel initializes the runtime.
    pub struct InitFlags: u32 {
        const MOUNT_UTILITY_DRIVE  = 0x00000001;
        const FORMAT_UTILITY_DRIVE = 0x00000002;
        const LIMIT_64_MEGABYTES   = 0x00000004;
        const DONT_SETUP_HARDDISK  = 0x00000008;
    }
}

const INIT_FLAG_NAMES: [Option<&str>; 4] = [
    Some("Mount Utility Drive"),
    Some("Format Utility Drive"),
    Some("Limit to 64 MB"),
    Some("Don't Setup Hard Disk"),
];

bitflags! {
    /// Section flags.
    pub struct SectionFlags: u32 {
        const WRITABLE            = 0x00000001;
        const PRELOAD             = 0x00000002;
        const EXECUTABLE          = 0x00000004;
        const INSERTED_FILE       = 0x00000008;
        const HEAD_PAGE_READ_ONLY = 0x00000010;
        const TAIL_PAGE_READ_ONLY = 0x00000020;
    }
}

pub fn is_supported(info: &DetectInfo) -> bool {
    match raw::Header::parse(info.header) {
        Ok(header) => header.magic.0 == *raw::MAGIC,
        Err(_) => false,
    }
}

/// A section of the XBE image.
#[derive(Debug, Clone)]
pub struct Section {
    name: String,
    flags: SectionFlags,
    virt_addr: u32,
    virt_size: u32,
    raw_addr: u32,
    raw_size: u32,
}

impl Section {
    fn from_raw(raw: &raw::SectionHeader, name: String) -> Self {
        let flags = SectionFlags::from_bits_truncate(raw.section_flags);
        if flags.bits() != raw.section_flags {
            warn!(
                "unknown section flags: known flags: {:#X}, raw flags: {:#X}",
                flags.bits(),
                raw.section_flags
            );
        }
        Self {
            name,
            flags,
            virt_addr: raw.virt_addr,
            virt_size: raw.virt_size,
            raw_addr: raw.raw_addr,
            raw_size: raw.raw_size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> SectionFlags {
        self.flags
    }

    pub fn virt_addr(&self) -> u32 {
        self.virt_addr
    }

    pub fn virt_size(&self) -> u32 {
        self.virt_size
    }

    /// Offset of the section data in the file.
    pub fn raw_addr(&self) -> u32 {
        self.raw_addr
    }

    pub fn raw_size(&self) -> u32 {
        self.raw_size
    }
}

/// The image header and certificate.
#[derive(Debug)]
struct Headers {
    header: raw::Header,
    cert: Option<Certificate>,
    init_flags: InitFlags,
}

/// Reader for XBE executables.
#[derive(Debug)]
pub struct Xbe {
    source: Option<Arc<dyn Source>>,
    options: Options,
    headers: Option<Headers>,
    sections: Lazy<Vec<Section>>,
    title_image: Lazy<DecodedImage>,
    logo: Lazy<DecodedImage>,
    pe: Lazy<PeHeader>,
    fields: Lazy<Fields>,
    metadata: Lazy<MetaData>,
}

impl Xbe {
    pub fn new(source: Arc<dyn Source>, options: &Options) -> Self {
        let mut this = Self {
            source: None,
            options: options.clone(),
            headers: None,
            sections: Lazy::new(),
            title_image: Lazy::new(),
            logo: Lazy::new(),
            pe: Lazy::new(),
            fields: Lazy::new(),
            metadata: Lazy::new(),
        };

        match read_headers(&*source) {
            Ok(headers) => {
                this.headers = Some(headers);
                this.source = Some(source);
            }
            Err(e) => debug!("not a usable XBE: {}", e),
        }
        this
    }

    fn headers(&self) -> Result<&Headers, Error> {
        self.headers
            .as_ref()
            .ok_or_else(|| Error::Malformed("not a valid XBE file".to_string()))
    }

    /// The decoded certificate.
    pub fn certificate(&self) -> Option<&Certificate> {
        self.headers.as_ref().and_then(|h| h.cert.as_ref())
    }

    /// Reads the start of the file that holds the header structures.
    fn header_window(&self) -> Result<Vec<u8>, Error> {
        let source = rom::live_source(&self.source)?;
        let len = source.size().min(HEADER_WINDOW) as usize;
        source.read_vec(0, len)
    }

    fn load_sections(&self) -> Result<Vec<Section>, Error> {
        let header = &self.headers()?.header;
        let window = self.header_window()?;

        let start = header
            .rel_addr(header.section_headers_addr)
            .ok_or_else(|| Error::Malformed("section table is below the image base".to_string()))?;
        let table = window.try_get(start..)?;
        if table.is_empty() {
            return Err(Error::NotFound("section table is empty".to_string()));
        }

        let fitting = table.len() / raw::SectionHeader::SIZE;
        let count = header.num_sections as usize;
        if count > fitting {
            warn!(
                "XBE claims {} sections, only {} fit in the header window",
                count, fitting
            );
        }

        let sections = table
            .chunks_exact(raw::SectionHeader::SIZE)
            .take(count)
            .enumerate()
            .filter_map(|(index, chunk)| {
                let raw = match raw::SectionHeader::parse(chunk) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!("skipping section {}: {}", index, e);
                        return None;
                    }
                };
                let name = header
                    .rel_addr(raw.section_name_addr)
                    .and_then(|offset| window.try_get(offset..).ok());
                match name {
                    Some(name) => Some(Section::from_raw(&raw, latin1_cstr(name))),
                    None => {
                        warn!(
                            "skipping section {}: name address {:#X} is outside the header",
                            index, raw.section_name_addr
                        );
                        None
                    }
                }
            })
            .collect();
        Ok(sections)
    }

    /// Returns the section table, read from the header window on first use.
    pub fn sections(&mut self) -> Result<&[Section], Error> {
        if self.sections.is_pending() {
            self.headers()?;
            rom::live_source(&self.source)?;
            let result = self.load_sections();
            self.sections.resolve(result);
        }
        self.sections.get().map(|s| &s[..])
    }

    fn load_title_image(&mut self) -> Result<DecodedImage, Error> {
        let section = self
            .sections()?
            .iter()
            .find(|s| s.name == TITLE_IMAGE_SECTION)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no {} section", TITLE_IMAGE_SECTION)))?;
        if section.raw_size > MAX_TITLE_IMAGE_SIZE {
            return Err(Error::Malformed(format!(
                "{} section is too large ({:#X} bytes)",
                TITLE_IMAGE_SECTION, section.raw_size
            )));
        }

        let source = rom::live_source(&self.source)?;
        let data = source.read_vec(section.raw_addr.into(), section.raw_size as usize)?;
        if data.starts_with(image::xpr::MAGIC) {
            image::xpr::decode(&data)
        } else if data.starts_with(image::PNG_MAGIC) {
            self.options.png.decode(&data)
        } else {
            Err(Error::Malformed("unknown title image format".to_string()))
        }
    }

    fn load_logo(&self) -> Result<DecodedImage, Error> {
        let header = &self.headers()?.header;
        if header.logo_bitmap_size == 0 {
            return Err(Error::NotFound("no logo bitmap".to_string()));
        }
        let start = header
            .rel_addr(header.logo_bitmap_addr)
            .ok_or_else(|| Error::NotFound("logo bitmap is below the image base".to_string()))?;
        let end = start
            .checked_add(header.logo_bitmap_size)
            .ok_or_else(|| Error::addr_overflow(start.into(), header.logo_bitmap_size.into()))?;
        let window = self.header_window()?;
        LogoBitmap::decode(window.try_get(start..end)?)?.to_image()
    }

    /// Reads the PE headers that precede the sections.
    fn load_pe(&self) -> Result<PeHeader, Error> {
        let header = &self.headers()?.header;
        let source = rom::live_source(&self.source)?;
        let offset = header
            .pe_base_addr
            .checked_sub(header.base_addr)
            .ok_or_else(|| Error::NotFound("PE base is below the image base".to_string()))?;
        if offset < header.header_size || u64::from(offset) >= source.size() {
            return Err(Error::NotFound(format!(
                "PE header offset {:#X} is outside the file",
                offset
            )));
        }
        PeHeader::read(&**source, offset.into())
    }

    fn pe(&mut self) -> Result<&PeHeader, Error> {
        if self.pe.is_pending() {
            rom::live_source(&self.source)?;
            let result = self.load_pe();
            self.pe.resolve(result);
        }
        self.pe.get()
    }

    fn title_image(&mut self) -> Result<&DecodedImage, Error> {
        if self.title_image.is_pending() {
            rom::live_source(&self.source)?;
            let result = self.load_title_image();
            self.title_image.resolve(result);
        }
        self.title_image.get()
    }

    fn logo(&mut self) -> Result<&DecodedImage, Error> {
        if self.logo.is_pending() {
            rom::live_source(&self.source)?;
            let result = self.load_logo();
            self.logo.resolve(result);
        }
        self.logo.get()
    }

    /// The debug filename from the header, if it lies in the header window.
    fn pe_filename(&self, window: &[u8]) -> Option<String> {
        let header = &self.headers.as_ref()?.header;
        let offset = header.rel_addr(header.debug_filename_addr)?;
        let name = latin1_cstr(window.try_get(offset..).ok()?);
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    fn load_fields(&mut self) -> Result<Fields, Error> {
        let window = self.header_window()?;
        let headers = self.headers()?;
        let (header, cert) = (&headers.header, headers.cert.as_ref());

        let mut fields = Fields::new();
        fields.reserve(11);
        fields.set_tab_name(0, "XBE");

        if let Some(cert) = cert {
            if !cert.title_name().is_empty() {
                fields.add_string("Title", cert.title_name());
            }
        }
        if let Some(name) = self.pe_filename(&window) {
            fields.add_string("PE Filename", name);
        }

        if let Some(cert) = cert {
            fields.add_string_flags(
                "Title ID",
                format!(
                    "{:08X} ({}-{:03})",
                    cert.title_id(),
                    title_id_letters(cert.title_id()),
                    cert.title_id() & 0xFFFF
                ),
                StrFlags::MONOSPACE,
            );
        }

        if header.time_date == 0 {
            fields.add_string("Timestamp", "Not set");
        } else {
            fields.add_datetime(
                "Timestamp",
                UNIX_EPOCH + Duration::from_secs(header.time_date.into()),
            );
        }

        if let Some(cert) = cert {
            fields.add_string(
                "Media Types",
                join_names(&media_type_names(cert.allowed_media()), 4),
            );
            fields.add_bitfield(
                "Region Code",
                &REGION_NAMES,
                3,
                cert.game_region().display_bits(),
            );
            fields.add_string("Disc #", (u64::from(cert.disk_number()) + 1).to_string());
            fields.add_string_numeric(
                "Version",
                cert.version().into(),
                Base::Hex,
                8,
                StrFlags::MONOSPACE,
            );
        }
        fields.add_bitfield("Init Flags", &INIT_FLAG_NAMES, 2, headers.init_flags.bits());

        match self.sections() {
            Ok(sections) => {
                let rows = sections
                    .iter()
                    .map(|s| {
                        vec![
                            s.name.clone(),
                            format!("0x{:08X}", s.virt_addr),
                            format!("0x{:08X}", s.virt_size),
                            format!("{:?}", s.flags),
                        ]
                    })
                    .collect();
                fields.add_list_data("Sections", &["Name", "Address", "Size", "Flags"], rows);
            }
            Err(e) => debug!("no XBE section table: {}", e),
        }

        match self.pe() {
            Ok(pe) => fields.add_fields_from(&pe.fields(), "PE"),
            Err(e) => debug!("no embedded PE header: {}", e),
        }

        Ok(fields)
    }

    fn load_metadata(&self) -> Result<MetaData, Error> {
        let headers = self.headers()?;
        let mut metadata = MetaData::new();
        if let Some(cert) = &headers.cert {
            metadata.add_string(Property::Title, cert.title_name());
        }
        Ok(metadata)
    }
}

fn read_headers(source: &dyn Source) -> Result<Headers, Error> {
    let header: raw::Header = source.read_struct(0)?;
    if header.magic.0 != *raw::MAGIC {
        return Err(Error::Unsupported);
    }

    let init_flags = InitFlags::from_bits_truncate(header.init_flags);
    if init_flags.bits() != header.init_flags {
        warn!(
            "unknown init flags: known flags: {:#X}, raw flags: {:#X}",
            init_flags.bits(),
            header.init_flags
        );
    }

    let cert = match header.rel_addr(header.cert_addr) {
        Some(offset) => match source.read_struct::<raw::Certificate>(offset.into()) {
            Ok(raw_cert) => {
                let cert = Certificate::from_raw(&raw_cert);
                debug!("XBE certificate: {:?}", cert);
                Some(cert)
            }
            Err(e) => {
                warn!("failed to read XBE certificate at {:#X}: {}", offset, e);
                None
            }
        },
        None => {
            warn!("XBE certificate address {:#X} is below the image base", header.cert_addr);
            None
        }
    };

    Ok(Headers {
        header,
        cert,
        init_flags,
    })
}

impl RomData for Xbe {
    fn is_valid(&self) -> bool {
        self.headers.is_some()
    }

    fn close(&mut self) {
        self.source = None;
    }

    fn system_name(&self, kind: SystemName) -> Option<&'static str> {
        if self.is_valid() {
            Some(kind.pick(&SYSTEM_NAMES))
        } else {
            None
        }
    }

    fn file_type(&self) -> FileType {
        FileType::Executable
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[".xbe"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["application/x-xbox-executable"]
    }

    fn fields(&mut self) -> Result<&Fields, Error> {
        if self.fields.is_pending() {
            self.headers()?;
            rom::live_source(&self.source)?;
            let result = self.load_fields();
            self.fields.resolve(result);
        }
        self.fields.get()
    }

    fn metadata(&mut self) -> Result<&MetaData, Error> {
        if self.metadata.is_pending() {
            self.headers()?;
            rom::live_source(&self.source)?;
            let result = self.load_metadata();
            self.metadata.resolve(result);
        }
        self.metadata.get()
    }

    fn supported_image_types(&mut self) -> ImageTypes {
        let mut types = ImageTypes::empty();
        if let Ok(sections) = self.sections() {
            if sections.iter().any(|s| s.name == TITLE_IMAGE_SECTION) {
                types |= ImageTypes::INT_ICON;
            }
        }
        if self.headers().map_or(false, |h| h.header.logo_bitmap_size != 0) {
            types |= ImageTypes::INT_IMAGE;
        }
        types
    }

    fn image_sizes(&mut self, kind: ImageType) -> Vec<ImageSize> {
        match kind {
            ImageType::IntIcon => match self.title_image() {
                Ok(image) => vec![ImageSize::new(image.width(), image.height())],
                Err(_) => Vec::new(),
            },
            ImageType::IntImage if self.supported_image_types().contains(ImageTypes::INT_IMAGE) => {
                vec![ImageSize::new(logo::WIDTH, logo::HEIGHT)]
            }
            _ => Vec::new(),
        }
    }

    fn image(&mut self, kind: ImageType) -> Result<&DecodedImage, Error> {
        self.headers()?;
        match kind {
            ImageType::IntIcon => self.title_image(),
            ImageType::IntImage => self.logo(),
            _ => Err(rom::not_found_image(kind)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fields::FieldValue;
    use crate::metadata::MetaValue;
    use crate::raw::{encode, ByteOrder, Bytes, WideStr};
    use crate::source::MemSource;

    const BASE: u32 = 0x10000;
    const CERT: usize = 0x190;
    const SECTIONS: usize = 0x360;
    const NAMES: usize = 0x3D0;
    const LOGO: usize = 0x400;
    const PE: usize = 0x1000;
    const TITLE_IMAGE: usize = 0x2000;

    /// A 2x2 swizzled A8R8G8B8 XPR0 texture filled with 0xFF112233.
    fn xpr() -> Vec<u8> {
        let header = image::xpr::Header {
            magic: Bytes(*image::xpr::MAGIC),
            file_size: 0x30,
            data_offset: 0x20,
            common: 0,
            data: 0,
            lock: 0,
            format: 0x06 << 8 | 1 << 20 | 1 << 24,
            size: 0,
        };
        let mut data = encode(&header, ByteOrder::Little).unwrap();
        for _ in 0..4 {
            data.extend(&0xFF11_2233u32.to_le_bytes());
        }
        data
    }

    fn section(name_offset: usize, raw_addr: usize, raw_size: usize, flags: u32) -> raw::SectionHeader {
        raw::SectionHeader {
            section_flags: flags,
            virt_addr: BASE + raw_addr as u32,
            virt_size: raw_size as u32,
            raw_addr: raw_addr as u32,
            raw_size: raw_size as u32,
            section_name_addr: BASE + name_offset as u32,
            section_name_refcount: 0,
            head_shared_page_refcount_addr: 0,
            tail_shared_page_refcount_addr: 0,
            section_digest: [0; 20],
        }
    }

    /// Builds an XBE with a certificate, two sections, a logo and a PE
    /// header.
    pub(crate) fn build() -> Vec<u8> {
        let title_image = xpr();
        let header = raw::Header {
            magic: Bytes(*raw::MAGIC),
            signature: Bytes([0; 256]),
            base_addr: BASE,
            header_size: PE as u32,
            image_size: 0x3000,
            image_header_size: 0x178,
            time_date: 1_000_000_000,
            cert_addr: BASE + CERT as u32,
            num_sections: 2,
            section_headers_addr: BASE + SECTIONS as u32,
            init_flags: 0x5,
            entry_point: 0,
            tls_addr: 0,
            pe_stack_commit: 0,
            pe_heap_reserve: 0,
            pe_heap_commit: 0,
            pe_base_addr: BASE + PE as u32,
            pe_size: 0,
            pe_checksum: 0,
            pe_time_date: 0,
            debug_pathname_addr: 0,
            debug_filename_addr: BASE + 0x178,
            debug_unicode_filename_addr: 0,
            kernel_thunk_addr: 0,
            non_kernel_import_dir_addr: 0,
            num_library_versions: 0,
            library_versions_addr: 0,
            kernel_library_version_addr: 0,
            xapi_library_version_addr: 0,
            logo_bitmap_addr: BASE + LOGO as u32,
            logo_bitmap_size: 2,
        };
        let mut out = encode(&header, ByteOrder::Little).unwrap();
        out.extend(b"default.exe\0");
        out.resize(CERT, 0);

        let mut title_name = [0u16; 40];
        for (dest, c) in title_name.iter_mut().zip("Test Title".encode_utf16()) {
            *dest = c;
        }
        let cert = raw::Certificate {
            size: 0x1D0,
            time_date: 0,
            title_id: 0x4D53_0004,
            title_name: WideStr(title_name),
            alt_title_ids: [0; 16],
            allowed_media: 0x8000_0005,
            game_region: 0x8000_0001,
            game_ratings: 0,
            disk_number: 0,
            version: 0x0000_0102,
            lan_key: [0; 16],
            signature_key: [0; 16],
            alt_signature_keys: [[0; 16]; 16],
        };
        out.extend(encode(&cert, ByteOrder::Little).unwrap());
        out.resize(SECTIONS, 0);

        for s in &[
            section(NAMES, PE, 0x100, 0x6),
            section(NAMES + 8, TITLE_IMAGE, title_image.len(), 0x8),
        ] {
            out.extend(encode(s, ByteOrder::Little).unwrap());
        }
        out.resize(NAMES, 0);
        out.extend(b".text\0");
        out.resize(NAMES + 8, 0);
        out.extend(b"$$XTIMAGE\0");
        out.resize(LOGO, 0);
        // one word chunk covering the whole logo with value 0xF
        out.extend(&(0xF000u16 | 1023 << 2 | 0b10).to_le_bytes());
        out.resize(PE, 0);
        out.extend(crate::pe::tests::build());
        out.resize(TITLE_IMAGE, 0);
        out.extend(title_image);
        out
    }

    fn open(data: Vec<u8>) -> Xbe {
        Xbe::new(Arc::new(MemSource::new(data)), &Options::default())
    }

    #[test]
    fn header_fields() {
        let mut xbe = open(build());
        assert!(xbe.is_valid());
        assert_eq!(xbe.system_name(SystemName::Long), Some("Microsoft Xbox"));

        let fields = xbe.fields().unwrap();
        assert_eq!(fields.get_str("Title"), Some("Test Title"));
        assert_eq!(fields.get_str("PE Filename"), Some("default.exe"));
        assert_eq!(fields.get_str("Title ID"), Some("4D530004 (MS-004)"));
        assert_eq!(fields.get_str("Media Types"), Some("Hard Disk, DVD/CD, Nonsecure Mode"));
        assert_eq!(fields.get_str("Disc #"), Some("1"));
        assert_eq!(fields.get_str("Version"), Some("0x00000102"));
        match &fields.get("Region Code").unwrap().value {
            FieldValue::Bitfield { value, .. } => assert_eq!(*value, 0b1001),
            other => panic!("unexpected value {:?}", other),
        }
        match &fields.get("Init Flags").unwrap().value {
            FieldValue::Bitfield { value, .. } => assert_eq!(*value, 0x5),
            other => panic!("unexpected value {:?}", other),
        }
        match &fields.get("Sections").unwrap().value {
            FieldValue::ListData { rows, .. } => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[1][0], "$$XTIMAGE");
            }
            other => panic!("unexpected value {:?}", other),
        }

        assert_eq!(fields.tabs(), &["XBE".to_string(), "PE".to_string()]);
        assert_eq!(fields.get_str("Subsystem"), Some("Xbox"));

        assert_eq!(
            xbe.metadata().unwrap().get(Property::Title),
            Some(&MetaValue::String("Test Title".to_string()))
        );
    }

    #[test]
    fn images() {
        let mut xbe = open(build());
        assert_eq!(
            xbe.supported_image_types(),
            ImageTypes::INT_ICON | ImageTypes::INT_IMAGE
        );

        let icon = xbe.image(ImageType::IntIcon).unwrap();
        assert_eq!((icon.width(), icon.height()), (2, 2));
        assert_eq!(icon.pixel(1, 1), Some(0xFF11_2233));

        let logo = xbe.image(ImageType::IntImage).unwrap();
        assert_eq!((logo.width(), logo.height()), (100, 17));
        assert_eq!(logo.pixel(0, 0), Some(0xFFFF_FFFF));

        assert!(matches!(
            xbe.image(ImageType::IntBanner),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn missing_title_image_failure_is_cached() {
        let mut data = build();
        // rename the section so it's not found
        data[NAMES + 8] = b'#';
        let mut xbe = open(data);
        assert!(!xbe.supported_image_types().contains(ImageTypes::INT_ICON));
        for _ in 0..2 {
            match xbe.image(ImageType::IntIcon) {
                Err(e @ Error::Cached(_)) => assert!(e.is_not_found()),
                other => panic!("unexpected result {:?}", other),
            }
        }
    }

    #[test]
    fn unreadable_certificate_is_skipped() {
        // at the base address, then far past the end of the file
        for &cert_addr in &[BASE, BASE + 0xF0_0000] {
            let mut data = build();
            data[0x118..0x11C].copy_from_slice(&cert_addr.to_le_bytes());
            let mut xbe = open(data);
            assert!(xbe.is_valid());
            assert!(xbe.certificate().is_none());

            let fields = xbe.fields().unwrap();
            assert_eq!(fields.get_str("Title"), None);
            assert_eq!(fields.get_str("Title ID"), None);
            assert!(fields.get("Media Types").is_none());
            assert_eq!(fields.get_str("PE Filename"), Some("default.exe"));
            assert!(fields.get("Timestamp").is_some());
            assert!(fields.get("Sections").is_some());

            assert_eq!(xbe.metadata().unwrap().get(Property::Title), None);
        }
    }

    #[test]
    fn addresses_at_the_base_are_rejected() {
        let mut data = build();
        // logo_bitmap_addr and debug_filename_addr
        data[0x170..0x174].copy_from_slice(&BASE.to_le_bytes());
        data[0x150..0x154].copy_from_slice(&BASE.to_le_bytes());
        let mut xbe = open(data);
        assert!(xbe.is_valid());
        assert!(xbe.image(ImageType::IntImage).unwrap_err().is_not_found());
        assert_eq!(xbe.fields().unwrap().get_str("PE Filename"), None);
    }

    #[test]
    fn section_with_bad_name_is_skipped() {
        let mut data = build();
        // section_name_addr of the first section
        let name_addr = SECTIONS + 0x14;
        data[name_addr..name_addr + 4].copy_from_slice(&0xFFFF_0000u32.to_le_bytes());
        let mut xbe = open(data);
        let sections = xbe.sections().unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].name, TITLE_IMAGE_SECTION);
        assert!(xbe.supported_image_types().contains(ImageTypes::INT_ICON));
        assert!(xbe.image(ImageType::IntIcon).is_ok());
    }

    #[test]
    fn section_count_is_clamped_to_the_window() {
        let mut data = build();
        let fitting = (data.len() - SECTIONS) / raw::SectionHeader::SIZE;
        data[0x11C..0x120].copy_from_slice(&0x0100_0000u32.to_le_bytes());
        let mut xbe = open(data);
        let sections = xbe.sections().unwrap();
        assert!(sections.len() >= 2 && sections.len() <= fitting);
        assert_eq!(sections[0].name, ".text");
        assert_eq!(sections[1].name, TITLE_IMAGE_SECTION);
    }

    #[test]
    fn section_table_outside_window() {
        let mut data = build();
        // section_headers_addr far past the header window
        data[0x120..0x124].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        let mut xbe = open(data);
        assert!(xbe.is_valid());
        assert!(xbe.sections().is_err());
        assert!(xbe.fields().unwrap().get("Sections").is_none());
    }
}
