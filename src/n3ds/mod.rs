//! Nintendo 3DS files.
//!
//! One reader handles every 3DS container this crate knows about:
//!
//! * SMDH icon files,
//! * 3DSX homebrew executables (with an optional embedded SMDH),
//! * CIA installable archives (the SMDH comes from the meta section, or from
//!   the ExeFS of the first content),
//! * CCI cartridge images and eMMC NAND dumps, which share the NCSD header.
//!
//! The CIA and NCSD containers nest NCCH partitions, which are handled by
//! [`ncch::Ncch`].
//!
//! [`ncch::Ncch`]: ncch/struct.Ncch.html

pub mod ncch;
pub mod raw;
pub mod smdh;

use self::ncch::Ncch;
use self::raw::{
    cci, tmd, CciHeader, CiaHeader, ContentChunk, NcsdHeader, PartitionEntry, ThreedsxExtHeader,
    ThreedsxHeader, TmdHeader,
};
use self::smdh::{IconSize, Smdh};
use crate::detect::{DetectInfo, N3dsKind};
use crate::fields::{Base, Fields, StrFlags};
use crate::image::{DecodedImage, ImageSize, ImageType, ImageTypes};
use crate::lazy::Lazy;
use crate::metadata::MetaData;
use crate::options::Options;
use crate::raw::RawStruct;
use crate::rom::{self, FileType, RomData, SystemName};
use crate::source::{PartitionSource, Source, SourceExt};
use crate::utils::format_file_size;
use crate::Error;

use std::ops::Range;
use std::sync::Arc;

const SYSTEM_NAMES: [&str; 3] = ["Nintendo 3DS", "Nintendo 3DS", "3DS"];

/// Default NCSD media unit shift (512-byte units).
const MEDIA_UNIT_SHIFT: u32 = 9;
/// Largest extra shift accepted from a CCI header.
const MAX_EXTRA_UNIT_SHIFT: u8 = 16;

const CCI_PARTITION_NAMES: [&str; 8] = [
    "Game",
    "Manual",
    "Download Play",
    "Partition 4",
    "Partition 5",
    "Partition 6",
    "New3DS Update",
    "Update",
];

const EMMC_PARTITION_NAMES: [&str; 8] = [
    "TWL NAND",
    "AGB_FIRM Save",
    "FIRM0",
    "FIRM1",
    "CTR NAND",
    "Partition 6",
    "Partition 7",
    "Partition 8",
];

fn has_magic(header: &[u8], offset: usize, magic: &[u8; 4]) -> bool {
    header.get(offset..offset + 4) == Some(&magic[..])
}

/// Detects which kind of 3DS file `info` describes, if any.
///
/// Every kind needs at least a 512-byte probe.
pub fn is_supported(info: &DetectInfo) -> Option<N3dsKind> {
    let header = info.header;
    if header.len() < raw::HEADER_SIZE {
        return None;
    }

    // CIA archives have no magic number, so the extension has to match
    if info.has_ext(".cia") {
        if let Ok(cia) = CiaHeader::parse(header) {
            if cia_fits(&cia, info.size) {
                return Some(N3dsKind::Cia);
            }
        }
    }
    if has_magic(header, 0, raw::SMDH_MAGIC) && info.size >= raw::SMDH_SIZE as u64 {
        return Some(N3dsKind::Smdh);
    }
    if has_magic(header, 0, raw::THREEDSX_MAGIC)
        && info.size >= (ThreedsxHeader::SIZE + ThreedsxExtHeader::SIZE) as u64
    {
        return Some(N3dsKind::Threedsx);
    }
    if has_magic(header, raw::NCSD_MAGIC_OFFSET, raw::NCSD_MAGIC) {
        let ncsd = NcsdHeader::parse(&header[raw::NCSD_MAGIC_OFFSET..]).ok()?;
        return ncsd_kind(&ncsd);
    }
    None
}

/// Tells cartridges and eMMC dumps apart by their partition crypt types.
fn ncsd_kind(header: &NcsdHeader) -> Option<N3dsKind> {
    let crypt = header.partition_crypt_types.0;
    if crypt == [0; 8] {
        Some(N3dsKind::Cci)
    } else if crypt == raw::EMMC_CRYPT_OLD || crypt == raw::EMMC_CRYPT_NEW {
        Some(N3dsKind::Emmc)
    } else {
        None
    }
}

fn aligned(len: u64) -> Result<u64, Error> {
    len.checked_add(63)
        .map(|len| len & !63)
        .ok_or_else(|| Error::addr_overflow(len, 63))
}

/// Byte ranges of the sections of a CIA archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiaLayout {
    pub cert_chain: Range<u64>,
    pub ticket: Range<u64>,
    pub tmd: Range<u64>,
    pub content: Range<u64>,
    pub meta: Range<u64>,
}

impl CiaLayout {
    /// End of the last section.
    pub fn end(&self) -> u64 {
        self.meta.end
    }
}

/// Computes the CIA section layout. Every section starts on a 64-byte
/// boundary.
pub fn cia_layout(header: &CiaHeader) -> Result<CiaLayout, Error> {
    let mut offset = aligned(header.header_size.into())?;
    let mut section = |len: u64| -> Result<Range<u64>, Error> {
        let start = offset;
        let end = start
            .checked_add(len)
            .ok_or_else(|| Error::addr_overflow(start, len))?;
        offset = start
            .checked_add(aligned(len)?)
            .ok_or_else(|| Error::addr_overflow(start, len))?;
        Ok(start..end)
    };

    Ok(CiaLayout {
        cert_chain: section(header.cert_chain_size.into())?,
        ticket: section(header.ticket_size.into())?,
        tmd: section(header.tmd_size.into())?,
        content: section(header.content_size)?,
        meta: section(header.meta_size.into())?,
    })
}

fn cia_fits(header: &CiaHeader, size: u64) -> bool {
    header.header_size == raw::CIA_HEADER_SIZE
        && header.kind == 0
        && header.version == 0
        && cia_layout(header).map_or(false, |layout| layout.end() <= size)
}

/// Byte ranges of consecutive CIA contents with the given sizes.
///
/// Each content starts at the 64-byte aligned end of the previous one.
pub fn cia_content_ranges(content_start: u64, sizes: &[u64]) -> Result<Vec<Range<u64>>, Error> {
    let mut offset = content_start;
    let mut ranges = Vec::with_capacity(sizes.len());
    for &size in sizes {
        let end = offset
            .checked_add(size)
            .ok_or_else(|| Error::addr_overflow(offset, size))?;
        ranges.push(offset..end);
        offset = offset
            .checked_add(aligned(size)?)
            .ok_or_else(|| Error::addr_overflow(offset, size))?;
    }
    Ok(ranges)
}

/// Byte range of an NCSD partition.
pub fn ncsd_partition_range(entry: PartitionEntry, unit_shift: u32) -> Range<u64> {
    let start = u64::from(entry.offset) << unit_shift;
    start..start + (u64::from(entry.length) << unit_shift)
}

/// A parsed title metadata record.
#[derive(Debug)]
pub struct Tmd {
    pub header: TmdHeader,
    pub contents: Vec<ContentChunk>,
}

impl Tmd {
    fn read(source: &dyn Source) -> Result<Self, Error> {
        let mut sig_type = [0; 4];
        source.read_exact_at(0, &mut sig_type)?;
        let sig_type = u32::from_be_bytes(sig_type);
        let header_offset = raw::signature_size(sig_type).ok_or_else(|| {
            Error::Malformed(format!("unknown TMD signature type {:#010X}", sig_type))
        })?;
        let header: TmdHeader = source.read_struct(header_offset)?;

        let count = header.content_count.min(tmd::MAX_CONTENTS);
        if count < header.content_count {
            warn!(
                "TMD lists {} contents, only reading {}",
                header.content_count, count
            );
        }
        let chunks_offset = header_offset + TmdHeader::SIZE as u64 + tmd::INFO_RECORDS_SIZE;
        let data = source.read_vec(chunks_offset, usize::from(count) * ContentChunk::SIZE)?;
        let contents = data
            .chunks_exact(ContentChunk::SIZE)
            .map(ContentChunk::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { header, contents })
    }
}

/// Formats a title version as `major.minor.micro`.
fn title_version(version: u16) -> String {
    format!(
        "{}.{}.{} (v{})",
        version >> 10,
        (version >> 4) & 0x3F,
        version & 0xF,
        version
    )
}

/// The header of the outermost container, by kind.
#[derive(Debug)]
enum Container {
    Smdh,
    Threedsx {
        header: ThreedsxHeader,
        ext: Option<ThreedsxExtHeader>,
    },
    Cia {
        layout: CiaLayout,
    },
    /// CCI cartridge (`cci` is set) or eMMC dump.
    Ncsd {
        header: NcsdHeader,
        cci: Option<CciHeader>,
        unit_shift: u32,
    },
}

impl Container {
    fn read(source: &dyn Source, kind: N3dsKind) -> Result<Self, Error> {
        match kind {
            N3dsKind::Smdh => {
                let magic = source.read_vec(0, 4)?;
                if magic != raw::SMDH_MAGIC || source.size() < raw::SMDH_SIZE as u64 {
                    return Err(Error::Malformed("not an SMDH file".to_string()));
                }
                Ok(Container::Smdh)
            }
            N3dsKind::Threedsx => {
                let header: ThreedsxHeader = source.read_struct(0)?;
                if header.magic.0 != *raw::THREEDSX_MAGIC {
                    return Err(Error::Malformed("invalid 3DSX magic".to_string()));
                }
                let ext = if usize::from(header.header_size)
                    >= ThreedsxHeader::SIZE + ThreedsxExtHeader::SIZE
                {
                    Some(source.read_struct(ThreedsxHeader::SIZE as u64)?)
                } else {
                    None
                };
                Ok(Container::Threedsx { header, ext })
            }
            N3dsKind::Cia => {
                let header: CiaHeader = source.read_struct(0)?;
                if !cia_fits(&header, source.size()) {
                    return Err(Error::Malformed(format!("invalid CIA header: {:?}", header)));
                }
                let layout = cia_layout(&header)?;
                debug!("CIA layout: {:?}", layout);
                Ok(Container::Cia { layout })
            }
            N3dsKind::Cci | N3dsKind::Emmc => {
                let header: NcsdHeader = source.read_struct(raw::NCSD_MAGIC_OFFSET as u64)?;
                if header.magic.0 != *raw::NCSD_MAGIC {
                    return Err(Error::Malformed("invalid NCSD magic".to_string()));
                }
                if ncsd_kind(&header) != Some(kind) {
                    return Err(Error::Malformed(format!("NCSD image is not a {:?}", kind)));
                }

                let (cci, unit_shift) = if kind == N3dsKind::Cci {
                    let card: CciHeader = source.read_struct(cci::HEADER_OFFSET as u64)?;
                    let extra = card.partition_flags.0[cci::FLAG_MEDIA_UNIT_SIZE];
                    if extra > MAX_EXTRA_UNIT_SHIFT {
                        return Err(Error::Malformed(format!(
                            "CCI media unit shift {} too large",
                            extra
                        )));
                    }
                    (Some(card), MEDIA_UNIT_SHIFT + u32::from(extra))
                } else {
                    (None, MEDIA_UNIT_SHIFT)
                };
                Ok(Container::Ncsd {
                    header,
                    cci,
                    unit_shift,
                })
            }
        }
    }
}

/// Reader for Nintendo 3DS files.
#[derive(Debug)]
pub struct Nintendo3ds {
    source: Option<Arc<dyn Source>>,
    options: Options,
    kind: N3dsKind,
    /// `None` if the file could not be read.
    container: Option<Container>,
    tmd: Lazy<Tmd>,
    ncch: Lazy<Ncch>,
    smdh: Lazy<Smdh>,
    icon: Lazy<DecodedImage>,
    fields: Lazy<Fields>,
    metadata: Lazy<MetaData>,
}

impl Nintendo3ds {
    /// Opens a file already identified as `kind` (see [`is_supported`]).
    ///
    /// [`is_supported`]: fn.is_supported.html
    pub fn with_kind(source: Arc<dyn Source>, kind: N3dsKind, options: &Options) -> Self {
        let mut this = Self {
            source: None,
            options: options.clone(),
            kind,
            container: None,
            tmd: Lazy::new(),
            ncch: Lazy::new(),
            smdh: Lazy::new(),
            icon: Lazy::new(),
            fields: Lazy::new(),
            metadata: Lazy::new(),
        };

        match Container::read(&*source, kind) {
            Ok(container) => {
                this.container = Some(container);
                this.source = Some(source);
            }
            Err(e) => debug!("not a usable {:?} file: {}", kind, e),
        }
        this
    }

    pub fn kind(&self) -> N3dsKind {
        self.kind
    }

    fn check_valid(&self) -> Result<(), Error> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::Malformed("not a valid 3DS file".to_string()))
        }
    }

    /// The title metadata of a CIA archive.
    pub fn tmd(&mut self) -> Result<&Tmd, Error> {
        if self.tmd.is_pending() {
            self.check_valid()?;
            let source = Arc::clone(rom::live_source(&self.source)?);
            let result = match &self.container {
                Some(Container::Cia { layout }) => {
                    let range = layout.tmd.clone();
                    PartitionSource::new(source, range.start, range.end - range.start)
                        .and_then(|tmd| Tmd::read(&tmd))
                }
                _ => Err(Error::NotFound("only CIA archives have a TMD".to_string())),
            };
            self.tmd.resolve(result);
        }
        self.tmd.get()
    }

    /// CIA contents and their byte ranges.
    fn cia_contents(&mut self) -> Result<Vec<(ContentChunk, Range<u64>)>, Error> {
        let area = match &self.container {
            Some(Container::Cia { layout }) => layout.content.clone(),
            _ => return Err(Error::NotFound("only CIA archives have contents".to_string())),
        };
        let chunks = self.tmd()?.contents.clone();
        let sizes: Vec<u64> = chunks.iter().map(|c| c.size).collect();
        let ranges = cia_content_ranges(area.start, &sizes)?;
        if let Some(last) = ranges.last() {
            if last.end > area.end {
                return Err(Error::Malformed(format!(
                    "CIA contents end at {:#X}, past the content section end {:#X}",
                    last.end, area.end
                )));
            }
        }
        Ok(chunks.into_iter().zip(ranges).collect())
    }

    fn load_ncch(&mut self) -> Result<Ncch, Error> {
        let range = match self.kind {
            N3dsKind::Cia => {
                let (chunk, range) = self
                    .cia_contents()?
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::NotFound("CIA has no contents".to_string()))?;
                if chunk.kind & tmd::CONTENT_ENCRYPTED != 0 {
                    return Err(Error::KeyUnavailable("CIA title key".to_string()));
                }
                range
            }
            N3dsKind::Cci => match &self.container {
                Some(Container::Ncsd {
                    header, unit_shift, ..
                }) => ncsd_partition_range(header.partitions[0], *unit_shift),
                _ => return Err(Error::NotFound("no NCSD header".to_string())),
            },
            _ => return Err(Error::NotFound(format!("{:?} files have no NCCH", self.kind))),
        };

        let source = Arc::clone(rom::live_source(&self.source)?);
        let partition = PartitionSource::new(source, range.start, range.end - range.start)?;
        Ncch::new(Arc::new(partition), Arc::clone(&self.options.keys))
    }

    /// The primary NCCH: the first CIA content or the CCI game partition.
    pub fn ncch(&mut self) -> Result<&Ncch, Error> {
        if self.ncch.is_pending() {
            self.check_valid()?;
            rom::live_source(&self.source)?;
            let result = self.load_ncch();
            self.ncch.resolve(result);
        }
        self.ncch.get()
    }

    fn load_smdh(&mut self) -> Result<Smdh, Error> {
        let source = Arc::clone(rom::live_source(&self.source)?);
        // `None` means the SMDH is the `icon` file of the primary NCCH's ExeFS
        let offset = match &self.container {
            Some(Container::Smdh) => Some(0),
            Some(Container::Threedsx { ext: Some(ext), .. })
                if ext.smdh_size as usize >= raw::SMDH_SIZE =>
            {
                Some(u64::from(ext.smdh_offset))
            }
            Some(Container::Cia { layout })
                if layout.meta.end - layout.meta.start
                    >= raw::CIA_META_SMDH + raw::SMDH_SIZE as u64 =>
            {
                Some(layout.meta.start + raw::CIA_META_SMDH)
            }
            Some(Container::Cia { .. }) | Some(Container::Ncsd { cci: Some(_), .. }) => None,
            _ => return Err(Error::NotFound(format!("{:?} file has no SMDH", self.kind))),
        };
        let data = match offset {
            Some(offset) => source.read_vec(offset, raw::SMDH_SIZE)?,
            None => self.ncch()?.exefs_file("icon", raw::SMDH_SIZE as u32)?,
        };
        Smdh::parse(&data)
    }

    /// The SMDH with titles and icons.
    pub fn smdh(&mut self) -> Result<&Smdh, Error> {
        if self.smdh.is_pending() {
            self.check_valid()?;
            rom::live_source(&self.source)?;
            let result = self.load_smdh();
            self.smdh.resolve(result);
        }
        self.smdh.get()
    }

    fn add_threedsx_fields(fields: &mut Fields, header: &ThreedsxHeader, ext: &Option<ThreedsxExtHeader>) {
        fields.add_string("Code Size", format_file_size(header.code_seg_size.into()));
        fields.add_string("RO Data Size", format_file_size(header.rodata_seg_size.into()));
        fields.add_string("Data Size", format_file_size(header.data_seg_size.into()));
        fields.add_string("BSS Size", format_file_size(header.bss_seg_size.into()));
        let romfs = match ext {
            Some(ext) if ext.romfs_offset != 0 => "Present",
            _ => "None",
        };
        fields.add_string("RomFS", romfs);
    }

    fn add_cia_fields(&mut self, fields: &mut Fields) {
        let contents = match self.cia_contents() {
            Ok(contents) => contents,
            Err(e) => {
                debug!("unusable TMD: {}", e);
                fields.add_string_flags("TMD", "Unknown", StrFlags::WARNING);
                return;
            }
        };
        if let Ok(tmd) = self.tmd() {
            let header = &tmd.header;
            fields.add_string_numeric("Title ID", header.title_id, Base::Hex, 16, StrFlags::MONOSPACE);
            fields.add_string("Version", title_version(header.title_version));
            if header.system_version != 0 {
                fields.add_string_numeric(
                    "Required System Version",
                    header.system_version,
                    Base::Hex,
                    16,
                    StrFlags::MONOSPACE,
                );
            }
        }

        let rows = contents
            .iter()
            .map(|(chunk, range)| {
                let mut flags = Vec::new();
                if chunk.kind & tmd::CONTENT_ENCRYPTED != 0 {
                    flags.push("Encrypted");
                }
                if chunk.kind & tmd::CONTENT_OPTIONAL != 0 {
                    flags.push("Optional");
                }
                vec![
                    chunk.index.to_string(),
                    format!("{:08X}", chunk.id),
                    if flags.is_empty() { "-".to_string() } else { flags.join(", ") },
                    format!("0x{:X}", range.start),
                    format_file_size(chunk.size),
                ]
            })
            .collect();
        fields.add_list_data("Contents", &["#", "ID", "Flags", "Offset", "Size"], rows);
    }

    /// One row per used partition: index, name, optional crypt type, offset
    /// and size.
    fn partition_rows(header: &NcsdHeader, unit_shift: u32, names: &[&str; 8], crypt: bool) -> Vec<Vec<String>> {
        header
            .partitions
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.length != 0)
            .map(|(i, entry)| {
                let range = ncsd_partition_range(*entry, unit_shift);
                let mut row = vec![i.to_string(), names[i].to_string()];
                if crypt {
                    let name = match header.partition_crypt_types.0[i] {
                        1 => "TWL",
                        2 => "CTR",
                        3 => "New3DS CTR",
                        _ => "None",
                    };
                    row.push(name.to_string());
                }
                row.push(format!("0x{:X}", range.start));
                row.push(format_file_size(range.end - range.start));
                row
            })
            .collect()
    }

    fn add_ncsd_fields(fields: &mut Fields, header: &NcsdHeader, card: &Option<CciHeader>, unit_shift: u32) {
        let image_size = u64::from(header.image_size) << unit_shift;
        match card {
            Some(card) => {
                fields.add_string_numeric("Media ID", header.media_id, Base::Hex, 16, StrFlags::MONOSPACE);
                fields.add_string("Image Size", format_file_size(image_size));
                let media_type = match card.partition_flags.0[cci::FLAG_MEDIA_TYPE] {
                    0 => "Inner Device".to_string(),
                    1 => "Card1".to_string(),
                    2 => "Card2".to_string(),
                    3 => "Extended Device".to_string(),
                    other => format!("Unknown ({})", other),
                };
                fields.add_string("Media Type", media_type);
                let rows = Self::partition_rows(header, unit_shift, &CCI_PARTITION_NAMES, false);
                fields.add_list_data("Partitions", &["#", "Type", "Offset", "Size"], rows);
            }
            None => {
                let console = if header.partition_crypt_types.0 == raw::EMMC_CRYPT_NEW {
                    "New 3DS"
                } else {
                    "Old 3DS"
                };
                fields.add_string("Console", console);
                fields.add_string("Image Size", format_file_size(image_size));
                let rows = Self::partition_rows(header, unit_shift, &EMMC_PARTITION_NAMES, true);
                fields.add_list_data("Partitions", &["#", "Type", "Crypto", "Offset", "Size"], rows);
            }
        }
    }

    fn load_fields(&mut self) -> Result<Fields, Error> {
        rom::live_source(&self.source)?;
        let mut fields = Fields::new();
        let tab_name = match self.kind {
            N3dsKind::Smdh => "SMDH",
            N3dsKind::Threedsx => "3DSX",
            N3dsKind::Cia => "CIA",
            N3dsKind::Cci => "CCI",
            N3dsKind::Emmc => "eMMC",
        };
        fields.set_tab_name(0, tab_name);

        let language = self.options.language();
        if self.kind != N3dsKind::Emmc {
            match self.smdh() {
                Ok(smdh) => smdh.add_fields(&mut fields, language.as_deref()),
                Err(e) => debug!("no SMDH: {}", e),
            }
        }

        match &self.container {
            Some(Container::Threedsx { header, ext }) => {
                Self::add_threedsx_fields(&mut fields, header, ext)
            }
            Some(Container::Ncsd {
                header,
                cci,
                unit_shift,
            }) => Self::add_ncsd_fields(&mut fields, header, cci, *unit_shift),
            _ => {}
        }
        if self.kind == N3dsKind::Cia {
            self.add_cia_fields(&mut fields);
        }

        if self.kind == N3dsKind::Cia || self.kind == N3dsKind::Cci {
            match self.ncch() {
                Ok(ncch) => {
                    fields.add_tab("NCCH");
                    ncch.add_fields(&mut fields);
                }
                Err(e) => {
                    debug!("no NCCH: {}", e);
                    let status = if e.is_not_found() {
                        "Encrypted (key unavailable)"
                    } else {
                        "Unknown"
                    };
                    fields.add_string_flags("NCCH", status, StrFlags::WARNING);
                }
            }
        }
        Ok(fields)
    }

    fn load_metadata(&mut self) -> Result<MetaData, Error> {
        let mut metadata = MetaData::new();
        let language = self.options.language();
        if let Ok(smdh) = self.smdh() {
            smdh.add_metadata(&mut metadata, language.as_deref());
        }
        Ok(metadata)
    }
}

impl RomData for Nintendo3ds {
    fn is_valid(&self) -> bool {
        self.container.is_some()
    }

    fn close(&mut self) {
        self.source = None;
        self.ncch.clear();
    }

    fn system_name(&self, kind: SystemName) -> Option<&'static str> {
        if self.is_valid() {
            Some(kind.pick(&SYSTEM_NAMES))
        } else {
            None
        }
    }

    fn file_type(&self) -> FileType {
        match self.kind {
            N3dsKind::Smdh => FileType::IconFile,
            N3dsKind::Threedsx => FileType::Homebrew,
            N3dsKind::Cia => FileType::ApplicationPackage,
            N3dsKind::Cci => FileType::RomImage,
            N3dsKind::Emmc => FileType::EmmcDump,
        }
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[".smdh", ".3dsx", ".cia", ".3ds", ".3dz", ".cci", ".bin"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        match self.kind {
            N3dsKind::Smdh => &["application/x-nintendo-3ds-smdh"],
            N3dsKind::Threedsx => &["application/x-nintendo-3ds-executable"],
            N3dsKind::Cia => &["application/x-ctr-cia"],
            N3dsKind::Cci => &["application/x-nintendo-3ds-rom"],
            N3dsKind::Emmc => &["application/x-nintendo-3ds-emmc"],
        }
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
        if self.kind != N3dsKind::Emmc && self.smdh().is_ok() {
            ImageTypes::INT_ICON
        } else {
            ImageTypes::empty()
        }
    }

    fn image_sizes(&mut self, kind: ImageType) -> Vec<ImageSize> {
        if kind == ImageType::IntIcon && self.supported_image_types().contains(ImageTypes::INT_ICON) {
            vec![IconSize::Small.dimensions(), IconSize::Large.dimensions()]
        } else {
            Vec::new()
        }
    }

    fn image(&mut self, kind: ImageType) -> Result<&DecodedImage, Error> {
        if kind != ImageType::IntIcon {
            return Err(rom::not_found_image(kind));
        }
        if self.icon.is_pending() {
            self.check_valid()?;
            rom::live_source(&self.source)?;
            let result = self.smdh().and_then(|smdh| smdh.icon(IconSize::Large));
            self.icon.resolve(result);
        }
        self.icon.get()
    }
}
