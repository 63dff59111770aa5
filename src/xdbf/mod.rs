//! Xbox 360 XDBF resource databases.
//!
//! An XDBF file is a table of `(namespace, resource id)` entries pointing into
//! a data area. Title strings live in per-language string tables (`XSTR`),
//! icons are PNG images, and achievements are described by an `XACH` record.
//! The same layout is embedded in XEX executables as a resource section, in
//! which case the reader is created with [`Xdbf::embedded`].
//!
//! [`Xdbf::embedded`]: struct.Xdbf.html#method.embedded

pub mod raw;

use crate::detect::DetectInfo;
use crate::fields::Fields;
use crate::image::{DecodedImage, ImageSize, ImageType, ImageTypes};
use crate::lazy::Lazy;
use crate::metadata::{MetaData, Property};
use crate::options::Options;
use crate::raw::RawStruct;
use crate::rom::{self, FileType, RomData, SystemName};
use crate::source::{Source, SourceExt};
use crate::utils::SliceExt;
use crate::Error;

use std::collections::HashMap;
use std::sync::Arc;

const SYSTEM_NAMES: [&str; 3] = ["Microsoft Xbox 360", "Xbox 360", "X360"];

/// Upper bound for a single string table or image resource.
const MAX_RESOURCE_SIZE: u32 = 1024 * 1024;
const MIN_IMAGE_SIZE: u32 = 16;
const MAX_ACHIEVEMENTS: usize = 512;
/// Entry tables larger than this are treated as corrupt.
const MAX_ENTRY_TABLE_LENGTH: u32 = 0x10000;

pub const LANGUAGE_ENGLISH: u32 = 1;

/// XDBF language ids, in id order.
const LANGUAGES: &[(u32, &str)] = &[
    (1, "en"),
    (2, "ja"),
    (3, "de"),
    (4, "fr"),
    (5, "es"),
    (6, "it"),
    (7, "ko"),
    (8, "zh-trad"),
    (9, "pt"),
    (10, "zh-simp"),
    (11, "pl"),
    (12, "ru"),
];

/// One past the highest language id.
const LANGUAGE_MAX: u32 = 13;

/// Maps a language code to its XDBF language id.
///
/// A plain `"zh"` selects traditional Chinese.
pub fn language_id(code: &str) -> Option<u32> {
    let code = code.to_ascii_lowercase();
    let code = if code == "zh" { "zh-trad" } else { code.as_str() };
    LANGUAGES.iter().find(|(_, c)| *c == code).map(|(id, _)| *id)
}

pub fn language_code(id: u32) -> Option<&'static str> {
    LANGUAGES
        .binary_search_by_key(&id, |(id, _)| *id)
        .ok()
        .map(|idx| LANGUAGES[idx].1)
}

pub fn is_supported(info: &DetectInfo) -> bool {
    match raw::Header::parse(info.header) {
        Ok(header) => header.magic.0 == *raw::MAGIC && header.version == raw::VERSION,
        Err(_) => false,
    }
}

/// A parsed `XSTR` string table.
#[derive(Debug)]
struct StringTable {
    strings: Vec<(u16, String)>,
}

impl StringTable {
    fn parse(data: &[u8]) -> Result<Self, Error> {
        let header = raw::XstrHeader::parse(data)?;
        if header.magic.0 != *raw::XSTR_MAGIC || header.version != raw::XSTR_VERSION {
            return Err(Error::Malformed(format!(
                "invalid string table header: {:?}",
                header
            )));
        }

        let mut strings = Vec::with_capacity(header.string_count.into());
        let mut pos = raw::XstrHeader::SIZE as u32;
        while let Ok(entry_data) = data.try_get(pos..) {
            let entry = match raw::XstrEntryHeader::parse(entry_data) {
                Ok(entry) => entry,
                Err(_) => break,
            };
            let start = pos + raw::XstrEntryHeader::SIZE as u32;
            let end = start + u32::from(entry.length);
            let text = match data.try_get(start..end) {
                Ok(text) => text,
                Err(_) => {
                    warn!("string {:#06X} runs past the end of its table", entry.string_id);
                    break;
                }
            };
            strings.push((entry.string_id, dos2unix(&String::from_utf8_lossy(text))));
            pos = end;
        }

        Ok(Self { strings })
    }

    fn get(&self, id: u16) -> Option<&str> {
        self.strings
            .iter()
            .find(|(string_id, _)| *string_id == id)
            .map(|(_, s)| s.as_str())
    }
}

fn dos2unix(s: &str) -> String {
    s.replace("\r\n", "\n")
}

/// Reader for XDBF files and XDBF sections embedded in XEX executables.
#[derive(Debug)]
pub struct Xdbf {
    source: Option<Arc<dyn Source>>,
    options: Options,
    /// Embedded in an XEX: the title is shown by the XEX reader instead.
    embedded: bool,
    valid: bool,
    entries: Vec<raw::Entry>,
    /// Start of the data area. Entry offsets are relative to this.
    data_offset: u64,
    string_tables: HashMap<u32, Lazy<StringTable>>,
    language: Lazy<Option<u32>>,
    /// Decoded images, keyed by resource id.
    images: HashMap<u64, Lazy<Arc<DecodedImage>>>,
    fields: Lazy<Fields>,
    metadata: Lazy<MetaData>,
}

impl Xdbf {
    /// Opens a standalone XDBF file.
    pub fn new(source: Arc<dyn Source>, options: &Options) -> Self {
        Self::open(source, options, false)
    }

    /// Opens an XDBF section embedded in an XEX executable.
    pub fn embedded(source: Arc<dyn Source>, options: &Options) -> Self {
        Self::open(source, options, true)
    }

    fn open(source: Arc<dyn Source>, options: &Options, embedded: bool) -> Self {
        let mut this = Self {
            source: None,
            options: options.clone(),
            embedded,
            valid: false,
            entries: Vec::new(),
            data_offset: 0,
            string_tables: HashMap::new(),
            language: Lazy::new(),
            images: HashMap::new(),
            fields: Lazy::new(),
            metadata: Lazy::new(),
        };

        match Self::read_entry_table(&*source) {
            Ok((entries, data_offset)) => {
                this.entries = entries;
                this.data_offset = data_offset;
                this.source = Some(source);
                this.valid = true;
            }
            Err(e) => debug!("not a usable XDBF: {}", e),
        }
        this
    }

    fn read_entry_table(source: &dyn Source) -> Result<(Vec<raw::Entry>, u64), Error> {
        let header_data = source.read_vec(0, raw::Header::SIZE)?;
        if !is_supported(&DetectInfo::new(&header_data, None, source.size())) {
            return Err(Error::Unsupported);
        }
        let header = raw::Header::parse(&header_data)?;
        if header.entry_table_length > MAX_ENTRY_TABLE_LENGTH {
            return Err(Error::Malformed(format!(
                "entry table too large ({} entries)",
                header.entry_table_length
            )));
        }

        let table_len = u64::from(header.entry_table_length) * raw::Entry::SIZE as u64;
        let data_offset = raw::Header::SIZE as u64
            + table_len
            + u64::from(header.free_space_table_length) * raw::FREE_SPACE_ENTRY_SIZE;

        let table = source.read_vec(raw::Header::SIZE as u64, table_len as usize)?;
        let entries = table
            .chunks_exact(raw::Entry::SIZE)
            .map(raw::Entry::parse)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "XDBF: {} entry slots ({} used), data at {:#X}",
            entries.len(),
            header.entry_count,
            data_offset
        );
        Ok((entries, data_offset))
    }

    fn find_resource(&self, namespace_id: u16, resource_id: u64) -> Option<&raw::Entry> {
        self.entries
            .iter()
            .find(|e| e.namespace_id == namespace_id && e.resource_id == resource_id)
    }

    /// Reads the data of a resource whose length lies within `min..=max`.
    fn read_resource(
        &self,
        namespace_id: u16,
        resource_id: u64,
        min: u32,
        max: u32,
    ) -> Result<Vec<u8>, Error> {
        let source = rom::live_source(&self.source)?;
        let entry = self.find_resource(namespace_id, resource_id).ok_or_else(|| {
            Error::NotFound(format!(
                "resource {:#X} in namespace {}",
                resource_id, namespace_id
            ))
        })?;
        if entry.length < min || entry.length > max {
            return Err(Error::Malformed(format!(
                "resource {:#X} has invalid length {}",
                resource_id, entry.length
            )));
        }
        let offset = self
            .data_offset
            .checked_add(u64::from(entry.offset))
            .ok_or_else(|| Error::addr_overflow(self.data_offset, entry.offset.into()))?;
        source.read_vec(offset, entry.length as usize)
    }

    fn load_string_table(&mut self, language: u32) -> Result<&StringTable, Error> {
        if language == 0 || language >= LANGUAGE_MAX {
            return Err(Error::NotFound(format!("language {}", language)));
        }
        rom::live_source(&self.source)?;
        if !self.string_tables.contains_key(&language) {
            let result = self
                .read_resource(
                    raw::NAMESPACE_STRING_TABLE,
                    language.into(),
                    raw::XstrHeader::SIZE as u32 + 1,
                    MAX_RESOURCE_SIZE,
                )
                .and_then(|data| StringTable::parse(&data));
            self.string_tables.entry(language).or_default().resolve(result);
        }
        match self.string_tables.get(&language) {
            Some(table) => table.get(),
            None => Err(Error::NotFound(format!("language {}", language))),
        }
    }

    fn read_default_language(&self) -> Result<u32, Error> {
        let data = self.read_resource(
            raw::NAMESPACE_METADATA,
            raw::XSTC_RESOURCE_ID,
            raw::Xstc::SIZE as u32,
            raw::Xstc::SIZE as u32,
        )?;
        let xstc = raw::Xstc::parse(&data)?;
        if xstc.magic.0 != *raw::XSTC_MAGIC
            || xstc.version != raw::XSTC_VERSION
            || xstc.size != raw::Xstc::SIZE as u32 - 4
        {
            return Err(Error::Malformed(format!("invalid XSTC record: {:?}", xstc)));
        }
        Ok(xstc.default_language)
    }

    fn select_language(&mut self) -> Option<u32> {
        let preferred = self.options.language().and_then(|code| language_id(&code));
        if let Some(id) = preferred {
            if self.load_string_table(id).is_ok() {
                return Some(id);
            }
        }

        match self.read_default_language() {
            Ok(id) => {
                if self.load_string_table(id).is_ok() {
                    return Some(id);
                }
            }
            Err(e) => debug!("no default language: {}", e),
        }

        if self.load_string_table(LANGUAGE_ENGLISH).is_ok() {
            Some(LANGUAGE_ENGLISH)
        } else {
            None
        }
    }

    /// Language id used for all displayed strings, if any string table is
    /// usable.
    pub fn language(&mut self) -> Option<u32> {
        if self.language.is_pending() {
            if rom::live_source(&self.source).is_err() {
                return None;
            }
            let language = self.select_language();
            info!("XDBF language: {:?}", language.and_then(language_code));
            self.language.resolve(Ok(language));
        }
        self.language.ready().copied().flatten()
    }

    /// Looks up a string in the selected language. Empty if unavailable.
    fn string(&mut self, language: u32, id: u16) -> String {
        match self.load_string_table(language) {
            Ok(table) => table.get(id).unwrap_or_default().to_string(),
            Err(_) => String::new(),
        }
    }

    /// The game title, or an empty string if there is none.
    pub fn title(&mut self) -> String {
        match self.language() {
            Some(language) => self.string(language, raw::ID_TITLE as u16),
            None => String::new(),
        }
    }

    fn load_image(&mut self, id: u64) -> Result<Arc<DecodedImage>, Error> {
        rom::live_source(&self.source)?;
        let result = if self.images.contains_key(&id) {
            None
        } else {
            let decoded = self
                .read_resource(raw::NAMESPACE_IMAGE, id, MIN_IMAGE_SIZE, MAX_RESOURCE_SIZE)
                .and_then(|data| self.options.png.decode(&data))
                .map(Arc::new);
            Some(decoded)
        };
        let slot = self.images.entry(id).or_default();
        if let Some(result) = result {
            slot.resolve(result);
        }
        slot.get().map(Arc::clone)
    }

    fn add_achievements(&mut self, fields: &mut Fields) -> Result<(), Error> {
        const MAX_SIZE: u32 =
            raw::XachHeader::SIZE as u32 + (raw::XachEntry::SIZE * MAX_ACHIEVEMENTS) as u32;

        let data = self.read_resource(
            raw::NAMESPACE_METADATA,
            raw::XACH_RESOURCE_ID,
            raw::XachHeader::SIZE as u32,
            MAX_SIZE,
        )?;
        let header = raw::XachHeader::parse(&data)?;
        if header.magic.0 != *raw::XACH_MAGIC {
            return Err(Error::Malformed("invalid achievement table magic".to_string()));
        }

        let available = (data.len() - raw::XachHeader::SIZE) / raw::XachEntry::SIZE;
        let count = usize::from(header.achievement_count)
            .min(MAX_ACHIEVEMENTS)
            .min(available);

        let language = self.language();
        let mut rows = Vec::with_capacity(count);
        let mut icons = Vec::with_capacity(count);
        let entries = data
            .get(raw::XachHeader::SIZE..)
            .unwrap_or_default()
            .chunks_exact(raw::XachEntry::SIZE)
            .take(count);
        for entry in entries {
            let entry = raw::XachEntry::parse(entry)?;
            icons.push(self.load_image(entry.image_id.into()).ok());

            let description = match language {
                Some(language) => {
                    let title = self.string(language, entry.title_id);
                    let locked = self.string(language, entry.locked_desc_id);
                    match (title.is_empty(), locked.is_empty()) {
                        (_, true) => title,
                        (true, false) => locked,
                        (false, false) => format!("{}\n{}", title, locked),
                    }
                }
                None => format!(
                    "Title: 0x{:04X} | Locked: 0x{:04X} | Unlocked: 0x{:04X}",
                    entry.title_id, entry.locked_desc_id, entry.unlocked_desc_id
                ),
            };

            rows.push(vec![
                entry.achievement_id.to_string(),
                description,
                entry.gamerscore.to_string(),
            ]);
        }

        fields.add_list_data_icons(
            "Achievements",
            &["ID", "Description", "Gamerscore"],
            rows,
            Some(icons),
        );
        Ok(())
    }

    fn load_fields(&mut self) -> Result<Fields, Error> {
        rom::live_source(&self.source)?;
        let mut fields = Fields::new();
        fields.reserve(2);
        fields.set_tab_name(0, "XDBF");

        if !self.embedded {
            let title = self.title();
            fields.add_string("Title", if title.is_empty() { "Unknown".to_string() } else { title });
        }

        if let Err(e) = self.add_achievements(&mut fields) {
            debug!("no achievements: {}", e);
        }
        Ok(fields)
    }

    fn load_metadata(&mut self) -> Result<MetaData, Error> {
        rom::live_source(&self.source)?;
        let mut metadata = MetaData::new();
        metadata.add_string(Property::Title, self.title());
        Ok(metadata)
    }

    fn check_valid(&self) -> Result<(), Error> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::Malformed("not a valid XDBF file".to_string()))
        }
    }
}

impl RomData for Xdbf {
    fn is_valid(&self) -> bool {
        self.valid
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
        FileType::ResourceFile
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[".xdbf", ".spa"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["application/x-xbox360-xdbf"]
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
        if !self.images.contains_key(&raw::ID_TITLE) {
            self.load_image(raw::ID_TITLE)?;
        }
        match self.images.get(&raw::ID_TITLE) {
            Some(slot) => slot.get().map(|image| &**image),
            None => Err(rom::not_found_image(kind)),
        }
    }
}
