//! SMDH icon and title metadata.

use super::raw::{self, smdh, SmdhSettings, SmdhTitle};
use crate::fields::{age, Fields};
use crate::image::{tiled, DecodedImage, ImageSize};
use crate::metadata::{MetaData, Property};
use crate::raw::RawStruct;
use crate::utils::SliceExt;
use crate::Error;

/// Two-letter codes of the title slots, in SMDH order.
const LANGUAGES: [&str; 12] = [
    "ja", "en", "fr", "de", "it", "es", "zh", "ko", "nl", "pt", "ru", "zh-tw",
];
const LANGUAGE_ENGLISH: usize = 1;

/// Maps a language code to its title slot.
///
/// `"zh"` and `"zh-cn"` select simplified Chinese, `"zh-tw"` and `"zh-hk"`
/// traditional Chinese.
pub fn language_index(code: &str) -> Option<usize> {
    let code = code.to_ascii_lowercase();
    match code.as_str() {
        "zh-cn" | "zh-hans" => Some(6),
        "zh-hk" | "zh-hant" => Some(11),
        other => LANGUAGES.iter().position(|l| *l == other),
    }
}

const REGION_NAMES: [Option<&str>; 7] = [
    Some("Japan"),
    Some("USA"),
    Some("Europe"),
    Some("Australia"),
    Some("China"),
    Some("South Korea"),
    Some("Taiwan"),
];

/// All regions, which SMDH files use to mean "region free".
const REGION_FREE: u32 = 0x7FFF_FFFF;

/// Rating byte bits.
const RATING_ACTIVE: u8 = 0x80;
const RATING_PENDING: u8 = 0x40;
const RATING_NO_RESTRICTION: u8 = 0x20;
const RATING_AGE_MASK: u8 = 0x1F;

/// An icon size an SMDH provides.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IconSize {
    Small,
    Large,
}

impl IconSize {
    pub fn dimensions(self) -> ImageSize {
        match self {
            IconSize::Small => ImageSize::new(24, 24),
            IconSize::Large => ImageSize::new(48, 48),
        }
    }
}

/// Title strings for one language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Title {
    pub short: String,
    pub long: String,
    pub publisher: String,
}

impl Title {
    fn is_empty(&self) -> bool {
        self.short.is_empty() && self.long.is_empty() && self.publisher.is_empty()
    }
}

/// A parsed SMDH.
#[derive(Debug)]
pub struct Smdh {
    version: u16,
    titles: Vec<Title>,
    settings: SmdhSettings,
    small_icon: Vec<u8>,
    large_icon: Vec<u8>,
}

impl Smdh {
    /// Parses a complete SMDH.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        if data.len() < raw::SMDH_SIZE {
            return Err(Error::Malformed(format!(
                "SMDH needs {:#X} bytes, got {:#X}",
                raw::SMDH_SIZE,
                data.len()
            )));
        }
        if !data.starts_with(raw::SMDH_MAGIC) {
            return Err(Error::Malformed("invalid SMDH magic".to_string()));
        }

        let titles = (0..smdh::TITLE_COUNT)
            .map(|i| {
                let start = (smdh::TITLES + i * SmdhTitle::SIZE) as u32;
                let title = SmdhTitle::parse(data.try_get(start..)?)?;
                Ok(Title {
                    short: title.short_desc.decode(),
                    long: title.long_desc.decode(),
                    publisher: title.publisher.decode(),
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let settings = SmdhSettings::parse(data.try_get(smdh::SETTINGS as u32..)?)?;

        let icon = |start: usize, len: usize| -> Result<Vec<u8>, Error> {
            Ok(data.try_get(start as u32..(start + len) as u32)?.to_vec())
        };

        Ok(Self {
            version: u16::from_le_bytes([data[smdh::VERSION], data[smdh::VERSION + 1]]),
            titles,
            small_icon: icon(smdh::SMALL_ICON, smdh::SMALL_ICON_SIZE)?,
            large_icon: icon(smdh::LARGE_ICON, smdh::LARGE_ICON_SIZE)?,
            settings,
        })
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    /// The title in the preferred language.
    ///
    /// Falls back to English, then to the first non-empty entry.
    pub fn title(&self, language: Option<&str>) -> Title {
        let preferred = language.and_then(language_index);
        preferred
            .into_iter()
            .chain(Some(LANGUAGE_ENGLISH))
            .filter_map(|i| self.titles.get(i))
            .find(|t| !t.is_empty())
            .or_else(|| self.titles.iter().find(|t| !t.is_empty()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn region_lock(&self) -> u32 {
        self.settings.region_lock
    }

    /// Age ratings converted to the common rating layout.
    pub fn age_ratings(&self) -> [u16; 16] {
        let mut out = [0; 16];
        for (dest, &rating) in out.iter_mut().zip(self.settings.ratings.0.iter()) {
            if rating & RATING_ACTIVE == 0 {
                continue;
            }
            let mut value = age::ACTIVE | u16::from(rating & RATING_AGE_MASK);
            if rating & RATING_PENDING != 0 {
                value |= age::PENDING;
            }
            if rating & RATING_NO_RESTRICTION != 0 {
                value |= age::NO_RESTRICTION;
            }
            *dest = value;
        }
        out
    }

    /// Decodes one of the two icons.
    pub fn icon(&self, size: IconSize) -> Result<DecodedImage, Error> {
        let dims = size.dimensions();
        let data = match size {
            IconSize::Small => &self.small_icon,
            IconSize::Large => &self.large_icon,
        };
        tiled::decode_rgb565(dims.width, dims.height, data)
    }

    /// Adds the title and settings fields to the current tab.
    pub fn add_fields(&self, fields: &mut Fields, language: Option<&str>) {
        let title = self.title(language);
        fields.add_string("Title", title.short);
        fields.add_string("Full Title", title.long);
        fields.add_string("Publisher", title.publisher);

        let region = self.settings.region_lock;
        if region == REGION_FREE {
            fields.add_string("Region Code", "Region-Free");
        } else {
            fields.add_bitfield("Region Code", &REGION_NAMES, 3, region);
        }
        fields.add_age_ratings("Age Rating", self.age_ratings());
    }

    /// Adds title, publisher and description properties.
    pub fn add_metadata(&self, metadata: &mut MetaData, language: Option<&str>) {
        let title = self.title(language);
        metadata.add_string(Property::Title, title.short);
        metadata.add_string(Property::Publisher, title.publisher);
        metadata.add_string(Property::Description, title.long);
    }
}
