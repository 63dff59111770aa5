//! Atari 8-bit SAP music files.
//!
//! A SAP file starts with a plain text header of `KEYWORD value` lines,
//! introduced by a `SAP` line and terminated by the `0xFF 0xFF` marker of the
//! binary part. Keywords are matched case-insensitively; string values are
//! enclosed in double quotes.

use crate::detect::DetectInfo;
use crate::fields::{Base, Fields, StrFlags};
use crate::lazy::Lazy;
use crate::metadata::{MetaData, Property};
use crate::options::Options;
use crate::rom::{self, FileType, RomData, SystemName};
use crate::source::{Source, SourceExt};
use crate::Error;

use std::sync::Arc;

const SYSTEM_NAMES: [&str; 3] = ["Atari 8-bit SAP Audio", "SAP", "SAP"];

/// How much of the file is searched for tags.
const MAX_HEADER_SIZE: u64 = 4096;

const FLAG_NAMES: [Option<&str>; 2] = [Some("NTSC"), Some("Stereo")];

/// Scanlines per frame, the default player call rate.
const SCANLINES_PAL: u16 = 312;
const SCANLINES_NTSC: u16 = 262;

fn strip_magic(header: &[u8]) -> Option<&[u8]> {
    if header.starts_with(b"SAP\r\n") {
        Some(&header[5..])
    } else if header.starts_with(b"SAP\n") {
        Some(&header[4..])
    } else {
        None
    }
}

pub fn is_supported(info: &DetectInfo) -> bool {
    // the shortest possible file is the magic plus the binary marker
    info.header.len() >= 6 && strip_magic(info.header).is_some()
}

/// Length of one song, from a `TIME` tag.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SongTime {
    pub millis: u32,
    /// The song loops instead of ending.
    pub looping: bool,
}

impl SongTime {
    /// Parses `mm:ss[.mmm] [LOOP]`.
    fn parse(params: &str) -> Option<Self> {
        let mut words = params.split_whitespace();
        let time = words.next()?;
        let looping = words.any(|w| w.eq_ignore_ascii_case("LOOP"));

        let (minutes, rest) = time.split_once(':')?;
        let (seconds, fraction) = match rest.split_once('.') {
            Some((seconds, fraction)) => (seconds, Some(fraction)),
            None => (rest, None),
        };
        let minutes: u32 = minutes.parse().ok()?;
        let seconds: u32 = seconds.parse().ok()?;
        if seconds >= 60 {
            return None;
        }
        let millis = match fraction {
            Some(f) if !f.is_empty() && f.len() <= 3 && f.bytes().all(|b| b.is_ascii_digit()) => {
                // ".5" is half a second
                let padded = format!("{:0<3}", f);
                padded.parse::<u32>().ok()?
            }
            Some(_) => return None,
            None => 0,
        };
        Some(Self {
            millis: minutes
                .checked_mul(60_000)?
                .checked_add(seconds * 1000 + millis)?,
            looping,
        })
    }

    fn display(&self) -> String {
        let total_secs = self.millis / 1000;
        format!(
            "{:02}:{:02}.{:03}",
            total_secs / 60,
            total_secs % 60,
            self.millis % 1000
        )
    }
}

/// The parsed text header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tags {
    /// Whether the header could be parsed at all.
    pub tags_read: bool,
    pub author: String,
    pub name: String,
    pub date: String,
    /// Number of songs, 1 by default.
    pub songs: u16,
    /// Zero-based default song.
    pub def_song: u16,
    pub ntsc: bool,
    /// Dual POKEY.
    pub stereo: bool,
    /// Player type letter (`B`, `C`, `D`, `S`, ...); NUL if missing.
    pub kind: u8,
    /// Scanlines between player calls; 0 means one frame.
    pub fastplay: u16,
    pub init_addr: u16,
    pub music_addr: u16,
    pub player_addr: u16,
    pub covox_addr: u16,
    /// `TIME` tags in song order.
    pub times: Vec<SongTime>,
}

impl Default for Tags {
    fn default() -> Self {
        Self {
            tags_read: false,
            author: String::new(),
            name: String::new(),
            date: String::new(),
            songs: 1,
            def_song: 0,
            ntsc: false,
            stereo: false,
            kind: 0,
            fastplay: 0,
            init_addr: 0,
            music_addr: 0,
            player_addr: 0,
            covox_addr: 0,
            times: Vec::new(),
        }
    }
}

/// Parses a number that must make up the whole first word of `params`.
fn parse_u16(params: &str, radix: u32) -> Option<u16> {
    let word = params.split_whitespace().next()?;
    u16::from_str_radix(word, radix).ok()
}

/// Extracts a double-quoted Latin-1 string.
fn parse_quoted(params: &[u8]) -> Option<String> {
    let rest = params.strip_prefix(b"\"")?;
    let end = rest.iter().position(|b| *b == b'"')?;
    Some(rest[..end].iter().map(|b| *b as char).collect())
}

/// Parses a SAP text header.
///
/// `header` is the start of the file including the `SAP` line. Unknown
/// keywords and malformed values are ignored.
pub fn parse_tags(header: &[u8]) -> Tags {
    let mut tags = Tags::default();
    let body = match strip_magic(header) {
        Some(body) if header.len() >= 6 => body,
        _ => return tags,
    };

    for line in body.split(|b| *b == b'\n') {
        if line.first() == Some(&0xFF) {
            break;
        }
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let (keyword, params) = match line.iter().position(|b| *b == b' ') {
            Some(space) => (&line[..space], &line[space + 1..]),
            None => (line, &[][..]),
        };
        let params = match params.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(start) => &params[start..],
            None => &[][..],
        };
        let keyword = String::from_utf8_lossy(keyword).to_ascii_uppercase();
        let text = String::from_utf8_lossy(params);

        match keyword.as_str() {
            "AUTHOR" | "NAME" | "DATE" => match parse_quoted(params) {
                Some(value) => {
                    let slot = match keyword.as_str() {
                        "AUTHOR" => &mut tags.author,
                        "NAME" => &mut tags.name,
                        _ => &mut tags.date,
                    };
                    *slot = value;
                }
                None => debug!("SAP: ignoring unquoted {} value", keyword),
            },
            "SONGS" => tags.songs = parse_u16(&text, 10).unwrap_or(tags.songs),
            "DEFSONG" => tags.def_song = parse_u16(&text, 10).unwrap_or(tags.def_song),
            "FASTPLAY" => tags.fastplay = parse_u16(&text, 10).unwrap_or(tags.fastplay),
            "INIT" => tags.init_addr = parse_u16(&text, 16).unwrap_or(tags.init_addr),
            "MUSIC" => tags.music_addr = parse_u16(&text, 16).unwrap_or(tags.music_addr),
            "PLAYER" => tags.player_addr = parse_u16(&text, 16).unwrap_or(tags.player_addr),
            "COVOX" => tags.covox_addr = parse_u16(&text, 16).unwrap_or(tags.covox_addr),
            "STEREO" => tags.stereo = true,
            "NTSC" => tags.ntsc = true,
            "TYPE" => match params {
                [c] | [c, b' ', ..] | [c, b'\t', ..] if !c.is_ascii_whitespace() => tags.kind = *c,
                _ => {}
            },
            "TIME" => match SongTime::parse(&text) {
                Some(time) => tags.times.push(time),
                None => debug!("SAP: invalid TIME value {:?}", text),
            },
            _ => trace!("SAP: skipping keyword {:?}", keyword),
        }
    }

    tags.tags_read = true;
    tags
}

/// The release year: the last run of exactly four digits in a `DATE` value
/// such as `"12/03/1987"` or `"1987-1988"`.
fn release_year(date: &str) -> Option<i64> {
    let bytes = date.as_bytes();
    let mut year = None;
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i - start == 4 {
            year = date[start..i].parse().ok();
        }
    }
    year
}

/// Reader for SAP files.
#[derive(Debug)]
pub struct Sap {
    source: Option<Arc<dyn Source>>,
    valid: bool,
    tags: Lazy<Tags>,
    fields: Lazy<Fields>,
    metadata: Lazy<MetaData>,
}

impl Sap {
    pub fn new(source: Arc<dyn Source>, _options: &Options) -> Self {
        let mut this = Self {
            source: None,
            valid: false,
            tags: Lazy::new(),
            fields: Lazy::new(),
            metadata: Lazy::new(),
        };

        let len = source.size().min(16) as usize;
        match source.read_vec(0, len) {
            Ok(header) if is_supported(&DetectInfo::new(&header, None, source.size())) => {
                this.source = Some(source);
                this.valid = true;
            }
            Ok(_) => debug!("not a SAP file"),
            Err(e) => debug!("could not read SAP header: {}", e),
        }
        this
    }

    fn check_valid(&self) -> Result<(), Error> {
        if self.valid {
            Ok(())
        } else {
            Err(Error::Malformed("not a valid SAP file".to_string()))
        }
    }

    /// The parsed header tags.
    pub fn tags(&mut self) -> Result<&Tags, Error> {
        if self.tags.is_pending() {
            self.check_valid()?;
            let source = rom::live_source(&self.source)?;
            let len = source.size().min(MAX_HEADER_SIZE) as usize;
            let result = source.read_vec(0, len).map(|header| parse_tags(&header));
            self.tags.resolve(result);
        }
        self.tags.get()
    }

    fn load_fields(&mut self) -> Result<Fields, Error> {
        let tags = self.tags()?;
        let mut fields = Fields::new();
        if !tags.tags_read {
            return Ok(fields);
        }
        fields.reserve(12);
        fields.set_tab_name(0, "SAP");

        if !tags.author.is_empty() {
            fields.add_string("Author", tags.author.as_str());
        }
        if !tags.name.is_empty() {
            fields.add_string("Song Title", tags.name.as_str());
        }
        if !tags.date.is_empty() {
            fields.add_string("Date", tags.date.as_str());
        }
        fields.add_string_numeric("# of Songs", tags.songs.into(), Base::Dec, 0, StrFlags::empty());
        if tags.songs > 1 {
            fields.add_string_numeric(
                "Default Song #",
                tags.def_song.into(),
                Base::Dec,
                0,
                StrFlags::empty(),
            );
        }

        let flags = u32::from(tags.ntsc) | u32::from(tags.stereo) << 1;
        fields.add_bitfield("Flags", &FLAG_NAMES, 0, flags);

        if tags.kind.is_ascii_alphabetic() {
            fields.add_string("Type", (tags.kind as char).to_string());
        } else {
            fields.add_string_flags("Type", format!("0x{:02X}", tags.kind), StrFlags::MONOSPACE);
        }

        let scanlines = match tags.fastplay {
            0 if tags.ntsc => SCANLINES_NTSC,
            0 => SCANLINES_PAL,
            n => n,
        };
        fields.add_string_numeric("Fastplay", scanlines.into(), Base::Dec, 0, StrFlags::empty());

        match tags.kind.to_ascii_uppercase() {
            b'B' | b'D' | b'S' => fields.add_string_numeric(
                "Init Address",
                tags.init_addr.into(),
                Base::Hex,
                4,
                StrFlags::MONOSPACE,
            ),
            b'C' => fields.add_string_numeric(
                "Music Address",
                tags.music_addr.into(),
                Base::Hex,
                4,
                StrFlags::MONOSPACE,
            ),
            _ => {}
        }
        fields.add_string_numeric(
            "Player Address",
            tags.player_addr.into(),
            Base::Hex,
            4,
            StrFlags::MONOSPACE,
        );
        if tags.covox_addr != 0 {
            fields.add_string_numeric(
                "COVOX Address",
                tags.covox_addr.into(),
                Base::Hex,
                4,
                StrFlags::MONOSPACE,
            );
        }

        if !tags.times.is_empty() {
            let rows = tags
                .times
                .iter()
                .enumerate()
                .map(|(i, time)| {
                    vec![
                        (i + 1).to_string(),
                        time.display(),
                        if time.looping { "Yes" } else { "No" }.to_string(),
                    ]
                })
                .collect();
            fields.add_list_data("Song List", &["#", "Duration", "Loop"], rows);
        }
        Ok(fields)
    }

    fn load_metadata(&mut self) -> Result<MetaData, Error> {
        let tags = self.tags()?;
        let mut metadata = MetaData::new();
        metadata.add_string(Property::Artist, tags.author.as_str());
        metadata.add_string(Property::Title, tags.name.as_str());
        if let Some(year) = release_year(&tags.date) {
            metadata.add_integer(Property::ReleaseYear, year);
        }
        Ok(metadata)
    }
}

impl RomData for Sap {
    fn is_valid(&self) -> bool {
        self.valid
    }

    fn close(&mut self) {
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
        FileType::AudioFile
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[".sap"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["audio/x-sap"]
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;
    use crate::image::ImageType;
    use crate::metadata::MetaValue;
    use crate::source::MemSource;

    const FIXTURE: &[u8] = b"SAP\r\nAUTHOR \"Test Author\"\nNAME \"Song\"\nSONGS 3\nDEFSONG 1\n\xFF";

    fn open(data: &[u8]) -> Sap {
        Sap::new(Arc::new(MemSource::new(data.to_vec())), &Options::default())
    }

    #[test]
    fn fixture_tags() {
        let tags = parse_tags(FIXTURE);
        assert!(tags.tags_read);
        assert_eq!(tags.author, "Test Author");
        assert_eq!(tags.name, "Song");
        assert_eq!(tags.songs, 3);
        assert_eq!(tags.def_song, 1);
        assert!(tags.times.is_empty());
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let tags = parse_tags(
            b"SAP\nauthor \"Someone\"\r\nType c\r\nMusic 2000\r\nStereo\r\nFASTPLAY 156\r\n\xFF\xFF",
        );
        assert_eq!(tags.author, "Someone");
        assert_eq!(tags.kind, b'c');
        assert_eq!(tags.music_addr, 0x2000);
        assert!(tags.stereo);
        assert!(!tags.ntsc);
        assert_eq!(tags.fastplay, 156);
    }

    #[test]
    fn malformed_values_are_ignored() {
        let tags = parse_tags(b"SAP\r\nNAME unquoted\r\nSONGS lots\r\nINIT zz\r\nDATE \"open\r\n\xFF");
        assert!(tags.tags_read);
        assert_eq!(tags.name, "");
        assert_eq!(tags.songs, 1);
        assert_eq!(tags.init_addr, 0);
        assert_eq!(tags.date, "");
    }

    #[test]
    fn not_a_sap_header() {
        assert!(!parse_tags(b"SAQ\r\nNAME \"x\"\xFF").tags_read);
        assert!(!parse_tags(b"SAP\n").tags_read);
    }

    #[test]
    fn song_times() {
        assert_eq!(
            SongTime::parse("01:30.5 LOOP"),
            Some(SongTime { millis: 90_500, looping: true })
        );
        assert_eq!(
            SongTime::parse("00:07.123"),
            Some(SongTime { millis: 7_123, looping: false })
        );
        assert_eq!(SongTime::parse("2:05"), Some(SongTime { millis: 125_000, looping: false }));
        assert_eq!(SongTime::parse("00:75"), None);
        assert_eq!(SongTime::parse("1:02.1234"), None);
        assert_eq!(SongTime::parse("soon"), None);
        assert_eq!(SongTime { millis: 90_500, looping: true }.display(), "01:30.500");
    }

    #[test]
    fn years() {
        assert_eq!(release_year("12/03/1987"), Some(1987));
        assert_eq!(release_year("1987-1988"), Some(1988));
        assert_eq!(release_year("03/87"), None);
        assert_eq!(release_year(""), None);
    }

    #[test]
    fn reader_fields_and_metadata() {
        let mut sap = open(
            b"SAP\r\nAUTHOR \"Composer\"\r\nNAME \"Tune\"\r\nDATE \"1986\"\r\nSONGS 2\r\nTYPE B\r\nINIT 1F00\r\nPLAYER 2000\r\nTIME 02:00 LOOP\r\nTIME 00:45.250\r\n\xFF\xFF\x00\x20",
        );
        assert!(sap.is_valid());
        assert_eq!(sap.file_type(), FileType::AudioFile);
        assert_eq!(sap.system_name(SystemName::Long), Some("Atari 8-bit SAP Audio"));

        let fields = sap.fields().unwrap();
        assert_eq!(fields.get_str("Author"), Some("Composer"));
        assert_eq!(fields.get_str("Song Title"), Some("Tune"));
        assert_eq!(fields.get_str("# of Songs"), Some("2"));
        assert_eq!(fields.get_str("Default Song #"), Some("0"));
        assert_eq!(fields.get_str("Type"), Some("B"));
        assert_eq!(fields.get_str("Fastplay"), Some("312"));
        assert_eq!(fields.get_str("Init Address"), Some("0x1F00"));
        assert_eq!(fields.get_str("Player Address"), Some("0x2000"));
        assert!(fields.get("Music Address").is_none());
        match &fields.get("Song List").unwrap().value {
            FieldValue::ListData { rows, .. } => {
                assert_eq!(rows[0], vec!["1", "02:00.000", "Yes"]);
                assert_eq!(rows[1], vec!["2", "00:45.250", "No"]);
            }
            other => panic!("unexpected field {:?}", other),
        }

        let metadata = sap.metadata().unwrap();
        assert_eq!(metadata.get(Property::Artist), Some(&MetaValue::String("Composer".to_string())));
        assert_eq!(metadata.get(Property::ReleaseYear), Some(&MetaValue::Integer(1986)));

        assert!(sap.image(ImageType::IntIcon).unwrap_err().is_not_found());
    }

    #[test]
    fn invalid_file() {
        let mut sap = open(b"NOT A SAP FILE");
        assert!(!sap.is_valid());
        assert!(sap.fields().is_err());
        assert_eq!(sap.system_name(SystemName::Short), None);
    }
}
