//! The reader contract shared by all formats, and the format-agnostic
//! `open()` entry point.

use crate::detect::{self, DetectInfo, Format};
use crate::fields::Fields;
use crate::image::{DecodedImage, ImageSize, ImageType, ImageTypes};
use crate::metadata::MetaData;
use crate::n3ds::Nintendo3ds;
use crate::options::Options;
use crate::sap::Sap;
use crate::source::{Source, SourceExt};
use crate::xbe::Xbe;
use crate::xdbf::Xdbf;
use crate::xex::Xex;
use crate::Error;

use std::fmt;
use std::sync::Arc;

/// Number of leading bytes handed to the detectors.
///
/// Large enough for a 3DS CIA header and an SMDH icon block.
pub const PROBE_SIZE: usize = 66560;

/// Which flavour of system name to return.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SystemName {
    /// "Microsoft Xbox 360"
    Long,
    /// "Xbox 360"
    Short,
    /// "X360"
    Abbreviation,
}

impl SystemName {
    pub(crate) fn pick(self, names: &[&'static str; 3]) -> &'static str {
        match self {
            SystemName::Long => names[0],
            SystemName::Short => names[1],
            SystemName::Abbreviation => names[2],
        }
    }
}

/// Broad classification of a file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FileType {
    Executable,
    ResourceFile,
    IconFile,
    Homebrew,
    ApplicationPackage,
    RomImage,
    EmmcDump,
    AudioFile,
}

/// A reader for one container format.
///
/// Readers are created infallibly and report their state through
/// `is_valid`. Derived data (fields, metadata, images) is loaded on first use
/// and cached for the reader's lifetime, including failures.
pub trait RomData: fmt::Debug + Send {
    /// Whether the file was recognized and its primary header read.
    fn is_valid(&self) -> bool;

    /// Drops the source and all nested readers.
    ///
    /// Data that was already loaded stays available; anything else fails
    /// with `Error::Closed` afterwards. Calling this more than once is fine.
    fn close(&mut self);

    /// Name of the system the file belongs to, or `None` if invalid.
    fn system_name(&self, kind: SystemName) -> Option<&'static str>;

    fn file_type(&self) -> FileType;

    /// File name extensions this reader handles, with leading dots.
    fn file_extensions(&self) -> &'static [&'static str];

    fn mime_types(&self) -> &'static [&'static str];

    /// The field model, loaded on first call.
    fn fields(&mut self) -> Result<&Fields, Error>;

    /// Property metadata, loaded on first call.
    fn metadata(&mut self) -> Result<&MetaData, Error>;

    /// Image types this particular file can provide.
    fn supported_image_types(&mut self) -> ImageTypes {
        ImageTypes::empty()
    }

    /// Available sizes for an image type. Empty if the type is unsupported.
    fn image_sizes(&mut self, _kind: ImageType) -> Vec<ImageSize> {
        Vec::new()
    }

    /// Loads an internal image.
    ///
    /// Fails with `Error::NotFound` for image types this file does not have.
    fn image(&mut self, kind: ImageType) -> Result<&DecodedImage, Error> {
        Err(not_found_image(kind))
    }
}

pub(crate) fn not_found_image(kind: ImageType) -> Error {
    Error::NotFound(format!("no {} image", kind.name()))
}

/// Returns the source of a reader, or `Error::Closed` if it was dropped.
pub(crate) fn live_source(source: &Option<Arc<dyn Source>>) -> Result<&Arc<dyn Source>, Error> {
    match source {
        Some(source) if source.is_open() => Ok(source),
        _ => Err(Error::Closed),
    }
}

/// Reads the detection probe: the first `PROBE_SIZE` bytes, or fewer for
/// small files.
pub fn read_probe(source: &dyn Source) -> Result<Vec<u8>, Error> {
    let len = source.size().min(PROBE_SIZE as u64) as usize;
    source.read_vec(0, len)
}

/// Detects the format of `source` and constructs the matching reader.
///
/// `ext` is the file name extension including the dot; it is only needed to
/// recognize 3DS CIA archives, which lack a magic number.
pub fn open(
    source: Arc<dyn Source>,
    ext: Option<&str>,
    options: &Options,
) -> Result<Box<dyn RomData>, Error> {
    let probe = read_probe(&*source)?;
    let info = DetectInfo::new(&probe, ext, source.size());
    let format = detect::detect(&info).ok_or(Error::Unsupported)?;
    debug!("detected {:?}", format);

    let reader: Box<dyn RomData> = match format {
        Format::Xbe => Box::new(Xbe::new(source, options)),
        Format::Xex => Box::new(Xex::new(source, options)),
        Format::Xdbf => Box::new(Xdbf::new(source, options)),
        Format::N3ds(kind) => Box::new(Nintendo3ds::with_kind(source, kind, options)),
        Format::Sap => Box::new(Sap::new(source, options)),
    };
    if reader.is_valid() {
        Ok(reader)
    } else {
        Err(Error::Malformed(format!("{:?} header could not be read", format)))
    }
}
