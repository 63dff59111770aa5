//! Format sniffing.
//!
//! Detection works purely on the bytes handed in through [`DetectInfo`]; it
//! never touches the source itself, so a truncated probe simply fails to
//! match.
//!
//! [`DetectInfo`]: struct.DetectInfo.html

use crate::{n3ds, sap, xbe, xdbf, xex};

/// Everything a detector may look at.
#[derive(Debug, Copy, Clone)]
pub struct DetectInfo<'a> {
    /// Leading bytes of the file.
    pub header: &'a [u8],
    /// File name extension including the leading dot (`".cia"`), if known.
    pub ext: Option<&'a str>,
    /// Total file size.
    pub size: u64,
}

impl<'a> DetectInfo<'a> {
    pub fn new(header: &'a [u8], ext: Option<&'a str>, size: u64) -> Self {
        Self { header, ext, size }
    }

    /// Whether the extension matches `wanted`, ignoring ASCII case.
    pub(crate) fn has_ext(&self, wanted: &str) -> bool {
        self.ext.map_or(false, |ext| ext.eq_ignore_ascii_case(wanted))
    }
}

/// The kind of Nintendo 3DS file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum N3dsKind {
    /// Icon and title metadata only.
    Smdh,
    /// Homebrew executable.
    Threedsx,
    /// CTR installable archive.
    Cia,
    /// Cartridge image (NCSD).
    Cci,
    /// NAND dump (NCSD).
    Emmc,
}

/// A detected file format.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Format {
    Xbe,
    Xex,
    Xdbf,
    N3ds(N3dsKind),
    Sap,
}

/// Runs every detector in turn and returns the first match.
pub fn detect(info: &DetectInfo) -> Option<Format> {
    if xbe::is_supported(info) {
        return Some(Format::Xbe);
    }
    if xex::is_supported(info) {
        return Some(Format::Xex);
    }
    if xdbf::is_supported(info) {
        return Some(Format::Xdbf);
    }
    if let Some(kind) = n3ds::is_supported(info) {
        return Some(Format::N3ds(kind));
    }
    if sap::is_supported(info) {
        return Some(Format::Sap);
    }
    trace!("no detector matched {} header bytes", info.header.len());
    None
}
