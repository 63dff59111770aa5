//! Decoded images and the decoders that produce them.
//!
//! Readers only locate image bytes. Decoding is done either by an external
//! [`ImageDecoder`] (PNG) or by one of the console-specific pixel decoders in
//! this module ([`tiled`] for 3DS icons, [`xpr`] for Xbox textures).
//!
//! [`ImageDecoder`]: trait.ImageDecoder.html
//! [`tiled`]: tiled/index.html
//! [`xpr`]: xpr/index.html

mod codec;
pub mod tiled;
pub mod xpr;

pub use self::codec::PngDecoder;

use crate::Error;

use std::fmt;

/// PNG file signature.
pub const PNG_MAGIC: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// A decoded image in 32-bit ARGB (`0xAARRGGBB`).
///
/// Dimensions are always checked against the pixel count on construction.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl DecodedImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u32>) -> Result<Self, Error> {
        if width == 0 || height == 0 {
            return Err(Error::Malformed(format!("empty image ({}x{})", width, height)));
        }
        let expected = u64::from(width) * u64::from(height);
        if pixels.len() as u64 != expected {
            return Err(Error::Malformed(format!(
                "{}x{} image needs {} pixels, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixels in row-major order.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Returns the pixel at (`x`, `y`), if inside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }

    /// Converts the pixels to RGBA bytes, as expected by PNG encoders.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for argb in &self.pixels {
            let [a, r, g, b] = argb.to_be_bytes();
            out.extend_from_slice(&[r, g, b, a]);
        }
        out
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Packs 8-bit channels into an ARGB32 pixel.
pub fn argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    u32::from_be_bytes([a, r, g, b])
}

/// Expands a channel of `bits` bits to 8 bits by replicating its high bits.
pub(crate) fn expand_bits(value: u32, bits: u32) -> u8 {
    let value = value & ((1 << bits) - 1);
    let mut out = value << (8 - bits);
    let mut filled = bits;
    while filled < 8 {
        out |= out >> filled;
        filled *= 2;
    }
    out as u8
}

/// Decodes an RGB565 pixel.
pub(crate) fn rgb565(v: u16) -> u32 {
    let v = u32::from(v);
    argb(
        0xFF,
        expand_bits(v >> 11, 5),
        expand_bits(v >> 5, 6),
        expand_bits(v, 5),
    )
}

/// A decoder for a general-purpose image file format.
pub trait ImageDecoder: Send + Sync + fmt::Debug {
    /// Decodes a complete image file held in `data`.
    fn decode(&self, data: &[u8]) -> Result<DecodedImage, Error>;
}

bitflags! {
    /// Set of image kinds a reader can provide.
    pub struct ImageTypes: u32 {
        /// Internal icon (XDBF title image, SMDH icon).
        const INT_ICON   = 0x00000001;
        const INT_BANNER = 0x00000002;
        const INT_MEDIA  = 0x00000004;
        /// Internal image (XBE title image, boot logo).
        const INT_IMAGE  = 0x00000008;
    }
}

/// A single kind of internal image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ImageType {
    IntIcon,
    IntBanner,
    IntMedia,
    IntImage,
}

impl ImageType {
    pub const ALL: [ImageType; 4] = [
        ImageType::IntIcon,
        ImageType::IntBanner,
        ImageType::IntMedia,
        ImageType::IntImage,
    ];

    pub fn flag(self) -> ImageTypes {
        match self {
            ImageType::IntIcon => ImageTypes::INT_ICON,
            ImageType::IntBanner => ImageTypes::INT_BANNER,
            ImageType::IntMedia => ImageTypes::INT_MEDIA,
            ImageType::IntImage => ImageTypes::INT_IMAGE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ImageType::IntIcon => "icon",
            ImageType::IntBanner => "banner",
            ImageType::IntMedia => "media",
            ImageType::IntImage => "image",
        }
    }

    /// Parses an image type name as returned by `name()`.
    pub fn from_name(name: &str) -> Option<Self> {
        ImageType::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }
}

/// Dimensions of an image a reader can provide.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_are_validated() {
        assert!(DecodedImage::new(2, 2, vec![0; 4]).is_ok());
        assert!(DecodedImage::new(2, 2, vec![0; 3]).is_err());
        assert!(DecodedImage::new(0, 2, vec![]).is_err());
    }

    #[test]
    fn bit_expansion() {
        assert_eq!(expand_bits(0x1F, 5), 0xFF);
        assert_eq!(expand_bits(0x3F, 6), 0xFF);
        assert_eq!(expand_bits(0, 5), 0);
        assert_eq!(expand_bits(0xF, 4), 0xFF);
        assert_eq!(expand_bits(0x8, 4), 0x88);
        assert_eq!(expand_bits(1, 1), 0xFF);
        assert_eq!(rgb565(0xF800), 0xFFFF0000);
        assert_eq!(rgb565(0x07E0), 0xFF00FF00);
    }

    #[test]
    fn rgba_conversion() {
        let img = DecodedImage::new(1, 1, vec![0x80112233]).unwrap();
        assert_eq!(img.to_rgba8(), vec![0x11, 0x22, 0x33, 0x80]);
        assert_eq!(img.pixel(0, 0), Some(0x80112233));
        assert_eq!(img.pixel(1, 0), None);
    }

    #[test]
    fn image_type_names() {
        assert_eq!(ImageType::from_name("ICON"), Some(ImageType::IntIcon));
        assert_eq!(ImageType::from_name("nope"), None);
    }
}
