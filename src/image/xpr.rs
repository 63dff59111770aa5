//! Xbox `XPR0` packed resources holding a single texture.
//!
//! The texture format, dimensions and swizzling are described by the
//! Direct3D `Format` register of the embedded texture header. Swizzled
//! textures store pixels in Morton order; DXT textures store 4x4 blocks
//! left to right, top to bottom.

use super::{argb, expand_bits, rgb565, DecodedImage};
use crate::raw::{ByteOrder as Order, Bytes, RawStruct};
use crate::utils::SliceExt;
use crate::Error;

use byteorder::{ByteOrder, LE};

/// "XPR0"
pub const MAGIC: &[u8; 4] = b"XPR0";

/// Largest accepted texture edge.
const MAX_DIMENSION: u32 = 4096;

#[derive(Debug, Deserialize, Serialize)]
pub struct Header {
    pub magic: Bytes<4>,
    pub file_size: u32,
    /// Offset of the pixel data from the start of the resource.
    pub data_offset: u32,
    pub common: u32,
    pub data: u32,
    pub lock: u32,
    /// Direct3D texture format register.
    pub format: u32,
    /// Dimensions of linear textures.
    pub size: u32,
}

impl RawStruct for Header {
    const SIZE: usize = 0x20;
    const ORDER: Order = Order::Little;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum PixelFormat {
    L8,
    A1R5G5B5,
    A4R4G4B4,
    R5G6B5,
    A8R8G8B8,
    X8R8G8B8,
    Dxt1,
    Dxt3,
    Dxt5,
}

impl PixelFormat {
    /// Maps a format code to the pixel format and whether it's swizzled.
    fn from_code(code: u32) -> Option<(Self, bool)> {
        use self::PixelFormat::*;
        Some(match code {
            0x00 => (L8, true),
            0x02 => (A1R5G5B5, true),
            0x04 => (A4R4G4B4, true),
            0x05 => (R5G6B5, true),
            0x06 => (A8R8G8B8, true),
            0x07 => (X8R8G8B8, true),
            0x0C => (Dxt1, false),
            0x0E => (Dxt3, false),
            0x0F => (Dxt5, false),
            0x11 => (R5G6B5, false),
            0x12 => (A8R8G8B8, false),
            0x1E => (X8R8G8B8, false),
            _ => return None,
        })
    }

    fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::L8 => 1,
            PixelFormat::A1R5G5B5 | PixelFormat::A4R4G4B4 | PixelFormat::R5G6B5 => 2,
            PixelFormat::A8R8G8B8 | PixelFormat::X8R8G8B8 => 4,
            // block formats are handled separately
            PixelFormat::Dxt1 | PixelFormat::Dxt3 | PixelFormat::Dxt5 => 0,
        }
    }

    fn decode_pixel(self, px: &[u8]) -> u32 {
        match self {
            PixelFormat::L8 => {
                let l = px.first().copied().unwrap_or(0);
                argb(0xFF, l, l, l)
            }
            PixelFormat::A1R5G5B5 => {
                let v = u32::from(LE::read_u16(px));
                let a = if v & 0x8000 != 0 { 0xFF } else { 0 };
                argb(a, expand_bits(v >> 10, 5), expand_bits(v >> 5, 5), expand_bits(v, 5))
            }
            PixelFormat::A4R4G4B4 => {
                let v = u32::from(LE::read_u16(px));
                argb(
                    expand_bits(v >> 12, 4),
                    expand_bits(v >> 8, 4),
                    expand_bits(v >> 4, 4),
                    expand_bits(v, 4),
                )
            }
            PixelFormat::R5G6B5 => rgb565(LE::read_u16(px)),
            PixelFormat::A8R8G8B8 => LE::read_u32(px),
            PixelFormat::X8R8G8B8 => LE::read_u32(px) | 0xFF00_0000,
            PixelFormat::Dxt1 | PixelFormat::Dxt3 | PixelFormat::Dxt5 => 0,
        }
    }
}

/// Spreads the low bits of `value` over the set bits of `mask`.
fn deposit(mut value: u32, mask: u32) -> u32 {
    let mut out = 0;
    let mut bit = 1u32;
    while bit != 0 && bit <= mask {
        if mask & bit != 0 {
            if value & 1 != 0 {
                out |= bit;
            }
            value >>= 1;
        }
        bit = bit.wrapping_shl(1);
    }
    out
}

/// Computes the Morton masks for x and y of a power-of-two texture.
///
/// Bits are interleaved starting with x; once one dimension runs out, the
/// remaining bits all belong to the other.
fn swizzle_masks(width: u32, height: u32) -> (u32, u32) {
    let (mut mask_x, mut mask_y) = (0, 0);
    let (mut w, mut h) = (width, height);
    let mut bit = 1;
    while w > 1 || h > 1 {
        if w > 1 {
            mask_x |= bit;
            bit <<= 1;
            w >>= 1;
        }
        if h > 1 {
            mask_y |= bit;
            bit <<= 1;
            h >>= 1;
        }
    }
    (mask_x, mask_y)
}

/// Decodes an XPR0 resource.
pub fn decode(data: &[u8]) -> Result<DecodedImage, Error> {
    let header = Header::parse(data)?;
    if &header.magic.0 != MAGIC {
        return Err(Error::Malformed(format!(
            "invalid XPR magic {:?}",
            header.magic
        )));
    }

    let code = (header.format >> 8) & 0xFF;
    let (format, swizzled) = PixelFormat::from_code(code)
        .ok_or_else(|| Error::Malformed(format!("unsupported XPR pixel format {:#04X}", code)))?;

    let (width, height, pitch) = if !swizzled && format.bytes_per_pixel() != 0 && header.size != 0 {
        let width = (header.size & 0xFFF) + 1;
        let height = ((header.size >> 12) & 0xFFF) + 1;
        let pitch = (((header.size >> 24) & 0xFF) + 1) * 64;
        (width, height, pitch)
    } else {
        let width = 1 << ((header.format >> 20) & 0xF);
        let height = 1 << ((header.format >> 24) & 0xF);
        (width, height, width * format.bytes_per_pixel() as u32)
    };
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(Error::Malformed(format!(
            "XPR texture too large ({}x{})",
            width, height
        )));
    }
    debug!("XPR0 texture {:?} {}x{} (swizzled: {})", format, width, height, swizzled);

    let pixels = data.try_get(header.data_offset..)?;
    match format {
        PixelFormat::Dxt1 | PixelFormat::Dxt3 | PixelFormat::Dxt5 => {
            decode_dxt(format, width, height, pixels)
        }
        _ if swizzled => decode_swizzled(format, width, height, pixels),
        _ => decode_linear(format, width, height, pitch, pixels),
    }
}

fn decode_swizzled(
    format: PixelFormat,
    width: u32,
    height: u32,
    data: &[u8],
) -> Result<DecodedImage, Error> {
    let bpp = format.bytes_per_pixel();
    let needed = width as usize * height as usize * bpp;
    let data = data.get(..needed).ok_or_else(|| {
        Error::Malformed(format!("XPR pixel data needs {} bytes, got {}", needed, data.len()))
    })?;

    let (mask_x, mask_y) = swizzle_masks(width, height);
    let mut out = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let idx = (deposit(x, mask_x) | deposit(y, mask_y)) as usize * bpp;
            let px = data.get(idx..idx + bpp).ok_or_else(|| {
                Error::Malformed("swizzled pixel index outside texture".to_string())
            })?;
            out.push(format.decode_pixel(px));
        }
    }
    DecodedImage::new(width, height, out)
}

fn decode_linear(
    format: PixelFormat,
    width: u32,
    height: u32,
    pitch: u32,
    data: &[u8],
) -> Result<DecodedImage, Error> {
    let bpp = format.bytes_per_pixel();
    let row_bytes = width as usize * bpp;
    let pitch = (pitch as usize).max(row_bytes);

    let mut out = Vec::with_capacity((width * height) as usize);
    for y in 0..height as usize {
        let start = y * pitch;
        let row = data.get(start..start + row_bytes).ok_or_else(|| {
            Error::Malformed(format!("XPR row {} is outside the pixel data", y))
        })?;
        out.extend(row.chunks_exact(bpp).map(|px| format.decode_pixel(px)));
    }
    DecodedImage::new(width, height, out)
}

/// Builds the 4-entry color palette of a DXT color block.
fn dxt_palette(c0: u16, c1: u16, allow_transparent: bool) -> [u32; 4] {
    let unpack = |c: u16| {
        let c = u32::from(c);
        [
            u32::from(expand_bits(c >> 11, 5)),
            u32::from(expand_bits(c >> 5, 6)),
            u32::from(expand_bits(c, 5)),
        ]
    };
    let (a, b) = (unpack(c0), unpack(c1));
    let mix = |wa: u32, wb: u32, div: u32| {
        argb(
            0xFF,
            ((a[0] * wa + b[0] * wb) / div) as u8,
            ((a[1] * wa + b[1] * wb) / div) as u8,
            ((a[2] * wa + b[2] * wb) / div) as u8,
        )
    };

    if c0 > c1 || !allow_transparent {
        [rgb565(c0), rgb565(c1), mix(2, 1, 3), mix(1, 2, 3)]
    } else {
        [rgb565(c0), rgb565(c1), mix(1, 1, 2), 0]
    }
}

/// Decodes the 16 pixels of one DXT block.
fn decode_dxt_block(format: PixelFormat, block: &[u8]) -> [u32; 16] {
    let (alpha, color) = match format {
        PixelFormat::Dxt1 => (None, block),
        _ => (Some(&block[..8]), &block[8..]),
    };

    let palette = dxt_palette(
        LE::read_u16(&color[0..2]),
        LE::read_u16(&color[2..4]),
        format == PixelFormat::Dxt1,
    );
    let indices = LE::read_u32(&color[4..8]);

    let mut out = [0; 16];
    for (i, px) in out.iter_mut().enumerate() {
        *px = palette[((indices >> (i * 2)) & 3) as usize];
    }

    match (format, alpha) {
        (PixelFormat::Dxt3, Some(alpha)) => {
            let bits = LE::read_u64(alpha);
            for (i, px) in out.iter_mut().enumerate() {
                let a = expand_bits(((bits >> (i * 4)) & 0xF) as u32, 4);
                *px = (*px & 0x00FF_FFFF) | (u32::from(a) << 24);
            }
        }
        (PixelFormat::Dxt5, Some(alpha)) => {
            let (a0, a1) = (u32::from(alpha[0]), u32::from(alpha[1]));
            let mut table = [a0, a1, 0, 0, 0, 0, 0, 0];
            if a0 > a1 {
                for i in 1..7 {
                    table[i + 1] = ((7 - i as u32) * a0 + i as u32 * a1) / 7;
                }
            } else {
                for i in 1..5 {
                    table[i + 1] = ((5 - i as u32) * a0 + i as u32 * a1) / 5;
                }
                table[6] = 0;
                table[7] = 255;
            }
            let bits = LE::read_u48(&alpha[2..8]);
            for (i, px) in out.iter_mut().enumerate() {
                let a = table[((bits >> (i * 3)) & 7) as usize];
                *px = (*px & 0x00FF_FFFF) | (a << 24);
            }
        }
        _ => {}
    }
    out
}

fn decode_dxt(
    format: PixelFormat,
    width: u32,
    height: u32,
    data: &[u8],
) -> Result<DecodedImage, Error> {
    let block_size = if format == PixelFormat::Dxt1 { 8 } else { 16 };
    let blocks_x = ((width + 3) / 4) as usize;
    let blocks_y = ((height + 3) / 4) as usize;
    let needed = blocks_x * blocks_y * block_size;
    let data = data.get(..needed).ok_or_else(|| {
        Error::Malformed(format!("DXT data needs {} bytes, got {}", needed, data.len()))
    })?;

    let mut out = vec![0; (width * height) as usize];
    for (b, block) in data.chunks_exact(block_size).enumerate() {
        let (bx, by) = ((b % blocks_x) as u32 * 4, (b / blocks_x) as u32 * 4);
        let texels = decode_dxt_block(format, block);
        for (i, texel) in texels.iter().enumerate() {
            let (x, y) = (bx + i as u32 % 4, by + i as u32 / 4);
            if x < width && y < height {
                if let Some(slot) = out.get_mut((y * width + x) as usize) {
                    *slot = *texel;
                }
            }
        }
    }
    DecodedImage::new(width, height, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw;

    fn xpr(format_code: u32, log_w: u32, log_h: u32, pixels: &[u8]) -> Vec<u8> {
        let header = Header {
            magic: Bytes(*MAGIC),
            file_size: 0x20 + pixels.len() as u32,
            data_offset: 0x20,
            common: 0,
            data: 0,
            lock: 0,
            format: (format_code << 8) | (log_w << 20) | (log_h << 24),
            size: 0,
        };
        let mut data = raw::encode(&header, Order::Little).unwrap();
        data.extend_from_slice(pixels);
        data
    }

    #[test]
    fn masks() {
        assert_eq!(swizzle_masks(4, 4), (0b0101, 0b1010));
        assert_eq!(swizzle_masks(8, 2), (0b1101, 0b0010));
        assert_eq!(deposit(0b11, 0b1010), 0b1010);
        assert_eq!(deposit(0b10, 0b0101), 0b0100);
    }

    #[test]
    fn swizzled_argb() {
        // 2x2, Morton order: (0,0) (1,0) (0,1) (1,1)
        let mut pixels = Vec::new();
        for v in &[0xFF000001u32, 0xFF000002, 0xFF000003, 0xFF000004] {
            pixels.extend_from_slice(&v.to_le_bytes());
        }
        let img = decode(&xpr(0x06, 1, 1, &pixels)).unwrap();
        assert_eq!(img.pixel(1, 0), Some(0xFF000002));
        assert_eq!(img.pixel(0, 1), Some(0xFF000003));
    }

    #[test]
    fn dxt1_solid_block() {
        // c0 = c1 = pure red, all indices 0
        let block = [0x00, 0xF8, 0x00, 0xF8, 0, 0, 0, 0];
        let img = decode(&xpr(0x0C, 2, 2, &block)).unwrap();
        assert_eq!((img.width(), img.height()), (4, 4));
        assert!(img.pixels().iter().all(|p| *p == 0xFFFF0000));
    }

    #[test]
    fn dxt5_alpha_endpoints() {
        // alpha 0x80 for all texels (index 0), color white
        let mut block = vec![0x80, 0x00, 0, 0, 0, 0, 0, 0];
        block.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);
        let img = decode(&xpr(0x0F, 2, 2, &block)).unwrap();
        assert_eq!(img.pixel(3, 3), Some(0x80FFFFFF));
    }

    #[test]
    fn rejects_short_data_and_bad_magic() {
        assert!(decode(&xpr(0x06, 2, 2, &[0; 15])).is_err());
        let mut data = xpr(0x00, 0, 0, &[0]);
        data[0] = b'Y';
        assert!(decode(&data).is_err());
        assert!(decode(&xpr(0x3F, 0, 0, &[0])).is_err());
    }
}
