//! Decoder for the Microsoft boot logo embedded in XBE headers.

use crate::image::{argb, DecodedImage};
use crate::Error;

use byteorder::ReadBytesExt;
use std::fmt;

pub const WIDTH: u32 = 100;
pub const HEIGHT: u32 = 17;

/// A 100x17 grayscale logo stored in the XBE header.
pub struct LogoBitmap {
    /// Pixel value are from 0 - 15 (4 bit).
    pixels: [[u8; WIDTH as usize]; HEIGHT as usize],
}

impl LogoBitmap {
    /// Decode the bitmap from compressed data in an XBE image.
    ///
    /// The encoding is a run-length encoding (RLE) with two different kinds of
    /// commands or "chunks", one sized 1 Byte, the other sized 2 Bytes. If the
    /// least significant bit of the next Byte is set, it's a 1-Byte chunk.
    /// Otherwise, the second-to-least significant bit must be set and it's a
    /// 2-Byte chunk. Graphically:
    ///
    /// ```notrust
    /// 1-Byte / 8-bit chunk:
    /// +----------+----------+---+
    /// |   Data   |  Length  | 1 |
    /// | (4 bits) | (3 bits) |   |
    /// +----------+----------+---+
    /// MSb                     LSb
    ///
    /// 2-Byte / 16-bit chunk:
    /// +----------+-----------+---+---+
    /// |   Data   |  Length   | 1 | 0 |
    /// | (4 bits) | (10 bits) |   |   |
    /// +----------+-----------+---+---+
    /// MSb                          LSb
    /// Second Byte      |    First Byte (Xbox is a Little Endian system)
    /// ```
    ///
    /// Both chunk types set the next `length` pixels, scanning the image
    /// line by line from left to right, to the 4-bit `data` value. 0 is black
    /// and 15 is white.
    pub fn decode(mut bytes: &[u8]) -> Result<Self, Error> {
        let mut pixels = [[0; WIDTH as usize]; HEIGHT as usize];

        trace!("logo: {} bytes of RLE data", bytes.len());

        {
            let mut pixel_iter = pixels.iter_mut().flat_map(|row| row.iter_mut());
            while let Some(chunk) = RleChunk::read(&mut bytes)? {
                trace!("{:?}", chunk);
                let (length, data) = (chunk.length(), chunk.data());

                for _ in 0..length {
                    match pixel_iter.next() {
                        Some(pix) => *pix = data,
                        None => {
                            return Err(Error::Malformed(
                                "RLE encoding too long for bitmap buffer".to_string(),
                            ))
                        }
                    }
                }
            }

            if pixel_iter.next().is_some() {
                debug!("RLE data didn't cover whole image");
            }
        }

        Ok(LogoBitmap { pixels })
    }

    /// Returns the 4-bit value of a pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        self.pixels
            .get(y as usize)
            .and_then(|row| row.get(x as usize))
            .copied()
    }

    /// Converts the logo to an opaque grayscale image.
    pub fn to_image(&self) -> Result<DecodedImage, Error> {
        let pixels = self
            .pixels
            .iter()
            .flat_map(|row| row.iter())
            .map(|&b| {
                let l = to_8bit(b);
                argb(0xFF, l, l, l)
            })
            .collect();
        DecodedImage::new(WIDTH, HEIGHT, pixels)
    }
}

impl fmt::Debug for LogoBitmap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut list = f.debug_list();

        for row in &self.pixels {
            list.entry(&display_row(row));
        }

        list.finish()
    }
}

/// Copies the nibble into both halves of the byte, so 15 becomes 255.
fn to_8bit(b: u8) -> u8 {
    let b = b & 0x0F;
    b << 4 | b
}

fn byte_to_ascii_pixel(b: u8) -> char {
    const CHARS: [char; 16] = [
        ' ', '.', '-', ':', '~', '=', '+', '*', 'a', '!', '$', '&', '%', '@', 'M', 'W',
    ];
    CHARS[usize::from(b & 0x0F)]
}

/// Convert an image row to an ASCII string representing each pixel with a char.
fn display_row(row: &[u8; WIDTH as usize]) -> String {
    row.iter().map(|b| byte_to_ascii_pixel(*b)).collect()
}

/// A run-length encoding chunk specifying a color value for a number of pixels.
enum RleChunk {
    Byte(u8),
    Word(u16),
}

impl RleChunk {
    /// Reads an RLE chunk from a byte stream.
    fn read(bytes: &mut &[u8]) -> Result<Option<Self>, Error> {
        let first = match bytes.read_u8() {
            Ok(b) => b,
            Err(_) => return Ok(None),
        };

        if first & 0x01 != 0 {
            // LSb set -> 8-bit chunk
            Ok(Some(RleChunk::Byte(first)))
        } else if first & 0x02 != 0 {
            // 2nd most LSb set -> 16-bit chunk
            let second = match bytes.read_u8() {
                Ok(b) => b,
                Err(_) => return Err(Error::Malformed("unexpected EOF in logo RLE".to_string())),
            };

            // second byte is MSB of the two
            let word = (u16::from(second) << 8) | u16::from(first);
            Ok(Some(RleChunk::Word(word)))
        } else {
            Err(Error::Malformed("invalid marker for RLE chunk".to_string()))
        }
    }

    /// The number of pixels to use the `data` value for (up to 10 bits).
    fn length(&self) -> u16 {
        match *self {
            RleChunk::Byte(b) => (u16::from(b) & 0b00001110) >> 1,
            RleChunk::Word(w) => (w & 0b00001111_11111100) >> 2,
        }
    }

    /// The 4-bit pixel value.
    fn data(&self) -> u8 {
        match *self {
            RleChunk::Byte(b) => (b & 0b11110000) >> 4,
            RleChunk::Word(w) => ((w & 0b11110000_00000000) >> 12) as u8,
        }
    }
}

impl fmt::Debug for RleChunk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RleChunk::Byte(b) => write!(
                f,
                "byte (raw {:08b}) {:04b} {:03b} 1",
                b,
                self.data(),
                self.length()
            ),
            RleChunk::Word(w) => write!(
                f,
                "word (raw {:016b}) {:04b} {:010b} 10",
                w,
                self.data(),
                self.length()
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encodes `runs` of `(value, length)` using 2-byte chunks only.
    pub(crate) fn encode(runs: &[(u8, u16)]) -> Vec<u8> {
        let mut out = Vec::new();
        for &(value, length) in runs {
            let word = u16::from(value) << 12 | (length & 0x3FF) << 2 | 0b10;
            out.extend(&word.to_le_bytes());
        }
        out
    }

    #[test]
    fn mixed_chunks() {
        // 1-byte chunk: value 0xF, length 3
        let mut data = vec![0xF0 | 3 << 1 | 1];
        data.extend(encode(&[(0x8, 97), (0x1, 1000), (0x1, 600)]));
        let logo = LogoBitmap::decode(&data).unwrap();
        assert_eq!(logo.pixel(0, 0), Some(0xF));
        assert_eq!(logo.pixel(2, 0), Some(0xF));
        assert_eq!(logo.pixel(3, 0), Some(0x8));
        assert_eq!(logo.pixel(99, 0), Some(0x8));
        assert_eq!(logo.pixel(0, 1), Some(0x1));

        let image = logo.to_image().unwrap();
        assert_eq!(image.pixel(0, 0), Some(0xFFFF_FFFF));
        assert_eq!(image.pixel(3, 0), Some(0xFF88_8888));
    }

    #[test]
    fn overlong_data_is_rejected() {
        let data = encode(&[(0x1, 1000), (0x2, 1000)]);
        assert!(LogoBitmap::decode(&data).is_err());
    }

    #[test]
    fn invalid_marker() {
        assert!(LogoBitmap::decode(&[0x00]).is_err());
        assert!(LogoBitmap::decode(&[0x02]).is_err());
    }
}
