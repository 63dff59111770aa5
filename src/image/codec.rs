use super::{argb, DecodedImage, ImageDecoder, PNG_MAGIC};
use crate::Error;

use png::{BitDepth, ColorType, Decoder, Transformations};

/// PNG decoder backed by the `png` crate.
///
/// Palette, low bit depth and 16-bit images are normalized to 8 bits per
/// channel before conversion to ARGB.
#[derive(Debug, Default, Copy, Clone)]
pub struct PngDecoder;

impl ImageDecoder for PngDecoder {
    fn decode(&self, data: &[u8]) -> Result<DecodedImage, Error> {
        if !data.starts_with(PNG_MAGIC) {
            return Err(Error::Malformed("missing PNG signature".to_string()));
        }

        let mut decoder = Decoder::new(data);
        decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);
        let mut reader = decoder
            .read_info()
            .map_err(|e| Error::Malformed(format!("PNG: {}", e)))?;
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader
            .next_frame(&mut buf)
            .map_err(|e| Error::Malformed(format!("PNG: {}", e)))?;

        if info.bit_depth != BitDepth::Eight {
            return Err(Error::Malformed(format!(
                "PNG: unexpected output bit depth {:?}",
                info.bit_depth
            )));
        }
        let channels = match info.color_type {
            ColorType::Grayscale => 1,
            ColorType::GrayscaleAlpha => 2,
            ColorType::Rgb => 3,
            ColorType::Rgba => 4,
            ColorType::Indexed => {
                return Err(Error::Malformed("PNG: palette was not expanded".to_string()))
            }
        };

        let width = info.width as usize;
        let mut pixels = Vec::with_capacity(width * info.height as usize);
        for row in buf.chunks(info.line_size).take(info.height as usize) {
            for px in row.chunks(channels).take(width) {
                let pixel = match *px {
                    [l] => argb(0xFF, l, l, l),
                    [l, a] => argb(a, l, l, l),
                    [r, g, b] => argb(0xFF, r, g, b),
                    [r, g, b, a] => argb(a, r, g, b),
                    _ => return Err(Error::Malformed("PNG: truncated row".to_string())),
                };
                pixels.push(pixel);
            }
        }

        DecodedImage::new(info.width, info.height, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(width: u32, height: u32, color: ColorType, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(color);
            encoder.set_depth(BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(data).unwrap();
        }
        out
    }

    #[test]
    fn decodes_rgba() {
        let data = encode(2, 1, ColorType::Rgba, &[255, 0, 0, 255, 0, 0, 255, 128]);
        let img = PngDecoder.decode(&data).unwrap();
        assert_eq!((img.width(), img.height()), (2, 1));
        assert_eq!(img.pixels(), &[0xFFFF0000, 0x800000FF]);
    }

    #[test]
    fn decodes_grayscale() {
        let data = encode(1, 2, ColorType::Grayscale, &[0x10, 0xEE]);
        let img = PngDecoder.decode(&data).unwrap();
        assert_eq!(img.pixels(), &[0xFF101010, 0xFFEEEEEE]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(PngDecoder.decode(b"not a png").is_err());
        let mut data = encode(1, 1, ColorType::Rgb, &[1, 2, 3]);
        data.truncate(30);
        assert!(PngDecoder.decode(&data).is_err());
    }
}
