//! Nintendo 3DS tiled RGB565 images.
//!
//! The image is split into 8x8 tiles stored left to right, top to bottom.
//! Pixels inside a tile are stored in Morton (Z-order), with the x coordinate
//! in the low bit of every bit pair.

use super::{rgb565, DecodedImage};
use crate::Error;

use byteorder::{ByteOrder, LE};

const TILE: u32 = 8;

/// Returns the (x, y) position of pixel `i` of a tile.
fn morton_xy(i: u32) -> (u32, u32) {
    let x = (i & 1) | ((i >> 1) & 2) | ((i >> 2) & 4);
    let y = ((i >> 1) & 1) | ((i >> 2) & 2) | ((i >> 3) & 4);
    (x, y)
}

/// Decodes a tiled little-endian RGB565 image.
///
/// `width` and `height` must be multiples of 8 and `data` must hold exactly
/// `width * height * 2` bytes.
pub fn decode_rgb565(width: u32, height: u32, data: &[u8]) -> Result<DecodedImage, Error> {
    if width == 0 || height == 0 || width % TILE != 0 || height % TILE != 0 {
        return Err(Error::Malformed(format!(
            "tiled image size {}x{} is not a multiple of the tile size",
            width, height
        )));
    }
    let expected = width as usize * height as usize * 2;
    if data.len() != expected {
        return Err(Error::Malformed(format!(
            "tiled {}x{} RGB565 image needs {} bytes, got {}",
            width,
            height,
            expected,
            data.len()
        )));
    }

    let mut pixels = vec![0; (width * height) as usize];
    let tiles_per_row = width / TILE;
    for (tile_idx, tile) in data.chunks_exact((TILE * TILE * 2) as usize).enumerate() {
        let tile_idx = tile_idx as u32;
        let (tx, ty) = ((tile_idx % tiles_per_row) * TILE, (tile_idx / tiles_per_row) * TILE);
        for (i, px) in tile.chunks_exact(2).enumerate() {
            let (x, y) = morton_xy(i as u32);
            let dest = ((ty + y) * width + tx + x) as usize;
            if let Some(slot) = pixels.get_mut(dest) {
                *slot = rgb565(LE::read_u16(px));
            }
        }
    }

    DecodedImage::new(width, height, pixels)
}
