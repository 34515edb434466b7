//! Image sources for the quad's texture.

use ember_engine::resource::{DecodedImage, ImageDecoder};
use ember_engine::{GpuError, Result};

/// Where the quad's pixels come from.
pub enum TextureSource {
    /// PNG or JPEG bytes, decoded while the session loads.
    Encoded(Vec<u8>),
    Decoded(DecodedImage),
}

/// [`ImageDecoder`] backed by the `image` crate.
pub struct RgbaDecoder;

impl ImageDecoder for RgbaDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage> {
        decode_rgba(bytes)
    }
}

/// Decodes PNG or JPEG bytes into sRGB RGBA8 pixels.
pub fn decode_rgba(bytes: &[u8]) -> Result<DecodedImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| GpuError::ImageDecode(e.to_string()))?
        .into_rgba8();
    let (width, height) = image.dimensions();
    Ok(DecodedImage::rgba8(width, height, image.into_raw()))
}

/// A `size` x `size` checkerboard of `cell`-pixel squares.
pub fn checkerboard(size: u32, cell: u32) -> DecodedImage {
    let cell = cell.max(1);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let lit = ((x / cell) + (y / cell)) % 2 == 0;
            pixels.extend_from_slice(if lit { &[0xf0, 0xa0, 0x30, 0xff] } else { &[0x20, 0x20, 0x28, 0xff] });
        }
    }
    DecodedImage::rgba8(size, size, pixels)
}
