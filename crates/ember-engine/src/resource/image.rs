use crate::error::{GpuError, Result};

/// Decoded pixel data, rows tightly packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            pixels,
        }
    }

    /// Row pitch implied by the pixel buffer.
    pub(crate) fn bytes_per_row(&self) -> Result<u32> {
        if self.width == 0 || self.height == 0 {
            return Err(GpuError::ImageDecode(format!(
                "empty image {}x{}",
                self.width, self.height
            )));
        }
        let rows = self.height as usize;
        if self.pixels.len() % rows != 0 {
            return Err(GpuError::ImageDecode(format!(
                "{} bytes do not divide into {rows} rows",
                self.pixels.len()
            )));
        }
        u32::try_from(self.pixels.len() / rows)
            .map_err(|_| GpuError::ImageDecode("row pitch exceeds u32".into()))
    }
}

/// Turns encoded image bytes into pixels.
///
/// The engine links no codec; applications plug one in.
pub trait ImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage>;
}

impl<F> ImageDecoder for F
where
    F: Fn(&[u8]) -> Result<DecodedImage>,
{
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage> {
        self(bytes)
    }
}
