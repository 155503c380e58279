use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

/// How pixels are packed in a [`Bitmap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelEncoding {
    /// 16-bit 5-6-5 colour.
    Rgb565,
    /// 32-bit colour with alpha.
    Argb8888,
}

impl PixelEncoding {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelEncoding::Rgb565 => 2,
            PixelEncoding::Argb8888 => 4,
        }
    }

    /// Code carried in the last IMAGEHEAD payload byte.
    pub const fn wire_code(self) -> u8 {
        match self {
            PixelEncoding::Rgb565 => 0x02,
            PixelEncoding::Argb8888 => 0x04,
        }
    }

    pub fn from_wire(code: u8) -> Option<Self> {
        match code {
            0x02 => Some(PixelEncoding::Rgb565),
            0x04 => Some(PixelEncoding::Argb8888),
            _ => None,
        }
    }
}

/// Reasons a bitmap cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitmapError {
    #[error("bitmap dimensions must be non-zero (got {width}x{height})")]
    ZeroDimension { width: u16, height: u16 },

    #[error("pixel buffer is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// A raw pixel buffer.
///
/// Pixels are stored row-major, each one big-endian in
/// [`PixelEncoding::bytes_per_pixel`] bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u16,
    height: u16,
    encoding: PixelEncoding,
    data: Bytes,
}

impl Bitmap {
    /// Wrap an existing pixel buffer, checking its size.
    pub fn new(
        width: u16,
        height: u16,
        encoding: PixelEncoding,
        data: impl Into<Bytes>,
    ) -> Result<Self, BitmapError> {
        if width == 0 || height == 0 {
            return Err(BitmapError::ZeroDimension { width, height });
        }
        let data = data.into();
        let expected = Self::size_for(width, height, encoding);
        if data.len() != expected {
            return Err(BitmapError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            encoding,
            data,
        })
    }

    /// Pack `pixels` (row-major). RGB565 keeps the low 16 bits of each value.
    pub fn from_pixels(
        width: u16,
        height: u16,
        encoding: PixelEncoding,
        pixels: &[u32],
    ) -> Result<Self, BitmapError> {
        let mut data = BytesMut::with_capacity(pixels.len() * encoding.bytes_per_pixel());
        for &pixel in pixels {
            match encoding {
                PixelEncoding::Rgb565 => data.put_u16(pixel as u16),
                PixelEncoding::Argb8888 => data.put_u32(pixel),
            }
        }
        Self::new(width, height, encoding, data.freeze())
    }

    /// Byte length of a `width`×`height` buffer in `encoding`.
    pub fn size_for(width: u16, height: u16, encoding: PixelEncoding) -> usize {
        usize::from(width) * usize::from(height) * encoding.bytes_per_pixel()
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn encoding(&self) -> PixelEncoding {
        self.encoding
    }

    /// The raw pixel bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn pixel_count(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// The packed value at column `x`, row `y`.
    pub fn pixel(&self, x: u16, y: u16) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = usize::from(y) * usize::from(self.width) + usize::from(x);
        let bpp = self.encoding.bytes_per_pixel();
        self.data
            .get(index * bpp..(index + 1) * bpp)
            .map(pack_pixel)
    }

    /// All pixels in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = u32> + '_ {
        self.data
            .chunks_exact(self.encoding.bytes_per_pixel())
            .map(pack_pixel)
    }
}

fn pack_pixel(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &byte| (acc << 8) | u32::from(byte))
}
