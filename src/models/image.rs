use crate::error::{ScanError, ScanResult};

/// Packed 32-bit color image (`0xAARRGGBB`, row-major)
///
/// Produced by an [`ImageLoader`](crate::loader::ImageLoader) and moved into
/// the color converter, which consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelImage {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
}

impl PixelImage {
    /// Wrap a packed pixel vector, checking `pixels.len() == width * height`
    pub fn new(width: usize, height: usize, pixels: Vec<u32>) -> ScanResult<Self> {
        let expected = width.checked_mul(height).ok_or_else(|| {
            ScanError::InvalidRequest(format!("image size {}x{} overflows", width, height))
        })?;
        if pixels.len() != expected {
            return Err(ScanError::InvalidRequest(format!(
                "pixel count {} does not match {}x{}",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Image filled with one packed color
    pub fn filled(width: usize, height: usize, argb: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![argb; width * height],
        }
    }

    /// Build from interleaved RGBA bytes (4 bytes per pixel)
    pub fn from_rgba(width: usize, height: usize, rgba: &[u8]) -> ScanResult<Self> {
        if rgba.len() != width * height * 4 {
            return Err(ScanError::InvalidRequest(format!(
                "rgba buffer of {} bytes does not match {}x{}",
                rgba.len(),
                width,
                height
            )));
        }
        let pixels = rgba
            .chunks_exact(4)
            .map(|px| pack_argb(px[3], px[0], px[1], px[2]))
            .collect();
        Self::new(width, height, pixels)
    }

    /// Image width in pixels
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height in pixels
    pub fn height(&self) -> usize {
        self.height
    }

    /// Packed pixels, row-major
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Packed value at (x, y)
    pub fn get(&self, x: usize, y: usize) -> u32 {
        self.pixels[y * self.width + x]
    }
}

/// Pack channels into `0xAARRGGBB`
#[inline]
pub fn pack_argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Semi-planar luma/chroma buffer (NV21 layout)
///
/// `width * height` luma bytes followed by one interleaved V,U pair per
/// 2x2 luma block. Both dimensions are even.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromaBuffer {
    width: usize,
    height: usize,
    bytes: Vec<u8>,
}

impl ChromaBuffer {
    /// Wrap raw NV21 bytes, validating the layout
    pub fn from_raw(width: usize, height: usize, bytes: Vec<u8>) -> ScanResult<Self> {
        if width % 2 != 0 || height % 2 != 0 || width < 2 || height < 2 {
            return Err(ScanError::InvalidGeometry { width, height });
        }
        let expected = Self::byte_len(width, height);
        if bytes.len() != expected {
            return Err(ScanError::InvalidRequest(format!(
                "nv21 buffer of {} bytes, expected {} for {}x{}",
                bytes.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            bytes,
        })
    }

    /// Total byte length for an even `width x height` buffer
    pub fn byte_len(width: usize, height: usize) -> usize {
        width * height + 2 * (width / 2) * (height / 2)
    }

    /// Buffer width (luma samples per row)
    pub fn width(&self) -> usize {
        self.width
    }

    /// Buffer height (luma rows)
    pub fn height(&self) -> usize {
        self.height
    }

    /// Whole buffer
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Luma plane
    pub fn luma(&self) -> &[u8] {
        &self.bytes[..self.width * self.height]
    }

    /// Interleaved V,U plane
    pub fn chroma(&self) -> &[u8] {
        &self.bytes[self.width * self.height..]
    }

    /// Luma sample at (x, y)
    #[inline]
    pub fn luma_at(&self, x: usize, y: usize) -> u8 {
        self.bytes[y * self.width + x]
    }

    /// (V, U) pair of the 2x2 block containing (x, y)
    pub fn vu_at(&self, x: usize, y: usize) -> (u8, u8) {
        let idx = self.width * self.height + (y / 2) * self.width + (x / 2) * 2;
        (self.bytes[idx], self.bytes[idx + 1])
    }
}
