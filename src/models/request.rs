use super::{ChromaBuffer, Point};
use crate::error::{ScanError, ScanResult};

/// Axis-aligned crop region in buffer pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    /// Left edge
    pub left: usize,
    /// Top edge
    pub top: usize,
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
}

impl CropRect {
    /// Create a crop region
    pub fn new(left: usize, top: usize, width: usize, height: usize) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Region covering the whole buffer
    pub fn full(buffer: &ChromaBuffer) -> Self {
        Self::new(0, 0, buffer.width(), buffer.height())
    }

    /// True when the region is non-empty and lies inside `width x height`
    pub fn fits(&self, width: usize, height: usize) -> bool {
        self.width > 0
            && self.height > 0
            && self.left.checked_add(self.width).is_some_and(|r| r <= width)
            && self.top.checked_add(self.height).is_some_and(|b| b <= height)
    }
}

/// Clockwise rotation applied to the cropped view before decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    /// No rotation
    #[default]
    Deg0,
    /// 90 degrees clockwise
    Deg90,
    /// 180 degrees
    Deg180,
    /// 270 degrees clockwise
    Deg270,
}

impl Rotation {
    /// Parse a rotation given in degrees (0, 90, 180, 270)
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    /// Rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Dimensions of a `width x height` region after rotation
    pub fn rotated_dims(&self, width: usize, height: usize) -> (usize, usize) {
        match self {
            Rotation::Deg0 | Rotation::Deg180 => (width, height),
            Rotation::Deg90 | Rotation::Deg270 => (height, width),
        }
    }

    /// Map view coordinates back into an unrotated `width x height` region
    #[inline]
    pub fn source_coords(&self, x: usize, y: usize, width: usize, height: usize) -> (usize, usize) {
        match self {
            Rotation::Deg0 => (x, y),
            Rotation::Deg90 => (y, height - 1 - x),
            Rotation::Deg180 => (width - 1 - x, height - 1 - y),
            Rotation::Deg270 => (width - 1 - y, x),
        }
    }

    /// Same mapping as [`Rotation::source_coords`] for sub-pixel points
    pub fn source_point(&self, p: Point, width: usize, height: usize) -> Point {
        let w = width as f32 - 1.0;
        let h = height as f32 - 1.0;
        match self {
            Rotation::Deg0 => p,
            Rotation::Deg90 => Point::new(p.y, h - p.x),
            Rotation::Deg180 => Point::new(w - p.x, h - p.y),
            Rotation::Deg270 => Point::new(w - p.y, p.x),
        }
    }
}

/// One decode call: buffer plus crop and rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeRequest {
    buffer: ChromaBuffer,
    crop: CropRect,
    rotation: Rotation,
}

impl DecodeRequest {
    /// Request over the whole buffer with no rotation
    pub fn new(buffer: ChromaBuffer) -> Self {
        let crop = CropRect::full(&buffer);
        Self {
            buffer,
            crop,
            rotation: Rotation::Deg0,
        }
    }

    /// Restrict decoding to `crop`, which must lie inside the buffer
    pub fn with_crop(mut self, crop: CropRect) -> ScanResult<Self> {
        if !crop.fits(self.buffer.width(), self.buffer.height()) {
            return Err(ScanError::InvalidRequest(format!(
                "crop {:?} outside {}x{} buffer",
                crop,
                self.buffer.width(),
                self.buffer.height()
            )));
        }
        self.crop = crop;
        Ok(self)
    }

    /// Rotate the cropped view before decoding
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Source buffer
    pub fn buffer(&self) -> &ChromaBuffer {
        &self.buffer
    }

    /// Crop region
    pub fn crop(&self) -> CropRect {
        self.crop
    }

    /// Rotation
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Dimensions the engine sees after crop and rotation
    pub fn view_dims(&self) -> (usize, usize) {
        self.rotation.rotated_dims(self.crop.width, self.crop.height)
    }

    /// Luma sample at view coordinates (x, y)
    #[inline]
    pub fn view_luma(&self, x: usize, y: usize) -> u8 {
        let (sx, sy) = self
            .rotation
            .source_coords(x, y, self.crop.width, self.crop.height);
        self.buffer.luma_at(self.crop.left + sx, self.crop.top + sy)
    }

    /// Map a point reported in view coordinates back to buffer coordinates
    pub fn view_to_buffer(&self, p: Point) -> Point {
        self.rotation
            .source_point(p, self.crop.width, self.crop.height)
            .translate(self.crop.left as f32, self.crop.top as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_buffer() -> ChromaBuffer {
        // 4x2 luma ramp 0..8, chroma zeros
        let mut bytes: Vec<u8> = (0..8).collect();
        bytes.extend_from_slice(&[0; 4]);
        ChromaBuffer::from_raw(4, 2, bytes).unwrap()
    }

    #[test]
    fn test_default_request_covers_buffer() {
        let req = DecodeRequest::new(ramp_buffer());
        assert_eq!(req.crop(), CropRect::new(0, 0, 4, 2));
        assert_eq!(req.rotation(), Rotation::Deg0);
        assert_eq!(req.view_dims(), (4, 2));
        assert_eq!(req.view_luma(3, 1), 7);
    }

    #[test]
    fn test_crop_must_fit() {
        let req = DecodeRequest::new(ramp_buffer());
        assert!(req.clone().with_crop(CropRect::new(2, 0, 2, 2)).is_ok());
        assert!(req.clone().with_crop(CropRect::new(3, 0, 2, 2)).is_err());
        assert!(req.with_crop(CropRect::new(0, 0, 0, 2)).is_err());
    }

    #[test]
    fn test_rotation_view_sampling() {
        // Source rows: [0 1 2 3] / [4 5 6 7]
        let req = DecodeRequest::new(ramp_buffer()).with_rotation(Rotation::Deg90);
        assert_eq!(req.view_dims(), (2, 4));
        // Clockwise: view top row is the source left column read bottom-up
        assert_eq!(req.view_luma(0, 0), 4);
        assert_eq!(req.view_luma(1, 0), 0);
        assert_eq!(req.view_luma(1, 3), 3);

        let req = DecodeRequest::new(ramp_buffer()).with_rotation(Rotation::Deg180);
        assert_eq!(req.view_luma(0, 0), 7);

        let req = DecodeRequest::new(ramp_buffer()).with_rotation(Rotation::Deg270);
        assert_eq!(req.view_luma(0, 0), 3);
        assert_eq!(req.view_luma(1, 3), 4);
    }

    #[test]
    fn test_view_to_buffer_matches_sampling() {
        let crop = CropRect::new(2, 0, 2, 2);
        for rotation in [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270] {
            let req = DecodeRequest::new(ramp_buffer())
                .with_crop(crop)
                .unwrap()
                .with_rotation(rotation);
            let p = req.view_to_buffer(Point::new(1.0, 0.0));
            let expected = req.buffer().luma_at(p.x as usize, p.y as usize);
            assert_eq!(req.view_luma(1, 0), expected, "rotation {:?}", rotation);
        }
    }

    #[test]
    fn test_rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::Deg270.degrees(), 270);
    }
}
