//! Image loading and read-permission collaborators

use crate::error::{ScanError, ScanResult};
use crate::models::{PixelImage, pack_argb};
use image::GenericImageView;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, trace};

/// Rasterizes an image file into packed pixels
pub trait ImageLoader: Send + Sync {
    /// Load `path`, failing with [`ScanError::ImageLoad`]
    fn load(&self, path: &Path) -> ScanResult<PixelImage>;
}

/// Host permission verdict, trusted as-is
pub trait ReadPermission: Send + Sync {
    /// True when the caller may read `path`
    fn is_granted(&self, path: &Path) -> bool;
}

impl ReadPermission for bool {
    fn is_granted(&self, _path: &Path) -> bool {
        *self
    }
}

/// Loader backed by the `image` crate
#[derive(Debug, Clone)]
pub struct FileImageLoader {
    max_pixels: u64,
    max_dimension: Option<u32>,
}

impl Default for FileImageLoader {
    fn default() -> Self {
        Self::new(40_000_000, None)
    }
}

impl FileImageLoader {
    /// Create a loader that rejects images above `max_pixels` and downscales
    /// to `max_dimension` on the longer side when set
    pub fn new(max_pixels: u64, max_dimension: Option<u32>) -> Self {
        Self {
            max_pixels,
            max_dimension,
        }
    }

    fn load_error(path: &Path, reason: impl ToString) -> ScanError {
        ScanError::ImageLoad {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Reader whose format comes from the file content, not the extension
    fn sniffed_reader(path: &Path) -> ScanResult<image::io::Reader<BufReader<File>>> {
        image::io::Reader::open(path)
            .map_err(|e| Self::load_error(path, e))?
            .with_guessed_format()
            .map_err(|e| Self::load_error(path, e))
    }

    fn check_pixel_limit(&self, path: &Path, width: u32, height: u32) -> ScanResult<()> {
        let pixels = width as u64 * height as u64;
        if pixels > self.max_pixels {
            return Err(Self::load_error(
                path,
                format!("{} pixels exceeds limit of {}", pixels, self.max_pixels),
            ));
        }
        Ok(())
    }
}

impl ImageLoader for FileImageLoader {
    fn load(&self, path: &Path) -> ScanResult<PixelImage> {
        // Header-only read so oversized images fail before a full decode
        let (header_w, header_h) = Self::sniffed_reader(path)?
            .into_dimensions()
            .map_err(|e| Self::load_error(path, e))?;
        self.check_pixel_limit(path, header_w, header_h)?;

        let img = Self::sniffed_reader(path)?
            .decode()
            .map_err(|e| Self::load_error(path, e))?;
        let (orig_w, orig_h) = img.dimensions();
        let img = match self.max_dimension {
            Some(max_dim) if orig_w.max(orig_h) > max_dim => {
                trace!(orig_w, orig_h, max_dim, "Downscaling image before conversion");
                img.resize(max_dim, max_dim, image::imageops::FilterType::Triangle)
            }
            _ => img,
        };

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let pixels = rgba
            .pixels()
            .map(|p| pack_argb(p[3], p[0], p[1], p[2]))
            .collect();
        debug!(path = %path.display(), width, height, "Loaded image");
        PixelImage::new(width as usize, height as usize, pixels)
    }
}
