//! Helpers shared by the command-line tools

use crate::models::{ChromaBuffer, FailureReason};
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Image files under `root` (recursive), sorted, truncated to `limit`
pub fn dataset_iter<P: AsRef<Path>>(
    root: P,
    limit: Option<usize>,
) -> impl Iterator<Item = PathBuf> {
    let mut images = collect_images(root.as_ref());
    images.sort();
    if let Some(limit) = limit {
        images.truncate(limit);
    }
    images.into_iter()
}

fn collect_images(root: &Path) -> Vec<PathBuf> {
    let mut stack = vec![root.to_path_buf()];
    let mut images = Vec::new();

    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let is_image = path
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
            if is_image {
                images.push(path);
            }
        }
    }

    images
}

/// Summary statistics for an NV21 buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneStats {
    /// Minimum luma value
    pub luma_min: u8,
    /// Maximum luma value
    pub luma_max: u8,
    /// Average luma value
    pub luma_avg: u8,
    /// Average of all chroma bytes
    pub chroma_avg: u8,
}

/// Luma range/average and chroma average of a buffer
pub fn plane_stats(buffer: &ChromaBuffer) -> PlaneStats {
    let luma = buffer.luma();
    let chroma = buffer.chroma();
    let (mut min, mut max, mut sum) = (u8::MAX, u8::MIN, 0u64);
    for &v in luma {
        min = min.min(v);
        max = max.max(v);
        sum += v as u64;
    }
    let chroma_sum: u64 = chroma.iter().map(|&v| v as u64).sum();
    PlaneStats {
        luma_min: min,
        luma_max: max,
        luma_avg: (sum / luma.len().max(1) as u64) as u8,
        chroma_avg: (chroma_sum / chroma.len().max(1) as u64) as u8,
    }
}

/// Tally of outcomes across a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchTally {
    /// Requests that decoded a symbol
    pub decoded: usize,
    /// Requests where no symbol was found
    pub not_found: usize,
    /// Requests that failed to load, convert or run
    pub errors: usize,
    /// Requests cancelled or rejected by a full queue
    pub skipped: usize,
}

impl BatchTally {
    /// Count one terminal outcome (`None` for success)
    pub fn record(&mut self, failure: Option<FailureReason>) {
        match failure {
            None => self.decoded += 1,
            Some(FailureReason::NotFound) => self.not_found += 1,
            Some(FailureReason::Error) => self.errors += 1,
            Some(FailureReason::Cancelled) => self.skipped += 1,
        }
    }

    /// All requests counted
    pub fn total(&self) -> usize {
        self.decoded + self.not_found + self.errors + self.skipped
    }

    /// Share of requests that decoded, in percent
    pub fn reading_rate(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        100.0 * self.decoded as f64 / self.total() as f64
    }
}
