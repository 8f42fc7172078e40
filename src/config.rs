//! Runtime configuration
//!
//! Everything is an explicit value passed at construction; `from_env` only
//! seeds that value from `QR_*` environment variables.

use crate::decoder::DecodeHints;

fn parse_env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_env_bool_u8(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u8>().ok())
        .map(|v| v != 0)
        .unwrap_or(default)
}

/// Settings for loading, conversion and the worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Worker threads in a [`DecodePool`](crate::pool::DecodePool)
    pub worker_threads: usize,
    /// Maximum requests in flight (queued or running) in a pool
    pub queue_capacity: usize,
    /// Reject images with more pixels than this before converting
    pub max_pixels: u64,
    /// Downscale so the longer side is at most this many pixels
    pub max_dimension: Option<u32>,
    /// Convert row pairs in parallel with rayon
    pub parallel_convert: bool,
    /// Engine hints
    pub hints: DecodeHints,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            queue_capacity: 16,
            max_pixels: 40_000_000,
            max_dimension: None,
            parallel_convert: false,
            hints: DecodeHints::default(),
        }
    }
}

impl ScanConfig {
    /// Defaults overridden by `QR_SCAN_WORKERS`, `QR_SCAN_QUEUE`,
    /// `QR_MAX_PIXELS`, `QR_MAX_DIM` (0 disables), `QR_PARALLEL_CONVERT`,
    /// `QR_REPORT_POINTS` and `QR_ALSO_INVERTED`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_dim = parse_env_u64("QR_MAX_DIM", 0);
        Self {
            worker_threads: parse_env_usize("QR_SCAN_WORKERS", defaults.worker_threads)
                .clamp(1, 64),
            queue_capacity: parse_env_usize("QR_SCAN_QUEUE", defaults.queue_capacity).max(1),
            max_pixels: parse_env_u64("QR_MAX_PIXELS", defaults.max_pixels),
            max_dimension: (max_dim > 0).then(|| max_dim.min(u32::MAX as u64) as u32),
            parallel_convert: parse_env_bool_u8("QR_PARALLEL_CONVERT", defaults.parallel_convert),
            hints: DecodeHints {
                report_possible_points: parse_env_bool_u8(
                    "QR_REPORT_POINTS",
                    defaults.hints.report_possible_points,
                ),
                also_inverted: parse_env_bool_u8("QR_ALSO_INVERTED", defaults.hints.also_inverted),
            },
        }
    }
}
