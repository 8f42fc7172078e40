//! Utility functions for image processing
//!
//! - Packed RGB to NV21 conversion (scalar and row-parallel)

pub mod yuv;
