//! qr_image_parse - decode barcodes from still images
//!
//! Loads an image file, converts it to a semi-planar NV21 luma/chroma
//! buffer and runs a decode engine on a worker thread. The caller gets a
//! [`DecodeHandle`] and receives exactly one terminal [`DecodeOutcome`],
//! followed by optional possible-point diagnostics.
//!
//! ```no_run
//! use qr_image_parse::{DecodeCoordinator, ScanConfig};
//!
//! let handle = DecodeCoordinator::new(&ScanConfig::default()).submit("/tmp/code.png");
//! handle.dispatch(|result| match result {
//!     Ok(code) => println!("{} ({})", code.code, code.kind),
//!     Err(err) => eprintln!("{}", err),
//! });
//! ```

#![warn(missing_docs)]

/// Runtime configuration
pub mod config;
/// Decode engine trait and the QR engine
pub mod decoder;
/// Worker-to-caller result delivery
pub mod dispatch;
/// Error taxonomy
pub mod error;
/// Image loading and permission collaborators
pub mod loader;
/// Core data structures (images, requests, outcomes)
pub mod models;
/// Single-request decode state machine
pub mod pipeline;
/// Bounded worker pool
pub mod pool;
/// Helpers for the command-line tools
pub mod tools;
/// Pixel conversion utilities
pub mod utils;

pub use config::ScanConfig;
pub use decoder::{DecodeEngine, DecodeHints, QrEngine};
pub use dispatch::{DecodeHandle, ResultDispatcher};
pub use error::{ScanError, ScanResult};
pub use loader::{FileImageLoader, ImageLoader, ReadPermission};
pub use models::{
    ChromaBuffer, CropRect, DecodeError, DecodeOutcome, DecodeRequest, DecodedCode, DecodedSymbol,
    FailureReason, PixelImage, Point, Rotation, Symbology,
};
pub use pipeline::{CancelToken, DecodeCoordinator, DecodeState, ProgressFn};
pub use pool::DecodePool;
pub use utils::yuv::{convert, convert_parallel};

use std::path::PathBuf;

/// Decode `path` on a dedicated worker thread using [`ScanConfig::from_env`]
///
/// `permission_granted` is the host's read-permission verdict; when false
/// the request still completes, with `Failure(Error)`.
pub fn parse_image(path: impl Into<PathBuf>, permission_granted: bool) -> DecodeHandle {
    DecodeCoordinator::new(&ScanConfig::from_env())
        .with_permission(std::sync::Arc::new(permission_granted))
        .submit(path)
}
