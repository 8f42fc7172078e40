/// Packed color images and NV21 buffers
pub mod image;
/// Decode outcomes and caller-facing records
pub mod outcome;
/// Buffer coordinates
pub mod point;
/// Decode requests (crop, rotation)
pub mod request;

pub use image::{ChromaBuffer, PixelImage, pack_argb};
pub use outcome::{DecodeError, DecodeOutcome, DecodedCode, DecodedSymbol, FailureReason, Symbology};
pub use point::Point;
pub use request::{CropRect, DecodeRequest, Rotation};
