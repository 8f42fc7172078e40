//! Decode engine seam
//!
//! The pipeline only talks to barcode decoders through [`DecodeEngine`].
//! An engine is configured once with [`DecodeHints`] and is not assumed to be
//! reentrant: each request owns its own instance.

/// `rqrr`-backed QR code engine
pub mod qr_engine;

pub use qr_engine::QrEngine;

use crate::models::{DecodeOutcome, DecodeRequest, Point};

/// Fixed options handed to an engine at construction time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeHints {
    /// Collect candidate symbol points, even when nothing decodes
    pub report_possible_points: bool,
    /// Retry on the inverted luma plane (light symbol on dark background)
    pub also_inverted: bool,
}

impl Default for DecodeHints {
    fn default() -> Self {
        Self {
            report_possible_points: true,
            also_inverted: false,
        }
    }
}

/// Barcode decoder consumed by the pipeline
pub trait DecodeEngine: Send {
    /// Decode one request. Returns `Failure(NotFound)` when no symbol is found.
    fn decode(&mut self, request: DecodeRequest) -> DecodeOutcome;

    /// Candidate points gathered by the last [`DecodeEngine::decode`] call,
    /// in buffer coordinates
    fn possible_points(&self) -> &[Point];
}

/// Builds one fresh engine per request
pub type EngineFactory = std::sync::Arc<dyn Fn(DecodeHints) -> Box<dyn DecodeEngine> + Send + Sync>;

/// Factory producing [`QrEngine`] instances
pub fn qr_engine_factory() -> EngineFactory {
    std::sync::Arc::new(|hints| Box::new(QrEngine::new(hints)) as Box<dyn DecodeEngine>)
}
