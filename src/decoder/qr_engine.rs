//! QR code engine backed by the `rqrr` crate
//!
//! Only the luma plane is used: the cropped, rotated view is fed to
//! `rqrr` as a greyscale image, and grid corners are mapped back to buffer
//! coordinates for diagnostics.

use super::{DecodeEngine, DecodeHints};
use crate::models::{DecodeOutcome, DecodeRequest, DecodedSymbol, FailureReason, Point, Symbology};
use std::time::Instant;
use tracing::{debug, trace};

/// QR code decoder
pub struct QrEngine {
    hints: DecodeHints,
    possible_points: Vec<Point>,
}

impl QrEngine {
    /// Create an engine with fixed hints
    pub fn new(hints: DecodeHints) -> Self {
        Self {
            hints,
            possible_points: Vec::new(),
        }
    }

    /// Hints this engine was built with
    pub fn hints(&self) -> DecodeHints {
        self.hints
    }

    fn scan(&mut self, request: &DecodeRequest, inverted: bool) -> Option<DecodedSymbol> {
        let (width, height) = request.view_dims();
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| {
            let l = request.view_luma(x, y);
            if inverted { 255 - l } else { l }
        });
        let grids = prepared.detect_grids();
        trace!(grids = grids.len(), inverted, "rqrr grid detection");

        let mut decoded = None;
        for grid in &grids {
            let corners: Vec<Point> = grid
                .bounds
                .iter()
                .map(|p| request.view_to_buffer(Point::new(p.x as f32, p.y as f32)))
                .collect();
            if self.hints.report_possible_points {
                self.possible_points.extend_from_slice(&corners);
            }
            if decoded.is_some() {
                continue;
            }

            let mut raw_bytes = Vec::new();
            match grid.decode_to(&mut raw_bytes) {
                Ok(meta) => {
                    let text = match String::from_utf8(raw_bytes.clone()) {
                        Ok(text) => text,
                        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
                    };
                    debug!(version = meta.version.0, ecc = meta.ecc_level, "QR grid decoded");
                    decoded = Some(DecodedSymbol {
                        text,
                        symbology: Symbology::QrCode,
                        raw_bytes,
                        possible_points: corners,
                    });
                }
                Err(e) => {
                    debug!(error = %e, "Failed to decode QR grid");
                }
            }
        }
        decoded
    }
}

impl DecodeEngine for QrEngine {
    fn decode(&mut self, request: DecodeRequest) -> DecodeOutcome {
        let start = Instant::now();
        self.possible_points.clear();

        let mut found = self.scan(&request, false);
        if found.is_none() && self.hints.also_inverted {
            found = self.scan(&request, true);
        }

        trace!(
            elapsed_ms = start.elapsed().as_millis(),
            points = self.possible_points.len(),
            "QR engine pass complete"
        );
        match found {
            Some(symbol) => DecodeOutcome::Success(symbol),
            None => DecodeOutcome::Failure(FailureReason::NotFound),
        }
    }

    fn possible_points(&self) -> &[Point] {
        &self.possible_points
    }
}
