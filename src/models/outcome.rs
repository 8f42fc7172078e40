use serde::Serialize;
use std::fmt;

use super::Point;

/// Barcode format tag reported by a decode engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[non_exhaustive]
pub enum Symbology {
    /// QR Code (Model 2)
    #[serde(rename = "QR_CODE")]
    QrCode,
}

impl Symbology {
    /// Stable upper-case format name handed to callers
    pub fn name(&self) -> &'static str {
        match self {
            Symbology::QrCode => "QR_CODE",
        }
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a request ended without a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    /// Engine ran and found nothing
    NotFound,
    /// Permission, loading, geometry or engine failure
    Error,
    /// Cancelled through the request's token
    Cancelled,
}

/// A successfully decoded symbol
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSymbol {
    /// Decoded text
    pub text: String,
    /// Symbol format
    pub symbology: Symbology,
    /// Decoded payload bytes
    pub raw_bytes: Vec<u8>,
    /// Points the engine reported for this symbol, diagnostic only
    pub possible_points: Vec<Point>,
}

/// Terminal outcome of one decode request
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// A symbol was decoded
    Success(DecodedSymbol),
    /// No symbol, with the reason
    Failure(FailureReason),
}

impl DecodeOutcome {
    /// True for `Success`
    pub fn is_success(&self) -> bool {
        matches!(self, DecodeOutcome::Success(_))
    }

    /// Failure reason, `None` on success
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            DecodeOutcome::Success(_) => None,
            DecodeOutcome::Failure(reason) => Some(*reason),
        }
    }

    /// Convert into the record handed to caller callbacks
    pub fn into_result(self) -> Result<DecodedCode, DecodeError> {
        match self {
            DecodeOutcome::Success(symbol) => Ok(DecodedCode {
                code: symbol.text,
                kind: symbol.symbology.name().to_string(),
                raw_bytes: symbol.raw_bytes,
            }),
            DecodeOutcome::Failure(reason) => Err(DecodeError::new(reason)),
        }
    }
}

/// Success record delivered to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedCode {
    /// Decoded text
    pub code: String,
    /// Symbology name, e.g. `QR_CODE`
    #[serde(rename = "type")]
    pub kind: String,
    /// Decoded payload bytes
    pub raw_bytes: Vec<u8>,
}

/// Failure record delivered to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeError {
    /// Stable error code
    pub code: &'static str,
    /// Stable message
    pub message: &'static str,
    /// Human-readable reason
    pub details: String,
    /// Machine-readable reason
    #[serde(skip)]
    pub reason: FailureReason,
}

impl DecodeError {
    /// Error code for every terminal decode failure
    pub const CODE: &'static str = "1001";
    /// Message for every terminal decode failure
    pub const MESSAGE: &'static str = "decode failed";

    /// Failure record for a reason
    pub fn new(reason: FailureReason) -> Self {
        let details = match reason {
            FailureReason::NotFound => "no barcode found",
            FailureReason::Error => "image could not be processed",
            FailureReason::Cancelled => "request cancelled",
        };
        Self {
            code: Self::CODE,
            message: Self::MESSAGE,
            details: details.to_string(),
            reason,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.code, self.message, self.details)
    }
}

impl std::error::Error for DecodeError {}
