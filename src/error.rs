//! Error types shared by the conversion and decode pipeline

use std::path::PathBuf;

/// Result alias used throughout the crate
pub type ScanResult<T> = Result<T, ScanError>;

/// Everything that can stop a decode request before a symbol is found
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    /// Caller lacks read access to the image
    #[error("no permission to read {0}")]
    PermissionDenied(PathBuf),

    /// File missing, unreadable, or not an image we can rasterize
    #[error("failed to load image {path}: {reason}")]
    ImageLoad {
        /// Path that was requested
        path: PathBuf,
        /// Underlying loader message
        reason: String,
    },

    /// Effective dimensions below 2x2 after dropping odd rows/columns
    #[error("invalid geometry {width}x{height}: need at least 2x2 pixels")]
    InvalidGeometry {
        /// Source width in pixels
        width: usize,
        /// Source height in pixels
        height: usize,
    },

    /// Crop region or buffer layout inconsistent with the request
    #[error("invalid decode request: {0}")]
    InvalidRequest(String),

    /// Request was cancelled before it completed
    #[error("decode request cancelled")]
    Cancelled,

    /// Worker pool could not be started
    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),

    /// Pool already holds its maximum number of in-flight requests
    #[error("decode queue is full ({capacity} requests in flight)")]
    QueueFull {
        /// Configured queue capacity
        capacity: usize,
    },
}

impl ScanError {
    /// Terminal failure reason this error maps to
    pub fn failure_reason(&self) -> crate::models::FailureReason {
        use crate::models::FailureReason;
        match self {
            ScanError::Cancelled => FailureReason::Cancelled,
            _ => FailureReason::Error,
        }
    }
}
