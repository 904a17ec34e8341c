//! Error type shared by every pipeline stage.

use thiserror::Error;

/// Errors that can occur while segmenting, tracking or persisting a position.
///
/// Only `Dimension`, `EmptyStack`, `InvalidConfig` and the I/O wrappers abort a
/// position. `EmptyDetection` is a per-frame diagnostic: the frame simply
/// contributes no detections and the pipeline carries on.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Dimension error: {0}")]
    Dimension(String),
    #[error("Empty stack: {0}")]
    EmptyStack(String),
    #[error("Frame {frame} yielded no objects after filtering")]
    EmptyDetection { frame: usize },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Unknown wavelet kernel '{0}'")]
    UnknownKernel(String),
    #[error("No stack for channel '{channel}' at position {position}")]
    MissingChannel { channel: String, position: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether this error leaves the rest of the position's stack usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineError::EmptyDetection { .. })
    }
}
