//! Error types for canvas and document operations.

use thiserror::Error;

/// Result type for structural canvas operations.
pub type CanvasResult<T> = Result<T, CanvasError>;

/// Programmer errors raised at the canvas API boundary.
///
/// These are checked before any action pair is built, so a rejected call
/// never leaves a half-applied entry in the history.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CanvasError {
    #[error("layer index {index} out of range (document has {len} layers)")]
    LayerIndexOutOfRange { index: usize, len: usize },

    #[error("invalid canvas size {width}x{height}: dimensions must be positive")]
    InvalidSize { width: i64, height: i64 },

    #[error("invalid scale {0}: scale must be positive and finite")]
    InvalidScale(f32),

    #[error("invalid opacity {0}: opacity must be within 0..=1")]
    InvalidOpacity(f32),

    #[error("document must contain at least one layer")]
    NoLayers,
}

/// Errors from the persisted document format and from export.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("malformed document JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("unsupported document version {0}")]
    UnsupportedVersion(f64),

    #[error("layer {index} image data could not be decoded: {reason}")]
    LayerImage { index: usize, reason: String },

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
