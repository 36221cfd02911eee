//! Error types for the recognition engine.
//!
//! Every failure surfaces synchronously to the caller. Nothing inside the
//! engine retries or downgrades an error to a partial number.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OcrError>;

#[derive(Debug, Error)]
pub enum OcrError {
    /// The input bitmap is empty, the ROI is out of bounds, or the crop is empty.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The model artifact is missing, empty, corrupt, or built for another feature size.
    #[error("failed to load model {path:?}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    /// The classifier produced no valid digit for a candidate.
    #[error("classification failed: {0}")]
    Classification(String),

    /// Segmentation left zero digit candidates in the region.
    #[error("no digits found for stat '{stat}'")]
    NoDigitsFound { stat: String },

    #[error("training failed: {0}")]
    Training(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl OcrError {
    pub(crate) fn model_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        OcrError::ModelLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
