//! Renderer error types.

use collage_core::{CollageError, StorageError};
use thiserror::Error;

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that can occur while fetching images or exporting a surface.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Resource loading or decoding failed.
    #[error("Failed to load resource: {0}")]
    Resource(String),

    /// Rasterization or encoding failed.
    #[error("Export failed: {0}")]
    Export(String),

    /// Session storage rejected the exported image.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The surface rejected an operation.
    #[error("Surface error: {0}")]
    Core(#[from] CollageError),
}

impl From<RenderError> for CollageError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Core(e) => e,
            RenderError::Storage(e) => Self::Storage(e),
            other => Self::ResourceLoad(other.to_string()),
        }
    }
}
