//! Error types for collage operations.

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for collage operations.
pub type CollageResult<T> = Result<T, CollageError>;

/// Errors that can occur in collage operations.
#[derive(Debug, Error)]
pub enum CollageError {
    /// Layer not found on the surface.
    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    /// No layout template with the requested id.
    #[error("Layout template not found: {0}")]
    TemplateNotFound(String),

    /// The surface was disposed before the operation could run.
    #[error("Surface has been disposed")]
    SurfaceDisposed,

    /// The scene store has no bound surface.
    #[error("No surface bound to the scene store")]
    NoSurface,

    /// Invalid layer operation.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Snapshot serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource loading failed.
    #[error("Failed to load resource: {0}")]
    ResourceLoad(String),

    /// Session storage rejected a read or write.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
