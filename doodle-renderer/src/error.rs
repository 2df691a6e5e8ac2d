//! Renderer error types.

use thiserror::Error;

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that can occur while featurizing a drawing.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The drawing has no strokes with points.
    #[error("Drawing has no points to render")]
    EmptyDrawing,

    /// The target raster size is zero in some dimension.
    #[error("Invalid raster size: {width}x{height}")]
    InvalidSize {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Rasterization failed.
    #[error("Rasterization failed: {0}")]
    Raster(String),

    /// Image encoding failed.
    #[error("Encoding failed: {0}")]
    Encode(String),
}
