//! Error types for crop operations

/// Errors from crop geometry and image handling.
///
/// Geometry problems are separate variants so a caller can ask the user to
/// pick the area again instead of writing an empty image.
#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("image bounds are degenerate (zero width or height)")]
    DegenerateBounds,

    #[error("crop area is empty ({width}x{height} pixels)")]
    EmptyCrop { width: u32, height: u32 },

    #[error("no crop rectangle yet (image not attached or layout pending)")]
    NotInitialized,

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Result alias for crop operations.
pub type Result<T> = std::result::Result<T, CropError>;
