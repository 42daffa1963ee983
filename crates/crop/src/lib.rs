//! Crop-rectangle geometry for a letterboxed image preview
//!
//! The preview shows an image scaled to fit its viewport and centered
//! (`compute_image_bounds`). The user drags one of eight handles to resize a
//! crop rectangle kept inside those bounds; on finalize the rectangle is
//! projected back into source-image pixels.
//!
//! Everything here is toolkit independent: `CropSession` consumes layout and
//! pointer events and returns actions for the caller to render. Decoding,
//! EXIF orientation and bitmap slicing live in `image_ops`/`orientation`.

pub mod error;
pub mod geometry;
pub mod handles;
pub mod image_ops;
pub mod orientation;
pub mod session;

pub use error::{CropError, Result};
pub use geometry::{CropConfig, PixelRect, RectF, compute_image_bounds};
pub use handles::Handle;
pub use image_ops::{crop_to, load_oriented};
pub use orientation::Orientation;
pub use session::{CropAction, CropEvent, CropSession, SessionState};
