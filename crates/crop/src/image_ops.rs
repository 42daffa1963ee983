//! Decoding with orientation fix-up, and pixel slicing
//!
//! The orientation is applied once at load time. The same corrected bitmap
//! then drives both the preview dimensions and the final slice, so the crop
//! rectangle never has to be rotated.

use std::path::Path;

use image::{DynamicImage, ImageDecoder, ImageReader};
use tracing::debug;

use crate::error::{CropError, Result};
use crate::geometry::PixelRect;
use crate::orientation::Orientation;

/// Decode the image at `path` and apply its EXIF orientation.
///
/// Returns the corrected image and the orientation that was applied. A file
/// without orientation metadata is treated as `Normal`.
pub fn load_oriented(path: &Path) -> Result<(DynamicImage, Orientation)> {
    let mut decoder = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(image::ImageError::IoError)?
        .into_decoder()?;

    let orientation = decoder
        .orientation()
        .ok()
        .and_then(|o| Orientation::from_exif(o.to_exif()))
        .unwrap_or_default();

    let decoded = DynamicImage::from_decoder(decoder)?;
    debug!(
        path = %path.display(),
        width = decoded.width(),
        height = decoded.height(),
        exif_orientation = orientation.to_exif(),
        "decoded image"
    );
    Ok((orientation.apply(decoded), orientation))
}

/// Cut `rect` out of `image`.
///
/// The rectangle is limited to the image; an empty result is an error.
pub fn crop_to(image: &DynamicImage, rect: PixelRect) -> Result<DynamicImage> {
    let right = rect.right.min(image.width());
    let bottom = rect.bottom.min(image.height());
    let width = right.saturating_sub(rect.left);
    let height = bottom.saturating_sub(rect.top);
    if width == 0 || height == 0 {
        return Err(CropError::EmptyCrop { width, height });
    }
    Ok(image.crop_imm(rect.left, rect.top, width, height))
}
