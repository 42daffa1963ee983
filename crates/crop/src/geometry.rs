//! Rectangles, fit-center bounds and the clamping rules for the crop rectangle

use serde::{Deserialize, Serialize};

use crate::error::{CropError, Result};

/// Sizes that shape the crop interaction, in view units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    /// Side of each handle square; also the minimum crop width and height.
    pub handle_size: f32,
    /// Extra hit area around each handle.
    pub touch_slop: f32,
    /// Floor for the side of the initial crop square.
    pub min_initial_size: f32,
    /// Initial crop side as a fraction of the smaller image-bound dimension.
    pub initial_fraction: f32,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            handle_size: 60.0,
            touch_slop: 30.0,
            min_initial_size: 200.0,
            initial_fraction: 0.6,
        }
    }
}

/// Axis-aligned rectangle in view coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RectF {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center_x(&self) -> f32 {
        (self.left + self.right) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }

    /// True when either dimension is zero, negative or not a number.
    pub fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Half-open containment: left and top edges inside, right and bottom outside.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        !self.is_degenerate() && x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Grow by `by` on every side.
    pub fn expand(&self, by: f32) -> Self {
        Self::new(self.left - by, self.top - by, self.right + by, self.bottom + by)
    }

    /// Square of side `size` centered on `(x, y)`.
    pub fn square_around(x: f32, y: f32, size: f32) -> Self {
        let half = size / 2.0;
        Self::new(x - half, y - half, x + half, y + half)
    }
}

/// Crop rectangle in source-image pixels. `right`/`bottom` are exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Where an `image_w`×`image_h` image lands inside a `view_w`×`view_h`
/// viewport when scaled to fit and centered.
///
/// A zero-sized image or viewport yields an empty rectangle at the origin.
pub fn compute_image_bounds(view_w: f32, view_h: f32, image_w: f32, image_h: f32) -> RectF {
    if !(view_w > 0.0 && view_h > 0.0 && image_w > 0.0 && image_h > 0.0) {
        return RectF::default();
    }

    let scale = (view_w / image_w).min(view_h / image_h);
    let scaled_w = image_w * scale;
    let scaled_h = image_h * scale;
    let left = (view_w - scaled_w) / 2.0;
    let top = (view_h - scaled_h) / 2.0;
    RectF::new(left, top, left + scaled_w, top + scaled_h)
}

/// Clamp a left/top edge: not before `bound`, and at least `gap` before
/// `opposite`. When both cannot hold, the gap wins.
pub(crate) fn clamp_low_edge(value: f32, bound: f32, opposite: f32, gap: f32) -> f32 {
    value.max(bound).min(opposite - gap)
}

/// Clamp a right/bottom edge: not past `bound`, and at least `gap` after
/// `opposite`. When both cannot hold, the gap wins.
pub(crate) fn clamp_high_edge(value: f32, opposite: f32, bound: f32, gap: f32) -> f32 {
    value.min(bound).max(opposite + gap)
}

/// Fit `rect` into `bounds` keeping every side at least `handle_size`.
///
/// Edges are clamped in the order left, top, right, bottom; right and bottom
/// are measured from the already clamped left and top.
pub(crate) fn clamp_into(rect: RectF, bounds: RectF, handle_size: f32) -> RectF {
    let left = clamp_low_edge(rect.left, bounds.left, bounds.right, handle_size);
    let top = clamp_low_edge(rect.top, bounds.top, bounds.bottom, handle_size);
    let right = clamp_high_edge(rect.right, left, bounds.right, handle_size);
    let bottom = clamp_high_edge(rect.bottom, top, bounds.bottom, handle_size);
    RectF::new(left, top, right, bottom)
}

/// Initial crop square: `initial_fraction` of the smaller bound dimension
/// (at least `min_initial_size`), centered in `bounds` and clamped into them.
pub fn initial_crop_rect(bounds: RectF, config: &CropConfig) -> RectF {
    let smaller = bounds.width().min(bounds.height());
    let size = (smaller * config.initial_fraction).max(config.min_initial_size);
    let square = RectF::square_around(bounds.center_x(), bounds.center_y(), size);
    clamp_into(square, bounds, config.handle_size)
}

/// Carry `rect` from `old` bounds to `new` bounds, keeping its position
/// relative to the image.
///
/// Falls back to a fresh initial rectangle when either bounds is degenerate.
pub fn reproject(rect: RectF, old: RectF, new: RectF, config: &CropConfig) -> RectF {
    if old.is_degenerate() || new.is_degenerate() {
        return initial_crop_rect(new, config);
    }

    let rel_left = (rect.left - old.left) / old.width();
    let rel_top = (rect.top - old.top) / old.height();
    let rel_right = (rect.right - old.left) / old.width();
    let rel_bottom = (rect.bottom - old.top) / old.height();

    let moved = RectF::new(
        new.left + rel_left * new.width(),
        new.top + rel_top * new.height(),
        new.left + rel_right * new.width(),
        new.top + rel_bottom * new.height(),
    );
    clamp_into(moved, new, config.handle_size)
}

/// Project `rect` from view space into source pixels.
///
/// Coordinates are scaled by the source size over the bounds size, truncated
/// toward zero and clamped to the image; right and bottom never fall before
/// left and top.
pub fn finalize_crop(rect: RectF, bounds: RectF, source_w: u32, source_h: u32) -> Result<PixelRect> {
    if bounds.is_degenerate() {
        return Err(CropError::DegenerateBounds);
    }

    let project_x = |x: f32| ((x - bounds.left) / bounds.width() * source_w as f32) as i64;
    let project_y = |y: f32| ((y - bounds.top) / bounds.height() * source_h as f32) as i64;

    let (src_w, src_h) = (i64::from(source_w), i64::from(source_h));
    let left = project_x(rect.left).clamp(0, src_w);
    let top = project_y(rect.top).clamp(0, src_h);
    let right = project_x(rect.right).clamp(left, src_w);
    let bottom = project_y(rect.bottom).clamp(top, src_h);

    let pixels = PixelRect {
        left: left as u32,
        top: top as u32,
        right: right as u32,
        bottom: bottom as u32,
    };
    if pixels.width() == 0 || pixels.height() == 0 {
        return Err(CropError::EmptyCrop {
            width: pixels.width(),
            height: pixels.height(),
        });
    }
    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HS: f32 = 60.0;

    #[test]
    fn wide_image_is_letterboxed_vertically() {
        let b = compute_image_bounds(1000.0, 1000.0, 2000.0, 1000.0);
        assert_eq!(b, RectF::new(0.0, 250.0, 1000.0, 750.0));
    }

    #[test]
    fn tall_image_is_pillarboxed() {
        let b = compute_image_bounds(1000.0, 500.0, 1000.0, 1000.0);
        assert_eq!(b, RectF::new(250.0, 0.0, 750.0, 500.0));
    }

    #[test]
    fn zero_dimensions_give_empty_bounds() {
        assert!(compute_image_bounds(0.0, 800.0, 100.0, 100.0).is_degenerate());
        assert!(compute_image_bounds(800.0, 800.0, 100.0, 0.0).is_degenerate());
    }

    #[test]
    fn contains_is_half_open() {
        let r = RectF::new(0.0, 0.0, 10.0, 10.0);
        assert!(r.contains(0.0, 0.0));
        assert!(r.contains(9.99, 9.99));
        assert!(!r.contains(10.0, 5.0));
        assert!(!r.contains(5.0, 10.0));
        assert!(!RectF::new(5.0, 5.0, 5.0, 10.0).contains(5.0, 6.0));
    }

    #[test]
    fn initial_rect_is_sixty_percent_and_centered() {
        let bounds = RectF::new(0.0, 250.0, 1000.0, 750.0);
        let r = initial_crop_rect(bounds, &CropConfig::default());
        // 0.6 * 500 = 300
        assert_eq!(r, RectF::new(350.0, 350.0, 650.0, 650.0));
    }

    #[test]
    fn initial_rect_has_floor_and_stays_inside() {
        let bounds = RectF::new(0.0, 0.0, 250.0, 250.0);
        let r = initial_crop_rect(bounds, &CropConfig::default());
        // 0.6 * 250 = 150 < 200
        assert_eq!(r, RectF::new(25.0, 25.0, 225.0, 225.0));

        let small = RectF::new(0.0, 0.0, 100.0, 100.0);
        let r = initial_crop_rect(small, &CropConfig::default());
        assert_eq!(r, RectF::new(0.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn bounds_narrower_than_handle_keep_minimum_size() {
        let sliver = RectF::new(100.0, 0.0, 120.0, 500.0);
        let r = initial_crop_rect(sliver, &CropConfig::default());
        assert!(r.width() >= HS, "width {}", r.width());
        assert!(r.height() >= HS);
    }

    #[test]
    fn clamp_edges_prefer_gap_on_inverted_range() {
        assert_eq!(clamp_low_edge(50.0, 0.0, 100.0, HS), 40.0);
        assert_eq!(clamp_low_edge(-5.0, 0.0, 100.0, HS), 0.0);
        // bound 80 but opposite edge at 100: gap wins
        assert_eq!(clamp_low_edge(90.0, 80.0, 100.0, HS), 40.0);
        assert_eq!(clamp_high_edge(500.0, 100.0, 300.0, HS), 300.0);
        assert_eq!(clamp_high_edge(120.0, 100.0, 300.0, HS), 160.0);
    }

    #[test]
    fn finalize_scales_to_source_pixels() {
        let bounds = RectF::new(0.0, 0.0, 1000.0, 1000.0);
        let rect = RectF::new(250.0, 250.0, 750.0, 750.0);
        let px = finalize_crop(rect, bounds, 4000, 4000).unwrap();
        assert_eq!(
            px,
            PixelRect {
                left: 1000,
                top: 1000,
                right: 3000,
                bottom: 3000
            }
        );
        assert_eq!(px.width(), 2000);
    }

    #[test]
    fn finalize_accounts_for_letterbox_offset() {
        let bounds = RectF::new(0.0, 250.0, 1000.0, 750.0);
        let rect = RectF::new(0.0, 250.0, 500.0, 500.0);
        let px = finalize_crop(rect, bounds, 2000, 1000).unwrap();
        assert_eq!(
            px,
            PixelRect {
                left: 0,
                top: 0,
                right: 1000,
                bottom: 500
            }
        );
    }

    #[test]
    fn finalize_clamps_outside_coordinates() {
        let bounds = RectF::new(100.0, 100.0, 200.0, 200.0);
        let rect = RectF::new(50.0, 90.0, 260.0, 150.0);
        let px = finalize_crop(rect, bounds, 10, 10).unwrap();
        assert_eq!(
            px,
            PixelRect {
                left: 0,
                top: 0,
                right: 10,
                bottom: 5
            }
        );
    }

    #[test]
    fn finalize_rejects_empty_and_degenerate() {
        let bounds = RectF::new(0.0, 0.0, 1000.0, 1000.0);
        let thin = RectF::new(500.0, 0.0, 500.5, 1000.0);
        assert!(matches!(
            finalize_crop(thin, bounds, 100, 100),
            Err(CropError::EmptyCrop { width: 0, .. })
        ));

        let rect = RectF::new(0.0, 0.0, 10.0, 10.0);
        assert!(matches!(
            finalize_crop(rect, RectF::default(), 100, 100),
            Err(CropError::DegenerateBounds)
        ));
    }

    #[test]
    fn reproject_keeps_relative_position() {
        let cfg = CropConfig::default();
        let old = RectF::new(0.0, 250.0, 1000.0, 750.0);
        let new = RectF::new(250.0, 0.0, 1250.0, 500.0);
        let rect = RectF::new(250.0, 375.0, 750.0, 625.0);

        let moved = reproject(rect, old, new, &cfg);
        assert_eq!(moved, RectF::new(500.0, 125.0, 1000.0, 375.0));
    }

    #[test]
    fn reproject_scales_with_bounds() {
        let cfg = CropConfig::default();
        let old = RectF::new(0.0, 0.0, 1000.0, 1000.0);
        let new = RectF::new(0.0, 0.0, 500.0, 500.0);
        let rect = RectF::new(200.0, 200.0, 800.0, 600.0);
        assert_eq!(
            reproject(rect, old, new, &cfg),
            RectF::new(100.0, 100.0, 400.0, 300.0)
        );
    }

    #[test]
    fn reproject_from_degenerate_reinitializes() {
        let cfg = CropConfig::default();
        let new = RectF::new(0.0, 250.0, 1000.0, 750.0);
        let rect = RectF::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(
            reproject(rect, RectF::default(), new, &cfg),
            initial_crop_rect(new, &cfg)
        );
    }
}
