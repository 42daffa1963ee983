//! The eight resize handles: placement, hit testing and drag rules

use serde::{Deserialize, Serialize};

use crate::geometry::{CropConfig, RectF, clamp_high_edge, clamp_low_edge};

/// A resize handle. Declaration order is the hit-test priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Handle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Top,
    Bottom,
    Left,
    Right,
}

impl Handle {
    /// All handles in hit-test order.
    pub const ALL: [Handle; 8] = [
        Handle::TopLeft,
        Handle::TopRight,
        Handle::BottomLeft,
        Handle::BottomRight,
        Handle::Top,
        Handle::Bottom,
        Handle::Left,
        Handle::Right,
    ];

    /// The point on `rect` this handle sits on.
    pub fn anchor(self, rect: &RectF) -> (f32, f32) {
        match self {
            Handle::TopLeft => (rect.left, rect.top),
            Handle::TopRight => (rect.right, rect.top),
            Handle::BottomLeft => (rect.left, rect.bottom),
            Handle::BottomRight => (rect.right, rect.bottom),
            Handle::Top => (rect.center_x(), rect.top),
            Handle::Bottom => (rect.center_x(), rect.bottom),
            Handle::Left => (rect.left, rect.center_y()),
            Handle::Right => (rect.right, rect.center_y()),
        }
    }

    /// Square of side `size` centered on the anchor.
    pub fn area(self, rect: &RectF, size: f32) -> RectF {
        let (x, y) = self.anchor(rect);
        RectF::square_around(x, y, size)
    }

    fn moves_left(self) -> bool {
        matches!(self, Handle::TopLeft | Handle::BottomLeft | Handle::Left)
    }

    fn moves_right(self) -> bool {
        matches!(self, Handle::TopRight | Handle::BottomRight | Handle::Right)
    }

    fn moves_top(self) -> bool {
        matches!(self, Handle::TopLeft | Handle::TopRight | Handle::Top)
    }

    fn moves_bottom(self) -> bool {
        matches!(self, Handle::BottomLeft | Handle::BottomRight | Handle::Bottom)
    }
}

impl std::str::FromStr for Handle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "top-left" | "tl" => Ok(Handle::TopLeft),
            "top-right" | "tr" => Ok(Handle::TopRight),
            "bottom-left" | "bl" => Ok(Handle::BottomLeft),
            "bottom-right" | "br" => Ok(Handle::BottomRight),
            "top" | "t" => Ok(Handle::Top),
            "bottom" | "b" => Ok(Handle::Bottom),
            "left" | "l" => Ok(Handle::Left),
            "right" | "r" => Ok(Handle::Right),
            other => Err(format!("unknown handle: {other}")),
        }
    }
}

/// All eight handle areas for `rect`, in hit-test order.
pub fn handle_areas(rect: &RectF, size: f32) -> [(Handle, RectF); 8] {
    Handle::ALL.map(|h| (h, h.area(rect, size)))
}

/// First handle whose area, grown by the touch slop, contains `(x, y)`.
pub fn hit_test(rect: &RectF, x: f32, y: f32, config: &CropConfig) -> Option<Handle> {
    handle_areas(rect, config.handle_size)
        .into_iter()
        .find(|(_, area)| area.expand(config.touch_slop).contains(x, y))
        .map(|(handle, _)| handle)
}

/// Move the edges `handle` controls toward `(x, y)`.
///
/// Each moved edge stays inside `bounds` and at least `handle_size` away from
/// the rectangle's current opposite edge.
pub fn drag(rect: RectF, handle: Handle, x: f32, y: f32, bounds: &RectF, handle_size: f32) -> RectF {
    let mut next = rect;
    if handle.moves_left() {
        next.left = clamp_low_edge(x, bounds.left, next.right, handle_size);
    }
    if handle.moves_right() {
        next.right = clamp_high_edge(x, next.left, bounds.right, handle_size);
    }
    if handle.moves_top() {
        next.top = clamp_low_edge(y, bounds.top, next.bottom, handle_size);
    }
    if handle.moves_bottom() {
        next.bottom = clamp_high_edge(y, next.top, bounds.bottom, handle_size);
    }
    next
}
