//! Crop session state machine
//!
//! Receives layout and pointer events, returns the action the caller should
//! perform (usually a redraw). The session owns the crop rectangle; the
//! caller owns rendering and the bitmap.
//!
//! ```text
//! Unattached ──attach──▶ AwaitingLayout ──resize(w>0,h>0)──▶ Idle
//!      └───────attach (viewport known)─────────────────────▶ Idle
//! Idle ──down on handle | begin_drag(h)──▶ Dragging(h) ──up/cancel──▶ Idle
//! Idle | Dragging ──finalize ok──▶ Finalized
//! ```

use tracing::debug;

use crate::error::{CropError, Result};
use crate::geometry::{
    CropConfig, PixelRect, RectF, compute_image_bounds, finalize_crop, initial_crop_rect, reproject,
};
use crate::handles::{self, Handle};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No image yet
    Unattached,
    /// Image attached, viewport still zero-sized
    AwaitingLayout,
    /// Crop rectangle placed, no gesture in progress
    Idle,
    /// A handle is being dragged
    Dragging(Handle),
    /// Final pixel rectangle produced
    Finalized,
}

/// Input to the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CropEvent {
    /// A new bitmap of the given (already oriented) size is shown
    ImageAttached { width: u32, height: u32 },
    /// The viewport changed size (layout pass, rotation)
    Resized { width: f32, height: f32 },
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp,
    PointerCancel,
    /// Produce the crop in the coordinates of a source bitmap of this size
    Finalize { source_width: u32, source_height: u32 },
}

/// What the caller should do after an event.
#[derive(Debug)]
pub enum CropAction {
    /// Nothing changed
    None,
    /// Redraw the overlay with this rectangle
    Redraw(RectF),
    /// A gesture grabbed a handle; the caller should keep the pointer
    DragStarted(Handle),
    /// The gesture ended
    DragEnded,
    /// Slice the source bitmap with this rectangle
    Crop(PixelRect),
    /// The selection cannot be cropped; ask the user to pick again
    Rejected(CropError),
}

/// One crop interaction over one image.
#[derive(Debug, Clone)]
pub struct CropSession {
    config: CropConfig,
    viewport: (f32, f32),
    image: Option<(u32, u32)>,
    bounds: RectF,
    rect: Option<RectF>,
    state: SessionState,
}

impl CropSession {
    pub fn new(config: CropConfig) -> Self {
        Self {
            config,
            viewport: (0.0, 0.0),
            image: None,
            bounds: RectF::default(),
            rect: None,
            state: SessionState::Unattached,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &CropConfig {
        &self.config
    }

    /// Current crop rectangle in view coordinates.
    pub fn crop_rect(&self) -> Option<RectF> {
        self.rect
    }

    /// Where the image currently sits inside the viewport.
    pub fn image_bounds(&self) -> RectF {
        self.bounds
    }

    /// Handle areas for drawing, in hit-test order.
    pub fn handle_areas(&self) -> Option<[(Handle, RectF); 8]> {
        self.rect
            .map(|rect| handles::handle_areas(&rect, self.config.handle_size))
    }

    /// Feed one event through the session.
    pub fn handle_event(&mut self, event: CropEvent) -> CropAction {
        match event {
            CropEvent::ImageAttached { width, height } => self.attach_image(width, height),
            CropEvent::Resized { width, height } => self.on_resize(width, height),
            CropEvent::PointerDown { x, y } => self.on_pointer_down(x, y),
            CropEvent::PointerMove { x, y } => self.on_pointer_move(x, y),
            CropEvent::PointerUp => self.on_pointer_up(),
            CropEvent::PointerCancel => self.on_pointer_cancel(),
            CropEvent::Finalize {
                source_width,
                source_height,
            } => match self.finalize(source_width, source_height) {
                Ok(rect) => CropAction::Crop(rect),
                Err(e) => CropAction::Rejected(e),
            },
        }
    }

    /// Start a session for an image of `width`×`height`.
    ///
    /// The rectangle is placed right away if the viewport has a size,
    /// otherwise on the first non-empty resize.
    pub fn attach_image(&mut self, width: u32, height: u32) -> CropAction {
        self.image = Some((width, height));
        self.rect = None;
        self.bounds = self.compute_bounds();

        if self.has_layout() && !self.bounds.is_degenerate() {
            self.place_initial()
        } else {
            debug!(width, height, "image attached, waiting for layout");
            self.state = SessionState::AwaitingLayout;
            CropAction::None
        }
    }

    /// Viewport changed size. A drag in progress keeps its handle.
    pub fn on_resize(&mut self, width: f32, height: f32) -> CropAction {
        self.viewport = (width.max(0.0), height.max(0.0));
        if self.image.is_none() {
            return CropAction::None;
        }

        let old = self.bounds;
        self.bounds = self.compute_bounds();

        match self.rect {
            None if self.has_layout() && !self.bounds.is_degenerate() => self.place_initial(),
            None => CropAction::None,
            Some(rect) => {
                let moved = reproject(rect, old, self.bounds, &self.config);
                debug!(?old, new = ?self.bounds, "re-projected crop rectangle");
                self.rect = Some(moved);
                CropAction::Redraw(moved)
            }
        }
    }

    /// Start a gesture if `(x, y)` is on a handle.
    pub fn on_pointer_down(&mut self, x: f32, y: f32) -> CropAction {
        if !matches!(self.state, SessionState::Idle | SessionState::Dragging(_)) {
            return CropAction::None;
        }
        let Some(rect) = self.rect else {
            return CropAction::None;
        };

        match handles::hit_test(&rect, x, y, &self.config) {
            Some(handle) => {
                debug!(?handle, x, y, "drag started");
                self.state = SessionState::Dragging(handle);
                CropAction::DragStarted(handle)
            }
            None => {
                self.state = SessionState::Idle;
                CropAction::None
            }
        }
    }

    /// Grab `handle` directly, without hit testing.
    ///
    /// Scripted gestures use this: on a small rectangle the expanded areas
    /// overlap and a pointer-down on one handle's anchor can hit an earlier one.
    pub fn begin_drag(&mut self, handle: Handle) -> CropAction {
        if !matches!(self.state, SessionState::Idle | SessionState::Dragging(_)) || self.rect.is_none() {
            return CropAction::None;
        }
        debug!(?handle, "drag started");
        self.state = SessionState::Dragging(handle);
        CropAction::DragStarted(handle)
    }

    /// Move the active handle. The pointer is first limited to the viewport.
    pub fn on_pointer_move(&mut self, x: f32, y: f32) -> CropAction {
        let SessionState::Dragging(handle) = self.state else {
            return CropAction::None;
        };
        let Some(rect) = self.rect else {
            return CropAction::None;
        };

        let x = x.clamp(0.0, self.viewport.0);
        let y = y.clamp(0.0, self.viewport.1);
        let next = handles::drag(rect, handle, x, y, &self.bounds, self.config.handle_size);
        self.rect = Some(next);
        CropAction::Redraw(next)
    }

    pub fn on_pointer_up(&mut self) -> CropAction {
        self.end_drag()
    }

    pub fn on_pointer_cancel(&mut self) -> CropAction {
        self.end_drag()
    }

    /// Project the rectangle onto a `source_w`×`source_h` bitmap.
    ///
    /// On error the session stays usable so the user can adjust and retry.
    pub fn finalize(&mut self, source_w: u32, source_h: u32) -> Result<PixelRect> {
        let rect = self.rect.ok_or(CropError::NotInitialized)?;
        let pixels = finalize_crop(rect, self.bounds, source_w, source_h)?;
        debug!(?pixels, source_w, source_h, "crop finalized");
        self.state = SessionState::Finalized;
        Ok(pixels)
    }

    fn end_drag(&mut self) -> CropAction {
        if let SessionState::Dragging(handle) = self.state {
            debug!(?handle, "drag ended");
            self.state = SessionState::Idle;
            CropAction::DragEnded
        } else {
            CropAction::None
        }
    }

    fn place_initial(&mut self) -> CropAction {
        let rect = initial_crop_rect(self.bounds, &self.config);
        debug!(?rect, bounds = ?self.bounds, "crop rectangle initialized");
        self.rect = Some(rect);
        self.state = SessionState::Idle;
        CropAction::Redraw(rect)
    }

    fn has_layout(&self) -> bool {
        self.viewport.0 > 0.0 && self.viewport.1 > 0.0
    }

    fn compute_bounds(&self) -> RectF {
        match self.image {
            Some((w, h)) => compute_image_bounds(self.viewport.0, self.viewport.1, w as f32, h as f32),
            None => RectF::default(),
        }
    }
}

impl Default for CropSession {
    fn default() -> Self {
        Self::new(CropConfig::default())
    }
}
