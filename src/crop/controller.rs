//! Pointer interaction state machine for the crop rectangle
//!
//! Idle until a pointer goes down on the rectangle body or one of its
//! corner handles, then Dragging until that pointer is released or the
//! gesture is cancelled. Moves are measured from the gesture's starting
//! point against a snapshot of the rectangle, so each move fully replaces
//! the previous result.

use tracing::{debug, trace};

use super::{Corner, CropRect, CropRegion, RectF};
use crate::geometry::Point;

/// What a drag gesture does to the rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Move,
    Resize(Corner),
}

/// State of an in-progress drag
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession {
    pub kind: GestureKind,
    /// Pointer that owns the gesture (pointer capture)
    pub pointer_id: u64,
    /// Pointer position at gesture start, image space
    pub start: Point,
    /// Rectangle at gesture start
    pub start_rect: CropRect,
}

/// Drives [`CropRegion`] mutations from pointer events
#[derive(Debug, Default)]
pub struct InteractionController {
    drag: Option<DragSession>,
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn drag_session(&self) -> Option<&DragSession> {
        self.drag.as_ref()
    }

    /// Begin a gesture. Ignored while another pointer owns a drag.
    pub fn pointer_down(&mut self, pointer_id: u64, kind: GestureKind, start: Point, region: &CropRegion) -> bool {
        if let Some(active) = &self.drag {
            if active.pointer_id != pointer_id {
                trace!("Pointer {} ignored, pointer {} is dragging", pointer_id, active.pointer_id);
                return false;
            }
        }

        debug!("Drag start {:?} at ({:.1}, {:.1})", kind, start.x, start.y);
        self.drag = Some(DragSession {
            kind,
            pointer_id,
            start,
            start_rect: region.rect(),
        });
        true
    }

    /// Apply a pointer move. Returns the new rectangle when a drag is active.
    pub fn pointer_move(&mut self, pointer_id: u64, current: Point, region: &mut CropRegion) -> Option<CropRect> {
        let session = self.drag.as_ref().filter(|s| s.pointer_id == pointer_id)?;

        let dx = current.x - session.start.x;
        let dy = current.y - session.start.y;

        let candidate = match session.kind {
            GestureKind::Move => translate(session.start_rect, dx, dy),
            GestureKind::Resize(corner) => resize_from_corner(session.start_rect, corner, dx, dy),
        };

        Some(region.set_rectangle(candidate))
    }

    /// End the gesture owned by `pointer_id`
    pub fn pointer_up(&mut self, pointer_id: u64) {
        if self.drag.as_ref().is_some_and(|s| s.pointer_id == pointer_id) {
            debug!("Drag end");
            self.drag = None;
        }
    }

    /// Abort whatever gesture is active
    pub fn cancel(&mut self) {
        if self.drag.take().is_some() {
            debug!("Drag cancelled");
        }
    }
}

/// Offset the rectangle without changing its size
pub fn translate(start: CropRect, dx: f32, dy: f32) -> RectF {
    RectF {
        x: start.x as f32 + dx,
        y: start.y as f32 + dy,
        ..RectF::from(start)
    }
}

/// Move the two edges adjacent to `corner` by the delta, before clamping
pub fn resize_from_corner(start: CropRect, corner: Corner, dx: f32, dy: f32) -> RectF {
    let mut r = RectF::from(start);

    if corner.is_top() {
        r.y += dy;
        r.h -= dy;
    } else {
        r.h += dy;
    }

    if corner.is_left() {
        r.x += dx;
        r.w -= dx;
    } else {
        r.w += dx;
    }

    r
}
