//! Crop region model

use tracing::debug;

use super::{CropRect, PresetFractions, RectF, MIN_CROP_SIZE};

/// Rectangle used before any preset has been applied
const INITIAL_RECT: RectF = RectF { x: 40.0, y: 40.0, w: 280.0, h: 120.0 };

/// Current crop rectangle for one image
///
/// Every rectangle handed out satisfies the bounds and minimum-size
/// invariant; all mutations go through [`CropRegion::set_rectangle`].
#[derive(Debug, Clone, PartialEq)]
pub struct CropRegion {
    rect: CropRect,
    image_width: u32,
    image_height: u32,
}

impl CropRegion {
    pub fn new(image_width: u32, image_height: u32) -> Self {
        Self {
            rect: clamp_rect(INITIAL_RECT, image_width, image_height),
            image_width,
            image_height,
        }
    }

    pub fn rect(&self) -> CropRect {
        self.rect
    }

    pub fn image_size(&self) -> (u32, u32) {
        (self.image_width, self.image_height)
    }

    /// Replace the rectangle with a clamped version of `candidate`
    pub fn set_rectangle(&mut self, candidate: RectF) -> CropRect {
        self.rect = clamp_rect(candidate, self.image_width, self.image_height);
        self.rect
    }

    /// Recompute the rectangle from preset fractions of the image size
    pub fn apply_preset(&mut self, fractions: &PresetFractions) -> CropRect {
        let candidate = fractions.to_candidate(self.image_width, self.image_height);
        let rect = self.set_rectangle(candidate);
        debug!("Applied crop preset {:?} -> {}", fractions, rect);
        rect
    }
}

/// Clamp a candidate so it is at least [`MIN_CROP_SIZE`] on each axis and
/// lies fully inside the image.
///
/// Size is clamped before position, so a rectangle grown past an edge is
/// shifted back inside rather than allowed to overhang. On an image smaller
/// than the minimum the floor drops to the image dimension.
pub fn clamp_rect(candidate: RectF, image_width: u32, image_height: u32) -> CropRect {
    let (w, x) = clamp_axis(candidate.w, candidate.x, image_width);
    let (h, y) = clamp_axis(candidate.h, candidate.y, image_height);
    CropRect { x, y, w, h }
}

fn clamp_axis(size: f32, origin: f32, extent: u32) -> (u32, u32) {
    let floor = MIN_CROP_SIZE.min(extent) as f32;
    // Non-finite input falls back to the floor size at the image edge
    let size = if size.is_finite() { size.round().clamp(floor, extent as f32) } else { floor };
    let size = size as u32;
    let origin = if origin.is_finite() { origin.round() } else { 0.0 };
    let origin = origin.clamp(0.0, (extent - size) as f32) as u32;
    (size, origin)
}
