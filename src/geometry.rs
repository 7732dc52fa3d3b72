//! Coordinate mapping between display space and image space
//!
//! Pointer events arrive in display (screen) pixels while the crop rectangle
//! lives in the pixel space of the underlying image. These helpers convert
//! in both directions and resolve which part of the crop outline a pointer
//! is over.

use serde::{Deserialize, Serialize};

use crate::crop::{CropRect, Corner};

/// A point in either display or image space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// On-screen rectangle the image is drawn into (display pixels)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DisplayRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl DisplayRect {
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self { left, top, width, height }
    }

    /// Whether the rectangle has a usable (positive) area
    pub fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right() && p.y >= self.top && p.y <= self.bottom()
    }

    /// Position of a corner of this rectangle
    pub fn corner(&self, corner: Corner) -> Point {
        match corner {
            Corner::TopLeft => Point::new(self.left, self.top),
            Corner::TopRight => Point::new(self.right(), self.top),
            Corner::BottomLeft => Point::new(self.left, self.bottom()),
            Corner::BottomRight => Point::new(self.right(), self.bottom()),
        }
    }
}

/// Convert a display-space point into image-space pixels.
///
/// A display rectangle without area maps everything to the image origin.
pub fn to_image_space(point: Point, display: DisplayRect, image_width: u32, image_height: u32) -> Point {
    if !display.is_visible() {
        return Point::default();
    }

    let fx = (point.x - display.left) / display.width;
    let fy = (point.y - display.top) / display.height;

    Point::new(fx * image_width as f32, fy * image_height as f32)
}

/// Convert an image-space point back to display pixels
pub fn to_display_space(point: Point, display: DisplayRect, image_width: u32, image_height: u32) -> Point {
    if image_width == 0 || image_height == 0 {
        return Point::new(display.left, display.top);
    }

    let fx = point.x / image_width as f32;
    let fy = point.y / image_height as f32;

    Point::new(display.left + fx * display.width, display.top + fy * display.height)
}

/// Map a crop rectangle to its on-screen outline.
///
/// Called whenever the rectangle or the viewport changes so that the box and
/// its corner handles can be repositioned.
pub fn rect_to_display(rect: CropRect, display: DisplayRect, image_width: u32, image_height: u32) -> DisplayRect {
    let min = to_display_space(
        Point::new(rect.x as f32, rect.y as f32),
        display,
        image_width,
        image_height,
    );
    let max = to_display_space(
        Point::new(rect.right() as f32, rect.bottom() as f32),
        display,
        image_width,
        image_height,
    );

    DisplayRect::new(min.x, min.y, max.x - min.x, max.y - min.y)
}

/// What part of the crop outline a pointer landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    /// One of the four resize handles
    Handle(Corner),
    /// Inside the rectangle but not on a handle
    Body,
}

/// Resolve which element of the crop outline is under a display-space pointer.
///
/// Handles take precedence over the body and extend `handle_radius` display
/// pixels around each corner, so they can be grabbed slightly outside the box.
pub fn hit_test(outline: DisplayRect, point: Point, handle_radius: f32) -> Option<HitTarget> {
    for corner in Corner::ALL {
        let c = outline.corner(corner);
        if (point.x - c.x).abs() <= handle_radius && (point.y - c.y).abs() <= handle_radius {
            return Some(HitTarget::Handle(corner));
        }
    }

    if outline.contains(point) {
        Some(HitTarget::Body)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEW: DisplayRect = DisplayRect::new(10.0, 20.0, 400.0, 300.0);

    #[test]
    fn test_to_image_space() {
        let p = to_image_space(Point::new(210.0, 170.0), VIEW, 800, 600);
        assert!((p.x - 400.0).abs() < 0.001);
        assert!((p.y - 300.0).abs() < 0.001);
    }

    #[test]
    fn test_zero_sized_display_is_noop() {
        let empty = DisplayRect::new(5.0, 5.0, 0.0, 0.0);
        let p = to_image_space(Point::new(50.0, 50.0), empty, 800, 600);
        assert_eq!(p, Point::default());
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let views = [
            VIEW,
            DisplayRect::new(0.0, 0.0, 1280.0, 720.0),
            DisplayRect::new(-30.0, 12.5, 333.0, 97.0),
        ];
        let points = [
            Point::new(10.0, 20.0),
            Point::new(123.4, 56.7),
            Point::new(409.0, 319.0),
            Point::new(-50.0, 1000.0),
        ];

        for view in views {
            for p in points {
                let image = to_image_space(p, view, 1400, 1960);
                let back = to_display_space(image, view, 1400, 1960);
                assert!((back.x - p.x).abs() < 0.01, "{p:?} -> {back:?}");
                assert!((back.y - p.y).abs() < 0.01, "{p:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn test_rect_to_display() {
        let rect = CropRect { x: 100, y: 150, w: 200, h: 60 };
        let outline = rect_to_display(rect, VIEW, 800, 600);

        assert!((outline.left - 60.0).abs() < 0.001);
        assert!((outline.top - 95.0).abs() < 0.001);
        assert!((outline.width - 100.0).abs() < 0.001);
        assert!((outline.height - 30.0).abs() < 0.001);
    }

    #[test]
    fn test_hit_test_prefers_handles() {
        let outline = DisplayRect::new(100.0, 100.0, 200.0, 80.0);

        assert_eq!(
            hit_test(outline, Point::new(98.0, 103.0), 8.0),
            Some(HitTarget::Handle(Corner::TopLeft))
        );
        assert_eq!(
            hit_test(outline, Point::new(305.0, 182.0), 8.0),
            Some(HitTarget::Handle(Corner::BottomRight))
        );
        assert_eq!(hit_test(outline, Point::new(200.0, 140.0), 8.0), Some(HitTarget::Body));
        assert_eq!(hit_test(outline, Point::new(20.0, 20.0), 8.0), None);
    }
}
