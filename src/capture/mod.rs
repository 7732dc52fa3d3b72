//! Image acquisition
//!
//! Two origins feed the pipeline: a user-supplied image file and frames from
//! a live camera. Both end up as an [`ImageBuffer`]. Camera streams are
//! scoped resources behind [`FrameSource`]; the session stops the previous
//! stream before installing a new one.

pub mod frame;

pub use frame::ImageBuffer;

use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Widest uploaded image kept at full resolution
pub const DEFAULT_MAX_UPLOAD_WIDTH: u32 = 1400;

/// Acquisition failures
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to read image file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has no pixels")]
    EmptyImage,
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("no frame available yet")]
    NoFrame,
}

/// A live frame provider such as a camera stream
pub trait FrameSource {
    /// Human readable description for logs
    fn describe(&self) -> String;

    /// Grab the most recent frame
    fn next_frame(&mut self) -> Result<ImageBuffer, CaptureError>;

    /// Stop the stream and release device handles. Must be idempotent.
    fn stop(&mut self);
}

/// Load an image file, downscaling proportionally when wider than `max_width`
pub fn load_file(path: &Path, max_width: u32) -> Result<ImageBuffer, CaptureError> {
    let bytes = std::fs::read(path).map_err(|source| CaptureError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let buffer = decode(&bytes, max_width)?;
    info!(
        "Loaded {:?} as {}x{}",
        path,
        buffer.width(),
        buffer.height()
    );
    Ok(buffer)
}

/// Decode encoded image bytes (PNG, JPEG, ...)
pub fn decode(bytes: &[u8], max_width: u32) -> Result<ImageBuffer, CaptureError> {
    let img = image::load_from_memory(bytes)?;
    let (width, height) = (img.width(), img.height());

    let img = if max_width > 0 && width > max_width {
        let ratio = max_width as f32 / width as f32;
        let new_height = ((height as f32 * ratio).round() as u32).max(1);
        debug!(
            "Downscaling {}x{} to {}x{}",
            width, height, max_width, new_height
        );
        img.resize_exact(max_width, new_height, FilterType::Triangle)
    } else {
        img
    };

    ImageBuffer::try_from(img.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_keeps_small_images() {
        let buffer = decode(&encode_png(300, 200), DEFAULT_MAX_UPLOAD_WIDTH).unwrap();
        assert_eq!(buffer.dimensions(), (300, 200));
        assert_eq!(buffer.pixel(5, 5), Some([10, 20, 30, 255]));
    }

    #[test]
    fn test_decode_downscales_wide_images() {
        let buffer = decode(&encode_png(2800, 1000), DEFAULT_MAX_UPLOAD_WIDTH).unwrap();
        assert_eq!(buffer.dimensions(), (1400, 500));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode(b"definitely not an image", 1400),
            Err(CaptureError::Decode(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_file(Path::new("/nonexistent/card.png"), 1400).unwrap_err();
        assert!(matches!(err, CaptureError::Io { .. }));
    }
}
