//! Region extraction and binarization for OCR
//!
//! Printed set codes are small and low contrast; cutting the crop out and
//! forcing it to pure black and white gives the recognizer a much cleaner
//! input than the raw photo.

use tracing::debug;

use crate::capture::{CaptureError, ImageBuffer};
use crate::crop::CropRect;

/// Contrast stretch applied around mid-grey before thresholding
pub const CONTRAST_FACTOR: f32 = 1.4;

/// Copy exactly the pixels inside `rect` into a new `rect.w x rect.h` buffer.
///
/// The rectangle is clipped to the image first; crop rectangles produced by
/// [`crate::crop::CropRegion`] are always inside it already.
pub fn extract(image: &ImageBuffer, rect: CropRect) -> Result<ImageBuffer, CaptureError> {
    let (img_width, img_height) = image.dimensions();

    let x = rect.x.min(img_width - 1);
    let y = rect.y.min(img_height - 1);
    let width = rect.w.clamp(1, img_width - x);
    let height = rect.h.clamp(1, img_height - y);

    let data = image.data();
    let mut region = Vec::with_capacity(width as usize * height as usize * 4);

    for row in y..(y + height) {
        let start = (row as usize * img_width as usize + x as usize) * 4;
        let end = start + width as usize * 4;
        region.extend_from_slice(&data[start..end]);
    }

    ImageBuffer::new(width, height, region)
}

/// Contrast-stretched luminance of one pixel
pub fn stretched_luminance(r: u8, g: u8, b: u8) -> f32 {
    let luminance = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    (luminance - 128.0) * CONTRAST_FACTOR + 128.0
}

/// Threshold RGBA data in place: black when the stretched luminance is at
/// or below `threshold`, white otherwise. Alpha is left unchanged.
pub fn binarize_in_place(data: &mut [u8], threshold: u8) {
    let threshold = threshold as f32;
    for chunk in data.chunks_exact_mut(4) {
        let value = if stretched_luminance(chunk[0], chunk[1], chunk[2]) <= threshold {
            0
        } else {
            255
        };
        chunk[0] = value;
        chunk[1] = value;
        chunk[2] = value;
    }
}

/// Binarized copy of a buffer
pub fn binarize(buffer: &ImageBuffer, threshold: u8) -> ImageBuffer {
    let mut out = buffer.clone();
    binarize_in_place(out.data_mut(), threshold);
    out
}

/// Extract the crop and binarize it: the buffer handed to the recognizer
pub fn normalize(image: &ImageBuffer, rect: CropRect, threshold: u8) -> Result<ImageBuffer, CaptureError> {
    let mut region = extract(image, rect)?;
    binarize_in_place(region.data_mut(), threshold);
    debug!(
        "Normalized crop {} to {}x{} (threshold {})",
        rect,
        region.width(),
        region.height(),
        threshold
    );
    Ok(region)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x3 image where every pixel encodes its own coordinates
    fn coordinate_image() -> ImageBuffer {
        let mut data = Vec::new();
        for y in 0..3u8 {
            for x in 0..4u8 {
                data.extend_from_slice(&[x, y, 7, 255]);
            }
        }
        ImageBuffer::new(4, 3, data).unwrap()
    }

    #[test]
    fn test_extract_copies_exact_region() {
        let img = coordinate_image();
        let region = extract(&img, CropRect { x: 1, y: 1, w: 2, h: 2 }).unwrap();

        assert_eq!(region.dimensions(), (2, 2));
        assert_eq!(region.pixel(0, 0), Some([1, 1, 7, 255]));
        assert_eq!(region.pixel(1, 0), Some([2, 1, 7, 255]));
        assert_eq!(region.pixel(0, 1), Some([1, 2, 7, 255]));
        assert_eq!(region.pixel(1, 1), Some([2, 2, 7, 255]));
    }

    #[test]
    fn test_extract_full_image() {
        let img = coordinate_image();
        let region = extract(&img, CropRect { x: 0, y: 0, w: 4, h: 3 }).unwrap();
        assert_eq!(region, img);
    }

    #[test]
    fn test_binarize_thresholds() {
        // Mid grey 128 stays 128 after stretching -> black at 165
        // Grey 160 -> (160-128)*1.4+128 = 172.8 -> white at 165, white at 160
        // Grey 155 -> 165.8 -> white at 165
        // Grey 154 -> 164.4 -> black at 165, white at 160
        let mut data = vec![
            128, 128, 128, 255,
            160, 160, 160, 10,
            155, 155, 155, 255,
            154, 154, 154, 0,
        ];
        let original = data.clone();
        binarize_in_place(&mut data, 165);
        assert_eq!(data, vec![0, 0, 0, 255, 255, 255, 255, 10, 255, 255, 255, 255, 0, 0, 0, 0]);

        let mut data = original;
        binarize_in_place(&mut data, 160);
        assert_eq!(&data[12..16], &[255, 255, 255, 0]);
    }

    #[test]
    fn test_binarize_output_is_pure_black_or_white() {
        let data: Vec<u8> = (0..=255u8)
            .flat_map(|v| [v, v.wrapping_mul(37), v.wrapping_add(91), v])
            .collect();
        let img = ImageBuffer::new(16, 16, data.clone()).unwrap();

        for threshold in [1, 100, 160, 165, 254] {
            let out = binarize(&img, threshold);
            for (px, src) in out.data().chunks_exact(4).zip(data.chunks_exact(4)) {
                assert!(px[0] == 0 || px[0] == 255);
                assert_eq!(px[0], px[1]);
                assert_eq!(px[1], px[2]);
                assert_eq!(px[3], src[3], "alpha must be preserved");
            }
        }
    }

    #[test]
    fn test_binarize_is_idempotent() {
        let img = ImageBuffer::new(2, 1, vec![0, 0, 0, 255, 255, 255, 255, 255]).unwrap();
        for threshold in [1, 160, 165, 254] {
            let once = binarize(&img, threshold);
            assert_eq!(once, img);
            assert_eq!(binarize(&once, threshold), once);
        }
    }

    #[test]
    fn test_normalize_matches_extract_then_binarize() {
        let img = ImageBuffer::filled(100, 80, [200, 200, 200, 255]).unwrap();
        let rect = CropRect { x: 10, y: 10, w: 60, h: 60 };
        let out = normalize(&img, rect, 165).unwrap();
        assert_eq!(out, binarize(&extract(&img, rect).unwrap(), 165));
        assert_eq!(out.pixel(0, 0), Some([255, 255, 255, 255]));
    }
}
