//! RGBA image buffer shared by the capture, crop and recognition steps

use image::RgbaImage;

use super::CaptureError;

/// An acquired image in RGBA8 layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    /// Raw RGBA pixel data, row-major
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl ImageBuffer {
    /// Wrap raw RGBA data, checking that it matches the dimensions
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::EmptyImage);
        }

        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(CaptureError::BufferSize {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self { data, width, height })
    }

    /// Image filled with a single RGBA color
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, CaptureError> {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// RGBA value at a pixel, if in bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.data[idx..idx + 4]);
        Some(px)
    }

    pub fn into_rgba_image(self) -> Result<RgbaImage, CaptureError> {
        let expected = self.width as usize * self.height as usize * 4;
        let actual = self.data.len();
        RgbaImage::from_raw(self.width, self.height, self.data)
            .ok_or(CaptureError::BufferSize { expected, actual })
    }
}

impl TryFrom<RgbaImage> for ImageBuffer {
    type Error = CaptureError;

    fn try_from(img: RgbaImage) -> Result<Self, Self::Error> {
        let (width, height) = img.dimensions();
        Self::new(width, height, img.into_raw())
    }
}
