//! Crop selection
//!
//! The crop rectangle is kept in image-pixel space. [`region::CropRegion`]
//! owns it and enforces bounds, [`controller::InteractionController`] turns
//! pointer gestures into rectangle updates, and [`FlowProfile`] carries the
//! per-flow preset fractions and binarization threshold.

pub mod controller;
pub mod region;

pub use controller::{DragSession, GestureKind, InteractionController};
pub use region::CropRegion;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Smallest allowed crop width/height in image pixels
pub const MIN_CROP_SIZE: u32 = 60;

/// Crop rectangle in image-pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl CropRect {
    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    /// Whether the rectangle lies entirely inside a `width x height` image
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }
}

impl fmt::Display for CropRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.w, self.h)
    }
}

impl FromStr for CropRect {
    type Err = String;

    /// Parses `x,y,w,h`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(format!("expected x,y,w,h but got '{s}'"));
        }

        let mut values = [0u32; 4];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = part
                .parse()
                .map_err(|_| format!("'{part}' is not a non-negative integer"))?;
        }

        Ok(Self {
            x: values[0],
            y: values[1],
            w: values[2],
            h: values[3],
        })
    }
}

/// Unclamped rectangle candidate, as produced by gestures and presets
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl From<CropRect> for RectF {
    fn from(r: CropRect) -> Self {
        Self {
            x: r.x as f32,
            y: r.y as f32,
            w: r.w as f32,
            h: r.h as f32,
        }
    }
}

/// Corner resize handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    pub fn is_top(self) -> bool {
        matches!(self, Corner::TopLeft | Corner::TopRight)
    }

    pub fn is_left(self) -> bool {
        matches!(self, Corner::TopLeft | Corner::BottomLeft)
    }
}

/// Named crop presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Top-left band holding the card name (stays clear of the HP box)
    Name,
    /// Bottom-left band holding the set code and number
    #[default]
    Code,
}

/// Preset rectangle as fractions of the image dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresetFractions {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl PresetFractions {
    /// Scale to an image, rounding to whole pixels
    pub fn to_candidate(&self, image_width: u32, image_height: u32) -> RectF {
        let (iw, ih) = (image_width as f32, image_height as f32);
        RectF {
            x: (iw * self.x).round(),
            y: (ih * self.y).round(),
            w: (iw * self.w).round(),
            h: (ih * self.h).round(),
        }
    }
}

/// Header strip, shared by both flows
pub const NAME_STRIP: PresetFractions = PresetFractions { x: 0.06, y: 0.03, w: 0.62, h: 0.16 };

/// Code strip used by the interactive crop-then-OCR flow
pub const CODE_STRIP_INTERACTIVE: PresetFractions = PresetFractions { x: 0.02, y: 0.78, w: 0.65, h: 0.20 };

/// Code strip used by the fixed-band auto-scan flow
pub const CODE_STRIP_AUTO_SCAN: PresetFractions = PresetFractions { x: 0.02, y: 0.78, w: 0.60, h: 0.20 };

/// Binarization threshold for the interactive flow
pub const THRESHOLD_INTERACTIVE: u8 = 165;

/// Binarization threshold for the auto-scan flow
pub const THRESHOLD_AUTO_SCAN: u8 = 160;

/// Which capture flow a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// User drags and resizes the crop before running OCR
    #[default]
    Interactive,
    /// Crop is fixed to the code band and scanned directly
    AutoScan,
}

impl FlowKind {
    pub fn profile(self) -> FlowProfile {
        match self {
            FlowKind::Interactive => FlowProfile::INTERACTIVE,
            FlowKind::AutoScan => FlowProfile::AUTO_SCAN,
        }
    }
}

/// Tuning for one capture flow
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowProfile {
    pub kind: FlowKind,
    /// Whether pointer gestures may change the crop
    pub adjustable: bool,
    /// Luminance threshold for binarization
    pub threshold: u8,
    pub name_strip: PresetFractions,
    pub code_strip: PresetFractions,
}

impl FlowProfile {
    pub const INTERACTIVE: FlowProfile = FlowProfile {
        kind: FlowKind::Interactive,
        adjustable: true,
        threshold: THRESHOLD_INTERACTIVE,
        name_strip: NAME_STRIP,
        code_strip: CODE_STRIP_INTERACTIVE,
    };

    pub const AUTO_SCAN: FlowProfile = FlowProfile {
        kind: FlowKind::AutoScan,
        adjustable: false,
        threshold: THRESHOLD_AUTO_SCAN,
        name_strip: NAME_STRIP,
        code_strip: CODE_STRIP_AUTO_SCAN,
    };

    pub fn preset(&self, preset: Preset) -> PresetFractions {
        match preset {
            Preset::Name => self.name_strip,
            Preset::Code => self.code_strip,
        }
    }
}
