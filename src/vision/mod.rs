//! Vision/OCR Layer
//!
//! Normalizes the cropped region and hands it to a recognition engine.
//! Supports multiple OCR backends:
//! - Tesseract via its command line (default, all platforms)
//! - Windows OCR API (Windows only)

pub mod preprocess;
pub mod recognition;
pub mod tesseract;
#[cfg(windows)]
pub mod windows_ocr;

pub use preprocess::{binarize, extract, normalize};
pub use recognition::{
    start_recognition, ProgressSink, ProgressStream, RecognitionError, RecognitionOptions,
    RecognitionProgress, RecognitionTask, Recognizer,
};
pub use tesseract::TesseractCli;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::RecognitionSettings;

/// OCR backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackend {
    /// Tesseract command line tool
    #[default]
    Tesseract,
    /// Windows built-in OCR
    WindowsOcr,
}

/// How the engine should segment the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSegmentation {
    /// Fully automatic layout analysis
    Auto,
    /// Treat the input as a single uniform block of text
    #[default]
    SingleBlock,
    /// Treat the input as a single text line
    SingleLine,
}

impl PageSegmentation {
    /// Tesseract `--psm` value
    pub fn psm(self) -> u8 {
        match self {
            PageSegmentation::Auto => 3,
            PageSegmentation::SingleBlock => 6,
            PageSegmentation::SingleLine => 7,
        }
    }
}

/// Build the recognizer selected in the settings
pub fn create_recognizer(settings: &RecognitionSettings) -> Result<Arc<dyn Recognizer>, RecognitionError> {
    info!("Using {:?} OCR backend", settings.backend);
    match settings.backend {
        OcrBackend::Tesseract => Ok(Arc::new(TesseractCli::new(settings.tesseract_path.clone()))),
        #[cfg(windows)]
        OcrBackend::WindowsOcr => Ok(Arc::new(windows_ocr::WindowsOcr::new())),
        #[cfg(not(windows))]
        OcrBackend::WindowsOcr => Err(RecognitionError::Unavailable(
            "Windows OCR is only available on Windows".to_string(),
        )),
    }
}
