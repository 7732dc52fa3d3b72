//! Windows OCR API backend
//!
//! Uses the built-in Windows OCR (Media.Ocr). The WinRT calls block, so
//! each request runs on the blocking thread pool.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use windows::{
    core::HSTRING,
    Globalization::Language,
    Graphics::Imaging::{BitmapPixelFormat, SoftwareBitmap},
    Media::Ocr::OcrEngine as WinOcrEngine,
    Storage::Streams::{DataReader, DataWriter, InMemoryRandomAccessStream},
};

use super::recognition::{ProgressSink, RecognitionError, RecognitionOptions, Recognizer};
use crate::capture::ImageBuffer;

/// Windows OCR engine wrapper
#[derive(Debug, Default)]
pub struct WindowsOcr;

impl WindowsOcr {
    pub fn new() -> Self {
        Self
    }
}

/// Map Tesseract style language codes to BCP-47 tags
pub fn language_tag(language: &str) -> &str {
    match language {
        "eng" => "en-US",
        "spa" => "es-ES",
        "fra" => "fr-FR",
        "deu" => "de-DE",
        "jpn" => "ja-JP",
        other => other,
    }
}

#[async_trait]
impl Recognizer for WindowsOcr {
    fn name(&self) -> &'static str {
        "windows-ocr"
    }

    async fn recognize(
        &self,
        image: &ImageBuffer,
        options: &RecognitionOptions,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<String, RecognitionError> {
        let tag = language_tag(&options.language).to_string();
        let (width, height) = image.dimensions();
        // Windows expects BGRA
        let mut bgra = image.data().to_vec();
        for chunk in bgra.chunks_exact_mut(4) {
            chunk.swap(0, 2);
        }

        progress.report("recognizing text", 0.0);
        let job = tokio::task::spawn_blocking(move || recognize_blocking(&tag, &bgra, width, height));

        let text = tokio::select! {
            _ = cancel.cancelled() => return Err(RecognitionError::Cancelled),
            joined = job => joined
                .map_err(|e| RecognitionError::Engine(e.to_string()))?
                .map_err(|e| RecognitionError::Engine(format!("{e:#}")))?,
        };
        progress.report("recognizing text", 1.0);

        Ok(text)
    }
}

fn create_engine(language_tag: &str) -> Result<WinOcrEngine> {
    let language = Language::CreateLanguage(&HSTRING::from(language_tag))
        .context("Failed to create language")?;

    if WinOcrEngine::IsLanguageSupported(&language).context("Failed to check language support")? {
        info!("Windows OCR using language {}", language_tag);
        return WinOcrEngine::TryCreateFromLanguage(&language)
            .context("Failed to create OCR engine for language");
    }

    warn!("Language '{}' not supported, falling back to user profile languages", language_tag);
    WinOcrEngine::TryCreateFromUserProfileLanguages().context("Failed to create OCR engine from user profile")
}

fn recognize_blocking(language_tag: &str, bgra: &[u8], width: u32, height: u32) -> Result<String> {
    let engine = create_engine(language_tag)?;
    let bitmap = create_software_bitmap(bgra, width, height)?;

    debug!("Windows OCR: Processing {}x{} image", width, height);
    let result = engine
        .RecognizeAsync(&bitmap)
        .context("Failed to start OCR recognition")?
        .get()
        .context("OCR recognition failed")?;

    Ok(result.Text().context("Failed to get OCR text")?.to_string())
}

/// Create a SoftwareBitmap from BGRA data
fn create_software_bitmap(bgra: &[u8], width: u32, height: u32) -> Result<SoftwareBitmap> {
    let stream = InMemoryRandomAccessStream::new().context("Failed to create in-memory stream")?;

    let writer = DataWriter::CreateDataWriter(&stream).context("Failed to create data writer")?;
    writer.WriteBytes(bgra).context("Failed to write pixel data")?;
    writer.StoreAsync().context("Failed to start store operation")?.get().context("Failed to store data")?;
    writer.FlushAsync().context("Failed to start flush operation")?.get().context("Failed to flush data")?;

    let reader = DataReader::CreateDataReader(&stream.GetInputStreamAt(0).context("Failed to get input stream")?)
        .context("Failed to create data reader")?;
    reader
        .LoadAsync(bgra.len() as u32)
        .context("Failed to start load operation")?
        .get()
        .context("Failed to load data")?;
    let buffer = reader.ReadBuffer(bgra.len() as u32).context("Failed to read buffer")?;

    let bitmap = SoftwareBitmap::Create(BitmapPixelFormat::Bgra8, width as i32, height as i32)
        .context("Failed to create SoftwareBitmap")?;
    bitmap.CopyFromBuffer(&buffer).context("Failed to copy buffer to bitmap")?;

    Ok(bitmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_tag() {
        assert_eq!(language_tag("eng"), "en-US");
        assert_eq!(language_tag("en-GB"), "en-GB");
    }
}
