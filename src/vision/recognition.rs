//! Recognition adapter
//!
//! Runs a [`Recognizer`] on a normalized buffer in a spawned task and
//! exposes its progress as a finite [`Stream`]. The stream ends when the
//! engine finishes; the text (or a single terminal error) is collected with
//! [`RecognitionTask::finish`]. Tasks can be cancelled at any point.

use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::PageSegmentation;
use crate::capture::{CaptureError, ImageBuffer};

/// Recognition failures. No partial text survives an error.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("recognition engine unavailable: {0}")]
    Unavailable(String),
    #[error("recognition engine failed: {0}")]
    Engine(String),
    #[error("failed to encode image for recognition: {0}")]
    Encode(#[from] image::ImageError),
    #[error("invalid image buffer: {0}")]
    Buffer(#[from] CaptureError),
    #[error("recognition I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("recognition cancelled")]
    Cancelled,
}

/// Engine request options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    /// Language tag understood by the engine
    pub language: String,
    pub page_segmentation: PageSegmentation,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            page_segmentation: PageSegmentation::SingleBlock,
        }
    }
}

/// One progress update
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionProgress {
    /// Engine stage, e.g. "recognizing text"
    pub stage: String,
    /// Completion of that stage in [0, 1]
    pub fraction: f32,
}

impl RecognitionProgress {
    pub fn percent(&self) -> u32 {
        (self.fraction * 100.0).round() as u32
    }
}

/// Sending half of a progress stream, handed to the engine
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<RecognitionProgress>,
}

impl ProgressSink {
    /// Report a stage. Fractions are clamped into [0, 1].
    pub fn report(&self, stage: impl Into<String>, fraction: f32) {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        // Receiver gone means nobody is watching any more
        let _ = self.tx.send(RecognitionProgress {
            stage: stage.into(),
            fraction,
        });
    }
}

/// Receiving half: a lazy, finite stream of progress updates
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<RecognitionProgress>,
}

impl Stream for ProgressStream {
    type Item = RecognitionProgress;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Create a connected sink/stream pair
pub fn progress_channel() -> (ProgressSink, ProgressStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSink { tx }, ProgressStream { rx })
}

/// A text recognition engine
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Short engine name for logs
    fn name(&self) -> &'static str;

    /// Recognize text in `image`. Implementations should report progress
    /// through `progress` and stop early once `cancel` fires.
    async fn recognize(
        &self,
        image: &ImageBuffer,
        options: &RecognitionOptions,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<String, RecognitionError>;
}

/// A running recognition request
pub struct RecognitionTask {
    progress: ProgressStream,
    handle: JoinHandle<Result<String, RecognitionError>>,
    cancel: CancellationToken,
}

impl RecognitionTask {
    /// Progress updates; the stream ends when the engine finishes
    pub fn progress(&mut self) -> &mut ProgressStream {
        &mut self.progress
    }

    /// Request cancellation; `finish` then yields [`RecognitionError::Cancelled`]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the engine result
    pub async fn finish(self) -> Result<String, RecognitionError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(RecognitionError::Cancelled),
            Err(e) => Err(RecognitionError::Engine(format!("recognition task panicked: {e}"))),
        }
    }
}

/// Start recognizing `image` on the current tokio runtime.
///
/// Cancelling `cancel` (or calling [`RecognitionTask::cancel`]) stops the
/// engine and makes the task finish with [`RecognitionError::Cancelled`].
pub fn start_recognition(
    engine: Arc<dyn Recognizer>,
    image: ImageBuffer,
    options: RecognitionOptions,
    cancel: CancellationToken,
) -> RecognitionTask {
    let (sink, progress) = progress_channel();
    let token = cancel.clone();

    let handle = tokio::spawn(async move {
        debug!(
            "{} recognizing {}x{} ({}, {:?})",
            engine.name(),
            image.width(),
            image.height(),
            options.language,
            options.page_segmentation
        );

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(RecognitionError::Cancelled),
            result = engine.recognize(&image, &options, &sink, &token) => result,
        };

        match &result {
            Ok(_) => sink.report("done", 1.0),
            Err(e) => warn!("{} recognition failed: {}", engine.name(), e),
        }

        result
    });

    RecognitionTask {
        progress,
        handle,
        cancel,
    }
}
