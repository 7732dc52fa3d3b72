//! Tesseract command line backend
//!
//! The buffer is encoded as PNG and piped to `tesseract stdin stdout`, so no
//! temporary files are involved. The child is killed if the request is
//! cancelled or dropped.

use async_trait::async_trait;
use image::ImageFormat;
use std::io::Cursor;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::recognition::{ProgressSink, RecognitionError, RecognitionOptions, Recognizer};
use crate::capture::ImageBuffer;

/// Runs the `tesseract` executable
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: PathBuf,
}

impl TesseractCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for reading PNG from stdin and writing text to stdout
    pub fn args(options: &RecognitionOptions) -> Vec<String> {
        vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            options.language.clone(),
            "--psm".to_string(),
            options.page_segmentation.psm().to_string(),
        ]
    }
}

/// Encode a buffer as PNG bytes
pub fn encode_png(image: &ImageBuffer) -> Result<Vec<u8>, RecognitionError> {
    let mut out = Cursor::new(Vec::new());
    image.clone().into_rgba_image()?.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[async_trait]
impl Recognizer for TesseractCli {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn recognize(
        &self,
        image: &ImageBuffer,
        options: &RecognitionOptions,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<String, RecognitionError> {
        progress.report("encoding image", 0.0);
        let png = encode_png(image)?;
        progress.report("encoding image", 1.0);

        let args = Self::args(options);
        debug!("Running {:?} {}", self.program, args.join(" "));

        progress.report("initializing tesseract", 0.0);
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => RecognitionError::Unavailable(format!(
                    "{:?} not found; install Tesseract or set recognition.tesseract_path",
                    self.program
                )),
                _ => RecognitionError::Io(e),
            })?;
        progress.report("initializing tesseract", 1.0);

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecognitionError::Engine("tesseract stdin unavailable".to_string()))?;
        let feed = async move {
            stdin.write_all(&png).await?;
            stdin.shutdown().await
        };

        progress.report("recognizing text", 0.0);
        let run = async { tokio::join!(feed, child.wait_with_output()) };

        let (fed, output) = tokio::select! {
            _ = cancel.cancelled() => return Err(RecognitionError::Cancelled),
            done = run => done,
        };

        let output = output?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::Engine(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        // A write error with a successful exit means tesseract stopped reading early
        fed?;

        progress.report("recognizing text", 1.0);
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        info!("Tesseract recognized {} characters", text.trim().len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::recognition::progress_channel;
    use crate::vision::PageSegmentation;

    #[test]
    fn test_args() {
        let options = RecognitionOptions {
            language: "eng".to_string(),
            page_segmentation: PageSegmentation::SingleBlock,
        };
        assert_eq!(
            TesseractCli::args(&options),
            vec!["stdin", "stdout", "-l", "eng", "--psm", "6"]
        );
    }

    #[test]
    fn test_encode_png_round_trips() {
        let img = ImageBuffer::filled(5, 3, [0, 0, 0, 255]).unwrap();
        let png = encode_png(&img).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (5, 3));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let engine = TesseractCli::new("/nonexistent/bin/tesseract");
        let img = ImageBuffer::filled(4, 4, [255, 255, 255, 255]).unwrap();
        let (sink, _stream) = progress_channel();

        let err = engine
            .recognize(&img, &RecognitionOptions::default(), &sink, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RecognitionError::Unavailable(_)));
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use futures_util::StreamExt;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;
        use std::time::{Duration, Instant};

        /// Executable shell script standing in for the tesseract binary
        fn fake_tesseract(dir: &Path, body: &str) -> TesseractCli {
            let path = dir.join("tesseract");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            TesseractCli::new(path)
        }

        fn card_strip() -> ImageBuffer {
            ImageBuffer::filled(40, 12, [0, 0, 0, 255]).unwrap()
        }

        #[tokio::test]
        async fn test_reads_text_from_stdout() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_tesseract(dir.path(), "cat >/dev/null\necho 'DRI 104/182'");
            let (sink, stream) = progress_channel();

            let text = engine
                .recognize(&card_strip(), &RecognitionOptions::default(), &sink, &CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(text.trim(), "DRI 104/182");

            drop(sink);
            let mut stages: Vec<String> = stream.map(|p| p.stage).collect().await;
            stages.dedup();
            assert_eq!(stages, vec!["encoding image", "initializing tesseract", "recognizing text"]);
        }

        #[tokio::test]
        async fn test_nonzero_exit_is_engine_error() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_tesseract(dir.path(), "echo 'bad language' >&2\nexit 3");
            let (sink, _stream) = progress_channel();

            let err = engine
                .recognize(&card_strip(), &RecognitionOptions::default(), &sink, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(&err, RecognitionError::Engine(msg) if msg.contains("bad language")), "{err}");
        }

        #[tokio::test]
        async fn test_cancel_stops_running_engine() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_tesseract(dir.path(), "sleep 30");
            let (sink, _stream) = progress_channel();
            let cancel = CancellationToken::new();

            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                trigger.cancel();
            });

            let started = Instant::now();
            let result = engine
                .recognize(&card_strip(), &RecognitionOptions::default(), &sink, &cancel)
                .await;
            assert!(matches!(result, Err(RecognitionError::Cancelled)));
            assert!(started.elapsed() < Duration::from_secs(10));
        }
    }
}
