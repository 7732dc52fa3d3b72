//! Scan session
//!
//! Owns everything one scanning session mutates: the active camera stream,
//! the captured image, the crop region and its drag state, the recognized
//! text and the identifier parsed from it. Each user-facing control maps to
//! one method. Actions that suspend (`run_recognition`, `run_search`) take
//! `&mut self`, so a second request cannot start while one is in flight.

use futures_util::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{CaptureError, FrameSource, ImageBuffer};
use crate::crop::{CropRect, CropRegion, FlowProfile, GestureKind, InteractionController, Preset};
use crate::geometry::{self, DisplayRect, HitTarget, Point};
use crate::lookup::{CardRecord, CardSearch, LookupError};
use crate::parser::{self, CardIdentifier};
use crate::vision::{
    normalize, start_recognition, RecognitionError, RecognitionOptions, RecognitionProgress, Recognizer,
};

/// Corner handles can be grabbed this many display pixels from the corner
pub const HANDLE_RADIUS: f32 = 14.0;

/// Failures of a session action. None of them end the session.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no image loaded")]
    NoImage,
    #[error("no camera stream running")]
    NoStream,
    #[error("the crop is fixed in this flow")]
    FixedCrop,
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl ScanError {
    /// Advice to show next to the error
    pub fn guidance(&self) -> &'static str {
        match self {
            ScanError::NoImage => "Take a snapshot or choose an image first.",
            ScanError::NoStream => "Start the camera before taking a snapshot.",
            ScanError::FixedCrop => "Switch to the interactive flow to adjust the crop.",
            ScanError::Capture(CaptureError::PermissionDenied(_)) => {
                "Allow camera access for this application and try again."
            }
            ScanError::Capture(_) => "Could not read the image. Try another photo or file.",
            ScanError::Recognition(RecognitionError::Unavailable(_)) => {
                "Install the OCR engine or pick another backend in the configuration."
            }
            ScanError::Recognition(RecognitionError::Cancelled) => "Recognition was cancelled.",
            ScanError::Recognition(_) => {
                "OCR failed. Reduce glare and make sure the text is sharp, then try again."
            }
            ScanError::Lookup(_) => "Card search failed. Check the connection and try again.",
        }
    }
}

/// Result of a successful recognition run
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionOutcome {
    /// Engine text with line breaks flattened
    pub raw: String,
    /// Cleaned text, as shown to the user
    pub cleaned: String,
    /// Identifier parsed from the text, if any
    pub identifier: Option<CardIdentifier>,
    /// Whether a search can be run with what was recognized
    pub search_enabled: bool,
}

/// What a search was made with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    Code(CardIdentifier),
    Name(String),
}

/// Result of a search action
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// At least one card matched
    Matches { query: SearchQuery, cards: Vec<CardRecord> },
    /// The service answered with no cards
    NoMatch { query: SearchQuery },
    /// Nothing to search with: no code, no text
    NeedsInput,
}

/// State of one scanning session
pub struct ScanSession {
    profile: FlowProfile,
    options: RecognitionOptions,
    stream: Option<Box<dyn FrameSource>>,
    image: Option<ImageBuffer>,
    region: Option<CropRegion>,
    controller: InteractionController,
    crop_visible: bool,
    recognized: Option<RecognitionOutcome>,
    /// Identifier box; holds the parsed code or the user's override text
    code_text: String,
    search_enabled: bool,
}

impl ScanSession {
    pub fn new(profile: FlowProfile, options: RecognitionOptions) -> Self {
        info!(
            "Scan session started ({:?} flow, threshold {})",
            profile.kind, profile.threshold
        );
        Self {
            profile,
            options,
            stream: None,
            image: None,
            region: None,
            controller: InteractionController::new(),
            crop_visible: true,
            recognized: None,
            code_text: String::new(),
            search_enabled: false,
        }
    }

    pub fn profile(&self) -> &FlowProfile {
        &self.profile
    }

    pub fn image(&self) -> Option<&ImageBuffer> {
        self.image.as_ref()
    }

    pub fn crop(&self) -> Option<CropRect> {
        self.region.as_ref().map(CropRegion::rect)
    }

    pub fn is_crop_visible(&self) -> bool {
        self.crop_visible
    }

    pub fn is_dragging(&self) -> bool {
        self.controller.is_dragging()
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn recognized(&self) -> Option<&RecognitionOutcome> {
        self.recognized.as_ref()
    }

    pub fn code_text(&self) -> &str {
        &self.code_text
    }

    pub fn can_search(&self) -> bool {
        self.search_enabled
    }

    /// Install a new camera stream, stopping the previous one first
    pub fn start_capture(&mut self, source: Box<dyn FrameSource>) {
        self.stop_stream();
        info!("Camera stream started: {}", source.describe());
        self.stream = Some(source);
    }

    /// Stop and release the active camera stream, if any
    pub fn stop_stream(&mut self) {
        if let Some(mut previous) = self.stream.take() {
            info!("Stopping camera stream: {}", previous.describe());
            previous.stop();
        }
    }

    /// Grab a frame from the active stream and make it the current image
    pub fn take_snapshot(&mut self) -> Result<CropRect, ScanError> {
        let stream = self.stream.as_mut().ok_or(ScanError::NoStream)?;
        let frame = stream.next_frame()?;
        Ok(self.load_image(frame))
    }

    /// Replace the current image (snapshot or upload).
    ///
    /// Clears recognition results and applies the code preset.
    pub fn load_image(&mut self, image: ImageBuffer) -> CropRect {
        let (width, height) = image.dimensions();
        debug!("New image {}x{}", width, height);

        self.controller.cancel();
        self.clear_results();

        let mut region = CropRegion::new(width, height);
        let rect = region.apply_preset(&self.profile.preset(Preset::Code));
        self.region = Some(region);
        self.image = Some(image);
        rect
    }

    /// Recompute the crop from a named preset
    pub fn choose_preset(&mut self, preset: Preset) -> Result<CropRect, ScanError> {
        let fractions = self.profile.preset(preset);
        let region = self.region.as_mut().ok_or(ScanError::NoImage)?;
        self.controller.cancel();
        Ok(region.apply_preset(&fractions))
    }

    /// Set the crop directly (clamped like any other edit)
    pub fn set_crop(&mut self, rect: CropRect) -> Result<CropRect, ScanError> {
        if !self.profile.adjustable {
            return Err(ScanError::FixedCrop);
        }
        let region = self.region.as_mut().ok_or(ScanError::NoImage)?;
        Ok(region.set_rectangle(rect.into()))
    }

    /// Show or hide the crop outline; returns the new visibility
    pub fn toggle_crop_visibility(&mut self) -> bool {
        self.crop_visible = !self.crop_visible;
        if !self.crop_visible {
            self.controller.cancel();
        }
        self.crop_visible
    }

    /// Where to draw the crop outline inside `display`
    pub fn crop_outline(&self, display: DisplayRect) -> Option<DisplayRect> {
        let region = self.region.as_ref()?;
        let (width, height) = region.image_size();
        Some(geometry::rect_to_display(region.rect(), display, width, height))
    }

    /// Pointer pressed at a display position. Returns whether a drag began.
    pub fn pointer_down(&mut self, pointer_id: u64, at: Point, display: DisplayRect) -> bool {
        if !self.profile.adjustable || !self.crop_visible {
            return false;
        }
        let Some(outline) = self.crop_outline(display) else {
            return false;
        };
        let Some(region) = self.region.as_ref() else {
            return false;
        };

        let kind = match geometry::hit_test(outline, at, HANDLE_RADIUS) {
            Some(HitTarget::Handle(corner)) => GestureKind::Resize(corner),
            Some(HitTarget::Body) => GestureKind::Move,
            None => return false,
        };

        let (width, height) = region.image_size();
        let start = geometry::to_image_space(at, display, width, height);
        self.controller.pointer_down(pointer_id, kind, start, region)
    }

    /// Pointer moved. Returns the updated crop while a drag is active.
    pub fn pointer_move(&mut self, pointer_id: u64, at: Point, display: DisplayRect) -> Option<CropRect> {
        let region = self.region.as_mut()?;
        let (width, height) = region.image_size();
        let current = geometry::to_image_space(at, display, width, height);
        self.controller.pointer_move(pointer_id, current, region)
    }

    pub fn pointer_up(&mut self, pointer_id: u64) {
        self.controller.pointer_up(pointer_id);
    }

    pub fn pointer_cancel(&mut self) {
        self.controller.cancel();
    }

    /// The binarized crop that recognition will receive
    pub fn normalized_crop(&self) -> Result<ImageBuffer, ScanError> {
        let image = self.image.as_ref().ok_or(ScanError::NoImage)?;
        let region = self.region.as_ref().ok_or(ScanError::NoImage)?;
        Ok(normalize(image, region.rect(), self.profile.threshold)?)
    }

    /// Run OCR on the current crop and parse the result.
    ///
    /// `on_progress` sees every progress update as it arrives. Cancelling
    /// `cancel` aborts the engine.
    pub async fn run_recognition<F>(
        &mut self,
        engine: Arc<dyn Recognizer>,
        cancel: CancellationToken,
        mut on_progress: F,
    ) -> Result<RecognitionOutcome, ScanError>
    where
        F: FnMut(&RecognitionProgress),
    {
        let buffer = self.normalized_crop()?;
        self.clear_results();

        let mut task = start_recognition(engine, buffer, self.options.clone(), cancel);
        while let Some(progress) = task.progress().next().await {
            on_progress(&progress);
        }

        let result = task.finish().await;
        self.apply_recognition(result)
    }

    /// Record an engine result: clean, parse and decide whether search is possible
    pub fn apply_recognition(&mut self, result: Result<String, RecognitionError>) -> Result<RecognitionOutcome, ScanError> {
        let text = match result {
            Ok(text) => text,
            Err(e) => {
                warn!("Recognition failed: {}", e);
                self.clear_results();
                return Err(e.into());
            }
        };

        let raw = text.replace(['\r', '\n'], " ").trim().to_string();
        let cleaned = parser::clean(&raw);
        let identifier = parser::extract(&cleaned);

        let search_enabled = match &identifier {
            Some(id) => {
                info!("Identifier found: {}", id);
                self.code_text = id.to_string();
                true
            }
            None => {
                info!("No identifier in {:?}", cleaned);
                self.code_text.clear();
                parser::is_searchable_text(&cleaned)
            }
        };

        let outcome = RecognitionOutcome {
            raw,
            cleaned,
            identifier,
            search_enabled,
        };
        self.search_enabled = search_enabled;
        self.recognized = Some(outcome.clone());
        Ok(outcome)
    }

    /// Free-text override of the identifier box
    pub fn set_override(&mut self, text: &str) {
        self.code_text = text.trim().to_string();
        if !self.code_text.is_empty() {
            self.search_enabled = true;
        }
    }

    /// Decide what to search for: a code parsed from the identifier box,
    /// else the box as a name, else the recognized text as a name
    pub fn search_query(&self) -> Option<SearchQuery> {
        if let Some(id) = parser::extract(&self.code_text) {
            return Some(SearchQuery::Code(id));
        }

        let name = if !self.code_text.is_empty() {
            self.code_text.as_str()
        } else {
            self.recognized.as_ref().map(|r| r.cleaned.trim()).unwrap_or("")
        };

        (!name.is_empty()).then(|| SearchQuery::Name(name.to_string()))
    }

    /// Look the card up
    pub async fn run_search(&mut self, search: &dyn CardSearch) -> Result<SearchOutcome, ScanError> {
        let Some(query) = self.search_query() else {
            return Ok(SearchOutcome::NeedsInput);
        };

        let cards = match &query {
            SearchQuery::Code(id) => search.search_by_code(&id.set_code, &id.number).await?,
            SearchQuery::Name(name) => search.search_by_name(name).await?,
        };

        if cards.is_empty() {
            info!("No cards for {:?}", query);
            Ok(SearchOutcome::NoMatch { query })
        } else {
            Ok(SearchOutcome::Matches { query, cards })
        }
    }

    /// Tear down: stop the stream and forget the image
    pub fn stop(&mut self) {
        self.stop_stream();
        self.controller.cancel();
        self.clear_results();
        self.image = None;
        self.region = None;
    }

    fn clear_results(&mut self) {
        self.recognized = None;
        self.code_text.clear();
        self.search_enabled = false;
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::{Corner, FlowKind, MIN_CROP_SIZE};
    use crate::lookup::{code_query, name_query};
    use crate::vision::recognition::tests::ScriptedRecognizer;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const VIEW: DisplayRect = DisplayRect::new(0.0, 0.0, 500.0, 700.0);

    fn card_image() -> ImageBuffer {
        ImageBuffer::filled(1000, 1400, [230, 230, 230, 255]).unwrap()
    }

    fn session() -> ScanSession {
        let mut session = ScanSession::new(FlowProfile::INTERACTIVE, RecognitionOptions::default());
        session.load_image(card_image());
        session
    }

    struct FakeCamera {
        stops: Arc<AtomicUsize>,
    }

    impl FrameSource for FakeCamera {
        fn describe(&self) -> String {
            "fake camera".to_string()
        }

        fn next_frame(&mut self) -> Result<ImageBuffer, CaptureError> {
            ImageBuffer::filled(640, 480, [0, 0, 0, 255])
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingSearch {
        queries: Mutex<Vec<String>>,
        cards: Vec<CardRecord>,
        fail: bool,
    }

    impl RecordingSearch {
        fn answer(&self, query: String) -> Result<Vec<CardRecord>, LookupError> {
            self.queries.lock().unwrap().push(query);
            if self.fail {
                Err(LookupError::Status { status: 503 })
            } else {
                Ok(self.cards.clone())
            }
        }
    }

    #[async_trait]
    impl CardSearch for RecordingSearch {
        async fn search_by_code(&self, set_code: &str, number: &str) -> Result<Vec<CardRecord>, LookupError> {
            self.answer(code_query(set_code, number))
        }

        async fn search_by_name(&self, name: &str) -> Result<Vec<CardRecord>, LookupError> {
            self.answer(name_query(name))
        }
    }

    #[test]
    fn test_load_image_applies_code_preset() {
        let session = session();
        assert_eq!(session.crop(), Some(CropRect { x: 20, y: 1092, w: 650, h: 280 }));
        assert!(!session.can_search());
    }

    #[test]
    fn test_auto_scan_uses_narrower_code_strip() {
        let mut session = ScanSession::new(FlowKind::AutoScan.profile(), RecognitionOptions::default());
        session.load_image(card_image());
        assert_eq!(session.crop().unwrap().w, 600);
    }

    #[test]
    fn test_choose_preset_requires_image() {
        let mut session = ScanSession::new(FlowProfile::INTERACTIVE, RecognitionOptions::default());
        assert!(matches!(session.choose_preset(Preset::Name), Err(ScanError::NoImage)));

        session.load_image(card_image());
        let rect = session.choose_preset(Preset::Name).unwrap();
        assert_eq!(rect, CropRect { x: 60, y: 42, w: 620, h: 224 });
    }

    #[test]
    fn test_drag_body_moves_crop() {
        let mut session = session();
        let outline = session.crop_outline(VIEW).unwrap();
        let inside = Point::new(outline.left + 50.0, outline.top + 50.0);

        assert!(session.pointer_down(1, inside, VIEW));
        // 10 display px = 20 image px at this scale
        let rect = session
            .pointer_move(1, Point::new(inside.x + 10.0, inside.y - 10.0), VIEW)
            .unwrap();
        assert_eq!(rect, CropRect { x: 40, y: 1072, w: 650, h: 280 });

        session.pointer_up(1);
        assert!(!session.is_dragging());
        assert!(session.pointer_move(1, Point::new(0.0, 0.0), VIEW).is_none());
    }

    #[test]
    fn test_drag_corner_resizes_crop() {
        let mut session = session();
        let outline = session.crop_outline(VIEW).unwrap();
        let corner = outline.corner(Corner::TopLeft);

        assert!(session.pointer_down(1, corner, VIEW));
        let rect = session
            .pointer_move(1, Point::new(corner.x + 5.0, corner.y + 5.0), VIEW)
            .unwrap();
        assert_eq!(rect, CropRect { x: 30, y: 1102, w: 640, h: 270 });

        let rect = session
            .pointer_move(1, Point::new(corner.x + 400.0, corner.y + 400.0), VIEW)
            .unwrap();
        assert_eq!(rect.w, MIN_CROP_SIZE);
        assert_eq!(rect.h, MIN_CROP_SIZE);
        assert!(rect.fits_within(1000, 1400));
    }

    #[test]
    fn test_pointer_outside_crop_is_ignored() {
        let mut session = session();
        assert!(!session.pointer_down(1, Point::new(450.0, 10.0), VIEW));
        assert!(session.pointer_move(1, Point::new(300.0, 300.0), VIEW).is_none());
    }

    #[test]
    fn test_fixed_flow_rejects_edits() {
        let mut session = ScanSession::new(FlowProfile::AUTO_SCAN, RecognitionOptions::default());
        session.load_image(card_image());
        let outline = session.crop_outline(VIEW).unwrap();

        assert!(!session.pointer_down(1, Point::new(outline.left + 5.0, outline.top + 30.0), VIEW));
        assert!(matches!(
            session.set_crop(CropRect { x: 0, y: 0, w: 100, h: 100 }),
            Err(ScanError::FixedCrop)
        ));
    }

    #[test]
    fn test_hidden_crop_ignores_pointer() {
        let mut session = session();
        assert!(!session.toggle_crop_visibility());
        let outline = session.crop_outline(VIEW).unwrap();
        assert!(!session.pointer_down(1, Point::new(outline.left + 20.0, outline.top + 20.0), VIEW));
        assert!(session.toggle_crop_visibility());
    }

    #[test]
    fn test_new_stream_stops_previous() {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut session = ScanSession::new(FlowProfile::INTERACTIVE, RecognitionOptions::default());

        assert!(matches!(session.take_snapshot(), Err(ScanError::NoStream)));

        session.start_capture(Box::new(FakeCamera { stops: stops.clone() }));
        session.start_capture(Box::new(FakeCamera { stops: stops.clone() }));
        assert_eq!(stops.load(Ordering::SeqCst), 1);

        let rect = session.take_snapshot().unwrap();
        assert!(rect.fits_within(640, 480));

        drop(session);
        assert_eq!(stops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_recognition_with_code() {
        let mut session = session();
        let mut seen = Vec::new();

        let outcome = session
            .run_recognition(
                Arc::new(ScriptedRecognizer::ok("DRI 104/182\n")),
                CancellationToken::new(),
                |p| seen.push(p.percent()),
            )
            .await
            .unwrap();

        assert_eq!(outcome.raw, "DRI 104/182");
        assert_eq!(outcome.identifier.as_ref().unwrap().to_string(), "DRI 104/182");
        assert!(outcome.search_enabled);
        assert_eq!(session.code_text(), "DRI 104/182");
        assert_eq!(seen.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_recognition_without_code_enables_name_search() {
        let mut session = session();
        let outcome = session
            .run_recognition(Arc::new(ScriptedRecognizer::ok("Pikachu ex\n")), CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert!(outcome.identifier.is_none());
        assert!(outcome.search_enabled);
        assert_eq!(session.search_query(), Some(SearchQuery::Name("Pikachu ex".to_string())));
    }

    #[tokio::test]
    async fn test_short_leftover_keeps_search_disabled() {
        let mut session = session();
        let outcome = session
            .run_recognition(Arc::new(ScriptedRecognizer::ok(" !?\n")), CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(outcome.cleaned, "");
        assert!(!outcome.search_enabled);
        assert!(!session.can_search());
    }

    #[tokio::test]
    async fn test_recognition_failure_clears_fields() {
        let mut session = session();
        session.set_override("DRI 104/182");

        let err = session
            .run_recognition(Arc::new(ScriptedRecognizer::failing("boom")), CancellationToken::new(), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::Recognition(RecognitionError::Engine(_))));
        assert!(err.guidance().contains("glare"));
        assert!(session.recognized().is_none());
        assert_eq!(session.code_text(), "");
        assert!(!session.can_search());
    }

    #[tokio::test]
    async fn test_recognition_requires_image() {
        let mut session = ScanSession::new(FlowProfile::INTERACTIVE, RecognitionOptions::default());
        let err = session
            .run_recognition(Arc::new(ScriptedRecognizer::ok("x")), CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::NoImage));
    }

    #[tokio::test]
    async fn test_search_by_code_and_no_match() {
        let mut session = session();
        session.apply_recognition(Ok("DRI 104/182".to_string())).unwrap();
        let search = RecordingSearch::default();

        let outcome = session.run_search(&search).await.unwrap();
        assert!(matches!(outcome, SearchOutcome::NoMatch { query: SearchQuery::Code(_) }));
        assert_eq!(*search.queries.lock().unwrap(), vec!["set.ptcgoCode:DRI number:104"]);
    }

    #[tokio::test]
    async fn test_override_text_searches_by_name() {
        let mut session = session();
        session.set_override("  Mewtwo ");
        let search = RecordingSearch {
            cards: vec![CardRecord {
                name: "Mewtwo".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let outcome = session.run_search(&search).await.unwrap();
        match outcome {
            SearchOutcome::Matches { query, cards } => {
                assert_eq!(query, SearchQuery::Name("Mewtwo".to_string()));
                assert_eq!(cards.len(), 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(*search.queries.lock().unwrap(), vec!["name:Mewtwo*"]);
    }

    #[tokio::test]
    async fn test_search_needs_input() {
        let mut session = session();
        let search = RecordingSearch::default();
        assert_eq!(session.run_search(&search).await.unwrap(), SearchOutcome::NeedsInput);
        assert!(search.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_is_distinct_from_no_match() {
        let mut session = session();
        session.set_override("DRI 104/182");
        let search = RecordingSearch {
            fail: true,
            ..Default::default()
        };

        let err = session.run_search(&search).await.unwrap_err();
        assert!(matches!(err, ScanError::Lookup(LookupError::Status { status: 503 })));
    }
}
