mod common;

use common::{letter_pdf, runtime, BrokenEngine, FixedEngine};
use image::RgbaImage;
use lopdf::content::Content;
use lopdf::Document;
use scanmark_core::{PointerEffect, RenderError, ScanInfo, SessionError, Tool};
use scanmark_model::{AnnotationKind, PageSize, Point, Region};
use scanmark_pdf::{
    CancellationToken, DocumentHandle, LopdfEngine, OpenSource, PdfEngine, PdfEngineError,
    RenderRequest, ThumbnailSize,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Opens anything but reports no pages; counts release attempts
struct PagelessEngine {
    inner: LopdfEngine,
    closes: Arc<AtomicUsize>,
}

impl PdfEngine for PagelessEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        self.inner.open(source)
    }

    fn page_count(&self, _handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(0)
    }

    fn page_size(&self, handle: DocumentHandle, page_index: u32) -> Result<PageSize, PdfEngineError> {
        self.inner.page_size(handle, page_index)
    }

    fn document_bytes(&self, handle: DocumentHandle) -> Result<&[u8], PdfEngineError> {
        self.inner.document_bytes(handle)
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, PdfEngineError> {
        self.inner.render_page(handle, request, cancel)
    }

    fn render_thumbnail(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        target: ThumbnailSize,
    ) -> Result<RgbaImage, PdfEngineError> {
        self.inner.render_thumbnail(handle, page_index, target)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close(handle)?;
        // A second release fails; the session must only log it
        self.inner.close(handle)
    }
}

#[test]
fn open_builds_page_records() {
    let runtime = runtime(Arc::new(FixedEngine::new("x", 0.5)));
    let session = runtime.open_document(letter_pdf(3), 918.0).expect("document opens");

    let labels: Vec<_> = session.page_records().iter().map(|r| r.thumbnail.label.as_str()).collect();
    assert_eq!(labels, vec!["Page 1", "Page 2", "Page 3"]);
    assert!(session.page_records().iter().all(|r| r.title.is_empty()));
    assert_eq!(session.current_page(), 1);
    assert_eq!(session.tool(), Tool::Scan);
    assert!((session.view().viewport().scale - 1.5).abs() < 1e-6);
}

#[test]
fn malformed_document_is_a_load_error() {
    let runtime = runtime(Arc::new(FixedEngine::new("x", 0.5)));
    let err = runtime
        .open_document(b"not a pdf".to_vec(), 918.0)
        .expect_err("garbage should not load");
    assert!(matches!(err, scanmark_core::RuntimeError::Session(SessionError::Load(_))));
}

#[test]
fn unreachable_url_is_a_load_error() {
    let runtime = runtime(Arc::new(FixedEngine::new("x", 0.5)));
    let err = runtime
        .open_document(OpenSource::url("http://127.0.0.1:9/report.pdf"), 918.0)
        .expect_err("nothing serves this URL");
    assert!(matches!(
        err,
        scanmark_core::RuntimeError::Session(SessionError::Load(PdfEngineError::Fetch(_)))
    ));
}

#[test]
fn pageless_document_is_released_and_rejected() {
    let runtime = runtime(Arc::new(FixedEngine::new("x", 0.5)));
    let closes = Arc::new(AtomicUsize::new(0));
    let engine = PagelessEngine { inner: LopdfEngine::new(), closes: closes.clone() };

    let err = runtime
        .open_with_engine(Box::new(engine), letter_pdf(1), 612.0)
        .expect_err("no pages to show");
    assert!(matches!(err, scanmark_core::RuntimeError::Session(SessionError::EmptyDocument)));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn scan_creates_callout_and_commits_title() {
    let engine = Arc::new(FixedEngine::new("  Invoice 2024-117 ", 0.93));
    let runtime = runtime(engine.clone());
    let mut session = runtime.open_document(letter_pdf(2), 918.0).expect("document opens");
    session.render_current().expect("page renders");

    session.pointer_down(Point::new(100.0, 100.0));
    session.pointer_move(Point::new(150.0, 120.0));
    let job = session.pointer_up(Point::new(200.0, 140.0)).expect("scan job");
    assert_eq!(job.region, Region { x: 100.0, y: 100.0, width: 100.0, height: 40.0 });
    assert_eq!(session.view().info(), &ScanInfo::Scanning);

    let id = session.scan(&job).expect("callout created");
    assert_eq!(engine.calls(), 4);
    assert_eq!(session.view().info().display(), "Invoice 2024-117");

    match session.view().store().get(id).map(|a| a.kind().clone()) {
        Some(AnnotationKind::Callout { anchor, box_origin, text }) => {
            assert_eq!(anchor, Point::new(150.0, 120.0));
            assert_eq!(box_origin, Point::new(210.0, 100.0));
            assert_eq!(text, "Invoice 2024-117");
        }
        other => panic!("unexpected {other:?}"),
    }

    assert_eq!(session.commit_title().as_deref(), Some("Invoice 2024-117"));
    assert_eq!(session.page_records()[0].title, "Invoice 2024-117");
    assert!(session.view().store().is_empty());
    assert_eq!(session.view().info(), &ScanInfo::Idle);
    assert!(session.view().overlay().is_empty());
}

#[test]
fn failing_engine_yields_no_text() {
    let runtime = runtime(Arc::new(BrokenEngine));
    let mut session = runtime.open_document(letter_pdf(1), 612.0).expect("document opens");
    session.render_current().expect("page renders");

    session.pointer_down(Point::new(10.0, 10.0));
    let job = session.pointer_up(Point::new(60.0, 30.0)).expect("scan job");
    assert!(session.scan(&job).is_some());

    assert_eq!(session.view().info(), &ScanInfo::NoText);
    assert_eq!(session.commit_title(), None);
    assert_eq!(session.view().store().len(), 1);
}

#[test]
fn page_switch_starts_clean() {
    let runtime = runtime(Arc::new(FixedEngine::new("late", 0.8)));
    let mut session = runtime.open_document(letter_pdf(3), 918.0).expect("document opens");
    session.render_current().expect("page renders");

    session.set_tool(Tool::Rect);
    session.pointer_down(Point::new(5.0, 5.0));
    session.pointer_up(Point::new(50.0, 50.0));
    session.set_tool(Tool::Scan);
    session.pointer_down(Point::new(100.0, 100.0));
    let job = session.pointer_up(Point::new(140.0, 120.0)).expect("scan job");
    let late = session.recognize(&job);

    assert_eq!(session.select_page(2), 2);
    assert!(session.view().store().is_empty());
    assert!(session.view().scan_drag().is_none());
    assert!(session.view().pending_scan().is_none());
    assert_eq!(session.view().info(), &ScanInfo::Idle);
    assert!(session.view().image().is_none());

    assert!(session.complete_scan(&job, late.text()).is_none());
    assert!(session.view().store().is_empty());

    assert_eq!(session.select_page(0), 1);
    assert_eq!(session.select_page(99), 3);
}

#[test]
fn late_result_after_returning_to_page_is_dropped() {
    let runtime = runtime(Arc::new(FixedEngine::new("fresh", 0.8)));
    let mut session = runtime.open_document(letter_pdf(2), 918.0).expect("document opens");
    session.render_current().expect("page renders");

    session.pointer_down(Point::new(100.0, 100.0));
    let old = session.pointer_up(Point::new(140.0, 120.0)).expect("scan job");

    session.select_page(2);
    session.select_page(1);
    session.render_current().expect("page renders");
    session.pointer_down(Point::new(100.0, 100.0));
    let new = session.pointer_up(Point::new(140.0, 120.0)).expect("scan job");
    assert_ne!(old, new);

    assert!(session.complete_scan(&old, "stale").is_none());
    assert!(session.view().store().is_empty());
    assert_eq!(session.view().info(), &ScanInfo::Scanning);

    assert!(session.scan(&new).is_some());
    assert_eq!(session.view().info().display(), "fresh");
}

#[test]
fn page_switch_cancels_render_in_flight() {
    let runtime = runtime(Arc::new(FixedEngine::new("x", 0.5)));
    let mut session = runtime.open_document(letter_pdf(2), 918.0).expect("document opens");

    let ticket = session.begin_render();
    assert_eq!(session.select_page(2), 2);
    assert!(ticket.token.is_cancelled());

    let result = session.rasterize(&ticket);
    assert!(matches!(result, Err(PdfEngineError::Cancelled)));
    let err = session.finish_render(&ticket, result).expect_err("render was cancelled");
    assert!(matches!(err, RenderError::Cancelled));
    assert!(session.view().image().is_none());
}

#[test]
fn newer_render_supersedes_older() {
    let runtime = runtime(Arc::new(FixedEngine::new("x", 0.5)));
    let mut session = runtime.open_document(letter_pdf(1), 612.0).expect("document opens");

    let first = session.begin_render();
    let second = session.begin_render();

    let err = session
        .finish_render(&first, Ok(RgbaImage::new(1, 1)))
        .expect_err("first ticket was superseded");
    assert!(matches!(err, RenderError::Superseded));
    assert!(session.view().image().is_none());

    let image = session.rasterize(&second).expect("page renders");
    session.finish_render(&second, Ok(image)).expect("current ticket lands");
    assert_eq!(session.view().image().map(|image| image.dimensions()), Some((612, 792)));
}

#[test]
fn edit_title_trims_and_overwrites() {
    let runtime = runtime(Arc::new(FixedEngine::new("x", 0.5)));
    let mut session = runtime.open_document(letter_pdf(2), 612.0).expect("document opens");

    assert!(session.edit_title(2, "  Appendix  "));
    assert!(session.edit_title(2, "Annex"));
    assert!(!session.edit_title(5, "Nowhere"));
    assert_eq!(session.page_records()[1].title, "Annex");
}

#[test]
fn thumbnails_upgrade_from_label() {
    let runtime = runtime(Arc::new(FixedEngine::new("x", 0.5)));
    let mut session = runtime.open_document(letter_pdf(2), 612.0).expect("document opens");

    session.render_thumbnail(2, ThumbnailSize::default()).expect("thumbnail renders");
    let thumbnail = &session.page_records()[1].thumbnail;
    assert_eq!(thumbnail.label, "Page 2");
    let image = thumbnail.image.as_ref().expect("image attached");
    assert_eq!(image.rgba.len(), (image.width * image.height * 4) as usize);
    assert!(session.page_records()[0].thumbnail.image.is_none());

    assert!(session.render_thumbnail(3, ThumbnailSize::default()).is_err());
}

#[test]
fn export_burns_current_page_at_view_scale() {
    let runtime = runtime(Arc::new(FixedEngine::new("x", 0.5)));
    let mut session = runtime.open_document(letter_pdf(2), 918.0).expect("document opens");

    session.select_page(2);
    session.set_tool(Tool::Callout);
    let effect = session.pointer_down(Point::new(60.0, 80.0));
    assert!(matches!(effect, PointerEffect::Created(_)));
    session.pointer_up(Point::new(60.0, 80.0));

    let annotations = session.annotations_for_export();
    assert_eq!(annotations.keys().copied().collect::<Vec<_>>(), vec![2]);

    let bytes = session.export().expect("export succeeds");
    let doc = Document::load_mem(&bytes).expect("exported PDF loads");
    let pages = doc.get_pages();
    assert_eq!(pages.len(), 2);

    let content = doc.get_page_content(pages[&2]).expect("page 2 content");
    let ops = Content::decode(&content).expect("decodes").operations;
    let re = ops.iter().find(|op| op.operator == "re").expect("callout box drawn");
    let values: Vec<f32> = re.operands.iter().map(|o| o.as_float().expect("number")).collect();

    // Box at (100, 50) in a 1.5x viewport
    assert!((values[0] - 66.67).abs() < 0.01);
    assert!((values[1] - 718.67).abs() < 0.01);

    let first = doc.get_page_content(pages[&1]).expect("page 1 content");
    assert!(!Content::decode(&first).expect("decodes").operations.iter().any(|op| op.operator == "re"));

    session.close().expect("session closes");
}
