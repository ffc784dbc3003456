//! Open document session
//!
//! Ties the engine, page records, toolbar state and the displayed
//! [`PageView`] together. Only one page is live at a time; selecting another
//! page replaces the view, which drops its annotations and scan state.

use crate::config::ScanmarkConfig;
use crate::interaction::{PointerEffect, Tool};
use crate::ocr::{OcrPipeline, RegionText};
use crate::page_view::{PageView, ScanJob};
use image::RgbaImage;
use scanmark_model::{
    Annotation, AnnotationId, PageList, PageRecord, PageSize, Point, ThumbnailImage, Viewport,
};
use scanmark_pdf::{
    export_annotated_pdf, DocumentHandle, ExportError, OpenSource, PdfEngine, PdfEngineError,
    RenderRequest, RenderSlot, RenderTicket, ThumbnailSize,
};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to load document: {0}")]
    Load(#[source] PdfEngineError),
    #[error("document has no pages")]
    EmptyDocument,
    #[error("engine error: {0}")]
    Engine(#[from] PdfEngineError),
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render cancelled")]
    Cancelled,
    #[error("render superseded by a newer request")]
    Superseded,
    #[error("render failed: {0}")]
    Engine(#[source] PdfEngineError),
}

pub struct DocumentSession {
    engine: Box<dyn PdfEngine>,
    handle: DocumentHandle,
    pages: PageList,
    page_sizes: Vec<PageSize>,
    container_width: f32,
    current_page: u32,
    tool: Tool,
    view: PageView,
    /// Bumped for every view built, so scan jobs never match a later view
    view_epoch: u64,
    render_slot: RenderSlot,
    ocr: OcrPipeline,
    config: ScanmarkConfig,
}

impl std::fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSession")
            .field("handle", &self.handle)
            .field("page_count", &self.pages.page_count())
            .field("current_page", &self.current_page)
            .field("tool", &self.tool)
            .finish_non_exhaustive()
    }
}

impl DocumentSession {
    /// Load a document and show its first page
    ///
    /// `container_width` is the pixel width the page is fit to.
    pub fn open(
        mut engine: Box<dyn PdfEngine>,
        source: OpenSource,
        ocr: OcrPipeline,
        config: ScanmarkConfig,
        container_width: f32,
    ) -> Result<Self, SessionError> {
        let handle = engine.open(source).map_err(SessionError::Load)?;
        let page_count = engine.page_count(handle).map_err(SessionError::Load)?;
        if page_count == 0 {
            if let Err(err) = engine.close(handle) {
                tracing::debug!(error = %err, "failed to release empty document");
            }
            return Err(SessionError::EmptyDocument);
        }

        let page_sizes = (0..page_count)
            .map(|index| engine.page_size(handle, index))
            .collect::<Result<Vec<_>, _>>()
            .map_err(SessionError::Load)?;

        let viewport = Viewport::fit_width(page_sizes[0], container_width);
        let view = PageView::new(1, viewport, &config.interaction).with_epoch(1);

        tracing::info!(page_count, scale = viewport.scale, "document session opened");

        Ok(Self {
            engine,
            handle,
            pages: PageList::with_page_count(page_count),
            page_sizes,
            container_width,
            current_page: 1,
            tool: Tool::default(),
            view,
            view_epoch: 1,
            render_slot: RenderSlot::new(),
            ocr,
            config,
        })
    }

    pub fn page_records(&self) -> &[PageRecord] {
        self.pages.records()
    }

    pub fn page_count(&self) -> u32 {
        self.pages.page_count()
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn view(&self) -> &PageView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut PageView {
        &mut self.view
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn config(&self) -> &ScanmarkConfig {
        &self.config
    }

    /// Pipeline used for scans; cheap to clone onto a worker thread
    pub fn ocr(&self) -> &OcrPipeline {
        &self.ocr
    }

    /// Switch tools; an unfinished gesture is abandoned
    pub fn set_tool(&mut self, tool: Tool) {
        if tool != self.tool {
            tracing::debug!(from = self.tool.name(), to = tool.name(), "tool changed");
            self.tool = tool;
            self.view.cancel_gesture();
        }
    }

    /// Show another page, clamped into range
    ///
    /// The previous page's annotations, scan selection and info are dropped
    /// and any in-flight render is cancelled. Returns the page now shown.
    pub fn select_page(&mut self, page_number: u32) -> u32 {
        let page_number = self.pages.clamp_page(page_number);
        if page_number == self.current_page {
            return page_number;
        }

        self.render_slot.cancel();
        let size = self.page_size(page_number);
        let viewport = Viewport::fit_width(size, self.container_width);
        self.view_epoch += 1;
        self.view = PageView::new(page_number, viewport, &self.config.interaction)
            .with_epoch(self.view_epoch);
        self.current_page = page_number;

        tracing::debug!(page = page_number, "page selected");
        page_number
    }

    /// Overwrite a page title with trimmed input
    pub fn edit_title(&mut self, page_number: u32, title: &str) -> bool {
        self.pages.set_title(page_number, title.trim())
    }

    fn page_size(&self, page_number: u32) -> PageSize {
        page_number
            .checked_sub(1)
            .and_then(|index| self.page_sizes.get(index as usize))
            .copied()
            .unwrap_or_default()
    }

    /// Rasterize the current page into the view
    ///
    /// Engine failures put the view into its fallback state and are
    /// returned for logging; they never affect the rest of the session.
    pub fn render_current(&mut self) -> Result<(), RenderError> {
        let ticket = self.begin_render();
        let result = self.rasterize(&ticket);
        self.finish_render(&ticket, result)
    }

    /// Issue a render of the current page, cancelling the one in flight
    ///
    /// The ticket stays valid until [`Self::finish_render`], another
    /// `begin_render`, or a page switch.
    pub fn begin_render(&mut self) -> RenderTicket {
        let request = RenderRequest {
            page_index: self.current_page - 1,
            scale: self.view.viewport().scale,
        };
        self.render_slot.begin(request)
    }

    /// Run the engine for `ticket`; returns early once the ticket is cancelled
    pub fn rasterize(&self, ticket: &RenderTicket) -> Result<RgbaImage, PdfEngineError> {
        self.engine.render_page(self.handle, ticket.request, &ticket.token)
    }

    /// Deliver the outcome of `ticket` to the view
    ///
    /// Results for a cancelled or superseded ticket are dropped.
    pub fn finish_render(
        &mut self,
        ticket: &RenderTicket,
        result: Result<RgbaImage, PdfEngineError>,
    ) -> Result<(), RenderError> {
        if !self.render_slot.finish(ticket) {
            tracing::debug!(
                page_index = ticket.request.page_index,
                generation = ticket.generation,
                "dropping render result"
            );
            return Err(if self.render_slot.in_flight().is_some() {
                RenderError::Superseded
            } else {
                RenderError::Cancelled
            });
        }

        match result {
            Ok(image) => {
                self.view.set_image(image);
                Ok(())
            }
            Err(PdfEngineError::Cancelled) => Err(RenderError::Cancelled),
            Err(err) => {
                tracing::warn!(page = self.current_page, error = %err, "page render failed");
                self.view.set_render_error(err.to_string());
                Err(RenderError::Engine(err))
            }
        }
    }

    /// Cancel the in-flight render, if any
    pub fn cancel_render(&mut self) {
        self.render_slot.cancel();
    }

    /// Upgrade a page's "Page N" label with a rendered thumbnail
    pub fn render_thumbnail(&mut self, page_number: u32, size: ThumbnailSize) -> Result<(), SessionError> {
        if self.pages.get(page_number).is_none() {
            return Err(SessionError::Engine(PdfEngineError::PageOutOfRange {
                page: page_number,
                page_count: self.pages.page_count(),
            }));
        }

        let image = self.engine.render_thumbnail(self.handle, page_number - 1, size)?;
        let (width, height) = image.dimensions();
        let thumbnail = ThumbnailImage { width, height, rgba: image.into_raw() };
        self.pages.set_thumbnail_image(page_number, thumbnail);
        Ok(())
    }

    pub fn pointer_down(&mut self, point: Point) -> PointerEffect {
        self.view.pointer_down(self.tool, point)
    }

    pub fn pointer_move(&mut self, point: Point) -> PointerEffect {
        self.view.pointer_move(self.tool, point)
    }

    /// Returns a scan job when a scan drag was released
    pub fn pointer_up(&mut self, point: Point) -> Option<ScanJob> {
        self.view.pointer_up(self.tool, point)
    }

    /// Run OCR for `job` against the current page raster
    ///
    /// Without a raster (not rendered yet or render failed) the result is
    /// empty.
    pub fn recognize(&self, job: &ScanJob) -> RegionText {
        match self.view.image() {
            Some(image) => self.ocr.recognize_region(image, &job.region),
            None => {
                tracing::warn!(page = job.page_number, "no page raster to scan");
                RegionText::default()
            }
        }
    }

    /// Deliver OCR text; late results for another page or scan are dropped
    pub fn complete_scan(&mut self, job: &ScanJob, text: &str) -> Option<AnnotationId> {
        if job.page_number != self.current_page {
            tracing::debug!(
                page = job.page_number,
                current = self.current_page,
                "dropping scan result for page no longer shown"
            );
            return None;
        }
        self.view.complete_scan(job, text)
    }

    /// Recognize and complete in one call
    pub fn scan(&mut self, job: &ScanJob) -> Option<AnnotationId> {
        let result = self.recognize(job);
        self.complete_scan(job, result.text())
    }

    /// Make the recognized text the current page's title
    pub fn commit_title(&mut self) -> Option<String> {
        let title = self.view.commit_title()?;
        self.pages.set_title(self.current_page, title.clone());
        Some(title)
    }

    /// Annotations keyed by page, ready for [`Self::export`]
    pub fn annotations_for_export(&self) -> BTreeMap<u32, Vec<Annotation>> {
        let mut pages = BTreeMap::new();
        let objects = self.view.store().objects();
        if !objects.is_empty() {
            pages.insert(self.current_page, objects.to_vec());
        }
        pages
    }

    /// Annotated copy of the document at the current viewport scale
    pub fn export(&self) -> Result<Vec<u8>, SessionError> {
        let bytes = self.engine.document_bytes(self.handle)?;
        let annotations = self.annotations_for_export();
        let options = self.config.export.to_options();
        Ok(export_annotated_pdf(bytes, &annotations, self.view.viewport().scale, &options)?)
    }

    /// Current raster, if rendered
    pub fn page_image(&self) -> Option<&RgbaImage> {
        self.view.image()
    }

    /// Release the document
    pub fn close(mut self) -> Result<(), SessionError> {
        self.render_slot.cancel();
        self.engine.close(self.handle)?;
        tracing::info!("document session closed");
        Ok(())
    }
}
