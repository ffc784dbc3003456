//! State of the single displayed page
//!
//! Owns everything that lives only as long as the page is on screen: the
//! annotation store, the gesture in progress, the scan selection and the
//! scan info line. Dropping the view is how a page switch discards it.

use crate::config::InteractionConfig;
use crate::interaction::{InteractionMachine, InteractionState, PointerEffect, Tool};
use crate::overlay::{self, OverlayPrimitive};
use image::RgbaImage;
use scanmark_model::{
    normalize, Annotation, AnnotationId, AnnotationStore, DragRect, Point, Region, Viewport,
};

/// Horizontal gap between a scanned region and its callout box
pub const SCAN_CALLOUT_GAP: f32 = 10.0;

/// Info line under the page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScanInfo {
    #[default]
    Idle,
    Scanning,
    Recognized(String),
    NoText,
}

impl ScanInfo {
    pub fn display(&self) -> &str {
        match self {
            ScanInfo::Idle => "",
            ScanInfo::Scanning => "Scanning...",
            ScanInfo::Recognized(text) => text,
            ScanInfo::NoText => "(no text)",
        }
    }

    /// Only recognized text can become a page title
    pub fn can_commit_title(&self) -> bool {
        matches!(self, ScanInfo::Recognized(_))
    }
}

/// A scan handed to the OCR pipeline
///
/// Results are only accepted while the job is still the latest scan of the
/// view that issued it. `epoch` tells apart two views of the same page.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanJob {
    pub page_number: u32,
    pub epoch: u64,
    pub generation: u64,
    /// Normalized, whole-pixel region in viewport space
    pub region: Region,
}

#[derive(Debug)]
pub struct PageView {
    page_number: u32,
    epoch: u64,
    viewport: Viewport,
    store: AnnotationStore,
    interaction: InteractionMachine,
    scan_drag: Option<DragRect>,
    pending_scan: Option<ScanJob>,
    scan_generation: u64,
    info: ScanInfo,
    image: Option<RgbaImage>,
    render_error: Option<String>,
}

impl PageView {
    pub fn new(page_number: u32, viewport: Viewport, config: &InteractionConfig) -> Self {
        Self {
            page_number,
            epoch: 0,
            viewport,
            store: AnnotationStore::new(page_number),
            interaction: InteractionMachine::new(config),
            scan_drag: None,
            pending_scan: None,
            scan_generation: 0,
            info: ScanInfo::Idle,
            image: None,
            render_error: None,
        }
    }

    /// Tag this view instance; scan jobs carry it
    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut AnnotationStore {
        &mut self.store
    }

    pub fn interaction_state(&self) -> InteractionState {
        self.interaction.state()
    }

    pub fn info(&self) -> &ScanInfo {
        &self.info
    }

    pub fn scan_drag(&self) -> Option<&DragRect> {
        self.scan_drag.as_ref()
    }

    pub fn pending_scan(&self) -> Option<&ScanJob> {
        self.pending_scan.as_ref()
    }

    pub fn image(&self) -> Option<&RgbaImage> {
        self.image.as_ref()
    }

    pub fn set_image(&mut self, image: RgbaImage) {
        self.image = Some(image);
        self.render_error = None;
    }

    /// Show the fallback state instead of a raster
    pub fn set_render_error(&mut self, message: impl Into<String>) {
        self.image = None;
        self.render_error = Some(message.into());
    }

    pub fn render_error(&self) -> Option<&str> {
        self.render_error.as_deref()
    }

    /// Annotations plus the live scan selection, in draw order
    pub fn overlay(&self) -> Vec<OverlayPrimitive> {
        let mut primitives = overlay::render(&self.store);
        if let Some(drag) = &self.scan_drag {
            primitives.push(overlay::scan_selection(drag));
        }
        primitives
    }

    pub fn pointer_down(&mut self, tool: Tool, point: Point) -> PointerEffect {
        if tool == Tool::Scan {
            self.interaction.reset();
            self.scan_drag = Some(DragRect::at(point));
            return PointerEffect::None;
        }
        self.scan_drag = None;
        self.interaction.pointer_down(tool, point, &mut self.store)
    }

    pub fn pointer_move(&mut self, tool: Tool, point: Point) -> PointerEffect {
        if tool == Tool::Scan {
            if let Some(drag) = self.scan_drag.as_mut() {
                drag.stretch_to(point);
            }
            return PointerEffect::None;
        }
        self.interaction.pointer_move(point, &mut self.store)
    }

    /// Abandon a markup gesture or scan drag without effect
    pub fn cancel_gesture(&mut self) {
        self.interaction.reset();
        self.scan_drag = None;
    }

    /// Finish the gesture; a scan drag yields the job to recognize
    pub fn pointer_up(&mut self, tool: Tool, point: Point) -> Option<ScanJob> {
        if tool != Tool::Scan {
            self.interaction.pointer_up(point, &mut self.store);
            return None;
        }

        let mut drag = self.scan_drag.take()?;
        drag.stretch_to(point);
        Some(self.begin_scan(normalize(&drag)))
    }

    /// Start recognizing `region`, superseding any scan still in flight
    pub fn begin_scan(&mut self, region: Region) -> ScanJob {
        self.scan_generation += 1;
        let job = ScanJob {
            page_number: self.page_number,
            epoch: self.epoch,
            generation: self.scan_generation,
            region: region.rounded(),
        };

        if let Some(previous) = self.pending_scan.replace(job.clone()) {
            tracing::debug!(generation = previous.generation, "superseded pending scan");
        }
        self.info = ScanInfo::Scanning;

        tracing::debug!(
            page = self.page_number,
            generation = job.generation,
            x = job.region.x,
            y = job.region.y,
            width = job.region.width,
            height = job.region.height,
            "scan started"
        );
        job
    }

    /// Accept recognized text for `job` and drop a callout next to the region
    ///
    /// Stale jobs (another view, superseded, or after commit) are ignored.
    pub fn complete_scan(&mut self, job: &ScanJob, text: &str) -> Option<AnnotationId> {
        if self.pending_scan.as_ref() != Some(job) {
            tracing::debug!(
                page = job.page_number,
                epoch = job.epoch,
                generation = job.generation,
                "ignoring stale scan result"
            );
            return None;
        }
        self.pending_scan = None;

        let text = text.trim();
        self.info = if text.is_empty() {
            ScanInfo::NoText
        } else {
            ScanInfo::Recognized(text.to_string())
        };

        let region = job.region;
        let callout = Annotation::callout_at(
            region.center(),
            Point::new(region.right() + SCAN_CALLOUT_GAP, region.y),
            text,
        );
        Some(self.store.append(callout))
    }

    /// Promote the recognized text to the page title
    ///
    /// Clears the store, scan selection and info line in one step and returns
    /// the title. Returns `None` (and changes nothing) unless text is showing.
    pub fn commit_title(&mut self) -> Option<String> {
        if !self.info.can_commit_title() {
            return None;
        }
        let ScanInfo::Recognized(text) = std::mem::take(&mut self.info) else {
            return None;
        };

        self.store.remove_all();
        self.interaction.reset();
        self.scan_drag = None;
        self.pending_scan = None;
        self.scan_generation += 1;

        tracing::info!(page = self.page_number, title = %text, "committed scan as page title");
        Some(text)
    }
}
