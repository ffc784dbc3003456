//! PDF loading, rasterization and annotated export
//!
//! The [`PdfEngine`] trait is the seam for document loading and page
//! rasterization. With the `pdfium` feature, [`pdfium::PdfiumEngine`] draws
//! page content through the PDFium library; [`LopdfEngine`] is the pure-Rust
//! fallback that only knows page geometry. The [`export`] module burns
//! overlay annotations into a copy of the document.

pub mod export;
#[cfg(feature = "pdfium")]
pub mod pdfium;
pub mod render;

use image::{ImageBuffer, Rgba};
use lopdf::{Document, Object, ObjectId};
use scanmark_model::PageSize;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use export::{
    export_annotated_pdf, project_box, ExportError, ExportOptions, PdfRect, TEXT_SNIPPET_CHARS,
};
pub use render::{CancellationToken, RenderRequest, RenderSlot, RenderTicket};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Fallback when a page declares no usable MediaBox (US Letter)
const DEFAULT_PAGE_SIZE: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

/// Rows rasterized between cancellation checks
const CANCEL_CHECK_ROWS: u32 = 64;

/// Largest document accepted from a URL
pub const MAX_DOWNLOAD_BYTES: u64 = 256 * 1024 * 1024;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSize {
    pub width_px: u32,
    pub height_px: u32,
}

impl Default for ThumbnailSize {
    fn default() -> Self {
        Self { width_px: 160, height_px: 160 }
    }
}

/// Where a document comes from
#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    /// `http://` or `https://` location, fetched once at open
    Url(String),
    Bytes(Vec<u8>),
}

impl OpenSource {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// Load the raw document bytes
    pub fn into_bytes(self) -> Result<Vec<u8>, PdfEngineError> {
        match self {
            OpenSource::Path(path) => Ok(fs::read(path)?),
            OpenSource::Url(url) => fetch_url(&url),
            OpenSource::Bytes(bytes) => Ok(bytes),
        }
    }
}

fn fetch_url(url: &str) -> Result<Vec<u8>, PdfEngineError> {
    let agent = ureq::AgentBuilder::new().timeout(FETCH_TIMEOUT).build();
    let resp = agent
        .get(url)
        .set("User-Agent", "scanmark")
        .call()
        .map_err(|e| PdfEngineError::Fetch(format!("{url}: {e}")))?;

    let mut bytes = Vec::new();
    resp.into_reader()
        .take(MAX_DOWNLOAD_BYTES + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| PdfEngineError::Fetch(format!("{url}: {e}")))?;

    if bytes.len() as u64 > MAX_DOWNLOAD_BYTES {
        return Err(PdfEngineError::Fetch(format!(
            "{url}: document larger than {MAX_DOWNLOAD_BYTES} bytes"
        )));
    }

    tracing::debug!(url, bytes = bytes.len(), "fetched document");
    Ok(bytes)
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("download failed: {0}")]
    Fetch(String),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("render cancelled")]
    Cancelled,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Document loader and page rasterizer
pub trait PdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError>;
    /// Original bytes, as needed by the export projector
    fn document_bytes(&self, handle: DocumentHandle) -> Result<&[u8], PdfEngineError>;
    /// Rasterize a page; must return [`PdfEngineError::Cancelled`] once
    /// `cancel` fires
    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, PdfEngineError>;
    fn render_thumbnail(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        target: ThumbnailSize,
    ) -> Result<RgbaImage, PdfEngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    bytes: Vec<u8>,
    page_sizes: Vec<PageSize>,
}

/// Pure-Rust backend built on lopdf
///
/// Reads page geometry from the document. Rasterization only produces the
/// blank page frame at the requested scale; page content is drawn by the
/// `pdfium` backend.
#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, PdfEngineError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let sizes: Vec<PageSize> =
            doc.get_pages().into_values().map(|page_id| media_box_size(&doc, page_id)).collect();

        if sizes.is_empty() {
            return Err(PdfEngineError::Backend("document has no pages".to_owned()));
        }

        Ok(sizes)
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, PdfEngineError> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

/// Look up a page attribute, following the `/Parent` chain for inherited keys
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    // Bounded walk; malformed files can contain parent cycles.
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

pub(crate) fn media_box_size(doc: &Document, page_id: ObjectId) -> PageSize {
    inherited_attribute(doc, page_id, b"MediaBox")
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok())
        .and_then(|array| {
            if array.len() != 4 {
                return None;
            }
            let x0 = resolve(doc, &array[0]).as_float().ok()?;
            let y0 = resolve(doc, &array[1]).as_float().ok()?;
            let x1 = resolve(doc, &array[2]).as_float().ok()?;
            let y1 = resolve(doc, &array[3]).as_float().ok()?;
            Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
        })
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

impl PdfEngine for LopdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = source.into_bytes()?;
        let page_sizes = Self::parse_sizes(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        tracing::debug!(handle = handle.raw(), pages = page_sizes.len(), "opened document");
        self.docs.insert(handle, DocumentRecord { bytes, page_sizes });

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.record(handle)?.page_sizes.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        let record = self.record(handle)?;
        record.page_sizes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: record.page_sizes.len() as u32,
        })
    }

    fn document_bytes(&self, handle: DocumentHandle) -> Result<&[u8], PdfEngineError> {
        Ok(&self.record(handle)?.bytes)
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, PdfEngineError> {
        let page_size = self.page_size(handle, request.page_index)?;
        let scale = if request.scale <= 0.0 { 1.0 } else { request.scale };

        let width = (page_size.width_pt * scale).round().max(1.0) as u32;
        let height = (page_size.height_pt * scale).round().max(1.0) as u32;

        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        let frame = Rgba([220, 220, 220, 255]);

        for y in 0..height {
            if y % CANCEL_CHECK_ROWS == 0 && cancel.is_cancelled() {
                return Err(PdfEngineError::Cancelled);
            }
            if width >= 4 && height >= 4 {
                if y == 0 || y == height - 1 {
                    for x in 0..width {
                        image.put_pixel(x, y, frame);
                    }
                } else {
                    image.put_pixel(0, y, frame);
                    image.put_pixel(width - 1, y, frame);
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(PdfEngineError::Cancelled);
        }

        Ok(image)
    }

    fn render_thumbnail(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        target: ThumbnailSize,
    ) -> Result<RgbaImage, PdfEngineError> {
        let page = self.render_page(
            handle,
            RenderRequest { page_index, scale: 0.25 },
            &CancellationToken::new(),
        )?;

        Ok(image::imageops::thumbnail(&page, target.width_px.max(1), target.height_px.max(1)))
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

/// PDFium when the feature is on and the library binds, else lopdf
pub fn default_engine() -> Box<dyn PdfEngine> {
    #[cfg(feature = "pdfium")]
    {
        match pdfium::PdfiumEngine::bind() {
            Ok(engine) => return Box::new(engine),
            Err(err) => {
                tracing::warn!(error = %err, "PDFium unavailable, pages render without content");
            }
        }
    }
    Box::new(LopdfEngine::new())
}
