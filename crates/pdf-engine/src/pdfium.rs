//! Native page rasterizer backed by PDFium
//!
//! Geometry and document bytes come from the lopdf backend; PDFium only
//! draws pixels. A document is loaded from its bytes for each render, so no
//! PDFium handle outlives a call.

use crate::{
    CancellationToken, DocumentHandle, LopdfEngine, OpenSource, PdfEngine, PdfEngineError,
    RenderRequest, RgbaImage, ThumbnailSize,
};
use pdfium_render::prelude::*;
use scanmark_model::PageSize;

pub struct PdfiumEngine {
    pdfium: Pdfium,
    inner: LopdfEngine,
}

impl std::fmt::Debug for PdfiumEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumEngine").field("inner", &self.inner).finish_non_exhaustive()
    }
}

fn backend(err: PdfiumError) -> PdfEngineError {
    PdfEngineError::Backend(err.to_string())
}

impl PdfiumEngine {
    /// Bind the PDFium library
    ///
    /// Search order: the executable's directory, the working directory,
    /// then the system library paths.
    pub fn bind() -> Result<Self, PdfEngineError> {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|path| path.parent().map(|dir| dir.to_path_buf()));

        let from_exe_dir = exe_dir.and_then(|dir| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir)).ok()
        });

        let bindings = match from_exe_dir {
            Some(bindings) => bindings,
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|err| {
                    PdfEngineError::Backend(format!("failed to bind pdfium library: {err}"))
                })?,
        };

        tracing::debug!("PDFium bound");
        Ok(Self { pdfium: Pdfium::new(bindings), inner: LopdfEngine::new() })
    }

    fn rasterize(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        width: u32,
        height: u32,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, PdfEngineError> {
        let page_count = self.inner.page_count(handle)?;
        let index = u16::try_from(page_index)
            .map_err(|_| PdfEngineError::PageOutOfRange { page: page_index, page_count })?;
        let bytes = self.inner.document_bytes(handle)?;

        if cancel.is_cancelled() {
            return Err(PdfEngineError::Cancelled);
        }

        let document = self.pdfium.load_pdf_from_byte_slice(bytes, None).map_err(backend)?;
        let page = document.pages().get(index).map_err(backend)?;

        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);
        let bitmap = page.render_with_config(&config).map_err(backend)?;

        if cancel.is_cancelled() {
            return Err(PdfEngineError::Cancelled);
        }

        let (width, height) = (bitmap.width() as u32, bitmap.height() as u32);
        RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes().to_vec()).ok_or_else(|| {
            PdfEngineError::Backend(format!("bitmap does not match {width}x{height}"))
        })
    }
}

impl PdfEngine for PdfiumEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        self.inner.open(source)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        self.inner.page_count(handle)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
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
        let size = self.page_size(handle, request.page_index)?;
        let scale = if request.scale <= 0.0 { 1.0 } else { request.scale };
        let width = (size.width_pt * scale).round().max(1.0) as u32;
        let height = (size.height_pt * scale).round().max(1.0) as u32;

        self.rasterize(handle, request.page_index, width, height, cancel)
    }

    fn render_thumbnail(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        target: ThumbnailSize,
    ) -> Result<RgbaImage, PdfEngineError> {
        let size = self.page_size(handle, page_index)?;
        let scale = (target.width_px.max(1) as f32 / size.width_pt)
            .min(target.height_px.max(1) as f32 / size.height_pt);
        let width = (size.width_pt * scale).round().max(1.0) as u32;
        let height = (size.height_pt * scale).round().max(1.0) as u32;

        self.rasterize(handle, page_index, width, height, &CancellationToken::new())
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.inner.close(handle)
    }
}
