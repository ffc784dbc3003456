//! Page records and viewport mapping

use serde::{Deserialize, Serialize};

/// Natural page size in PDF points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl Default for PageSize {
    fn default() -> Self {
        Self { width_pt: 612.0, height_pt: 792.0 }
    }
}

/// Mapping from PDF page points to on-screen pixels
///
/// A single uniform scale fit to the container width. Every annotation
/// coordinate lives in the scaled space this describes, so the same scale
/// must be handed to the export projector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub page_size: PageSize,
    pub scale: f32,
}

impl Viewport {
    /// Fit the page to `container_width` pixels
    ///
    /// Degenerate inputs fall back to a scale of 1.0.
    pub fn fit_width(page_size: PageSize, container_width: f32) -> Self {
        let scale = if page_size.width_pt > 0.0 && container_width > 0.0 {
            container_width / page_size.width_pt
        } else {
            1.0
        };
        Self { page_size, scale }
    }

    pub fn with_scale(page_size: PageSize, scale: f32) -> Self {
        Self { page_size, scale }
    }

    pub fn width_px(&self) -> f32 {
        self.page_size.width_pt * self.scale
    }

    pub fn height_px(&self) -> f32 {
        self.page_size.height_pt * self.scale
    }

    /// Pixel dimensions of a raster at this viewport
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width_px().round().max(1.0) as u32,
            self.height_px().round().max(1.0) as u32,
        )
    }
}

/// Pixel thumbnail attached to a page record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailImage {
    pub width: u32,
    pub height: u32,
    /// Packed RGBA8 pixels
    pub rgba: Vec<u8>,
}

/// Sidebar representation of a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub label: String,
    pub image: Option<ThumbnailImage>,
}

impl Thumbnail {
    pub fn label_for(page_number: u32) -> Self {
        Self { label: format!("Page {page_number}"), image: None }
    }
}

/// One entry per PDF page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub page_number: u32,
    pub title: String,
    pub thumbnail: Thumbnail,
}

/// Page records for an open document
///
/// Created once on load, never shrinks or grows while the document is open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageList {
    records: Vec<PageRecord>,
}

impl PageList {
    /// Build records for pages `1..=page_count`
    pub fn with_page_count(page_count: u32) -> Self {
        let records = (1..=page_count)
            .map(|page_number| PageRecord {
                page_number,
                title: String::new(),
                thumbnail: Thumbnail::label_for(page_number),
            })
            .collect();
        Self { records }
    }

    pub fn records(&self) -> &[PageRecord] {
        &self.records
    }

    pub fn page_count(&self) -> u32 {
        self.records.len() as u32
    }

    pub fn get(&self, page_number: u32) -> Option<&PageRecord> {
        let index = page_number.checked_sub(1)? as usize;
        self.records.get(index)
    }

    fn get_mut(&mut self, page_number: u32) -> Option<&mut PageRecord> {
        let index = page_number.checked_sub(1)? as usize;
        self.records.get_mut(index)
    }

    /// Overwrite a page title; returns `false` for unknown pages
    pub fn set_title(&mut self, page_number: u32, title: impl Into<String>) -> bool {
        match self.get_mut(page_number) {
            Some(record) => {
                record.title = title.into();
                true
            }
            None => false,
        }
    }

    pub fn set_thumbnail_image(&mut self, page_number: u32, image: ThumbnailImage) -> bool {
        match self.get_mut(page_number) {
            Some(record) => {
                record.thumbnail.image = Some(image);
                true
            }
            None => false,
        }
    }

    /// Clamp a requested page number into `1..=page_count`
    pub fn clamp_page(&self, page_number: u32) -> u32 {
        page_number.clamp(1, self.page_count().max(1))
    }
}
