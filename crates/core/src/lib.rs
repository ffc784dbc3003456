//! scanmark core library
//!
//! Interaction, OCR and session layer of the annotation workspace:
//! pointer events become store mutations, scan drags become recognized
//! callouts, and the session hands the result to the export projector.

pub mod config;
pub mod interaction;
pub mod ocr;
pub mod overlay;
pub mod page_view;
pub mod runtime;
pub mod session;
pub mod tesseract;

pub use config::{ConfigError, ExportConfig, InteractionConfig, OcrConfig, ScanmarkConfig};
pub use interaction::{InteractionMachine, InteractionState, PointerEffect, Tool};
pub use ocr::{
    crop_region, effective_magnification, rotations, select_best, BestText, OcrPipeline,
    Recognition, RecognitionEngine, RecognitionError, RegionText, Rotation, MAX_CROP_PIXELS,
};
pub use overlay::{OverlayPrimitive, CALLOUT_DISPLAY_HEIGHT};
pub use page_view::{PageView, ScanInfo, ScanJob, SCAN_CALLOUT_GAP};
pub use runtime::{init_logging, Runtime, RuntimeError, DEFAULT_LOG_FILTER};
pub use session::{DocumentSession, RenderError, SessionError};
pub use tesseract::TesseractEngine;
