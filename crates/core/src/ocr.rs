//! Region capture and OCR
//!
//! A scan region is cropped from the rendered page, upscaled, and recognized
//! in all four right-angle orientations. The orientation with the highest
//! confidence among non-empty results wins, which makes the caption robust
//! to sideways or upside-down text on the page.

use crate::config::OcrConfig;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use scanmark_model::Region;
use std::io;
use std::sync::Arc;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Output of a single recognition call
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// 0.0 to 1.0
    pub confidence: f32,
}

impl Recognition {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self { text: text.into(), confidence }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("recognition engine unavailable: {0}")]
    Unavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("recognition failed: {0}")]
    Engine(String),
    #[error("unreadable engine output: {0}")]
    Output(String),
}

/// Text recognizer
///
/// Implementations are shared across the four orientation workers.
pub trait RecognitionEngine: Send + Sync {
    fn name(&self) -> &str;

    fn recognize(&self, image: &RgbaImage, language: &str) -> Result<Recognition, RecognitionError>;

    /// Check that the engine can run at all
    fn probe(&self) -> Result<(), RecognitionError> {
        Ok(())
    }
}

/// Clockwise rotation applied to the crop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Recognition and tie-break order
    pub const ALL: [Rotation; 4] = [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270];

    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    pub fn apply(&self, image: &RgbaImage) -> RgbaImage {
        match self {
            Rotation::Deg0 => image.clone(),
            Rotation::Deg90 => imageops::rotate90(image),
            Rotation::Deg180 => imageops::rotate180(image),
            Rotation::Deg270 => imageops::rotate270(image),
        }
    }
}

/// Upper bound on a magnified crop; larger crops get a smaller factor
pub const MAX_CROP_PIXELS: u64 = 16 * 1024 * 1024;

/// Copy `region` out of the page raster and upscale it
///
/// The region is clipped to the page, so drags past the canvas edge only
/// sample the pixels they overlap. A region that misses the page reads as a
/// single white pixel, and a zero-area region on the page as the one pixel
/// under it.
pub fn crop_region(page: &RgbaImage, region: &Region, magnification: u32) -> RgbaImage {
    let region = region.rounded();
    let (x, y) = (f64::from(region.x), f64::from(region.y));
    let left = x.max(0.0);
    let top = y.max(0.0);
    let right = (x + f64::from(region.width).max(1.0)).min(f64::from(page.width()));
    let bottom = (y + f64::from(region.height).max(1.0)).min(f64::from(page.height()));

    // Also rejects NaN coordinates
    if !(right > left && bottom > top) {
        return magnify(RgbaImage::from_pixel(1, 1, BACKGROUND), magnification);
    }

    let crop = imageops::crop_imm(
        page,
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    )
    .to_image();
    magnify(crop, magnification)
}

/// Largest factor up to `magnification` that keeps the crop within
/// [`MAX_CROP_PIXELS`]; never below 1
pub fn effective_magnification(width: u32, height: u32, magnification: u32) -> u32 {
    let pixels = u64::from(width) * u64::from(height);
    let fitting = ((MAX_CROP_PIXELS / pixels.max(1)) as f64).sqrt() as u32;
    magnification.clamp(1, fitting.max(1))
}

fn magnify(crop: RgbaImage, magnification: u32) -> RgbaImage {
    let (width, height) = crop.dimensions();
    let factor = effective_magnification(width, height, magnification);

    if factor < magnification {
        tracing::debug!(magnification, factor, width, height, "reduced crop magnification");
    }
    if factor == 1 {
        return crop;
    }
    imageops::resize(&crop, width * factor, height * factor, FilterType::Triangle)
}

/// The crop in every orientation, in [`Rotation::ALL`] order
pub fn rotations(image: &RgbaImage) -> Vec<(Rotation, RgbaImage)> {
    Rotation::ALL.iter().map(|rotation| (*rotation, rotation.apply(image))).collect()
}

/// Winning orientation
#[derive(Debug, Clone, PartialEq)]
pub struct BestText {
    pub rotation: Rotation,
    /// Trimmed
    pub text: String,
    pub confidence: f32,
}

/// Pick the highest-confidence non-empty result
///
/// Strictly greater wins, so on a tie the earlier candidate is kept.
pub fn select_best<I>(candidates: I) -> Option<BestText>
where
    I: IntoIterator<Item = (Rotation, Recognition)>,
{
    let mut best: Option<BestText> = None;
    let mut best_confidence = -1.0_f32;

    for (rotation, recognition) in candidates {
        let text = recognition.text.trim();
        if !text.is_empty() && recognition.confidence > best_confidence {
            best_confidence = recognition.confidence;
            best = Some(BestText {
                rotation,
                text: text.to_string(),
                confidence: recognition.confidence,
            });
        }
    }

    best
}

/// Result of recognizing one region
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionText {
    pub best: Option<BestText>,
    /// Orientations whose engine call failed
    pub failed: Vec<Rotation>,
}

impl RegionText {
    /// Recognized text, or "" when nothing was found
    pub fn text(&self) -> &str {
        self.best.as_ref().map_or("", |best| best.text.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.best.is_none()
    }
}

/// Crop, rotate, recognize, select
#[derive(Clone)]
pub struct OcrPipeline {
    engine: Arc<dyn RecognitionEngine>,
    language: String,
    magnification: u32,
    concurrent: bool,
}

impl std::fmt::Debug for OcrPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrPipeline")
            .field("engine", &self.engine.name())
            .field("language", &self.language)
            .field("magnification", &self.magnification)
            .field("concurrent", &self.concurrent)
            .finish()
    }
}

impl OcrPipeline {
    pub fn new(engine: Arc<dyn RecognitionEngine>, config: &OcrConfig) -> Self {
        Self {
            engine,
            language: config.language.clone(),
            magnification: config.magnification.max(1),
            concurrent: config.concurrent,
        }
    }

    pub fn engine(&self) -> &Arc<dyn RecognitionEngine> {
        &self.engine
    }

    pub fn magnification(&self) -> u32 {
        self.magnification
    }

    /// Recognize a normalized region of a rendered page
    pub fn recognize_region(&self, page: &RgbaImage, region: &Region) -> RegionText {
        let crop = crop_region(page, region, self.magnification);
        tracing::debug!(
            x = region.x,
            y = region.y,
            width = crop.width(),
            height = crop.height(),
            "captured scan region"
        );
        self.recognize_image(&crop)
    }

    /// Recognize an already cropped image in all four orientations
    pub fn recognize_image(&self, image: &RgbaImage) -> RegionText {
        let variants = rotations(image);
        let attempts = if self.concurrent {
            self.run_concurrent(&variants)
        } else {
            self.run_sequential(&variants)
        };

        let mut result = RegionText::default();
        let mut recognized = Vec::with_capacity(attempts.len());

        for (rotation, attempt) in attempts {
            match attempt {
                Ok(recognition) => {
                    tracing::debug!(
                        degrees = rotation.degrees(),
                        confidence = recognition.confidence,
                        chars = recognition.text.trim().len(),
                        "orientation recognized"
                    );
                    recognized.push((rotation, recognition));
                }
                Err(err) => {
                    tracing::warn!(
                        degrees = rotation.degrees(),
                        engine = self.engine.name(),
                        error = %err,
                        "recognition failed for orientation"
                    );
                    result.failed.push(rotation);
                }
            }
        }

        result.best = select_best(recognized);
        result
    }

    fn run_sequential(
        &self,
        variants: &[(Rotation, RgbaImage)],
    ) -> Vec<(Rotation, Result<Recognition, RecognitionError>)> {
        variants
            .iter()
            .map(|(rotation, image)| (*rotation, self.engine.recognize(image, &self.language)))
            .collect()
    }

    fn run_concurrent(
        &self,
        variants: &[(Rotation, RgbaImage)],
    ) -> Vec<(Rotation, Result<Recognition, RecognitionError>)> {
        let engine = self.engine.as_ref();
        let language = self.language.as_str();

        std::thread::scope(|scope| {
            let workers: Vec<_> = variants
                .iter()
                .map(|(rotation, image)| {
                    (*rotation, scope.spawn(move || engine.recognize(image, language)))
                })
                .collect();

            workers
                .into_iter()
                .map(|(rotation, worker)| {
                    let outcome = worker.join().unwrap_or_else(|_| {
                        Err(RecognitionError::Engine("recognition worker panicked".to_string()))
                    });
                    (rotation, outcome)
                })
                .collect()
        })
    }
}
