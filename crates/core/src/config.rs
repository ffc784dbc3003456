//! Runtime configuration
//!
//! Settings can be built programmatically, read from environment variables,
//! or loaded from a JSON file. Every source is validated the same way.

use scanmark_model::{ANCHOR_GRAB_RADIUS, ERASER_RADIUS};
use scanmark_pdf::ExportOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Upper bound for the OCR upscale factor
pub const MAX_MAGNIFICATION: u32 = 8;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanmarkConfig {
    pub interaction: InteractionConfig,
    pub ocr: OcrConfig,
    pub export: ExportConfig,
}

/// Hit-test radii, in viewport pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Distance within which a callout anchor can be grabbed
    pub anchor_grab_radius: f32,
    /// Distance within which the eraser removes a callout by its anchor
    pub eraser_radius: f32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self { anchor_grab_radius: ANCHOR_GRAB_RADIUS, eraser_radius: ERASER_RADIUS }
    }
}

/// Region recognition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract language code
    pub language: String,

    /// Integer upscale applied to the cropped region before recognition
    pub magnification: u32,

    /// Recognize the four rotations on scoped threads
    pub concurrent: bool,

    /// Path or name of the tesseract executable
    pub tesseract_bin: PathBuf,

    /// Tesseract page segmentation mode (6 = single uniform block)
    pub page_segmentation_mode: u8,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            magnification: 2,
            concurrent: true,
            tesseract_bin: PathBuf::from("tesseract"),
            page_segmentation_mode: 6,
        }
    }
}

impl OcrConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_magnification(mut self, magnification: u32) -> Self {
        self.magnification = magnification;
        self
    }

    pub fn with_concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    pub fn with_tesseract_bin<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.tesseract_bin = path.as_ref().to_path_buf();
        self
    }

    pub fn with_page_segmentation_mode(mut self, mode: u8) -> Self {
        self.page_segmentation_mode = mode;
        self
    }
}

/// Export settings, mapped onto [`ExportOptions`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub include_pen_strokes: bool,
    pub border_width: f32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        let options = ExportOptions::default();
        Self { include_pen_strokes: options.include_pen_strokes, border_width: options.border_width }
    }
}

impl ExportConfig {
    pub fn to_options(&self) -> ExportOptions {
        ExportOptions {
            include_pen_strokes: self.include_pen_strokes,
            border_width: self.border_width,
            ..ExportOptions::default()
        }
    }
}

impl ScanmarkConfig {
    pub fn with_interaction(mut self, interaction: InteractionConfig) -> Self {
        self.interaction = interaction;
        self
    }

    pub fn with_ocr(mut self, ocr: OcrConfig) -> Self {
        self.ocr = ocr;
        self
    }

    pub fn with_export(mut self, export: ExportConfig) -> Self {
        self.export = export;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SCANMARK_OCR_LANGUAGE`: recognition language (default: eng)
    /// - `SCANMARK_OCR_MAGNIFICATION`: upscale factor (default: 2)
    /// - `SCANMARK_OCR_CONCURRENT`: `true`/`false` (default: true)
    /// - `SCANMARK_TESSERACT_BIN`: tesseract executable
    /// - `SCANMARK_ANCHOR_RADIUS`: callout grab radius in px (default: 12)
    /// - `SCANMARK_ERASER_RADIUS`: eraser radius in px (default: 10)
    ///
    /// # Errors
    /// Returns an error if any variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SCANMARK_OCR_LANGUAGE") {
            config.ocr.language = val;
        }
        if let Some(val) = parse_env("SCANMARK_OCR_MAGNIFICATION")? {
            config.ocr.magnification = val;
        }
        if let Some(val) = parse_env("SCANMARK_OCR_CONCURRENT")? {
            config.ocr.concurrent = val;
        }
        if let Ok(val) = std::env::var("SCANMARK_TESSERACT_BIN") {
            config.ocr.tesseract_bin = PathBuf::from(val);
        }
        if let Some(val) = parse_env("SCANMARK_ANCHOR_RADIUS")? {
            config.interaction.anchor_grab_radius = val;
        }
        if let Some(val) = parse_env("SCANMARK_ERASER_RADIUS")? {
            config.interaction.eraser_radius = val;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file; missing keys take defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty JSON, creating parent directories.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let radii = [
            ("anchor_grab_radius", self.interaction.anchor_grab_radius),
            ("eraser_radius", self.interaction.eraser_radius),
        ];
        for (key, radius) in radii {
            if !radius.is_finite() || radius < 0.0 {
                return Err(ConfigError::InvalidValue(format!("{key}={radius}")));
            }
        }

        if self.ocr.magnification == 0 || self.ocr.magnification > MAX_MAGNIFICATION {
            return Err(ConfigError::InvalidValue(format!(
                "magnification={} (expected 1..={MAX_MAGNIFICATION})",
                self.ocr.magnification
            )));
        }

        if self.ocr.language.trim().is_empty() {
            return Err(ConfigError::InvalidValue("language is empty".to_string()));
        }

        if !self.export.border_width.is_finite() || self.export.border_width <= 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "border_width={}",
                self.export.border_width
            )));
        }

        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={val}"))),
        Err(_) => Ok(None),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}
