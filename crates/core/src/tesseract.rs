//! Tesseract command-line recognition engine
//!
//! Each call writes the image to a temporary PNG and runs
//! `tesseract <png> stdout -l <lang> --psm <mode> tsv`. The PNG is removed
//! on every exit path. Word confidences in the TSV output are averaged and
//! scaled to 0..1.

use crate::config::OcrConfig;
use crate::ocr::{Recognition, RecognitionEngine, RecognitionError};
use image::{ImageFormat, RgbaImage};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// TSV columns: level page_num block_num par_num line_num word_num
/// left top width height conf text
const TSV_COLUMNS: usize = 12;

#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    page_segmentation_mode: u8,
    /// Where input PNGs are written; the system temp dir when unset
    scratch_dir: Option<PathBuf>,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::from_config(&OcrConfig::default())
    }
}

impl TesseractEngine {
    pub fn new<P: AsRef<Path>>(binary: P) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
            page_segmentation_mode: 6,
            scratch_dir: None,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            binary: config.tesseract_bin.clone(),
            page_segmentation_mode: config.page_segmentation_mode,
            scratch_dir: None,
        }
    }

    pub fn with_scratch_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.scratch_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl RecognitionEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &RgbaImage, language: &str) -> Result<Recognition, RecognitionError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("scanmark-ocr-").suffix(".png");
        let input = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        {
            let mut writer = BufWriter::new(input.as_file());
            image.write_to(&mut writer, ImageFormat::Png)?;
            writer.flush()?;
        }

        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .args(["-l", language])
            .args(["--psm", &self.page_segmentation_mode.to_string()])
            .arg("tsv")
            .stdin(Stdio::null())
            .output();

        let path = input.path().to_path_buf();
        if let Err(err) = input.close() {
            tracing::debug!(path = %path.display(), error = %err, "failed to remove OCR input");
        }

        let output = output.map_err(|err| {
            RecognitionError::Unavailable(format!("{}: {err}", self.binary.display()))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::Engine(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_tsv(&String::from_utf8_lossy(&output.stdout))
    }

    fn probe(&self) -> Result<(), RecognitionError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|err| RecognitionError::Unavailable(format!("{}: {err}", self.binary.display())))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(RecognitionError::Unavailable(format!(
                "{} --version exited with {}",
                self.binary.display(),
                output.status
            )))
        }
    }
}

/// Rebuild text and mean confidence from tesseract TSV output
///
/// Words on the same (block, paragraph, line) are joined by spaces, lines
/// by newlines. Rows with negative confidence are layout rows, not words.
pub fn parse_tsv(tsv: &str) -> Result<Recognition, RecognitionError> {
    let mut lines = tsv.lines();
    match lines.next() {
        Some(header) if header.starts_with("level") => {}
        Some(other) => {
            return Err(RecognitionError::Output(format!("missing TSV header: {other:.40}")));
        }
        None => return Ok(Recognition::new("", 0.0)),
    }

    let mut text = String::new();
    let mut current_line: Option<(u32, u32, u32)> = None;
    let mut confidence_sum = 0.0_f32;
    let mut words = 0_u32;

    for row in lines {
        let fields: Vec<&str> = row.splitn(TSV_COLUMNS, '\t').collect();
        if fields.len() < TSV_COLUMNS {
            continue;
        }

        let confidence: f32 = fields[10]
            .trim()
            .parse()
            .map_err(|_| RecognitionError::Output(format!("bad confidence {:?}", fields[10])))?;
        let word = fields[11].trim();
        if confidence < 0.0 || word.is_empty() {
            continue;
        }

        let line_key = (
            fields[2].parse().unwrap_or(0),
            fields[3].parse().unwrap_or(0),
            fields[4].parse().unwrap_or(0),
        );
        match current_line {
            Some(key) if key == line_key => text.push(' '),
            Some(_) => text.push('\n'),
            None => {}
        }
        current_line = Some(line_key);
        text.push_str(word);

        confidence_sum += confidence;
        words += 1;
    }

    let confidence = if words == 0 { 0.0 } else { confidence_sum / words as f32 / 100.0 };
    Ok(Recognition { text, confidence: confidence.clamp(0.0, 1.0) })
}
