#![allow(dead_code)]

use image::RgbaImage;
use lopdf::content::Content;
use lopdf::{dictionary, Document, Object, Stream};
use scanmark_core::{
    OcrConfig, OcrPipeline, Recognition, RecognitionEngine, RecognitionError, Runtime,
    ScanmarkConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// US Letter document with `page_count` empty pages
pub fn letter_pdf(page_count: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = (0..page_count)
        .map(|_| {
            let content = Content { operations: Vec::new() };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("empty content encodes"),
            ));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
            })
            .into()
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("sample PDF saves");
    bytes
}

/// Returns the same answer for every orientation and counts calls
pub struct FixedEngine {
    pub recognition: Recognition,
    pub calls: AtomicUsize,
}

impl FixedEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self { recognition: Recognition::new(text, confidence), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RecognitionEngine for FixedEngine {
    fn name(&self) -> &str {
        "fixed"
    }

    fn recognize(&self, _image: &RgbaImage, _language: &str) -> Result<Recognition, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.recognition.clone())
    }
}

/// Always fails
pub struct BrokenEngine;

impl RecognitionEngine for BrokenEngine {
    fn name(&self) -> &str {
        "broken"
    }

    fn recognize(&self, _image: &RgbaImage, _language: &str) -> Result<Recognition, RecognitionError> {
        Err(RecognitionError::Engine("model not loaded".to_string()))
    }
}

pub fn pipeline(engine: Arc<dyn RecognitionEngine>) -> OcrPipeline {
    OcrPipeline::new(engine, &OcrConfig::default())
}

pub fn runtime(engine: Arc<dyn RecognitionEngine>) -> Runtime {
    Runtime::with_engine(ScanmarkConfig::default(), engine).expect("runtime starts")
}
