//! Export projector: burn overlay annotations into a PDF
//!
//! Annotations are captured in viewport pixel space (Y down, scaled by the
//! viewport). PDF page space has Y growing up from the bottom and is measured
//! in points, so every primitive goes through
//!
//! ```text
//! pdf_x = screen_x / scale
//! pdf_y = page_height - screen_y / scale - element_height / scale
//! ```
//!
//! The scale must be the one the annotations were captured at; there is
//! deliberately no default.

use crate::{inherited_attribute, media_box_size};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use scanmark_model::{
    Annotation, AnnotationKind, Color, Point, Region, CALLOUT_BOX_HEIGHT, CALLOUT_BOX_WIDTH,
};
use std::collections::BTreeMap;

/// Attached text is cut to this many characters
pub const TEXT_SNIPPET_CHARS: usize = 200;

/// Resource name of the font added for annotation text
const FONT_RESOURCE: &str = "ScanmarkHelv";

/// Distance from the top of a box to the first text baseline, in points
const BOX_TEXT_DROP: f32 = 12.0;
const BOX_TEXT_INSET: f32 = 4.0;

/// Baseline drop for free text annotations, in points
const TEXT_LINE_DROP: f32 = 12.0;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to load source PDF: {0}")]
    Load(#[source] lopdf::Error),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("invalid export scale {0}")]
    InvalidScale(f32),
    #[error("PDF object error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("failed to write PDF: {0}")]
    Write(String),
}

/// Export options
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// Draw freehand pen strokes as polylines
    pub include_pen_strokes: bool,

    /// Stroke width for boxes and strokes, in points
    pub border_width: f32,

    /// Font size for text inside rect and callout boxes
    pub box_font_size: f32,

    /// Font size for free text annotations
    pub text_font_size: f32,

    pub stroke_color: Color,
    pub text_color: Color,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_pen_strokes: true,
            border_width: 2.0,
            box_font_size: 9.0,
            text_font_size: 10.0,
            stroke_color: Color::RED,
            text_color: Color::BLACK,
        }
    }
}

/// Rectangle in PDF page space (bottom-left origin)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PdfRect {
    pub fn top(&self) -> f32 {
        self.y + self.height
    }
}

/// Map a normalized screen-space box into PDF space
pub fn project_box(region: &Region, page_height: f32, scale: f32) -> PdfRect {
    let width = region.width / scale;
    let height = region.height / scale;
    PdfRect {
        x: region.x / scale,
        y: page_height - region.y / scale - height,
        width,
        height,
    }
}

fn project_point(point: &Point, page_height: f32, scale: f32) -> (f32, f32) {
    (point.x / scale, page_height - point.y / scale)
}

/// Produce a copy of `original` with annotations drawn into page content
///
/// `annotations` is keyed by 1-based page number. Any page number outside
/// the document aborts the whole export; nothing partial is returned.
pub fn export_annotated_pdf(
    original: &[u8],
    annotations: &BTreeMap<u32, Vec<Annotation>>,
    scale: f32,
    options: &ExportOptions,
) -> Result<Vec<u8>, ExportError> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(ExportError::InvalidScale(scale));
    }

    let mut doc = Document::load_mem(original).map_err(ExportError::Load)?;
    let pages = doc.get_pages();
    let page_count = pages.len() as u32;

    for &page in annotations.keys() {
        if !pages.contains_key(&page) {
            return Err(ExportError::PageOutOfRange { page, page_count });
        }
    }

    for (page_number, objects) in annotations {
        let Some(&page_id) = pages.get(page_number) else {
            continue;
        };
        let page_height = media_box_size(&doc, page_id).height_pt;

        let operations = page_operations(objects, page_height, scale, options);
        if operations.is_empty() {
            continue;
        }

        if operations.iter().any(|op| op.operator == "Tf") {
            register_font(&mut doc, page_id)?;
        }
        append_content(&mut doc, page_id, operations)?;

        tracing::debug!(page = page_number, objects = objects.len(), "burned annotations into page");
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|e| ExportError::Write(e.to_string()))?;

    tracing::info!(pages = annotations.len(), bytes = bytes.len(), "exported annotated PDF");
    Ok(bytes)
}

fn page_operations(
    objects: &[Annotation],
    page_height: f32,
    scale: f32,
    options: &ExportOptions,
) -> Vec<Operation> {
    let mut ops = Vec::new();

    for object in objects {
        match object.kind() {
            AnnotationKind::Rect { .. } | AnnotationKind::Callout { .. } => {
                let Some(region) = object.bounds() else {
                    continue;
                };
                let rect = project_box(&region, page_height, scale);
                stroke_rect(&mut ops, &rect, options);

                if let Some(text) = object.text_content().filter(|t| !t.is_empty()) {
                    let snippet: String = text.chars().take(TEXT_SNIPPET_CHARS).collect();
                    draw_text(
                        &mut ops,
                        &snippet,
                        rect.x + BOX_TEXT_INSET,
                        rect.top() - BOX_TEXT_DROP,
                        options.box_font_size,
                        options.text_color,
                    );
                }
            }
            AnnotationKind::Text { anchor, text } => {
                if text.is_empty() {
                    continue;
                }
                let x = anchor.x / scale;
                let y = page_height - anchor.y / scale - TEXT_LINE_DROP;
                draw_text(&mut ops, text, x, y, options.text_font_size, options.text_color);
            }
            AnnotationKind::Pen { points } => {
                if options.include_pen_strokes && points.len() >= 2 {
                    stroke_polyline(&mut ops, points, page_height, scale, options);
                }
            }
        }
    }

    ops
}

fn color_operands(color: Color) -> Vec<Object> {
    let (r, g, b, _) = color.to_normalized();
    vec![r.into(), g.into(), b.into()]
}

fn stroke_rect(ops: &mut Vec<Operation>, rect: &PdfRect, options: &ExportOptions) {
    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new("RG", color_operands(options.stroke_color)));
    ops.push(Operation::new("w", vec![options.border_width.into()]));
    ops.push(Operation::new(
        "re",
        vec![rect.x.into(), rect.y.into(), rect.width.into(), rect.height.into()],
    ));
    ops.push(Operation::new("S", vec![]));
    ops.push(Operation::new("Q", vec![]));
}

fn stroke_polyline(
    ops: &mut Vec<Operation>,
    points: &[Point],
    page_height: f32,
    scale: f32,
    options: &ExportOptions,
) {
    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new("RG", color_operands(options.stroke_color)));
    ops.push(Operation::new("w", vec![options.border_width.into()]));
    ops.push(Operation::new("J", vec![1.into()]));
    ops.push(Operation::new("j", vec![1.into()]));

    for (i, point) in points.iter().enumerate() {
        let (x, y) = project_point(point, page_height, scale);
        let operator = if i == 0 { "m" } else { "l" };
        ops.push(Operation::new(operator, vec![x.into(), y.into()]));
    }

    ops.push(Operation::new("S", vec![]));
    ops.push(Operation::new("Q", vec![]));
}

fn draw_text(ops: &mut Vec<Operation>, text: &str, x: f32, y: f32, size: f32, color: Color) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![Object::Name(FONT_RESOURCE.as_bytes().to_vec()), size.into()]));
    ops.push(Operation::new("rg", color_operands(color)));
    ops.push(Operation::new("TL", vec![(size * 1.2).into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));

    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            ops.push(Operation::new("T*", vec![]));
        }
        ops.push(Operation::new("Tj", vec![Object::string_literal(win_ansi_bytes(line))]));
    }

    ops.push(Operation::new("ET", vec![]));
}

/// Encode for the standard Helvetica font; unmappable characters become '?'
fn win_ansi_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            0x20..=0x7e | 0xa0..=0xff => c as u8,
            0x09 => b' ',
            _ => b'?',
        })
        .collect()
}

/// Make the annotation font available in the page's resources
///
/// Inherited resources are copied onto the page so the original content
/// keeps resolving its own fonts and XObjects.
fn register_font(doc: &mut Document, page_id: ObjectId) -> Result<(), ExportError> {
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut resources = inherited_attribute(doc, page_id, b"Resources")
        .and_then(|obj| resolve_dict(doc, obj))
        .unwrap_or_else(Dictionary::new);

    let mut fonts = resources
        .get(b"Font")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .unwrap_or_else(Dictionary::new);

    fonts.set(FONT_RESOURCE, Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));

    doc.get_object_mut(page_id)?.as_dict_mut()?.set("Resources", Object::Dictionary(resources));
    Ok(())
}

fn resolve_dict(doc: &Document, object: &Object) -> Option<Dictionary> {
    match object {
        Object::Reference(id) => doc.get_dictionary(*id).ok().cloned(),
        Object::Dictionary(dict) => Some(dict.clone()),
        _ => None,
    }
}

/// Wrap existing page content in q/Q and append the annotation stream
fn append_content(
    doc: &mut Document,
    page_id: ObjectId,
    operations: Vec<Operation>,
) -> Result<(), ExportError> {
    let existing: Vec<Object> = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let save_state = Content { operations: vec![Operation::new("q", vec![])] }.encode()?;
    let prefix_id = doc.add_object(Stream::new(dictionary! {}, save_state));

    let mut body = Vec::with_capacity(operations.len() + 1);
    body.push(Operation::new("Q", vec![]));
    body.extend(operations);
    let suffix_id = doc.add_object(Stream::new(dictionary! {}, Content { operations: body }.encode()?));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(prefix_id));
    contents.extend(existing);
    contents.push(Object::Reference(suffix_id));

    doc.get_object_mut(page_id)?.as_dict_mut()?.set("Contents", Object::Array(contents));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sample_pdf;
    use scanmark_model::{AnnotationPatch, PageSize};

    const EPS: f32 = 0.01;

    fn decode_page(bytes: &[u8], page_number: u32) -> (Document, Vec<Operation>) {
        let doc = Document::load_mem(bytes).expect("exported PDF should reload");
        let page_id = doc.get_pages()[&page_number];
        let content = doc.get_page_content(page_id).expect("page content");
        let operations = Content::decode(&content).expect("content decodes").operations;
        (doc, operations)
    }

    fn floats(op: &Operation) -> Vec<f32> {
        op.operands.iter().map(|o| o.as_float().expect("numeric operand")).collect()
    }

    #[test]
    fn projects_callout_box_into_pdf_space() {
        let region = Region { x: 100.0, y: 50.0, width: 180.0, height: 60.0 };
        let rect = project_box(&region, 792.0, 1.5);

        assert!((rect.x - 66.67).abs() < EPS);
        assert!((rect.y - 718.67).abs() < EPS);
        assert!((rect.width - 120.0).abs() < EPS);
        assert!((rect.height - 40.0).abs() < EPS);
    }

    #[test]
    fn callout_box_is_stroked_with_text() {
        let bytes = sample_pdf(1, PageSize::default());
        let callout =
            Annotation::callout_at(Point::new(60.0, 80.0), Point::new(100.0, 50.0), "Total due");
        let annotations = BTreeMap::from([(1, vec![callout])]);

        let out = export_annotated_pdf(&bytes, &annotations, 1.5, &ExportOptions::default())
            .expect("export should succeed");
        let (_, ops) = decode_page(&out, 1);

        let re = ops.iter().find(|op| op.operator == "re").expect("box should be drawn");
        let values = floats(re);
        assert!((values[0] - 66.67).abs() < EPS);
        assert!((values[1] - 718.67).abs() < EPS);
        assert!((values[2] - 120.0).abs() < EPS);
        assert!((values[3] - 40.0).abs() < EPS);

        let tj = ops.iter().find(|op| op.operator == "Tj").expect("text should be drawn");
        assert_eq!(tj.operands[0].as_str().expect("string operand"), b"Total due");

        let td = ops.iter().find(|op| op.operator == "Td").expect("text position");
        let origin = floats(td);
        assert!((origin[0] - 70.67).abs() < EPS);
        assert!((origin[1] - (758.67 - 12.0)).abs() < EPS);
    }

    #[test]
    fn rect_is_normalized_before_projection() {
        let bytes = sample_pdf(1, PageSize::default());
        let mut rect = Annotation::rect(Point::new(150.0, 150.0));
        rect.apply(AnnotationPatch::Size { width: -150.0, height: -75.0 });
        let annotations = BTreeMap::from([(1, vec![rect])]);

        let out = export_annotated_pdf(&bytes, &annotations, 1.5, &ExportOptions::default())
            .expect("export should succeed");
        let (_, ops) = decode_page(&out, 1);

        let values = floats(ops.iter().find(|op| op.operator == "re").expect("rect drawn"));
        assert!(values[0].abs() < EPS);
        assert!((values[1] - (792.0 - 50.0 - 50.0)).abs() < EPS);
        assert!((values[2] - 100.0).abs() < EPS);
        assert!((values[3] - 50.0).abs() < EPS);
        assert!(!ops.iter().any(|op| op.operator == "Tj"));
    }

    #[test]
    fn long_text_is_truncated() {
        let bytes = sample_pdf(1, PageSize::default());
        let long = "x".repeat(500);
        let callout = Annotation::callout_at(Point::new(0.0, 0.0), Point::new(10.0, 10.0), long);
        let annotations = BTreeMap::from([(1, vec![callout])]);

        let out = export_annotated_pdf(&bytes, &annotations, 1.0, &ExportOptions::default())
            .expect("export should succeed");
        let (_, ops) = decode_page(&out, 1);

        let tj = ops.iter().find(|op| op.operator == "Tj").expect("text drawn");
        assert_eq!(tj.operands[0].as_str().expect("string").len(), TEXT_SNIPPET_CHARS);
    }

    #[test]
    fn text_annotation_has_no_box() {
        let bytes = sample_pdf(1, PageSize::default());
        let mut text = Annotation::text(Point::new(30.0, 60.0));
        text.apply(AnnotationPatch::Text("Note".to_owned()));
        let annotations = BTreeMap::from([(1, vec![text])]);

        let out = export_annotated_pdf(&bytes, &annotations, 1.5, &ExportOptions::default())
            .expect("export should succeed");
        let (_, ops) = decode_page(&out, 1);

        assert!(!ops.iter().any(|op| op.operator == "re"));
        let td = floats(ops.iter().find(|op| op.operator == "Td").expect("text position"));
        assert!((td[0] - 20.0).abs() < EPS);
        assert!((td[1] - (792.0 - 40.0 - 12.0)).abs() < EPS);
    }

    #[test]
    fn pen_strokes_follow_options() {
        let bytes = sample_pdf(1, PageSize::default());
        let mut pen = Annotation::pen(Point::new(0.0, 0.0));
        pen.apply(AnnotationPatch::AppendPoint(Point::new(15.0, 30.0)));
        let annotations = BTreeMap::from([(1, vec![pen])]);

        let out = export_annotated_pdf(&bytes, &annotations, 1.5, &ExportOptions::default())
            .expect("export should succeed");
        let (_, ops) = decode_page(&out, 1);
        let line = floats(ops.iter().find(|op| op.operator == "l").expect("stroke drawn"));
        assert!((line[0] - 10.0).abs() < EPS);
        assert!((line[1] - 772.0).abs() < EPS);

        let legacy = ExportOptions { include_pen_strokes: false, ..ExportOptions::default() };
        let out = export_annotated_pdf(&bytes, &annotations, 1.5, &legacy)
            .expect("export should succeed");
        let (_, ops) = decode_page(&out, 1);
        assert!(!ops.iter().any(|op| op.operator == "l"));
    }

    #[test]
    fn text_font_is_registered_on_page() {
        let bytes = sample_pdf(1, PageSize::default());
        let callout = Annotation::callout_at(Point::new(0.0, 0.0), Point::new(5.0, 5.0), "A");
        let annotations = BTreeMap::from([(1, vec![callout])]);

        let out = export_annotated_pdf(&bytes, &annotations, 1.0, &ExportOptions::default())
            .expect("export should succeed");
        let (doc, _) = decode_page(&out, 1);
        let page_id = doc.get_pages()[&1];
        let resources = doc
            .get_dictionary(page_id)
            .expect("page dict")
            .get(b"Resources")
            .expect("resources set")
            .as_dict()
            .expect("inline resources");
        let fonts = resources.get(b"Font").expect("font dict").as_dict().expect("inline fonts");
        assert!(fonts.has(FONT_RESOURCE.as_bytes()));
    }

    #[test]
    fn out_of_range_page_aborts_export() {
        let bytes = sample_pdf(2, PageSize::default());
        let annotations = BTreeMap::from([
            (1, vec![Annotation::rect(Point::new(1.0, 1.0))]),
            (5, vec![Annotation::rect(Point::new(1.0, 1.0))]),
        ]);

        let err = export_annotated_pdf(&bytes, &annotations, 1.5, &ExportOptions::default())
            .expect_err("page 5 does not exist");
        assert!(matches!(err, ExportError::PageOutOfRange { page: 5, page_count: 2 }));
    }

    #[test]
    fn rejects_non_positive_scale() {
        let bytes = sample_pdf(1, PageSize::default());
        let err = export_annotated_pdf(&bytes, &BTreeMap::new(), 0.0, &ExportOptions::default())
            .expect_err("zero scale is invalid");
        assert!(matches!(err, ExportError::InvalidScale(_)));
    }

    #[test]
    fn empty_annotation_map_round_trips_document() {
        let bytes = sample_pdf(3, PageSize::default());
        let out = export_annotated_pdf(&bytes, &BTreeMap::new(), 1.5, &ExportOptions::default())
            .expect("export should succeed");
        let doc = Document::load_mem(&out).expect("reload");
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn win_ansi_replaces_unmappable_characters() {
        assert_eq!(win_ansi_bytes("Caf\u{e9} \u{4e2d}"), vec![b'C', b'a', b'f', 0xe9, b' ', b'?']);
    }
}
