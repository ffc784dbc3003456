//! Overlay display list
//!
//! A pure projection of the store into drawing primitives for whatever
//! surface sits over the page raster.

use scanmark_model::{
    Annotation, AnnotationId, AnnotationKind, AnnotationStore, Color, DragRect, Point, Region,
    CALLOUT_BOX_WIDTH,
};

/// Callout boxes are drawn taller on screen than the exported box
pub const CALLOUT_DISPLAY_HEIGHT: f32 = 80.0;

pub const STROKE_WIDTH: f32 = 2.0;

const RECT_FILL: Color = Color { r: 0, g: 0, b: 255, a: 20 };
const TEXT_BORDER: Color = Color { r: 136, g: 136, b: 136, a: 255 };
const SCAN_STROKE: Color = Color { r: 255, g: 0, b: 0, a: 230 };
const SCAN_FILL: Color = Color { r: 255, g: 0, b: 0, a: 15 };

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayPrimitive {
    Polyline {
        id: AnnotationId,
        points: Vec<Point>,
        stroke: Color,
        width: f32,
    },
    Rect {
        id: Option<AnnotationId>,
        region: Region,
        stroke: Color,
        fill: Option<Color>,
        dashed: bool,
    },
    Line {
        id: AnnotationId,
        from: Point,
        to: Point,
        stroke: Color,
    },
    TextBox {
        id: AnnotationId,
        region: Region,
        text: String,
        border: Color,
    },
}

impl OverlayPrimitive {
    pub fn id(&self) -> Option<AnnotationId> {
        match self {
            OverlayPrimitive::Rect { id, .. } => *id,
            OverlayPrimitive::Polyline { id, .. }
            | OverlayPrimitive::Line { id, .. }
            | OverlayPrimitive::TextBox { id, .. } => Some(*id),
        }
    }
}

/// Display list for every object in the store, in render order
pub fn render(store: &AnnotationStore) -> Vec<OverlayPrimitive> {
    let mut primitives = Vec::with_capacity(store.len());
    for object in store.objects() {
        push_object(&mut primitives, object);
    }
    primitives
}

fn push_object(primitives: &mut Vec<OverlayPrimitive>, object: &Annotation) {
    let id = object.id();
    match object.kind() {
        AnnotationKind::Pen { points } => primitives.push(OverlayPrimitive::Polyline {
            id,
            points: points.clone(),
            stroke: Color::RED,
            width: STROKE_WIDTH,
        }),
        AnnotationKind::Rect { .. } => {
            if let Some(region) = object.bounds() {
                primitives.push(OverlayPrimitive::Rect {
                    id: Some(id),
                    region,
                    stroke: Color::BLUE,
                    fill: Some(RECT_FILL),
                    dashed: false,
                });
            }
        }
        AnnotationKind::Text { text, .. } => {
            if let Some(region) = object.bounds() {
                primitives.push(OverlayPrimitive::TextBox {
                    id,
                    region,
                    text: text.clone(),
                    border: TEXT_BORDER,
                });
            }
        }
        AnnotationKind::Callout { anchor, box_origin, text } => {
            primitives.push(OverlayPrimitive::Line {
                id,
                from: *anchor,
                to: *box_origin,
                stroke: Color::RED,
            });
            primitives.push(OverlayPrimitive::TextBox {
                id,
                region: Region {
                    x: box_origin.x,
                    y: box_origin.y,
                    width: CALLOUT_BOX_WIDTH,
                    height: CALLOUT_DISPLAY_HEIGHT,
                },
                text: text.clone(),
                border: Color::RED,
            });
        }
    }
}

/// Dashed rectangle shown while a scan drag is in progress
pub fn scan_selection(drag: &DragRect) -> OverlayPrimitive {
    OverlayPrimitive::Rect {
        id: None,
        region: scanmark_model::normalize(drag),
        stroke: SCAN_STROKE,
        fill: Some(SCAN_FILL),
        dashed: true,
    }
}
