//! Overlay annotation model
//!
//! Annotations are a closed set of shapes drawn on top of a rendered page.
//! Coordinates are stored in viewport pixel space (see [`crate::geometry`]);
//! the export projector is responsible for mapping them into PDF space.

use crate::geometry::{normalize, DragRect, Point, Region};
use serde::{Deserialize, Serialize};

/// Unique identifier for an annotation
///
/// Generated using UUID v4, so ids never collide within a page.
pub type AnnotationId = uuid::Uuid;

/// Size of a callout's text box
pub const CALLOUT_BOX_WIDTH: f32 = 180.0;
pub const CALLOUT_BOX_HEIGHT: f32 = 60.0;

/// Where a freshly placed callout puts its box, relative to the anchor
pub const CALLOUT_BOX_OFFSET: (f32, f32) = (40.0, -30.0);

/// Fixed size of a free text box
pub const TEXT_BOX_WIDTH: f32 = 200.0;
pub const TEXT_BOX_HEIGHT: f32 = 60.0;

/// RGBA color representation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Convert to normalized RGBA values (0.0 to 1.0)
    pub fn to_normalized(&self) -> (f32, f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        )
    }
}

impl Color {
    pub const RED: Color = Color { r: 255, g: 0, b: 0, a: 255 };
    pub const BLUE: Color = Color { r: 0, g: 0, b: 255, a: 255 };
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
}

/// Shape-specific payload of an annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnnotationKind {
    /// Freehand polyline, append-only while drawing
    Pen { points: Vec<Point> },

    /// Rectangle with signed size (sign encodes drag direction)
    Rect { origin: Point, width: f32, height: f32 },

    /// Free text in a fixed-size box at `anchor`
    Text { anchor: Point, text: String },

    /// Subject point connected by a leader line to a movable text box
    Callout { anchor: Point, box_origin: Point, text: String },
}

/// Partial update applied through the store
///
/// A patch only touches the fields that exist on the target shape; applying
/// it to an unrelated shape leaves the annotation unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationPatch {
    /// Replace the text of a text box or callout
    Text(String),

    /// Append a point to a pen stroke
    AppendPoint(Point),

    /// Set the signed size of a rectangle
    Size { width: f32, height: f32 },

    /// Move a callout's box
    BoxOrigin(Point),
}

/// A single overlay object owned by one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    id: AnnotationId,
    #[serde(flatten)]
    kind: AnnotationKind,
}

impl Annotation {
    /// Create an annotation with a freshly generated id
    pub fn new(kind: AnnotationKind) -> Self {
        Self { id: AnnotationId::new_v4(), kind }
    }

    /// Create an annotation with a specific id (for deserialization and tests)
    pub fn with_id(id: AnnotationId, kind: AnnotationKind) -> Self {
        Self { id, kind }
    }

    pub fn pen(start: Point) -> Self {
        Self::new(AnnotationKind::Pen { points: vec![start] })
    }

    pub fn rect(origin: Point) -> Self {
        Self::new(AnnotationKind::Rect { origin, width: 0.0, height: 0.0 })
    }

    pub fn text(anchor: Point) -> Self {
        Self::new(AnnotationKind::Text { anchor, text: String::new() })
    }

    /// Callout with its box at the default offset from the anchor
    pub fn callout(anchor: Point) -> Self {
        let (dx, dy) = CALLOUT_BOX_OFFSET;
        Self::callout_at(anchor, anchor.offset(dx, dy), String::new())
    }

    pub fn callout_at(anchor: Point, box_origin: Point, text: impl Into<String>) -> Self {
        Self::new(AnnotationKind::Callout { anchor, box_origin, text: text.into() })
    }

    pub fn id(&self) -> AnnotationId {
        self.id
    }

    pub fn kind(&self) -> &AnnotationKind {
        &self.kind
    }

    /// Short lowercase name of the shape
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            AnnotationKind::Pen { .. } => "pen",
            AnnotationKind::Rect { .. } => "rect",
            AnnotationKind::Text { .. } => "text",
            AnnotationKind::Callout { .. } => "callout",
        }
    }

    /// Attached text, if the shape carries any
    pub fn text_content(&self) -> Option<&str> {
        match &self.kind {
            AnnotationKind::Text { text, .. } | AnnotationKind::Callout { text, .. } => {
                Some(text.as_str())
            }
            AnnotationKind::Pen { .. } | AnnotationKind::Rect { .. } => None,
        }
    }

    /// Box of a callout, sized to the default callout box
    pub fn callout_box(&self) -> Option<Region> {
        match &self.kind {
            AnnotationKind::Callout { box_origin, .. } => Some(Region {
                x: box_origin.x,
                y: box_origin.y,
                width: CALLOUT_BOX_WIDTH,
                height: CALLOUT_BOX_HEIGHT,
            }),
            _ => None,
        }
    }

    /// Normalized bounds used for hit testing and export
    ///
    /// For callouts this is the text box, not the anchor. Empty pen strokes
    /// have no bounds.
    pub fn bounds(&self) -> Option<Region> {
        match &self.kind {
            AnnotationKind::Pen { points } => {
                let first = points.first()?;
                let (mut min_x, mut min_y, mut max_x, mut max_y) =
                    (first.x, first.y, first.x, first.y);
                for point in points.iter().skip(1) {
                    min_x = min_x.min(point.x);
                    min_y = min_y.min(point.y);
                    max_x = max_x.max(point.x);
                    max_y = max_y.max(point.y);
                }
                Some(Region { x: min_x, y: min_y, width: max_x - min_x, height: max_y - min_y })
            }
            AnnotationKind::Rect { origin, width, height } => {
                Some(normalize(&DragRect::new(origin.x, origin.y, *width, *height)))
            }
            AnnotationKind::Text { anchor, .. } => Some(Region {
                x: anchor.x,
                y: anchor.y,
                width: TEXT_BOX_WIDTH,
                height: TEXT_BOX_HEIGHT,
            }),
            AnnotationKind::Callout { .. } => self.callout_box(),
        }
    }

    /// Merge a patch into this annotation
    ///
    /// Returns `false` if the patch does not apply to this shape.
    pub fn apply(&mut self, patch: AnnotationPatch) -> bool {
        match (&mut self.kind, patch) {
            (AnnotationKind::Pen { points }, AnnotationPatch::AppendPoint(point)) => {
                points.push(point);
                true
            }
            (AnnotationKind::Rect { width, height, .. }, AnnotationPatch::Size { width: w, height: h }) => {
                *width = w;
                *height = h;
                true
            }
            (AnnotationKind::Text { text, .. }, AnnotationPatch::Text(new_text))
            | (AnnotationKind::Callout { text, .. }, AnnotationPatch::Text(new_text)) => {
                *text = new_text;
                true
            }
            (AnnotationKind::Callout { box_origin, .. }, AnnotationPatch::BoxOrigin(origin)) => {
                *box_origin = origin;
                true
            }
            _ => false,
        }
    }
}
