//! Pointer interaction state machine
//!
//! Turns pointer events plus the active tool into store mutations. One
//! machine drives one page; pointer coordinates are viewport pixels.

use crate::config::InteractionConfig;
use scanmark_model::{
    point_near, Annotation, AnnotationId, AnnotationKind, AnnotationPatch, AnnotationStore, Point,
};
use serde::{Deserialize, Serialize};

/// Toolbar tools
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Region capture for OCR; markup tools are inert while active
    #[default]
    Scan,
    Pen,
    Rect,
    Text,
    Callout,
    Eraser,
}

impl Tool {
    pub const ALL: [Tool; 6] =
        [Tool::Scan, Tool::Pen, Tool::Rect, Tool::Text, Tool::Callout, Tool::Eraser];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Scan => "scan",
            Tool::Pen => "pen",
            Tool::Rect => "rect",
            Tool::Text => "text",
            Tool::Callout => "callout",
            Tool::Eraser => "eraser",
        }
    }

    pub fn is_markup(&self) -> bool {
        !matches!(self, Tool::Scan)
    }
}

/// Where a gesture currently is
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum InteractionState {
    #[default]
    Idle,
    DrawingPen { id: AnnotationId },
    DrawingRect { id: AnnotationId, origin: Point },
    /// `grab_offset` is the cursor position minus the box origin at grab time
    DraggingCallout { id: AnnotationId, grab_offset: Point },
}

/// What a pointer event did to the store
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PointerEffect {
    #[default]
    None,
    Created(AnnotationId),
    Updated(AnnotationId),
    /// A drag on an existing object began; nothing changed yet
    Grabbed(AnnotationId),
    Removed(Vec<AnnotationId>),
}

#[derive(Debug, Clone)]
pub struct InteractionMachine {
    state: InteractionState,
    anchor_grab_radius: f32,
    eraser_radius: f32,
}

impl Default for InteractionMachine {
    fn default() -> Self {
        Self::new(&InteractionConfig::default())
    }
}

impl InteractionMachine {
    pub fn new(config: &InteractionConfig) -> Self {
        Self {
            state: InteractionState::Idle,
            anchor_grab_radius: config.anchor_grab_radius,
            eraser_radius: config.eraser_radius,
        }
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == InteractionState::Idle
    }

    /// Drop any gesture in progress
    pub fn reset(&mut self) {
        self.state = InteractionState::Idle;
    }

    pub fn pointer_down(
        &mut self,
        tool: Tool,
        point: Point,
        store: &mut AnnotationStore,
    ) -> PointerEffect {
        // A down without a matching up abandons the previous gesture
        self.state = InteractionState::Idle;

        match tool {
            Tool::Scan => PointerEffect::None,
            Tool::Pen => {
                let id = store.append(Annotation::pen(point));
                self.state = InteractionState::DrawingPen { id };
                PointerEffect::Created(id)
            }
            Tool::Rect => {
                let id = store.append(Annotation::rect(point));
                self.state = InteractionState::DrawingRect { id, origin: point };
                PointerEffect::Created(id)
            }
            Tool::Text => PointerEffect::Created(store.append(Annotation::text(point))),
            Tool::Callout => match self.hit_test_callout(store, &point) {
                Some((id, box_origin)) => {
                    self.state =
                        InteractionState::DraggingCallout { id, grab_offset: point.minus(&box_origin) };
                    PointerEffect::Grabbed(id)
                }
                None => PointerEffect::Created(store.append(Annotation::callout(point))),
            },
            Tool::Eraser => {
                let removed = self.erase_at(store, &point);
                if removed.is_empty() {
                    PointerEffect::None
                } else {
                    PointerEffect::Removed(removed)
                }
            }
        }
    }

    pub fn pointer_move(&mut self, point: Point, store: &mut AnnotationStore) -> PointerEffect {
        let (id, patch) = match self.state {
            InteractionState::Idle => return PointerEffect::None,
            InteractionState::DrawingPen { id } => (id, AnnotationPatch::AppendPoint(point)),
            InteractionState::DrawingRect { id, origin } => (
                id,
                AnnotationPatch::Size { width: point.x - origin.x, height: point.y - origin.y },
            ),
            InteractionState::DraggingCallout { id, grab_offset } => {
                (id, AnnotationPatch::BoxOrigin(point.minus(&grab_offset)))
            }
        };

        if store.update(id, patch) {
            PointerEffect::Updated(id)
        } else {
            tracing::debug!(%id, "gesture target vanished, returning to idle");
            self.state = InteractionState::Idle;
            PointerEffect::None
        }
    }

    /// End the gesture; an up without a down is a no-op
    pub fn pointer_up(&mut self, _point: Point, _store: &mut AnnotationStore) -> PointerEffect {
        self.state = InteractionState::Idle;
        PointerEffect::None
    }

    /// First callout in store order whose box contains `point` or whose
    /// anchor is strictly closer than the grab radius; returns its id and
    /// box origin
    fn hit_test_callout(&self, store: &AnnotationStore, point: &Point) -> Option<(AnnotationId, Point)> {
        store.objects().iter().find_map(|object| {
            let AnnotationKind::Callout { anchor, box_origin, .. } = object.kind() else {
                return None;
            };
            let in_box = object.callout_box().is_some_and(|region| region.contains(point));
            if in_box || anchor.distance_to(point) < self.anchor_grab_radius {
                Some((object.id(), *box_origin))
            } else {
                None
            }
        })
    }

    /// Remove every rect containing `point` and every callout whose anchor
    /// is within the eraser radius
    fn erase_at(&self, store: &mut AnnotationStore, point: &Point) -> Vec<AnnotationId> {
        let doomed: Vec<AnnotationId> = store
            .objects()
            .iter()
            .filter(|object| match object.kind() {
                AnnotationKind::Rect { .. } => {
                    object.bounds().is_some_and(|region| region.contains(point))
                }
                AnnotationKind::Callout { anchor, .. } => {
                    point_near(anchor, point, self.eraser_radius)
                }
                AnnotationKind::Pen { .. } | AnnotationKind::Text { .. } => false,
            })
            .map(Annotation::id)
            .collect();

        for id in &doomed {
            store.remove(*id);
        }
        if !doomed.is_empty() {
            tracing::debug!(count = doomed.len(), x = point.x, y = point.y, "erased annotations");
        }
        doomed
    }
}
