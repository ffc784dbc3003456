//! scanmark document model
//!
//! Pure data for the annotation overlay: screen-space geometry, the
//! annotation sum type, the per-page store and page records.

pub mod annotation;
pub mod geometry;
pub mod page;
pub mod store;

pub use annotation::{
    Annotation, AnnotationId, AnnotationKind, AnnotationPatch, Color, CALLOUT_BOX_HEIGHT,
    CALLOUT_BOX_OFFSET, CALLOUT_BOX_WIDTH, TEXT_BOX_HEIGHT, TEXT_BOX_WIDTH,
};
pub use geometry::{
    normalize, point_in_rect, point_near, DragRect, Point, Region, ANCHOR_GRAB_RADIUS,
    ERASER_RADIUS,
};
pub use page::{PageList, PageRecord, PageSize, Thumbnail, ThumbnailImage, Viewport};
pub use store::{AnnotationStore, StoreEvent, SubscriptionId};
