//! Screen-space geometry and hit testing
//!
//! All coordinates are in the scaled pixel space of the displayed page:
//! origin at the top-left of the rendered viewport, Y growing downward.

use serde::{Deserialize, Serialize};

/// Default radius for grabbing a callout anchor
pub const ANCHOR_GRAB_RADIUS: f32 = 12.0;

/// Default radius for erasing a callout by its anchor
pub const ERASER_RADIUS: f32 = 10.0;

/// A point in viewport pixel space
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(&self, dx: f32, dy: f32) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }

    /// Component-wise difference `self - other`
    pub fn minus(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }
}

/// A rectangle as produced by a pointer drag
///
/// Width and height are signed: a drag toward the top-left yields negative
/// values. Normalize before hit testing or export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DragRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DragRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Zero-sized rectangle anchored at a drag start point
    pub fn at(origin: Point) -> Self {
        Self::new(origin.x, origin.y, 0.0, 0.0)
    }

    /// Stretch the rectangle so its far corner sits at `cursor`
    pub fn stretch_to(&mut self, cursor: Point) {
        self.width = cursor.x - self.x;
        self.height = cursor.y - self.y;
    }
}

/// Normalized rectangle: top-left origin, non-negative size
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Region {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        normalize(&DragRect::new(x, y, width, height))
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Snap to whole pixels, as needed when reading from a raster
    pub fn rounded(&self) -> Region {
        Region {
            x: self.x.round(),
            y: self.y.round(),
            width: self.width.round(),
            height: self.height.round(),
        }
    }

    /// Integer midpoint, flooring odd sizes
    pub fn center(&self) -> Point {
        Point::new(
            self.x + (self.width / 2.0).floor(),
            self.y + (self.height / 2.0).floor(),
        )
    }

    pub fn contains(&self, point: &Point) -> bool {
        point_in_rect(point, self)
    }
}

/// Normalize a signed drag rectangle
pub fn normalize(rect: &DragRect) -> Region {
    Region {
        x: rect.x.min(rect.x + rect.width),
        y: rect.y.min(rect.y + rect.height),
        width: rect.width.abs(),
        height: rect.height.abs(),
    }
}

/// Inclusive bounds test on a normalized rectangle
pub fn point_in_rect(point: &Point, region: &Region) -> bool {
    point.x >= region.x
        && point.x <= region.x + region.width
        && point.y >= region.y
        && point.y <= region.y + region.height
}

/// Euclidean proximity test, inclusive of the radius
pub fn point_near(a: &Point, b: &Point, radius: f32) -> bool {
    a.distance_to(b) <= radius
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_flips_negative_drags() {
        let signed = [
            DragRect::new(10.0, 10.0, 40.0, 30.0),
            DragRect::new(50.0, 40.0, -40.0, -30.0),
            DragRect::new(50.0, 10.0, -40.0, 30.0),
            DragRect::new(10.0, 40.0, 40.0, -30.0),
        ];

        for rect in signed {
            let region = normalize(&rect);
            assert_eq!(region, Region { x: 10.0, y: 10.0, width: 40.0, height: 30.0 });
        }
    }

    #[test]
    fn normalized_area_matches_absolute_extent() {
        for (w, h) in [(0.0, 0.0), (-12.5, 3.0), (7.0, -9.25), (-1.0, -1.0), (300.0, 2.0)] {
            let region = normalize(&DragRect::new(3.0, -4.0, w, h));
            assert!(region.width >= 0.0 && region.height >= 0.0);
            assert!((region.area() - (w * h).abs()).abs() < 1e-4);
        }
    }

    #[test]
    fn point_in_rect_is_inclusive() {
        let region = Region::new(10.0, 10.0, 40.0, 40.0);
        assert!(point_in_rect(&Point::new(10.0, 10.0), &region));
        assert!(point_in_rect(&Point::new(50.0, 50.0), &region));
        assert!(point_in_rect(&Point::new(30.0, 30.0), &region));
        assert!(!point_in_rect(&Point::new(50.1, 30.0), &region));
        assert!(!point_in_rect(&Point::new(30.0, 9.9), &region));
    }

    #[test]
    fn point_near_uses_euclidean_distance() {
        let origin = Point::new(0.0, 0.0);
        assert!(point_near(&origin, &Point::new(6.0, 8.0), 10.0));
        assert!(!point_near(&origin, &Point::new(8.0, 8.0), 10.0));
    }

    #[test]
    fn center_floors_odd_sizes() {
        let region = Region::new(10.0, 20.0, 5.0, 7.0);
        assert_eq!(region.center(), Point::new(12.0, 23.0));
    }

    #[test]
    fn drag_rect_stretch_keeps_origin() {
        let mut rect = DragRect::at(Point::new(100.0, 100.0));
        rect.stretch_to(Point::new(80.0, 130.0));
        assert_eq!(rect, DragRect::new(100.0, 100.0, -20.0, 30.0));
    }
}
