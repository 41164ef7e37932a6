//! Pixel geometry shared across the pipeline: points, boxes, and the
//! landmark-derived face geometry that drives challenge evaluation.

use serde::Serialize;

/// Landmark layout produced by detection backends: face center, chin,
/// left eye, right eye, left mouth corner, right mouth corner.
pub const LANDMARK_CENTER: usize = 0;
pub const LANDMARK_CHIN: usize = 1;
pub const LANDMARK_LEFT_EYE: usize = 2;
pub const LANDMARK_RIGHT_EYE: usize = 3;
pub const LANDMARK_MOUTH_LEFT: usize = 4;
pub const LANDMARK_MOUTH_RIGHT: usize = 5;

/// A position in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
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
}

/// Axis-aligned rectangle in integer pixel coordinates, `x1 < x2` and
/// `y1 < y2` for a non-empty box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn centroid(&self) -> Point {
        Point::new(
            (self.x1 + self.x2) as f32 / 2.0,
            (self.y1 + self.y2) as f32 / 2.0,
        )
    }

    /// Intersect with the frame rectangle. The result may be empty.
    pub fn clamp(&self, frame_width: u32, frame_height: u32) -> BoundingBox {
        BoundingBox {
            x1: self.x1.max(0),
            y1: self.y1.max(0),
            x2: self.x2.min(frame_width as i32),
            y2: self.y2.min(frame_height as i32),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }
}

/// Face position and size derived from landmarks, the inputs to liveness
/// challenge evaluation.
///
/// The width proxy is eye spacing doubled, which tracks apparent face width
/// without depending on how tight the detector draws its boxes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceGeometry {
    pub center: Point,
    pub width_proxy: f32,
}

impl FaceGeometry {
    /// Derive geometry from a landmark set. Returns `None` when the required
    /// points are missing, non-finite, or inconsistent (eyes swapped).
    pub fn from_landmarks(landmarks: &[Point]) -> Option<FaceGeometry> {
        let center = *landmarks.get(LANDMARK_CENTER)?;
        let left_eye = landmarks.get(LANDMARK_LEFT_EYE)?;
        let right_eye = landmarks.get(LANDMARK_RIGHT_EYE)?;
        let width_proxy = (right_eye.x - left_eye.x) * 2.0;
        if !center.x.is_finite() || !center.y.is_finite() || !width_proxy.is_finite() {
            return None;
        }
        if width_proxy <= 0.0 {
            return None;
        }
        Some(FaceGeometry { center, width_proxy })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(a.distance_to(&b), 5.0);
        assert_eq!(b.distance_to(&a), 5.0);
    }

    #[test]
    fn test_bbox_centroid_and_size() {
        let b = BoundingBox::new(100, 50, 300, 250);
        assert_eq!(b.width(), 200);
        assert_eq!(b.height(), 200);
        assert_eq!(b.centroid(), Point::new(200.0, 150.0));
    }

    #[test]
    fn test_bbox_clamp_inside_frame() {
        let b = BoundingBox::new(-20, -10, 650, 500);
        let clamped = b.clamp(640, 480);
        assert_eq!(clamped, BoundingBox::new(0, 0, 640, 480));
        assert!(!clamped.is_empty());
    }

    #[test]
    fn test_bbox_clamp_fully_outside_is_empty() {
        let b = BoundingBox::new(700, 500, 800, 600);
        assert!(b.clamp(640, 480).is_empty());
    }

    #[test]
    fn test_face_geometry_from_landmarks() {
        let landmarks = vec![
            Point::new(200.0, 150.0), // center
            Point::new(200.0, 250.0), // chin
            Point::new(150.0, 120.0), // left eye
            Point::new(250.0, 120.0), // right eye
            Point::new(150.0, 190.0),
            Point::new(250.0, 190.0),
        ];
        let geom = FaceGeometry::from_landmarks(&landmarks).unwrap();
        assert_eq!(geom.center, Point::new(200.0, 150.0));
        assert_eq!(geom.width_proxy, 200.0);
    }

    #[test]
    fn test_face_geometry_rejects_short_landmark_set() {
        assert!(FaceGeometry::from_landmarks(&[]).is_none());
        assert!(FaceGeometry::from_landmarks(&[Point::new(1.0, 1.0)]).is_none());
    }

    #[test]
    fn test_face_geometry_rejects_swapped_eyes() {
        let landmarks = vec![
            Point::new(200.0, 150.0),
            Point::new(200.0, 250.0),
            Point::new(250.0, 120.0), // left eye to the right of the right eye
            Point::new(150.0, 120.0),
        ];
        assert!(FaceGeometry::from_landmarks(&landmarks).is_none());
    }

    #[test]
    fn test_face_geometry_rejects_non_finite() {
        let landmarks = vec![
            Point::new(f32::NAN, 150.0),
            Point::new(200.0, 250.0),
            Point::new(150.0, 120.0),
            Point::new(250.0, 120.0),
        ];
        assert!(FaceGeometry::from_landmarks(&landmarks).is_none());
    }
}
