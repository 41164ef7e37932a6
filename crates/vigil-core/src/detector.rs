//! Face detection contract.

use serde::Serialize;

use crate::frame::Frame;
use crate::geometry::{BoundingBox, Point};

/// Head pose estimate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeadPose {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

/// A single detected face in one frame.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Six-point layout, see the `LANDMARK_*` constants in [`crate::geometry`].
    pub landmarks: Vec<Point>,
    pub confidence: f32,
    /// Populated only by backends that estimate pose.
    pub pose: Option<HeadPose>,
}

impl Detection {
    /// Build a detection whose landmarks follow the standard six-point
    /// layout, synthesized from the box geometry. Backends without a real
    /// landmark model use this.
    pub fn from_bbox(bbox: BoundingBox, confidence: f32) -> Detection {
        let x = bbox.x1 as f32;
        let y = bbox.y1 as f32;
        let w = bbox.width() as f32;
        let h = bbox.height() as f32;
        let landmarks = vec![
            Point::new(x + w / 2.0, y + h / 2.0),
            Point::new(x + w / 2.0, y + h),
            Point::new(x + w * 0.25, y + h / 3.0),
            Point::new(x + w * 0.75, y + h / 3.0),
            Point::new(x + w * 0.25, y + h * 2.0 / 3.0),
            Point::new(x + w * 0.75, y + h * 2.0 / 3.0),
        ];
        Detection {
            bbox,
            landmarks,
            confidence,
            pose: None,
        }
    }
}

/// Face detection backend.
///
/// Returns every face found in the frame, or an empty vector when none is
/// present. Backend failures are handled internally and also surface as an
/// empty result; the pipeline treats both the same way.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Vec<Detection>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{FaceGeometry, LANDMARK_LEFT_EYE, LANDMARK_RIGHT_EYE};

    #[test]
    fn test_synthesized_landmarks_follow_layout() {
        let det = Detection::from_bbox(BoundingBox::new(100, 100, 300, 400), 0.9);
        assert_eq!(det.landmarks.len(), 6);
        assert_eq!(det.landmarks[LANDMARK_LEFT_EYE], Point::new(150.0, 200.0));
        assert_eq!(det.landmarks[LANDMARK_RIGHT_EYE], Point::new(250.0, 200.0));
    }

    #[test]
    fn test_synthesized_width_proxy_matches_box_width() {
        let det = Detection::from_bbox(BoundingBox::new(100, 100, 300, 400), 0.9);
        let geom = FaceGeometry::from_landmarks(&det.landmarks).unwrap();
        assert_eq!(geom.width_proxy, 200.0);
        assert_eq!(geom.center, det.bbox.centroid());
    }
}
