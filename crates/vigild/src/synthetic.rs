//! Self-contained demo backends: a rendered scene standing in for the
//! camera, plus detector, encoder, and analyzer implementations that
//! work on it.
//!
//! The scene holds one checkered face that walks a fixed loop: hold,
//! slide right, slide back, grow, shrink. Every challenge kind becomes
//! satisfiable at some point in the cycle, so the full authentication
//! flow can be exercised without hardware or models.

use std::time::Instant;

use vigil_core::{
    AttributeAnalyzer, BoundingBox, CaptureError, Detection, Embedding, FaceAttributes,
    FaceDetector, FaceEncoder, Frame, FrameSource,
};

const BACKGROUND: [u8; 3] = [40, 40, 40];
const FACE_LIGHT: [u8; 3] = [210, 170, 140];
const FACE_DARK: [u8; 3] = [90, 60, 45];
const CELL: u32 = 8;

const BASE_HALF_W: f32 = 70.0;
const BASE_HALF_H: f32 = 90.0;

/// Seconds per motion loop.
const CYCLE: f32 = 16.0;

/// Face pose at a point in the loop: horizontal offset as a fraction of
/// the frame width, and the size multiplier.
fn pose_at(t: f32) -> (f32, f32) {
    let t = t.rem_euclid(CYCLE);
    match t {
        t if t < 2.0 => (0.0, 1.0),
        t if t < 4.0 => (lerp(0.0, 0.10, (t - 2.0) / 2.0), 1.0),
        t if t < 6.0 => (0.10, 1.0),
        t if t < 8.0 => (lerp(0.10, 0.0, (t - 6.0) / 2.0), 1.0),
        t if t < 10.0 => (0.0, 1.0),
        t if t < 12.0 => (0.0, lerp(1.0, 1.35, (t - 10.0) / 2.0)),
        t if t < 14.0 => (0.0, 1.35),
        t => (0.0, lerp(1.35, 1.0, (t - 14.0) / 2.0)),
    }
}

fn lerp(from: f32, to: f32, amount: f32) -> f32 {
    from + (to - from) * amount
}

/// Frame source that renders the demo scene on demand.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    started: Instant,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            started: Instant::now(),
        }
    }

    fn frame_at(&self, t: f32) -> Frame {
        let (offset, scale) = pose_at(t);
        let cx = self.width as f32 / 2.0 + offset * self.width as f32;
        let cy = self.height as f32 / 2.0;
        draw_face(self.width, self.height, cx, cy, scale)
    }
}

impl FrameSource for SyntheticCamera {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        Ok(self.frame_at(self.started.elapsed().as_secs_f32()))
    }
}

fn draw_face(width: u32, height: u32, cx: f32, cy: f32, scale: f32) -> Frame {
    let mut frame = Frame::filled(width, height, BACKGROUND);

    let half_w = BASE_HALF_W * scale;
    let half_h = BASE_HALF_H * scale;
    let x1 = (cx - half_w).max(0.0) as u32;
    let y1 = (cy - half_h).max(0.0) as u32;
    let x2 = ((cx + half_w) as u32).min(width.saturating_sub(1));
    let y2 = ((cy + half_h) as u32).min(height.saturating_sub(1));

    for y in y1..=y2 {
        for x in x1..=x2 {
            // Checker anchored to frame coordinates; the pattern scrolls
            // under the face as it moves, keeping the crop textured.
            let light = (x / CELL + y / CELL) % 2 == 0;
            let rgb = if light { FACE_LIGHT } else { FACE_DARK };
            let idx = ((y * width + x) * 3) as usize;
            frame.data[idx..idx + 3].copy_from_slice(&rgb);
        }
    }
    frame
}

/// Finds the face by its color signature: warm pixels with descending
/// channel order, which the background never has.
pub struct SyntheticDetector;

impl FaceDetector for SyntheticDetector {
    fn detect(&mut self, frame: &Frame) -> Vec<Detection> {
        let mut min_x = i32::MAX;
        let mut min_y = i32::MAX;
        let mut max_x = i32::MIN;
        let mut max_y = i32::MIN;

        for y in (0..frame.height).step_by(2) {
            for x in (0..frame.width).step_by(2) {
                let [r, g, b] = frame.pixel(x, y);
                if r >= 80 && r > g && g > b {
                    min_x = min_x.min(x as i32);
                    min_y = min_y.min(y as i32);
                    max_x = max_x.max(x as i32);
                    max_y = max_y.max(y as i32);
                }
            }
        }

        if min_x == i32::MAX {
            return vec![];
        }
        let bbox = BoundingBox::new(min_x, min_y, max_x + 1, max_y + 1);
        vec![Detection::from_bbox(bbox, 0.95)]
    }
}

/// Color-statistics embedding: channel means plus texture contrast,
/// normalized to [0, 1]. Stable under the scene's translation and
/// scaling, which is all the demo identity needs.
pub struct SyntheticEncoder;

impl FaceEncoder for SyntheticEncoder {
    fn encode(&mut self, frame: &Frame, bbox: &BoundingBox) -> Option<Embedding> {
        let crop = frame.crop(bbox)?;
        let pixels = (crop.width * crop.height) as f32;
        if pixels == 0.0 {
            return None;
        }

        let mut sums = [0.0f32; 3];
        for px in crop.data.chunks_exact(3) {
            sums[0] += px[0] as f32;
            sums[1] += px[1] as f32;
            sums[2] += px[2] as f32;
        }
        let means = [sums[0] / pixels, sums[1] / pixels, sums[2] / pixels];

        let mut spread = 0.0f32;
        for px in crop.data.chunks_exact(3) {
            spread += (px[0] as f32 - means[0]).abs();
        }

        Some(Embedding {
            values: vec![
                means[0] / 255.0,
                means[1] / 255.0,
                means[2] / 255.0,
                spread / pixels / 255.0,
            ],
            model_version: Some("synthetic-v1".to_string()),
        })
    }
}

/// Fixed attributes for the demo face.
pub struct SyntheticAnalyzer;

impl AttributeAnalyzer for SyntheticAnalyzer {
    fn analyze(&mut self, _frame: &Frame, _bbox: &BoundingBox) -> FaceAttributes {
        FaceAttributes {
            age: Some(34),
            gender: None,
            emotion: Some("neutral".to_string()),
        }
    }
}
