//! Capture quality gate.
//!
//! Cheap image statistics decide whether a face crop is worth spending
//! liveness and recognition effort on: Laplacian variance for sharpness,
//! mean HSV value for exposure, head pose limits when an estimate exists,
//! and a minimum face width. The gate is pure; evaluating the same frame
//! twice yields the same verdict.

use std::fmt;

use serde::Serialize;

use crate::detector::Detection;
use crate::frame::Frame;

/// Quality gate thresholds.
#[derive(Debug, Clone)]
pub struct QualityConfig {
    /// Minimum Laplacian variance; below this the crop counts as blurred.
    pub blur_threshold: f64,
    pub min_brightness: f64,
    pub max_brightness: f64,
    /// Pose limits in degrees, applied only when the detection carries a
    /// pose estimate.
    pub max_yaw: f32,
    pub max_pitch: f32,
    /// Minimum face width in pixels.
    pub min_face_width: i32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            blur_threshold: 50.0,
            min_brightness: 70.0,
            max_brightness: 220.0,
            max_yaw: 25.0,
            max_pitch: 25.0,
            min_face_width: 80,
        }
    }
}

/// Reason a face failed the gate, in the operator-facing spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QualityReason {
    Blur,
    Dark,
    Pose,
    Far,
}

impl fmt::Display for QualityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityReason::Blur => "BLUR",
            QualityReason::Dark => "DARK",
            QualityReason::Pose => "POSE",
            QualityReason::Far => "FAR",
        };
        f.write_str(s)
    }
}

/// Per-check outcome plus the measured scores behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityVerdict {
    pub pass: bool,
    pub sharp: bool,
    pub exposed: bool,
    pub frontal: bool,
    pub sized: bool,
    pub blur_score: f64,
    pub brightness: f64,
    pub face_width: i32,
}

impl QualityVerdict {
    pub fn reasons(&self) -> Vec<QualityReason> {
        let mut reasons = Vec::new();
        if !self.sharp {
            reasons.push(QualityReason::Blur);
        }
        if !self.exposed {
            reasons.push(QualityReason::Dark);
        }
        if !self.frontal {
            reasons.push(QualityReason::Pose);
        }
        if !self.sized {
            reasons.push(QualityReason::Far);
        }
        reasons
    }
}

pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Evaluate one detection. Image statistics run on the face crop when
    /// it is non-empty after clamping, otherwise on the whole frame.
    pub fn evaluate(&self, frame: &Frame, detection: &Detection) -> QualityVerdict {
        let crop = frame.crop(&detection.bbox);
        let region = crop.as_ref().unwrap_or(frame);

        let gray = luma(region);
        let blur_score = laplacian_variance(&gray, region.width as usize, region.height as usize);
        let brightness = mean_value_channel(region);

        let sharp = blur_score > self.config.blur_threshold;
        let exposed =
            brightness >= self.config.min_brightness && brightness <= self.config.max_brightness;
        let frontal = match detection.pose {
            Some(pose) => {
                pose.yaw.abs() <= self.config.max_yaw && pose.pitch.abs() <= self.config.max_pitch
            }
            None => true,
        };
        let sized = detection.bbox.width() >= self.config.min_face_width;

        QualityVerdict {
            pass: sharp && exposed && frontal && sized,
            sharp,
            exposed,
            frontal,
            sized,
            blur_score,
            brightness,
            face_width: detection.bbox.width(),
        }
    }
}

fn luma(frame: &Frame) -> Vec<f64> {
    frame
        .data
        .chunks_exact(3)
        .map(|px| 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64)
        .collect()
}

/// Population variance of the 3x3 Laplacian over interior pixels.
fn laplacian_variance(gray: &[f64], width: usize, height: usize) -> f64 {
    if width < 3 || height < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut n = 0.0;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let i = y * width + x;
            let lap = gray[i - width] + gray[i + width] + gray[i - 1] + gray[i + 1] - 4.0 * gray[i];
            sum += lap;
            sum_sq += lap * lap;
            n += 1.0;
        }
    }
    if n == 0.0 {
        return 0.0;
    }
    let mean = sum / n;
    sum_sq / n - mean * mean
}

/// Mean HSV value channel, i.e. max(r, g, b) per pixel, on a 0-255 scale.
fn mean_value_channel(frame: &Frame) -> f64 {
    let mut sum: u64 = 0;
    for px in frame.data.chunks_exact(3) {
        sum += px[0].max(px[1]).max(px[2]) as u64;
    }
    let count = (frame.data.len() / 3) as f64;
    if count == 0.0 {
        0.0
    } else {
        sum as f64 / count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{Detection, HeadPose};
    use crate::geometry::BoundingBox;

    fn checkerboard(width: u32, height: u32, a: u8, b: u8) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let v = if (x + y) % 2 == 0 { a } else { b };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Frame::new(width, height, data)
    }

    fn det(width: i32) -> Detection {
        Detection::from_bbox(BoundingBox::new(10, 10, 10 + width, 10 + width), 0.9)
    }

    fn gate() -> QualityGate {
        QualityGate::new(QualityConfig::default())
    }

    #[test]
    fn test_sharp_textured_face_passes() {
        let frame = checkerboard(320, 320, 200, 60);
        let verdict = gate().evaluate(&frame, &det(200));
        assert!(verdict.sharp, "blur score {}", verdict.blur_score);
        assert!(verdict.exposed, "brightness {}", verdict.brightness);
        assert!(verdict.frontal);
        assert!(verdict.sized);
        assert!(verdict.pass);
        assert!(verdict.reasons().is_empty());
    }

    #[test]
    fn test_uniform_region_reads_as_blurred() {
        let frame = Frame::filled(320, 320, [128, 128, 128]);
        let verdict = gate().evaluate(&frame, &det(200));
        assert!(!verdict.sharp);
        assert_eq!(verdict.blur_score, 0.0);
        assert!(verdict.reasons().contains(&QualityReason::Blur));
        assert!(!verdict.pass);
    }

    #[test]
    fn test_dark_region_fails_exposure() {
        let frame = checkerboard(320, 320, 40, 10);
        let verdict = gate().evaluate(&frame, &det(200));
        assert!(!verdict.exposed);
        assert!(verdict.reasons().contains(&QualityReason::Dark));
    }

    #[test]
    fn test_saturated_region_fails_exposure() {
        let frame = Frame::filled(320, 320, [255, 255, 255]);
        let verdict = gate().evaluate(&frame, &det(200));
        assert_eq!(verdict.brightness, 255.0);
        assert!(!verdict.exposed);
        assert!(verdict.reasons().contains(&QualityReason::Dark));
    }

    #[test]
    fn test_overbright_texture_fails_exposure_only() {
        // sharp but washed out, so the sole complaint is exposure
        let frame = checkerboard(320, 320, 255, 215);
        let verdict = gate().evaluate(&frame, &det(200));
        assert!(verdict.brightness > 220.0);
        assert_eq!(verdict.reasons(), vec![QualityReason::Dark]);
        assert!(!verdict.pass);
    }

    #[test]
    fn test_missing_pose_estimate_passes_pose_check() {
        let frame = checkerboard(320, 320, 200, 60);
        let detection = det(200);
        assert!(detection.pose.is_none());
        assert!(gate().evaluate(&frame, &detection).frontal);
    }

    #[test]
    fn test_excess_yaw_fails_pose_check() {
        let frame = checkerboard(320, 320, 200, 60);
        let mut detection = det(200);
        detection.pose = Some(HeadPose {
            pitch: 0.0,
            yaw: 30.0,
            roll: 0.0,
        });
        let verdict = gate().evaluate(&frame, &detection);
        assert!(!verdict.frontal);
        assert!(verdict.reasons().contains(&QualityReason::Pose));
    }

    #[test]
    fn test_small_face_fails_size_check() {
        let frame = checkerboard(320, 320, 200, 60);
        let verdict = gate().evaluate(&frame, &det(60));
        assert!(!verdict.sized);
        assert!(verdict.reasons().contains(&QualityReason::Far));
    }

    #[test]
    fn test_empty_crop_falls_back_to_whole_frame() {
        let frame = checkerboard(320, 320, 200, 60);
        let detection = Detection::from_bbox(BoundingBox::new(400, 400, 600, 600), 0.9);
        let verdict = gate().evaluate(&frame, &detection);
        // statistics come from the full frame, size check still sees the box
        assert!(verdict.sharp);
        assert!(verdict.sized);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let frame = checkerboard(320, 320, 180, 70);
        let g = gate();
        let detection = det(150);
        assert_eq!(g.evaluate(&frame, &detection), g.evaluate(&frame, &detection));
    }

    #[test]
    fn test_reason_spelling() {
        assert_eq!(QualityReason::Blur.to_string(), "BLUR");
        assert_eq!(QualityReason::Dark.to_string(), "DARK");
        assert_eq!(QualityReason::Pose.to_string(), "POSE");
        assert_eq!(QualityReason::Far.to_string(), "FAR");
    }
}
