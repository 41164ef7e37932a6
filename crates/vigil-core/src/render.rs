//! Render payloads: what a front end needs to draw one processed frame.
//!
//! The pipeline never draws anything itself; it emits these structures and
//! the daemon's dashboard (or any other consumer) turns them into pixels,
//! ANSI text, or JSON.

use serde::Serialize;

use crate::geometry::BoundingBox;
use crate::liveness::{ChallengeKind, ChallengeStatus};
use crate::quality::QualityReason;
use crate::session::AuthStage;
use crate::tracker::TrackId;

/// Traffic-light color class for a face box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OverlayColor {
    /// Unverified, or failing quality.
    Red,
    /// Liveness passed but not verified.
    Yellow,
    /// Verified.
    Green,
}

/// Map an authentication stage to its box color.
pub fn color_for_stage(stage: AuthStage) -> OverlayColor {
    match stage {
        AuthStage::Verified => OverlayColor::Green,
        AuthStage::LivenessPassed | AuthStage::Recognizing | AuthStage::UnknownStable => {
            OverlayColor::Yellow
        }
        _ => OverlayColor::Red,
    }
}

/// The active challenge prompt for a face.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChallengePrompt {
    pub kind: ChallengeKind,
    pub status: ChallengeStatus,
}

/// Per-face render signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceOverlay {
    pub track: TrackId,
    pub bbox: BoundingBox,
    pub color: OverlayColor,
    /// Text lines beside the box, top to bottom. The first is always the
    /// track id label.
    pub labels: Vec<String>,
    /// Non-empty when the quality gate failed this frame.
    pub quality_reasons: Vec<QualityReason>,
    /// Present while a challenge is being evaluated.
    pub challenge: Option<ChallengePrompt>,
}

/// Global frame statistics shown alongside the faces.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dashboard {
    pub fps: f32,
    pub faces: usize,
    pub mode: String,
}

/// One frame's complete render payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderFrame {
    pub overlays: Vec<FaceOverlay>,
    pub dashboard: Dashboard,
}
