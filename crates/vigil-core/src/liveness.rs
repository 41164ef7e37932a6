//! Challenge-response liveness detection.
//!
//! A static photograph or a replayed video can carry a perfectly good face,
//! so before a track is allowed near the recognizer it must perform a
//! randomly chosen motion: move closer, move away, move left, or move
//! right. Progress is measured against a baseline captured on the first
//! well-formed frame after the challenge is issued; horizontal motion is
//! compared to a fraction of the frame width and depth motion to a
//! fractional change of the face width proxy. A challenge that is not
//! completed within the timeout expires.
//!
//! Completion is terminal: once passed, a challenge never regresses, and
//! the owning track keeps its liveness credit for the rest of its life.

use std::fmt;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::geometry::FaceGeometry;

/// Motion a subject must perform to prove liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChallengeKind {
    MoveCloser,
    MoveAway,
    MoveLeft,
    MoveRight,
}

pub const CHALLENGE_KINDS: [ChallengeKind; 4] = [
    ChallengeKind::MoveCloser,
    ChallengeKind::MoveAway,
    ChallengeKind::MoveLeft,
    ChallengeKind::MoveRight,
];

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChallengeKind::MoveCloser => "MOVE_CLOSER",
            ChallengeKind::MoveAway => "MOVE_AWAY",
            ChallengeKind::MoveLeft => "MOVE_LEFT",
            ChallengeKind::MoveRight => "MOVE_RIGHT",
        };
        f.write_str(s)
    }
}

/// What one evaluation round reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChallengeStatus {
    /// Baseline captured this frame; motion is measured from here on.
    Establishing,
    /// Motion has not reached the threshold yet.
    Waiting,
    Passed,
    TimedOut,
    /// Landmark data was malformed; nothing was measured this frame.
    TrackingError,
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChallengeStatus::Establishing => "Keep Moving...",
            ChallengeStatus::Waiting => "WAITING...",
            ChallengeStatus::Passed => "PASSED",
            ChallengeStatus::TimedOut => "TIMEOUT",
            ChallengeStatus::TrackingError => "Tracking Error",
        };
        f.write_str(s)
    }
}

/// What happens to a track whose challenge timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Issue a fresh random challenge and keep trying.
    Reissue,
    /// Leave the track unauthenticated until the tracker drops it.
    Expire,
}

/// Challenge engine tuning.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    pub timeout: Duration,
    /// Horizontal displacement required, as a fraction of the frame width.
    pub move_fraction: f32,
    /// Width-proxy change required, as a fraction of the baseline proxy.
    pub scale_fraction: f32,
    pub timeout_policy: TimeoutPolicy,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            move_fraction: 0.05,
            scale_fraction: 0.20,
            timeout_policy: TimeoutPolicy::Reissue,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    center_x: f32,
    width_proxy: f32,
}

/// A single active challenge for one track. Each track gets its own
/// instance; baselines are never shared between subjects.
#[derive(Debug, Clone)]
pub struct LivenessChallenge {
    kind: ChallengeKind,
    issued_at: Instant,
    baseline: Option<Baseline>,
    completed: bool,
    expired: bool,
}

impl LivenessChallenge {
    /// Issue a challenge with a uniformly random kind.
    pub fn issue<R: Rng>(rng: &mut R) -> Self {
        let kind = CHALLENGE_KINDS
            .choose(rng)
            .copied()
            .unwrap_or(ChallengeKind::MoveCloser);
        Self::with_kind(kind)
    }

    pub fn with_kind(kind: ChallengeKind) -> Self {
        Self {
            kind,
            issued_at: Instant::now(),
            baseline: None,
            completed: false,
            expired: false,
        }
    }

    pub fn kind(&self) -> ChallengeKind {
        self.kind
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Whether a previous evaluation already reported a timeout.
    pub fn has_expired(&self) -> bool {
        self.expired
    }

    /// Evaluate one frame of the challenge.
    ///
    /// Order matters: a completed challenge stays passed, an expired clock
    /// beats everything else, malformed geometry measures nothing, and the
    /// first well-formed frame only captures the baseline.
    pub fn evaluate(
        &mut self,
        geometry: Option<FaceGeometry>,
        frame_width: u32,
        config: &LivenessConfig,
    ) -> ChallengeStatus {
        if self.completed {
            return ChallengeStatus::Passed;
        }
        if self.issued_at.elapsed() > config.timeout {
            self.expired = true;
            return ChallengeStatus::TimedOut;
        }
        let Some(geom) = geometry else {
            return ChallengeStatus::TrackingError;
        };
        let Some(base) = self.baseline else {
            self.baseline = Some(Baseline {
                center_x: geom.center.x,
                width_proxy: geom.width_proxy,
            });
            return ChallengeStatus::Establishing;
        };

        let dx = geom.center.x - base.center_x;
        let dw = geom.width_proxy - base.width_proxy;
        let move_threshold = frame_width as f32 * config.move_fraction;
        let scale_threshold = base.width_proxy * config.scale_fraction;

        let passed = match self.kind {
            ChallengeKind::MoveLeft => dx < -move_threshold,
            ChallengeKind::MoveRight => dx > move_threshold,
            ChallengeKind::MoveCloser => dw > scale_threshold,
            ChallengeKind::MoveAway => dw < -scale_threshold,
        };
        if passed {
            self.completed = true;
            ChallengeStatus::Passed
        } else {
            ChallengeStatus::Waiting
        }
    }
}
