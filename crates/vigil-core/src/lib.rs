//! Continuous face authentication: tracking, quality gating, liveness
//! challenges, and identity matching over pluggable camera and inference
//! backends.
//!
//! The crate is organized around one synchronous state machine,
//! [`AuthPipeline`], fed by a [`FramePump`] and parameterized over the
//! [`FaceDetector`], [`FaceEncoder`], and [`AttributeAnalyzer`] traits.
//! Everything here is deterministic given the backend outputs; no I/O
//! happens outside the frame source and the enrollment store.

pub mod analyzer;
pub mod detector;
pub mod enrollment;
pub mod frame;
pub mod geometry;
pub mod liveness;
pub mod matcher;
pub mod pipeline;
pub mod quality;
pub mod recognizer;
pub mod render;
pub mod session;
pub mod tracker;

pub use analyzer::{AttributeAnalyzer, FaceAttributes};
pub use detector::{Detection, FaceDetector, HeadPose};
pub use enrollment::{validate_embedding, EnrolledIdentity, EnrollmentStore, StoreError};
pub use frame::{CaptureError, Frame, FramePump, FrameSource};
pub use geometry::{BoundingBox, FaceGeometry, Point};
pub use liveness::{
    ChallengeKind, ChallengeStatus, LivenessChallenge, LivenessConfig, TimeoutPolicy,
};
pub use matcher::{
    CosineMatcher, MatchOutcome, MatchedIdentity, Matcher, MAX_COSINE_DISTANCE,
};
pub use pipeline::{AuthPipeline, EnrollError, FrameReport, PipelineConfig, PipelineEvent};
pub use quality::{QualityConfig, QualityGate, QualityReason, QualityVerdict};
pub use recognizer::{Embedding, FaceEncoder};
pub use render::{
    color_for_stage, ChallengePrompt, Dashboard, FaceOverlay, OverlayColor, RenderFrame,
};
pub use session::{AuthStage, AuthState, SessionMap};
pub use tracker::{
    associate_detections, AssociationCap, CentroidTracker, Track, TrackId, TrackerConfig,
};
