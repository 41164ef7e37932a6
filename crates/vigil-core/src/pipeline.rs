//! The per-frame authentication pipeline.
//!
//! `AuthPipeline` owns every piece of business state: the tracker, the
//! per-track sessions, the quality gate, active challenges, and the gallery
//! snapshot. One call to [`AuthPipeline::process_frame`] runs the whole
//! cycle: detect, track, join detections back to tracks, then advance each
//! face's authentication state machine. Failures are track-local; a bad
//! frame or a failed stage never takes the loop down.

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::analyzer::{AttributeAnalyzer, FaceAttributes};
use crate::detector::{Detection, FaceDetector};
use crate::enrollment::{EnrolledIdentity, EnrollmentStore, StoreError};
use crate::frame::Frame;
use crate::geometry::{BoundingBox, FaceGeometry};
use crate::liveness::{ChallengeKind, ChallengeStatus, LivenessChallenge, LivenessConfig, TimeoutPolicy};
use crate::matcher::{CosineMatcher, Matcher};
use crate::quality::{QualityConfig, QualityGate};
use crate::recognizer::FaceEncoder;
use crate::render::{color_for_stage, ChallengePrompt, FaceOverlay};
use crate::session::{AuthStage, AuthState, SessionMap};
use crate::tracker::{associate_detections, AssociationCap, CentroidTracker, TrackerConfig, TrackId};

/// Every stage's tuning in one place.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub tracker: TrackerConfig,
    pub association_cap: AssociationCap,
    pub quality: QualityConfig,
    pub liveness: LivenessConfig,
    /// Cosine distance strictly below this accepts a gallery entry.
    pub match_threshold: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            association_cap: AssociationCap::default(),
            quality: QualityConfig::default(),
            liveness: LivenessConfig::default(),
            match_threshold: 0.5,
        }
    }
}

/// Notable happenings in one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// First verification of this track.
    Welcome { track: TrackId, name: String },
    TrackVerified {
        track: TrackId,
        name: String,
        confidence: f32,
    },
    TrackRejected { track: TrackId, distance: f32 },
    ChallengeIssued { track: TrackId, kind: ChallengeKind },
    ChallengeTimedOut { track: TrackId, kind: ChallengeKind },
}

/// Everything a caller needs to render and react to one frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// One overlay per face that had a detection joined this frame.
    pub overlays: Vec<FaceOverlay>,
    pub events: Vec<PipelineEvent>,
    /// Set while enrollment is armed and exactly one quality-passing face
    /// is in view; the capture is held until completed or cancelled.
    pub enroll_ready: Option<TrackId>,
    pub faces: usize,
}

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("no capture is ready for enrollment")]
    NotReady,
    #[error("could not encode a face from the captured frame")]
    EncodingFailed,
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct PendingEnroll {
    frame: Frame,
    bbox: BoundingBox,
    attributes: Option<FaceAttributes>,
}

/// The authentication state machine over pluggable detection, encoding,
/// and analysis backends.
pub struct AuthPipeline<D, E, A> {
    detector: D,
    encoder: E,
    analyzer: A,
    quality: QualityGate,
    tracker: CentroidTracker,
    sessions: SessionMap,
    matcher: CosineMatcher,
    gallery: Vec<EnrolledIdentity>,
    liveness: LivenessConfig,
    association_cap: AssociationCap,
    match_threshold: f32,
    rng: StdRng,
    enroll_armed: bool,
    pending_enroll: Option<PendingEnroll>,
}

impl<D, E, A> AuthPipeline<D, E, A>
where
    D: FaceDetector,
    E: FaceEncoder,
    A: AttributeAnalyzer,
{
    pub fn new(
        detector: D,
        encoder: E,
        analyzer: A,
        config: PipelineConfig,
        gallery: Vec<EnrolledIdentity>,
    ) -> Self {
        tracing::info!(identities = gallery.len(), "pipeline initialized");
        Self {
            detector,
            encoder,
            analyzer,
            quality: QualityGate::new(config.quality),
            tracker: CentroidTracker::new(config.tracker),
            sessions: SessionMap::new(),
            matcher: CosineMatcher,
            gallery,
            liveness: config.liveness,
            association_cap: config.association_cap,
            match_threshold: config.match_threshold,
            rng: StdRng::from_entropy(),
            enroll_armed: false,
            pending_enroll: None,
        }
    }

    pub fn gallery_len(&self) -> usize {
        self.gallery.len()
    }

    pub fn session(&self, track: TrackId) -> Option<&AuthState> {
        self.sessions.get(track)
    }

    pub fn enrollment_armed(&self) -> bool {
        self.enroll_armed
    }

    /// Start watching for an enrollable capture. The next frame with
    /// exactly one quality-passing face reports `enroll_ready`.
    pub fn arm_enrollment(&mut self) {
        self.enroll_armed = true;
        tracing::info!("enrollment armed");
    }

    pub fn cancel_enrollment(&mut self) {
        self.enroll_armed = false;
        self.pending_enroll = None;
    }

    /// Run one full cycle over a frame.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameReport {
        let detections = self.detector.detect(frame);
        let centroids: Vec<_> = detections.iter().map(|d| d.bbox.centroid()).collect();
        self.tracker.update(&centroids);
        let joined =
            associate_detections(self.tracker.tracks(), &detections, self.association_cap, frame.width);
        self.sessions.sync(self.tracker.tracks());

        let mut events = Vec::new();
        let mut overlays = Vec::new();
        for &(track, detection) in &joined {
            if let Some(overlay) = self.step_face(frame, track, detection, &mut events) {
                overlays.push(overlay);
            }
        }

        let mut enroll_ready = None;
        if self.enroll_armed {
            // Faces that fail quality do not count toward the
            // one-subject requirement.
            let mut passing = joined.iter().copied().filter(|&(track, _)| {
                self.sessions
                    .get(track)
                    .and_then(|s| s.quality.as_ref())
                    .map(|q| q.pass)
                    .unwrap_or(false)
            });
            if let (Some((track, detection)), None) = (passing.next(), passing.next()) {
                self.pending_enroll = Some(PendingEnroll {
                    frame: frame.clone(),
                    bbox: detection.bbox,
                    attributes: self.sessions.get(track).and_then(|s| s.attributes.clone()),
                });
                enroll_ready = Some(track);
            }
        }

        FrameReport {
            overlays,
            events,
            enroll_ready,
            faces: joined.len(),
        }
    }

    /// Advance one face's state machine and build its overlay.
    fn step_face(
        &mut self,
        frame: &Frame,
        track: TrackId,
        detection: &Detection,
        events: &mut Vec<PipelineEvent>,
    ) -> Option<FaceOverlay> {
        let state = self.sessions.get_mut(track)?;

        if state.stage() == AuthStage::Detected {
            state.transition(AuthStage::QualityWait);
        }

        let verdict = self.quality.evaluate(frame, detection);
        let quality_ok = verdict.pass;
        state.quality = Some(verdict);

        let mut prompt = None;
        match state.stage() {
            AuthStage::QualityWait | AuthStage::LivenessActive => {
                if quality_ok {
                    if state.challenge.is_none() {
                        let challenge = LivenessChallenge::issue(&mut self.rng);
                        tracing::debug!(track, kind = %challenge.kind(), "challenge issued");
                        events.push(PipelineEvent::ChallengeIssued {
                            track,
                            kind: challenge.kind(),
                        });
                        state.challenge = Some(challenge);
                    }
                    state.transition(AuthStage::LivenessActive);

                    let geometry = FaceGeometry::from_landmarks(&detection.landmarks);
                    if let Some(challenge) = state.challenge.as_mut() {
                        let already_expired = challenge.has_expired();
                        let status = challenge.evaluate(geometry, frame.width, &self.liveness);
                        // the prompt names the challenge that produced this
                        // status, even if a reissue replaces it below
                        let shown_kind = challenge.kind();
                        match status {
                            ChallengeStatus::Passed => {
                                tracing::info!(track, kind = %challenge.kind(), "liveness passed");
                                state.transition(AuthStage::LivenessPassed);
                            }
                            ChallengeStatus::TimedOut if !already_expired => {
                                let expired_kind = challenge.kind();
                                tracing::debug!(track, kind = %expired_kind, "challenge timed out");
                                events.push(PipelineEvent::ChallengeTimedOut {
                                    track,
                                    kind: expired_kind,
                                });
                                if self.liveness.timeout_policy == TimeoutPolicy::Reissue {
                                    let next = LivenessChallenge::issue(&mut self.rng);
                                    tracing::debug!(track, kind = %next.kind(), "challenge reissued");
                                    events.push(PipelineEvent::ChallengeIssued {
                                        track,
                                        kind: next.kind(),
                                    });
                                    *challenge = next;
                                }
                            }
                            _ => {}
                        }
                        prompt = Some(ChallengePrompt {
                            kind: shown_kind,
                            status,
                        });
                    }
                } else if state.stage() == AuthStage::LivenessActive {
                    // The challenge stays armed and its clock keeps running.
                    state.transition(AuthStage::QualityWait);
                }
            }
            _ => {}
        }

        if state.stage() == AuthStage::LivenessPassed && state.embedding().is_none() {
            match self.encoder.encode(frame, &detection.bbox) {
                Some(embedding) => {
                    state.set_embedding(embedding);
                    state.transition(AuthStage::Recognizing);
                }
                None => {
                    tracing::debug!(track, "embedding extraction failed, retrying next frame");
                }
            }
        }

        if state.stage() == AuthStage::Recognizing {
            if let Some(embedding) = state.embedding() {
                let outcome = self
                    .matcher
                    .identify(embedding, &self.gallery, self.match_threshold);
                match outcome.identity.clone() {
                    Some(found) => {
                        tracing::info!(
                            track,
                            name = %found.name,
                            confidence = outcome.confidence,
                            "identity verified"
                        );
                        events.push(PipelineEvent::TrackVerified {
                            track,
                            name: found.name,
                            confidence: outcome.confidence,
                        });
                        state.outcome = Some(outcome);
                        state.transition(AuthStage::Verified);
                    }
                    None => {
                        tracing::info!(track, distance = outcome.distance, "no gallery match");
                        events.push(PipelineEvent::TrackRejected {
                            track,
                            distance: outcome.distance,
                        });
                        state.outcome = Some(outcome);
                        state.transition(AuthStage::UnknownStable);
                    }
                }
            }
            if state.attributes.is_none() {
                let attributes = self.analyzer.analyze(frame, &detection.bbox);
                state.attributes = Some(attributes);
            }
        }

        if let Some(name) = state.take_welcome() {
            tracing::info!(track, name = %name, "welcome");
            events.push(PipelineEvent::Welcome { track, name });
        }

        let mut labels = vec![format!("ID: {track}")];
        if state.stage() == AuthStage::Verified {
            if let Some(outcome) = &state.outcome {
                if let Some(found) = &outcome.identity {
                    labels.push(format!("WELCOME {}", found.name.to_uppercase()));
                    labels.push(format!("Name: {}", found.name));
                    labels.push(format!("Conf: {:.2}", outcome.confidence));
                }
            }
            if let Some(attrs) = &state.attributes {
                labels.push(format!("Age: {}", attrs.age_label()));
                labels.push(format!("Gender: {}", attrs.gender_label()));
                labels.push(format!("Emotion: {}", attrs.emotion_label()));
            }
        }

        let quality_reasons = if quality_ok {
            Vec::new()
        } else {
            state.quality.as_ref().map(|q| q.reasons()).unwrap_or_default()
        };

        Some(FaceOverlay {
            track,
            bbox: detection.bbox,
            color: color_for_stage(state.stage()),
            labels,
            quality_reasons,
            challenge: prompt,
        })
    }

    /// Turn the held capture into a gallery entry.
    ///
    /// Encoding runs fresh on the held frame; a backend refusal reports an
    /// error and mutates nothing. On success the gallery snapshot is
    /// re-read from the store so matching picks up the new identity
    /// immediately. The armed flag is cleared either way.
    pub fn complete_enrollment(
        &mut self,
        name: &str,
        store: &mut dyn EnrollmentStore,
    ) -> Result<String, EnrollError> {
        let pending = self.pending_enroll.take().ok_or(EnrollError::NotReady)?;
        self.enroll_armed = false;

        let Some(embedding) = self.encoder.encode(&pending.frame, &pending.bbox) else {
            tracing::warn!(name, "enrollment capture could not be encoded");
            return Err(EnrollError::EncodingFailed);
        };
        let id = store.add(name, &embedding, pending.attributes.as_ref())?;
        self.gallery = store.get_all()?;
        tracing::info!(id = %id, name, gallery = self.gallery.len(), "identity enrolled");
        Ok(id)
    }
}
