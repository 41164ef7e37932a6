//! Per-track authentication state.
//!
//! Sessions exist in bijection with live tracker ids: the map is synced at
//! the top of every frame, creating state for new tracks and discarding
//! state whose track expired. Authentication history never survives a
//! track loss.

use std::collections::BTreeMap;

use crate::analyzer::FaceAttributes;
use crate::liveness::LivenessChallenge;
use crate::matcher::MatchOutcome;
use crate::quality::QualityVerdict;
use crate::recognizer::Embedding;
use crate::tracker::{Track, TrackId};

/// Authentication progress for one tracked subject. Declaration order is
/// the pipeline order; later stages outrank earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    Detected,
    QualityWait,
    LivenessActive,
    LivenessPassed,
    Recognizing,
    Verified,
    UnknownStable,
}

impl AuthStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuthStage::Verified | AuthStage::UnknownStable)
    }
}

/// Everything the pipeline knows about one tracked subject.
#[derive(Debug, Clone)]
pub struct AuthState {
    stage: AuthStage,
    pub quality: Option<QualityVerdict>,
    pub challenge: Option<LivenessChallenge>,
    embedding: Option<Embedding>,
    pub outcome: Option<MatchOutcome>,
    pub attributes: Option<FaceAttributes>,
    welcome_announced: bool,
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            stage: AuthStage::Detected,
            quality: None,
            challenge: None,
            embedding: None,
            outcome: None,
            attributes: None,
            welcome_announced: false,
        }
    }

    pub fn stage(&self) -> AuthStage {
        self.stage
    }

    /// Apply a stage change, enforcing forward-only movement. The one legal
    /// regression is LivenessActive back to QualityWait while capture
    /// quality drops mid-challenge; terminal stages never move.
    pub fn transition(&mut self, next: AuthStage) {
        if self.stage == next || self.stage.is_terminal() {
            return;
        }
        let backwards = (next as u8) < (self.stage as u8);
        let oscillation =
            self.stage == AuthStage::LivenessActive && next == AuthStage::QualityWait;
        if backwards && !oscillation {
            return;
        }
        self.stage = next;
    }

    /// Store the first successful embedding; later calls are ignored. One
    /// track is one subject, and its identity evidence is immutable.
    pub fn set_embedding(&mut self, embedding: Embedding) {
        if self.embedding.is_none() {
            self.embedding = Some(embedding);
        }
    }

    pub fn embedding(&self) -> Option<&Embedding> {
        self.embedding.as_ref()
    }

    /// The verified name, exactly once. Returns `Some` on the first call
    /// after verification and `None` forever after.
    pub fn take_welcome(&mut self) -> Option<String> {
        if self.welcome_announced || self.stage != AuthStage::Verified {
            return None;
        }
        let name = self
            .outcome
            .as_ref()
            .and_then(|o| o.identity.as_ref())
            .map(|i| i.name.clone())?;
        self.welcome_announced = true;
        Some(name)
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Auth state for every live track.
#[derive(Debug, Default)]
pub struct SessionMap {
    sessions: BTreeMap<TrackId, AuthState>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile with the tracker: open sessions for new tracks, close
    /// sessions whose track died.
    pub fn sync(&mut self, live: &BTreeMap<TrackId, Track>) {
        let dead: Vec<TrackId> = self
            .sessions
            .keys()
            .filter(|id| !live.contains_key(id))
            .copied()
            .collect();
        for id in dead {
            self.sessions.remove(&id);
            tracing::debug!(track = id, "session closed");
        }
        for id in live.keys() {
            self.sessions.entry(*id).or_insert_with(|| {
                tracing::debug!(track = *id, "session opened");
                AuthState::new()
            });
        }
    }

    pub fn get(&self, id: TrackId) -> Option<&AuthState> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut AuthState> {
        self.sessions.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TrackId, &AuthState)> {
        self.sessions.iter()
    }
}
