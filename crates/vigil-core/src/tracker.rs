//! Centroid tracking: stable ids for faces across frames.
//!
//! Tracking runs in two explicit steps each frame. First the tracker matches
//! detection centroids against known tracks by greedy global nearest
//! assignment and ages or registers tracks. Then a separate join step
//! re-associates the surviving track ids with this frame's full detection
//! payloads, because the tracker itself only ever sees centroids.

use std::collections::{BTreeMap, VecDeque};

use crate::detector::Detection;
use crate::geometry::Point;

pub type TrackId = u64;

/// Tracker tuning knobs.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Consecutive frames a track may go undetected before it is dropped.
    pub max_disappeared: u32,
    /// Past centroids retained per track.
    pub history_len: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_disappeared: 30,
            history_len: 32,
        }
    }
}

/// One tracked subject.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub centroid: Point,
    /// Recent centroids, oldest first, bounded by `history_len`.
    pub history: VecDeque<Point>,
    /// Consecutive frames without a matched detection.
    pub disappeared: u32,
}

/// Multi-object centroid tracker.
///
/// Ids are never reused within a tracker instance. A subject that leaves
/// and returns after its track expired gets a fresh id and restarts
/// authentication from scratch.
pub struct CentroidTracker {
    tracks: BTreeMap<TrackId, Track>,
    next_id: TrackId,
    config: TrackerConfig,
}

impl CentroidTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 1,
            config,
        }
    }

    pub fn tracks(&self) -> &BTreeMap<TrackId, Track> {
        &self.tracks
    }

    /// Advance one frame with this frame's detection centroids.
    pub fn update(&mut self, centroids: &[Point]) -> &BTreeMap<TrackId, Track> {
        if centroids.is_empty() {
            self.age_all();
            return &self.tracks;
        }
        if self.tracks.is_empty() {
            for c in centroids {
                self.register(*c);
            }
            return &self.tracks;
        }
        self.assign(centroids);
        &self.tracks
    }

    /// Greedy global nearest assignment: all track/detection pairs sorted
    /// ascending by distance, each track and detection used at most once.
    /// Ties break on the smaller track id, then the smaller detection index.
    fn assign(&mut self, centroids: &[Point]) {
        let mut pairs: Vec<(f32, TrackId, usize)> = Vec::new();
        for (id, track) in &self.tracks {
            for (di, c) in centroids.iter().enumerate() {
                let dist = track.centroid.distance_to(c);
                if dist.is_finite() {
                    pairs.push((dist, *id, di));
                }
            }
        }
        pairs.sort_by(|a, b| {
            a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2))
        });

        let mut used_tracks = std::collections::BTreeSet::new();
        let mut used_detections = vec![false; centroids.len()];
        for (_, id, di) in pairs {
            if used_tracks.contains(&id) || used_detections[di] {
                continue;
            }
            used_tracks.insert(id);
            used_detections[di] = true;
            if let Some(track) = self.tracks.get_mut(&id) {
                track.centroid = centroids[di];
                track.disappeared = 0;
                if track.history.len() == self.config.history_len {
                    track.history.pop_front();
                }
                track.history.push_back(centroids[di]);
            }
        }

        let unmatched: Vec<TrackId> = self
            .tracks
            .keys()
            .filter(|id| !used_tracks.contains(id))
            .copied()
            .collect();
        for id in unmatched {
            self.age(id);
        }
        for (di, c) in centroids.iter().enumerate() {
            if !used_detections[di] {
                self.register(*c);
            }
        }
    }

    fn register(&mut self, centroid: Point) -> TrackId {
        let id = self.next_id;
        self.next_id += 1;
        let mut history = VecDeque::with_capacity(self.config.history_len);
        history.push_back(centroid);
        self.tracks.insert(
            id,
            Track {
                id,
                centroid,
                history,
                disappeared: 0,
            },
        );
        tracing::debug!(track = id, "track registered");
        id
    }

    fn age(&mut self, id: TrackId) {
        let expired = match self.tracks.get_mut(&id) {
            Some(track) => {
                track.disappeared += 1;
                track.disappeared > self.config.max_disappeared
            }
            None => false,
        };
        if expired {
            self.tracks.remove(&id);
            tracing::debug!(track = id, "track expired");
        }
    }

    fn age_all(&mut self) {
        let ids: Vec<TrackId> = self.tracks.keys().copied().collect();
        for id in ids {
            self.age(id);
        }
    }
}

/// Cap on the track-to-detection association distance used by the join
/// step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssociationCap {
    /// Fixed pixel radius.
    Pixels(f32),
    /// Radius as a fraction of the frame width, for resolution-independent
    /// deployments.
    FrameFraction(f32),
}

impl Default for AssociationCap {
    fn default() -> Self {
        AssociationCap::Pixels(50.0)
    }
}

impl AssociationCap {
    pub fn radius(&self, frame_width: u32) -> f32 {
        match self {
            AssociationCap::Pixels(px) => *px,
            AssociationCap::FrameFraction(f) => f * frame_width as f32,
        }
    }
}

/// Join live track ids back to this frame's detection payloads.
///
/// For each track the nearest detection strictly inside the cap wins; a
/// track with nothing in range gets no entry this frame and its auth state
/// is left alone. Output order follows ascending track id.
pub fn associate_detections<'a>(
    tracks: &BTreeMap<TrackId, Track>,
    detections: &'a [Detection],
    cap: AssociationCap,
    frame_width: u32,
) -> Vec<(TrackId, &'a Detection)> {
    let radius = cap.radius(frame_width);
    let mut joined = Vec::new();
    for (id, track) in tracks {
        let mut best: Option<(&Detection, f32)> = None;
        for det in detections {
            let dist = track.centroid.distance_to(&det.bbox.centroid());
            if dist < radius && best.map_or(true, |(_, d)| dist < d) {
                best = Some((det, dist));
            }
        }
        if let Some((det, _)) = best {
            joined.push((*id, det));
        }
    }
    joined
}
