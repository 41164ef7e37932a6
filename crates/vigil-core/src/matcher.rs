//! Identity matching over an enrolled gallery.

use serde::Serialize;

use crate::enrollment::EnrolledIdentity;
use crate::recognizer::Embedding;

/// Distance assigned to pairs that cannot be compared (zero norm or
/// mismatched dimensions), and to an empty gallery. This is the true
/// maximum of the cosine distance, so degenerate pairs can never win.
pub const MAX_COSINE_DISTANCE: f32 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedIdentity {
    pub id: String,
    pub name: String,
}

/// Outcome of comparing a probe embedding against the gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchOutcome {
    /// Present when the best distance clears the threshold.
    pub identity: Option<MatchedIdentity>,
    /// Best (smallest) distance observed.
    pub distance: f32,
    /// `max(0, 1 - distance)` for a match, zero otherwise.
    pub confidence: f32,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }

    fn unknown(distance: f32) -> Self {
        Self {
            identity: None,
            distance,
            confidence: 0.0,
        }
    }
}

/// Compares probe embeddings against the gallery.
pub trait Matcher {
    fn identify(
        &self,
        probe: &Embedding,
        gallery: &[EnrolledIdentity],
        threshold: f32,
    ) -> MatchOutcome;
}

/// Cosine-distance matcher: `distance = 1 - cosine similarity`. A probe
/// matches when its best distance is strictly below the threshold; ties on
/// the minimum keep the earliest gallery entry.
pub struct CosineMatcher;

impl CosineMatcher {
    /// Cosine distance between two raw vectors. Degenerate inputs (length
    /// mismatch, zero norm) report the sentinel maximum.
    pub fn distance(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return MAX_COSINE_DISTANCE;
        }
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;
        for (x, y) in a.iter().zip(b) {
            dot += x * y;
            norm_a += x * x;
            norm_b += y * y;
        }
        if norm_a == 0.0 || norm_b == 0.0 {
            return MAX_COSINE_DISTANCE;
        }
        1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

impl Matcher for CosineMatcher {
    fn identify(
        &self,
        probe: &Embedding,
        gallery: &[EnrolledIdentity],
        threshold: f32,
    ) -> MatchOutcome {
        if gallery.is_empty() {
            return MatchOutcome::unknown(MAX_COSINE_DISTANCE);
        }
        let mut best_idx = 0usize;
        let mut best = f32::INFINITY;
        for (i, entry) in gallery.iter().enumerate() {
            let d = Self::distance(&probe.values, &entry.embedding.values);
            if d < best {
                best = d;
                best_idx = i;
            }
        }
        if best < threshold {
            let entry = &gallery[best_idx];
            MatchOutcome {
                identity: Some(MatchedIdentity {
                    id: entry.id.clone(),
                    name: entry.name.clone(),
                }),
                distance: best,
                confidence: (1.0 - best).max(0.0),
            }
        } else {
            MatchOutcome::unknown(best)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const THRESHOLD: f32 = 0.5;

    fn entry(id: &str, name: &str, values: Vec<f32>) -> EnrolledIdentity {
        EnrolledIdentity {
            id: id.to_string(),
            name: name.to_string(),
            embedding: Embedding::new(values),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_identical_embedding_matches_with_full_confidence() {
        let gallery = vec![entry("a", "alice", vec![0.6, 0.8])];
        let outcome = CosineMatcher.identify(&Embedding::new(vec![0.6, 0.8]), &gallery, THRESHOLD);
        let identity = outcome.identity.expect("should match");
        assert_eq!(identity.name, "alice");
        assert!(outcome.distance.abs() < 1e-5);
        assert!((outcome.confidence - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let outcome = CosineMatcher.identify(&Embedding::new(vec![1.0, 0.0]), &[], THRESHOLD);
        assert!(!outcome.is_match());
        assert_eq!(outcome.distance, MAX_COSINE_DISTANCE);
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn test_orthogonal_embedding_is_unknown() {
        let gallery = vec![entry("a", "alice", vec![1.0, 0.0])];
        let outcome = CosineMatcher.identify(&Embedding::new(vec![0.0, 1.0]), &gallery, THRESHOLD);
        assert!(!outcome.is_match());
        assert!((outcome.distance - 1.0).abs() < 1e-5);
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn test_opposite_embedding_scores_max_distance() {
        let gallery = vec![entry("a", "alice", vec![1.0, 0.0])];
        let outcome = CosineMatcher.identify(&Embedding::new(vec![-1.0, 0.0]), &gallery, THRESHOLD);
        assert!((outcome.distance - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_zero_norm_probe_cannot_match() {
        let gallery = vec![entry("a", "alice", vec![0.0, 0.0])];
        let outcome = CosineMatcher.identify(&Embedding::new(vec![0.0, 0.0]), &gallery, THRESHOLD);
        assert!(!outcome.is_match());
        assert_eq!(outcome.distance, MAX_COSINE_DISTANCE);
    }

    #[test]
    fn test_dimension_mismatch_cannot_match() {
        let gallery = vec![entry("a", "alice", vec![1.0, 0.0, 0.0])];
        let outcome = CosineMatcher.identify(&Embedding::new(vec![1.0, 0.0]), &gallery, THRESHOLD);
        assert!(!outcome.is_match());
        assert_eq!(outcome.distance, MAX_COSINE_DISTANCE);
    }

    #[test]
    fn test_nearest_entry_wins() {
        let gallery = vec![
            entry("a", "alice", vec![1.0, 0.0]),
            entry("b", "bob", vec![0.9, 0.1]),
        ];
        let outcome = CosineMatcher.identify(&Embedding::new(vec![0.9, 0.1]), &gallery, THRESHOLD);
        assert_eq!(outcome.identity.unwrap().name, "bob");
    }

    #[test]
    fn test_tie_keeps_first_entry() {
        let gallery = vec![
            entry("a", "alice", vec![1.0, 0.0]),
            entry("b", "impostor", vec![1.0, 0.0]),
        ];
        let outcome = CosineMatcher.identify(&Embedding::new(vec![1.0, 0.0]), &gallery, THRESHOLD);
        assert_eq!(outcome.identity.unwrap().id, "a");
    }

    #[test]
    fn test_threshold_is_strict() {
        let gallery = vec![entry("a", "alice", vec![1.0, 1.0])];
        let probe = Embedding::new(vec![1.0, 0.0]);
        // find the actual distance first, then use it as the threshold
        let measured = CosineMatcher.identify(&probe, &gallery, 999.0).distance;
        let outcome = CosineMatcher.identify(&probe, &gallery, measured);
        assert!(!outcome.is_match());
    }

    #[test]
    fn test_identify_is_deterministic() {
        let gallery = vec![
            entry("a", "alice", vec![0.3, 0.7, 0.1]),
            entry("b", "bob", vec![0.1, 0.2, 0.9]),
        ];
        let probe = Embedding::new(vec![0.3, 0.6, 0.2]);
        let first = CosineMatcher.identify(&probe, &gallery, THRESHOLD);
        for _ in 0..5 {
            assert_eq!(CosineMatcher.identify(&probe, &gallery, THRESHOLD), first);
        }
    }
}
