//! Embedding extraction contract.

use crate::frame::Frame;
use crate::geometry::BoundingBox;

/// A face embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Identifies the encoder that produced this vector. Embeddings from
    /// different models are not comparable.
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn all_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    pub fn l2_norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }
}

/// Embedding extraction backend.
///
/// Returns `None` when the crop is empty or the backend cannot produce a
/// vector this frame; callers retry on a later frame.
pub trait FaceEncoder: Send {
    fn encode(&mut self, frame: &Frame, bbox: &BoundingBox) -> Option<Embedding>;
}
