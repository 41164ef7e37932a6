//! Demographic attribute estimation contract.

use serde::{Deserialize, Serialize};

use crate::frame::Frame;
use crate::geometry::BoundingBox;

/// Attributes estimated from a face crop. Every field is optional; backends
/// fill in what they can.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceAttributes {
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub emotion: Option<String>,
}

impl FaceAttributes {
    pub fn is_empty(&self) -> bool {
        self.age.is_none() && self.gender.is_none() && self.emotion.is_none()
    }

    pub fn age_label(&self) -> String {
        match self.age {
            Some(age) => age.to_string(),
            None => "?".to_string(),
        }
    }

    pub fn gender_label(&self) -> &str {
        self.gender.as_deref().unwrap_or("?")
    }

    pub fn emotion_label(&self) -> &str {
        self.emotion.as_deref().unwrap_or("?")
    }
}

/// Attribute estimation backend. Failures yield an empty result; the
/// pipeline records it and does not retry.
pub trait AttributeAnalyzer: Send {
    fn analyze(&mut self, frame: &Frame, bbox: &BoundingBox) -> FaceAttributes;
}
