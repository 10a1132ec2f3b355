use crate::models::{BodyObservation, FaceGeometry, FrameSample};

use super::config::DetectionConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Presence {
    pub face_present: bool,
    pub body_visible: bool,
    /// Usable keypoints when the face is present.
    pub face: Option<FaceGeometry>,
}

impl Presence {
    pub fn is_absent(&self) -> bool {
        !self.face_present && !self.body_visible
    }
}

/// Classify one merged frame. Malformed landmarks count as missing.
pub fn classify_presence(sample: &FrameSample, config: &DetectionConfig) -> Presence {
    let face = sample
        .face
        .as_ref()
        .filter(|landmarks| !landmarks.is_empty())
        .and_then(|landmarks| landmarks.geometry());

    let body_visible = match &sample.body {
        // Cold start: the pose model is still loading, assume the subject is there.
        BodyObservation::NotYetRun => true,
        BodyObservation::Observed(None) => false,
        BodyObservation::Observed(Some(body)) => body
            .shoulders()
            .any(|shoulder| shoulder.visibility > config.body_visibility_threshold),
    };

    Presence {
        face_present: face.is_some(),
        body_visible,
        face,
    }
}
