use crate::models::FaceGeometry;

use super::config::DetectionConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    /// Positive when the head tilts down. A proxy, not a 3D angle.
    pub pitch: f64,
    /// Positive when the nose sits right of the eye midpoint.
    pub yaw: f64,
    pub engagement: u8,
}

pub fn estimate_orientation(face: &FaceGeometry, config: &DetectionConfig) -> Orientation {
    let mid_eye = face.left_eye.midpoint(&face.right_eye);

    let raw_pitch = face.nose_tip.y - mid_eye.y;
    let pitch = (raw_pitch - config.pitch_bias) * config.pitch_scale;

    let raw_yaw = face.nose_tip.x - mid_eye.x;
    let yaw = raw_yaw * config.yaw_scale;

    Orientation {
        pitch,
        yaw,
        engagement: engagement_score(pitch, yaw, config),
    }
}

pub fn engagement_score(pitch: f64, yaw: f64, config: &DetectionConfig) -> u8 {
    let penalty = pitch.abs() * config.pitch_weight + yaw.abs() * config.yaw_weight;
    let score = (100.0 - penalty).round();
    if score.is_nan() {
        return 0;
    }
    score.clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::fixtures::{face_with_offset, face_with_pitch};

    fn orient(face: crate::models::FaceLandmarks) -> Orientation {
        estimate_orientation(&face.geometry().unwrap(), &DetectionConfig::default())
    }

    #[test]
    fn neutral_pose_scores_full() {
        let orientation = orient(face_with_pitch(0.0));
        assert!(orientation.pitch.abs() < 1e-9);
        assert!(orientation.yaw.abs() < 1e-9);
        assert_eq!(orientation.engagement, 100);
    }

    #[test]
    fn pitch_and_yaw_are_weighted() {
        // pitch 5 → penalty 10, yaw 0.02 * 200 = 4 → penalty 12
        let orientation = orient(face_with_offset(0.02, 0.05 + 5.0 / 200.0));
        assert!((orientation.pitch - 5.0).abs() < 1e-9);
        assert!((orientation.yaw - 4.0).abs() < 1e-9);
        assert_eq!(orientation.engagement, 78);
    }

    #[test]
    fn score_is_clamped_at_zero() {
        let orientation = orient(face_with_offset(0.3, 0.4));
        assert_eq!(orientation.engagement, 0);
        assert_eq!(engagement_score(-500.0, 500.0, &DetectionConfig::default()), 0);
    }

    #[test]
    fn looking_up_also_costs_engagement() {
        let orientation = orient(face_with_pitch(-10.0));
        assert_eq!(orientation.engagement, 80);
    }
}
