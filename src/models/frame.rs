//! Per-frame detector output.
//!
//! Face landmarks follow the face-mesh index layout and body landmarks the
//! pose layout; only the handful of keypoints below are ever read.

use serde::{Deserialize, Serialize};

pub const NOSE_TIP_INDEX: usize = 1;
pub const LEFT_EYE_INDEX: usize = 33;
pub const RIGHT_EYE_INDEX: usize = 263;

pub const LEFT_SHOULDER_INDEX: usize = 11;
pub const RIGHT_SHOULDER_INDEX: usize = 12;

/// Normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn midpoint(&self, other: &Point2) -> Point2 {
        Point2 {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyPoint {
    pub x: f64,
    pub y: f64,
    /// Detector confidence that the point is in frame, `[0, 1]`.
    #[serde(default)]
    pub visibility: f64,
}

/// The three facial keypoints the orientation estimator needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceGeometry {
    pub nose_tip: Point2,
    pub left_eye: Point2,
    pub right_eye: Point2,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceLandmarks {
    pub points: Vec<Point2>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point2>) -> Self {
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `None` when the mesh is truncated or any keypoint is not finite.
    pub fn geometry(&self) -> Option<FaceGeometry> {
        let pick = |index: usize| {
            self.points
                .get(index)
                .copied()
                .filter(|point| point.is_finite())
        };

        Some(FaceGeometry {
            nose_tip: pick(NOSE_TIP_INDEX)?,
            left_eye: pick(LEFT_EYE_INDEX)?,
            right_eye: pick(RIGHT_EYE_INDEX)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyLandmarks {
    pub points: Vec<BodyPoint>,
}

impl BodyLandmarks {
    pub fn new(points: Vec<BodyPoint>) -> Self {
        Self { points }
    }

    /// Shoulder points that are present and carry a finite visibility.
    pub fn shoulders(&self) -> impl Iterator<Item = &BodyPoint> {
        [LEFT_SHOULDER_INDEX, RIGHT_SHOULDER_INDEX]
            .into_iter()
            .filter_map(|index| self.points.get(index))
            .filter(|point| point.visibility.is_finite())
    }
}

/// What the body detector has told us so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum BodyObservation {
    /// The body detector has not produced a single result yet.
    #[default]
    NotYetRun,
    /// Latest result; `None` means the detector ran and found nobody.
    Observed(Option<BodyLandmarks>),
}

/// One evaluated frame: the face result of this frame merged with the latest
/// known body result.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
    pub timestamp_ms: i64,
    pub face: Option<FaceLandmarks>,
    pub body: BodyObservation,
}

impl FrameSample {
    pub fn new(timestamp_ms: i64, face: Option<FaceLandmarks>, body: BodyObservation) -> Self {
        Self {
            timestamp_ms,
            face,
            body,
        }
    }
}

/// Raw result of one detector invocation, as delivered to a monitor session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DetectorOutput {
    #[serde(rename_all = "camelCase")]
    Face {
        timestamp_ms: i64,
        #[serde(default)]
        landmarks: Option<FaceLandmarks>,
    },
    Body {
        #[serde(default)]
        landmarks: Option<BodyLandmarks>,
    },
}
