pub mod frame;
pub mod subject;
pub mod update;

pub use frame::{
    BodyLandmarks, BodyObservation, BodyPoint, DetectorOutput, FaceGeometry, FaceLandmarks,
    FrameSample, Point2,
};
pub use subject::{
    EngagementReading, LookDownState, PresenceState, SubjectState, ViolationEntry, ViolationKind,
};
pub use update::{SubjectUpdate, UpdatePayload, ViolationRecord, WallClockAnchor};
