pub mod config;
pub mod engine;
pub mod orientation;
pub mod presence;
pub mod smoothing;

pub use config::DetectionConfig;
pub use engine::{DebounceEngine, FrameOutcome};
pub use orientation::{engagement_score, estimate_orientation, Orientation};
pub use presence::{classify_presence, Presence};
pub use smoothing::EngagementSmoother;
