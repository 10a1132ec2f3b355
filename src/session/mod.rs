pub mod controller;
pub mod emitter;
pub mod feed;
pub mod loop_worker;

pub use controller::MonitorController;
pub use emitter::{Emitter, UpdateSink};
pub use feed::{FrameFeed, FrameMerger};
pub use loop_worker::{monitor_loop, SubjectInfo};
