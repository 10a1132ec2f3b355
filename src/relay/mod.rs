pub mod client;
pub mod roster;
pub mod server;

pub use client::RelayClient;
pub use roster::{default_name, ClassRoster, ReplaceOutcome, SubjectRecord};
pub use server::{router, serve, RelayState, SharedState};
