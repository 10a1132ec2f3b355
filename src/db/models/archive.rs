use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ViolationRecord;

/// A subject's last known state, kept after it left the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedSubject {
    pub id: i64,
    pub subject_id: String,
    pub name: String,
    pub engagement: u8,
    pub violations: Vec<ViolationRecord>,
    pub left_desk_count: u32,
    pub looked_down_count: u32,
    pub last_update: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
}
