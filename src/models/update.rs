//! Wire messages exchanged with the relay.

use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};

use super::subject::{SubjectState, ViolationEntry, ViolationKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub time: String,
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Full-state update for one subject. The relay replaces, never merges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectUpdate {
    pub subject_id: String,
    pub name: String,
    pub engagement: u8,
    pub violations: Vec<ViolationRecord>,
}

/// Inbound shape at the relay: every field but the key may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub engagement: Option<f64>,
    #[serde(default)]
    pub violations: Option<Vec<ViolationRecord>>,
}

impl From<SubjectUpdate> for UpdatePayload {
    fn from(update: SubjectUpdate) -> Self {
        Self {
            subject_id: Some(update.subject_id),
            name: Some(update.name),
            engagement: Some(f64::from(update.engagement)),
            violations: Some(update.violations),
        }
    }
}

/// Maps monotonic frame timestamps onto wall-clock time. Anchored on the
/// first frame of a session.
#[derive(Debug, Clone, Copy)]
pub struct WallClockAnchor {
    timestamp_ms: i64,
    wall: DateTime<Utc>,
}

impl WallClockAnchor {
    pub fn new(timestamp_ms: i64, wall: DateTime<Utc>) -> Self {
        Self { timestamp_ms, wall }
    }

    /// Out-of-range offsets fall back to the anchor's wall time.
    pub fn wall_time(&self, timestamp_ms: i64) -> DateTime<Utc> {
        timestamp_ms
            .checked_sub(self.timestamp_ms)
            .and_then(Duration::try_milliseconds)
            .and_then(|offset| self.wall.checked_add_signed(offset))
            .unwrap_or(self.wall)
    }

    pub fn format(&self, timestamp_ms: i64) -> String {
        self.wall_time(timestamp_ms)
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string()
    }

    pub fn record(&self, entry: &ViolationEntry) -> ViolationRecord {
        ViolationRecord {
            time: self.format(entry.timestamp_ms),
            kind: entry.kind,
            detail: entry.detail.clone(),
        }
    }
}

impl SubjectUpdate {
    pub fn from_state(
        subject_id: &str,
        name: &str,
        engagement: u8,
        state: &SubjectState,
        anchor: &WallClockAnchor,
    ) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            name: name.to_string(),
            engagement: engagement.min(100),
            violations: state
                .violation_log
                .iter()
                .map(|entry| anchor.record(entry))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_serializes_with_relay_field_names() {
        let anchor = WallClockAnchor::new(0, Utc::now());
        let mut state = SubjectState::new();
        state.log(4_000, ViolationKind::LeftDesk, None);
        state.log(9_000, ViolationKind::Returned, Some("5.0s".into()));

        let update = SubjectUpdate::from_state("s-1", "Ada", 87, &state, &anchor);
        let json = serde_json::to_value(&update).unwrap();

        assert_eq!(json["subjectId"], "s-1");
        assert_eq!(json["engagement"], 87);
        assert_eq!(json["violations"][0]["type"], "LEFT_DESK");
        assert!(json["violations"][0].get("detail").is_none());
        assert_eq!(json["violations"][1]["detail"], "5.0s");
    }

    #[test]
    fn anchor_offsets_from_first_frame() {
        let wall = Utc::now();
        let anchor = WallClockAnchor::new(10_000, wall);
        assert_eq!(anchor.wall_time(12_500), wall + Duration::milliseconds(2_500));
    }

    #[test]
    fn absurd_timestamps_do_not_panic() {
        let wall = Utc::now();
        let anchor = WallClockAnchor::new(0, wall);
        assert_eq!(anchor.wall_time(10_000_000_000_000_000), wall);
        assert_eq!(anchor.wall_time(i64::MIN), wall);

        let anchor = WallClockAnchor::new(i64::MAX, wall);
        assert_eq!(anchor.wall_time(-5), wall);
        assert_eq!(anchor.format(i64::MIN).len(), 8);
    }
}
