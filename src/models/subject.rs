//! Per-subject tracking state owned by the debounce engine.

use serde::{Deserialize, Serialize};

/// Away sub-machine. Only `Away` and `Recovering` suppress normal scoring.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PresenceState {
    Present,
    TransitioningAway,
    Away,
    Recovering,
}

impl Default for PresenceState {
    fn default() -> Self {
        PresenceState::Present
    }
}

impl PresenceState {
    pub fn is_away(&self) -> bool {
        matches!(self, PresenceState::Away | PresenceState::Recovering)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LookDownState {
    Normal,
    Armed,
    Confirmed,
}

impl Default for LookDownState {
    fn default() -> Self {
        LookDownState::Normal
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    #[serde(rename = "LEFT_DESK", alias = "Left Desk", alias = "Left_Desk")]
    LeftDesk,
    #[serde(
        rename = "LOOKING_DOWN",
        alias = "Looking Down",
        alias = "Looking_Down",
        alias = "LOOKED_DOWN"
    )]
    LookingDown,
    #[serde(rename = "RETURNED", alias = "Returned")]
    Returned,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::LeftDesk => "LEFT_DESK",
            ViolationKind::LookingDown => "LOOKING_DOWN",
            ViolationKind::Returned => "RETURNED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationEntry {
    pub timestamp_ms: i64,
    pub kind: ViolationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Transient per-frame output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementReading {
    pub engagement: u8,
    pub is_looking_down: bool,
    pub is_left_desk: bool,
    pub pitch: f64,
    pub yaw: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectState {
    pub presence: PresenceState,
    pub away_since_ms: Option<i64>,
    pub away_confirmed_at_ms: Option<i64>,
    pub recovering_since_ms: Option<i64>,
    pub looking_down: LookDownState,
    pub looked_down_since_ms: Option<i64>,
    pub left_desk_count: u32,
    pub looked_down_count: u32,
    pub last_engagement: u8,
    /// Append-only, oldest first.
    pub violation_log: Vec<ViolationEntry>,
}

impl Default for SubjectState {
    fn default() -> Self {
        Self {
            presence: PresenceState::Present,
            away_since_ms: None,
            away_confirmed_at_ms: None,
            recovering_since_ms: None,
            looking_down: LookDownState::Normal,
            looked_down_since_ms: None,
            left_desk_count: 0,
            looked_down_count: 0,
            last_engagement: 100,
            violation_log: Vec::new(),
        }
    }
}

impl SubjectState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn log(&mut self, timestamp_ms: i64, kind: ViolationKind, detail: Option<String>) {
        self.violation_log.push(ViolationEntry {
            timestamp_ms,
            kind,
            detail,
        });
    }

    pub fn count_of(&self, kind: ViolationKind) -> usize {
        self.violation_log
            .iter()
            .filter(|entry| entry.kind == kind)
            .count()
    }
}
