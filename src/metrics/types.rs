use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EmissionOutcome {
    Sent,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissionMetrics {
    pub timestamp: DateTime<Utc>,
    pub subject_id: String,
    pub violation_count: usize,
    pub duration_ms: u64,
    pub outcome: EmissionOutcome,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub system: SystemMetrics,
    pub recent_emissions: Vec<EmissionMetrics>,
    pub frames_processed: u64,
    pub body_results: u64,
    pub frames_dropped: u64,
    pub events_confirmed: u64,
    pub emissions_sent: u64,
    pub emissions_failed: u64,
    pub emissions_skipped: u64,
}
