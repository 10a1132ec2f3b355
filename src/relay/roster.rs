use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{UpdatePayload, ViolationKind, ViolationRecord};

/// What the relay keeps for one connected subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRecord {
    pub id: String,
    pub name: String,
    pub engagement: u8,
    pub violations: Vec<ViolationRecord>,
    pub last_update: DateTime<Utc>,
}

impl SubjectRecord {
    fn same_content(&self, other: &SubjectRecord) -> bool {
        self.name == other.name
            && self.engagement == other.engagement
            && self.violations == other.violations
    }

    pub fn count_of(&self, kind: ViolationKind) -> usize {
        self.violations.iter().filter(|v| v.kind == kind).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl ReplaceOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, ReplaceOutcome::Unchanged)
    }
}

pub fn default_name(subject_id: &str) -> String {
    let prefix: String = subject_id.chars().take(4).collect();
    format!("Student {prefix}")
}

fn normalize_engagement(value: Option<f64>) -> u8 {
    match value {
        Some(v) if v.is_finite() => v.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}

/// Latest full state per subject, keyed by subject id.
#[derive(Debug, Default)]
pub struct ClassRoster {
    subjects: BTreeMap<String, SubjectRecord>,
}

impl ClassRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole record. Identical content keeps the existing
    /// record, timestamp included.
    pub fn replace(
        &mut self,
        subject_id: &str,
        payload: UpdatePayload,
        now: DateTime<Utc>,
    ) -> ReplaceOutcome {
        let record = SubjectRecord {
            id: subject_id.to_string(),
            name: payload
                .name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| default_name(subject_id)),
            engagement: normalize_engagement(payload.engagement),
            violations: payload.violations.unwrap_or_default(),
            last_update: now,
        };

        match self.subjects.get_mut(subject_id) {
            Some(existing) if existing.same_content(&record) => ReplaceOutcome::Unchanged,
            Some(existing) => {
                *existing = record;
                ReplaceOutcome::Updated
            }
            None => {
                self.subjects.insert(subject_id.to_string(), record);
                ReplaceOutcome::Inserted
            }
        }
    }

    pub fn remove(&mut self, subject_id: &str) -> Option<SubjectRecord> {
        self.subjects.remove(subject_id)
    }

    pub fn get(&self, subject_id: &str) -> Option<&SubjectRecord> {
        self.subjects.get(subject_id)
    }

    pub fn snapshot(&self) -> BTreeMap<String, SubjectRecord> {
        self.subjects.clone()
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}
