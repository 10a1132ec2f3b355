use crate::models::{
    EngagementReading, FrameSample, LookDownState, PresenceState, SubjectState, ViolationEntry,
    ViolationKind,
};

use super::config::DetectionConfig;
use super::orientation::estimate_orientation;
use super::presence::classify_presence;

/// Result of evaluating one frame.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub reading: EngagementReading,
    /// Entries confirmed by this frame, already appended to the log.
    pub events: Vec<ViolationEntry>,
}

impl FrameOutcome {
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }
}

/// Turns per-frame presence and orientation into debounced violation events.
///
/// Two independent sub-machines run per subject:
/// - away: `Present → TransitioningAway → Away → Recovering → Present`
/// - looking down: `Normal → Armed → Confirmed`
///
/// Leaving `Away` needs `recovery_confirm_ms` of continuous presence; a
/// window of 0 clears on the first present frame.
pub struct DebounceEngine {
    config: DetectionConfig,
    state: SubjectState,
}

impl DebounceEngine {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            state: SubjectState::new(),
        }
    }

    pub fn state(&self) -> &SubjectState {
        &self.state
    }

    pub fn into_state(self) -> SubjectState {
        self.state
    }

    pub fn process(&mut self, sample: &FrameSample) -> FrameOutcome {
        let now = sample.timestamp_ms;
        let presence = classify_presence(sample, &self.config);
        let log_len = self.state.violation_log.len();

        self.step_away(presence.is_absent(), now);

        let mut pitch = 0.0;
        let mut yaw = 0.0;
        let mut is_looking_down = false;

        let engagement = if self.state.presence.is_away() {
            0
        } else if let Some(face) = presence.face {
            let orientation = estimate_orientation(&face, &self.config);
            pitch = orientation.pitch;
            yaw = orientation.yaw;
            is_looking_down = self.step_looking_down(pitch, now);
            orientation.engagement
        } else if presence.body_visible {
            self.config.unreadable_engagement
        } else {
            // Absent but not confirmed yet: one gap frame must not move the score.
            self.state.last_engagement
        };

        self.state.last_engagement = engagement;

        FrameOutcome {
            reading: EngagementReading {
                engagement,
                is_looking_down,
                is_left_desk: self.state.presence.is_away(),
                pitch,
                yaw,
            },
            events: self.state.violation_log[log_len..].to_vec(),
        }
    }

    fn step_away(&mut self, absent: bool, now: i64) {
        match self.state.presence {
            PresenceState::Present => {
                if absent {
                    self.state.presence = PresenceState::TransitioningAway;
                    self.state.away_since_ms = Some(now);
                }
            }
            PresenceState::TransitioningAway => {
                if !absent {
                    self.state.presence = PresenceState::Present;
                    self.state.away_since_ms = None;
                    return;
                }
                let since = *self.state.away_since_ms.get_or_insert(now);
                if now.saturating_sub(since) > self.config.away_confirm_ms {
                    self.confirm_departure(now);
                }
            }
            PresenceState::Away => {
                if !absent {
                    self.state.presence = PresenceState::Recovering;
                    self.state.recovering_since_ms = Some(now);
                    self.try_complete_recovery(now);
                }
            }
            PresenceState::Recovering => {
                if absent {
                    self.state.presence = PresenceState::Away;
                    self.state.recovering_since_ms = None;
                } else {
                    self.try_complete_recovery(now);
                }
            }
        }
    }

    fn confirm_departure(&mut self, now: i64) {
        let state = &mut self.state;
        state.presence = PresenceState::Away;
        state.away_since_ms = None;
        state.away_confirmed_at_ms = Some(now);
        state.left_desk_count += 1;
        state.looking_down = LookDownState::Normal;
        state.looked_down_since_ms = None;
        state.log(now, ViolationKind::LeftDesk, None);
    }

    fn try_complete_recovery(&mut self, now: i64) {
        let since = *self.state.recovering_since_ms.get_or_insert(now);
        if now.saturating_sub(since) < self.config.recovery_confirm_ms {
            return;
        }

        let state = &mut self.state;
        state.presence = PresenceState::Present;
        state.recovering_since_ms = None;
        let detail = state.away_confirmed_at_ms.take().map(|confirmed_at| {
            let secs = now.saturating_sub(confirmed_at).max(0) as f64 / 1000.0;
            format!("{secs:.1}s")
        });
        state.log(now, ViolationKind::Returned, detail);
    }

    /// Returns whether this frame reads as looking down.
    fn step_looking_down(&mut self, pitch: f64, now: i64) -> bool {
        if pitch <= self.config.down_threshold {
            self.state.looking_down = LookDownState::Normal;
            self.state.looked_down_since_ms = None;
            return false;
        }

        match self.state.looking_down {
            LookDownState::Normal => {
                self.state.looking_down = LookDownState::Armed;
                self.state.looked_down_since_ms = Some(now);
            }
            LookDownState::Armed => {
                let since = *self.state.looked_down_since_ms.get_or_insert(now);
                if now.saturating_sub(since) > self.config.down_confirm_ms {
                    let state = &mut self.state;
                    state.looking_down = LookDownState::Confirmed;
                    state.looked_down_since_ms = None;
                    state.looked_down_count += 1;
                    state.log(now, ViolationKind::LookingDown, None);
                }
            }
            LookDownState::Confirmed => {}
        }
        true
    }
}
