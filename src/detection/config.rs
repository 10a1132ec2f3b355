use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Thresholds and geometry constants for presence, orientation and debounce.
/// Camera placement varies, so every constant is tunable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectionConfig {
    /// A shoulder counts as visible strictly above this confidence
    pub body_visibility_threshold: f64,

    /// Orientation geometry
    pub pitch_bias: f64,
    pub pitch_scale: f64,
    pub yaw_scale: f64,
    pub pitch_weight: f64,
    pub yaw_weight: f64,

    /// Score when only the body is visible: present but unreadable
    pub unreadable_engagement: u8,

    /// Continuous absence required before a departure is confirmed
    pub away_confirm_ms: i64,
    /// Continuous presence required before leaving the away state
    pub recovery_confirm_ms: i64,

    /// Pitch above this counts as looking down
    pub down_threshold: f64,
    pub down_confirm_ms: i64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            body_visibility_threshold: 0.4,
            pitch_bias: 0.05,
            pitch_scale: 200.0,
            yaw_scale: 200.0,
            pitch_weight: 2.0,
            yaw_weight: 3.0,
            unreadable_engagement: 20,
            away_confirm_ms: 3_000,
            recovery_confirm_ms: 1_000,
            down_threshold: 10.0,
            down_confirm_ms: 2_000,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.body_visibility_threshold) {
            bail!(
                "bodyVisibilityThreshold must be within [0, 1], got {}",
                self.body_visibility_threshold
            );
        }
        if self.unreadable_engagement == 0 || self.unreadable_engagement >= 100 {
            bail!(
                "unreadableEngagement must be between 1 and 99, got {}",
                self.unreadable_engagement
            );
        }
        if self.away_confirm_ms <= 0 || self.down_confirm_ms <= 0 {
            bail!("confirmation windows must be positive");
        }
        if self.recovery_confirm_ms < 0 {
            bail!("recoveryConfirmMs must not be negative");
        }
        let constants = [
            self.pitch_bias,
            self.pitch_scale,
            self.yaw_scale,
            self.pitch_weight,
            self.yaw_weight,
            self.down_threshold,
        ];
        if constants.iter().any(|value| !value.is_finite()) {
            bail!("orientation constants must be finite");
        }
        if self.pitch_weight < 0.0 || self.yaw_weight < 0.0 {
            bail!("engagement weights must not be negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        DetectionConfig::default().validate().unwrap();
    }

    #[test]
    fn unreadable_score_cannot_collide_with_away() {
        let config = DetectionConfig {
            unreadable_engagement: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: DetectionConfig =
            serde_json::from_str(r#"{"downThreshold": 15.0}"#).unwrap();
        assert_eq!(config.down_threshold, 15.0);
        assert_eq!(config.away_confirm_ms, 3_000);
    }
}
