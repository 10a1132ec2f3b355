use crate::models::EngagementReading;

/// EMA over per-frame engagement, used for what gets shipped to the relay.
pub struct EngagementSmoother {
    alpha: f64,
    prev: Option<f64>,
}

impl EngagementSmoother {
    /// `alpha` of 1.0 passes readings through unchanged.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            prev: None,
        }
    }

    pub fn apply(&mut self, reading: &EngagementReading) -> u8 {
        let current = f64::from(reading.engagement);

        // Confirmed away must read exactly 0, not a decaying tail.
        if reading.is_left_desk {
            self.prev = Some(0.0);
            return 0;
        }

        let smoothed = match self.prev {
            Some(prev) => self.alpha * current + (1.0 - self.alpha) * prev,
            None => current,
        };
        self.prev = Some(smoothed);
        smoothed.round().clamp(0.0, 100.0) as u8
    }

    pub fn value(&self) -> Option<u8> {
        self.prev.map(|value| value.round().clamp(0.0, 100.0) as u8)
    }

    pub fn reset(&mut self) {
        self.prev = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(engagement: u8, is_left_desk: bool) -> EngagementReading {
        EngagementReading {
            engagement,
            is_looking_down: false,
            is_left_desk,
            pitch: 0.0,
            yaw: 0.0,
        }
    }

    #[test]
    fn first_reading_passes_through() {
        let mut smoother = EngagementSmoother::new(0.5);
        assert_eq!(smoother.apply(&reading(80, false)), 80);
        assert_eq!(smoother.apply(&reading(40, false)), 60);
        assert_eq!(smoother.value(), Some(60));
    }

    #[test]
    fn away_snaps_to_zero() {
        let mut smoother = EngagementSmoother::new(0.2);
        smoother.apply(&reading(100, false));
        assert_eq!(smoother.apply(&reading(0, true)), 0);
        // Recovery climbs back from zero rather than from the pre-away score.
        assert_eq!(smoother.apply(&reading(100, false)), 20);
    }

    #[test]
    fn alpha_one_disables_smoothing() {
        let mut smoother = EngagementSmoother::new(1.0);
        smoother.apply(&reading(10, false));
        assert_eq!(smoother.apply(&reading(90, false)), 90);
    }
}
