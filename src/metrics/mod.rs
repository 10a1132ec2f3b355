mod types;

pub use types::{EmissionMetrics, EmissionOutcome, MetricsSnapshot, SystemMetrics};

use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

const MAX_RECENT_EMISSIONS: usize = 20;

/// Session counters plus process CPU/memory. Clones share state.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    recent_emissions: Vec<EmissionMetrics>,
    frames_processed: u64,
    body_results: u64,
    frames_dropped: u64,
    events_confirmed: u64,
    emissions_sent: u64,
    emissions_failed: u64,
    emissions_skipped: u64,
    system: System,
    pid: Pid,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // CPU usage is a delta, so take a baseline now
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_emissions: Vec::with_capacity(MAX_RECENT_EMISSIONS),
                frames_processed: 0,
                body_results: 0,
                frames_dropped: 0,
                events_confirmed: 0,
                emissions_sent: 0,
                emissions_failed: 0,
                emissions_skipped: 0,
                system,
                pid,
            })),
        }
    }

    pub async fn sample_system_metrics(&self) -> SystemMetrics {
        let mut state = self.inner.lock().await;
        state.refresh_system()
    }

    pub async fn record_frame(&self, events_confirmed: usize) {
        let mut state = self.inner.lock().await;
        state.frames_processed += 1;
        state.events_confirmed += events_confirmed as u64;
    }

    pub async fn record_body_result(&self) {
        self.inner.lock().await.body_results += 1;
    }

    pub async fn record_dropped_frame(&self) {
        self.inner.lock().await.frames_dropped += 1;
    }

    pub async fn record_skipped_emission(&self) {
        self.inner.lock().await.emissions_skipped += 1;
    }

    pub async fn record_emission(&self, metrics: EmissionMetrics) {
        let mut state = self.inner.lock().await;

        match metrics.outcome {
            EmissionOutcome::Sent => state.emissions_sent += 1,
            EmissionOutcome::Failed | EmissionOutcome::TimedOut => state.emissions_failed += 1,
        }

        state.recent_emissions.push(metrics);
        if state.recent_emissions.len() > MAX_RECENT_EMISSIONS {
            state.recent_emissions.remove(0);
        }
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let mut state = self.inner.lock().await;
        let system = state.refresh_system();

        MetricsSnapshot {
            system,
            recent_emissions: state.recent_emissions.clone(),
            frames_processed: state.frames_processed,
            body_results: state.body_results,
            frames_dropped: state.frames_dropped,
            events_confirmed: state.events_confirmed,
            emissions_sent: state.emissions_sent,
            emissions_failed: state.emissions_failed,
            emissions_skipped: state.emissions_skipped,
        }
    }

    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        state.recent_emissions.clear();
        state.frames_processed = 0;
        state.body_results = 0;
        state.frames_dropped = 0;
        state.events_confirmed = 0;
        state.emissions_sent = 0;
        state.emissions_failed = 0;
        state.emissions_skipped = 0;
        state.refresh_system();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsState {
    fn refresh_system(&mut self) -> SystemMetrics {
        let pid = self.pid;
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        match self.system.process(pid) {
            Some(process) => SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            },
            None => SystemMetrics::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn emission(outcome: EmissionOutcome) -> EmissionMetrics {
        EmissionMetrics {
            timestamp: Utc::now(),
            subject_id: "s-1".into(),
            violation_count: 0,
            duration_ms: 3,
            outcome,
        }
    }

    #[tokio::test]
    async fn counts_outcomes_and_caps_history() {
        let metrics = MetricsCollector::new();
        for _ in 0..25 {
            metrics.record_emission(emission(EmissionOutcome::Sent)).await;
        }
        metrics.record_emission(emission(EmissionOutcome::TimedOut)).await;
        metrics.record_skipped_emission().await;

        let snapshot = metrics.get_snapshot().await;
        assert_eq!(snapshot.emissions_sent, 25);
        assert_eq!(snapshot.emissions_failed, 1);
        assert_eq!(snapshot.emissions_skipped, 1);
        assert_eq!(snapshot.recent_emissions.len(), MAX_RECENT_EMISSIONS);
        assert_eq!(
            snapshot.recent_emissions.last().map(|e| e.outcome),
            Some(EmissionOutcome::TimedOut)
        );
    }

    #[tokio::test]
    async fn clones_share_counters_until_reset() {
        let metrics = MetricsCollector::new();
        let clone = metrics.clone();
        clone.record_frame(2).await;
        clone.record_dropped_frame().await;

        let snapshot = metrics.get_snapshot().await;
        assert_eq!(snapshot.frames_processed, 1);
        assert_eq!(snapshot.events_confirmed, 2);
        assert_eq!(snapshot.frames_dropped, 1);

        metrics.reset().await;
        assert_eq!(clone.get_snapshot().await.frames_processed, 0);
    }
}
