use anyhow::Result;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{Duration, Instant};

use crate::config::SessionConfig;
use crate::metrics::{EmissionMetrics, EmissionOutcome, MetricsCollector};
use crate::models::SubjectUpdate;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Destination for full-state subject updates.
pub trait UpdateSink: Send + Sync + 'static {
    fn send_update(&self, update: SubjectUpdate) -> impl Future<Output = Result<()>> + Send;
}

/// Fire-and-forget delivery. At most `max_in_flight` sends run at once;
/// anything past that is dropped since the next update supersedes it.
pub struct Emitter<S> {
    sink: Arc<S>,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
    timeout: Duration,
    metrics: MetricsCollector,
}

impl<S: UpdateSink> Emitter<S> {
    pub fn new(sink: Arc<S>, config: &SessionConfig, metrics: MetricsCollector) -> Self {
        let max_in_flight = config.max_in_flight.max(1);
        Self {
            sink,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            timeout: Duration::from_millis(config.emit_timeout_ms),
            metrics,
        }
    }

    /// Returns false when the update was skipped.
    pub async fn emit(&self, update: SubjectUpdate) -> bool {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                log_debug!("emitter saturated, skipping update for {}", update.subject_id);
                self.metrics.record_skipped_emission().await;
                return false;
            }
        };

        let sink = Arc::clone(&self.sink);
        let metrics = self.metrics.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            let _permit = permit;
            let subject_id = update.subject_id.clone();
            let violation_count = update.violations.len();
            let started = Instant::now();

            let outcome = match tokio::time::timeout(timeout, sink.send_update(update)).await {
                Ok(Ok(())) => EmissionOutcome::Sent,
                Ok(Err(err)) => {
                    log_warn!("update delivery failed for {}: {err:?}", subject_id);
                    EmissionOutcome::Failed
                }
                Err(_) => {
                    log_warn!(
                        "update delivery timeout (> {}ms) for {}",
                        timeout.as_millis(),
                        subject_id
                    );
                    EmissionOutcome::TimedOut
                }
            };

            metrics
                .record_emission(EmissionMetrics {
                    timestamp: Utc::now(),
                    subject_id,
                    violation_count,
                    duration_ms: started.elapsed().as_millis() as u64,
                    outcome,
                })
                .await;
        });

        true
    }

    /// Waits until every in-flight send has finished.
    pub async fn flush(&self) {
        if let Ok(all) = self.permits.acquire_many(self.max_in_flight as u32).await {
            drop(all);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    fn update(engagement: u8) -> SubjectUpdate {
        SubjectUpdate {
            subject_id: "s-1".into(),
            name: "Ada".into(),
            engagement,
            violations: Vec::new(),
        }
    }

    #[tokio::test]
    async fn delivers_in_background() {
        let sink = Arc::new(RecordingSink::default());
        let metrics = MetricsCollector::new();
        let emitter = Emitter::new(Arc::clone(&sink), &SessionConfig::default(), metrics.clone());

        assert!(emitter.emit(update(80)).await);
        emitter.flush().await;

        assert_eq!(sink.received().await, vec![update(80)]);
        assert_eq!(metrics.get_snapshot().await.emissions_sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn saturation_skips_and_stalls_time_out() {
        let sink = Arc::new(RecordingSink {
            stall: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let metrics = MetricsCollector::new();
        let config = SessionConfig {
            max_in_flight: 1,
            ..Default::default()
        };
        let emitter = Emitter::new(Arc::clone(&sink), &config, metrics.clone());

        assert!(emitter.emit(update(50)).await);
        assert!(!emitter.emit(update(60)).await);
        emitter.flush().await;

        let snapshot = metrics.get_snapshot().await;
        assert_eq!(snapshot.emissions_skipped, 1);
        assert_eq!(snapshot.emissions_failed, 1);
        assert_eq!(snapshot.recent_emissions[0].outcome, EmissionOutcome::TimedOut);
        assert!(sink.received().await.is_empty());

        // The permit is released after the timeout
        assert!(emitter.emit(update(70)).await);
    }

    #[tokio::test]
    async fn failures_are_counted_not_raised() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let metrics = MetricsCollector::new();
        let emitter = Emitter::new(sink, &SessionConfig::default(), metrics.clone());

        emitter.emit(update(10)).await;
        emitter.flush().await;
        assert_eq!(metrics.get_snapshot().await.emissions_failed, 1);
    }
}
