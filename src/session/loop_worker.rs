use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::detection::{DebounceEngine, DetectionConfig, EngagementSmoother};
use crate::metrics::MetricsCollector;
use crate::models::{DetectorOutput, SubjectState, SubjectUpdate, WallClockAnchor};

use super::emitter::{Emitter, UpdateSink};
use super::feed::FrameMerger;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectInfo {
    pub subject_id: String,
    pub name: String,
}

impl SubjectInfo {
    pub fn new(subject_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            name: name.into(),
        }
    }
}

/// Per-subject session task. Owns the engine state; nothing else touches it.
///
/// Exits on cancellation or when every `FrameFeed` is dropped. A closed
/// channel sends one last state update after in-flight deliveries settle;
/// a cancellation just stops. Returns the final subject state.
pub async fn monitor_loop<S: UpdateSink>(
    subject: SubjectInfo,
    detection: DetectionConfig,
    session: SessionConfig,
    mut frames: mpsc::Receiver<DetectorOutput>,
    emitter: Emitter<S>,
    metrics: MetricsCollector,
    cancel_token: CancellationToken,
) -> SubjectState {
    let mut engine = DebounceEngine::new(detection);
    let mut merger = FrameMerger::new();
    let mut smoother = EngagementSmoother::new(session.smoothing_alpha);
    let mut anchor: Option<WallClockAnchor> = None;
    let mut engagement: Option<u8> = None;

    let mut ticker = tokio::time::interval(Duration::from_millis(session.emit_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log_info!("monitoring started for {}", subject.subject_id);

    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                log_info!("monitor loop shutting down for {}", subject.subject_id);
                break;
            }
            _ = ticker.tick() => {
                let (Some(anchor), Some(engagement)) = (anchor, engagement) else {
                    continue;
                };
                log_debug!("periodic update for {} engagement={}", subject.subject_id, engagement);
                emitter
                    .emit(SubjectUpdate::from_state(
                        &subject.subject_id,
                        &subject.name,
                        engagement,
                        engine.state(),
                        &anchor,
                    ))
                    .await;
            }
            received = frames.recv() => {
                let Some(output) = received else {
                    log_info!("frame feed closed for {}, sending final state", subject.subject_id);
                    // Earlier sends must land first so the final state wins at the relay
                    emitter.flush().await;
                    if let (Some(anchor), Some(engagement)) = (anchor, engagement) {
                        emitter
                            .emit(SubjectUpdate::from_state(
                                &subject.subject_id,
                                &subject.name,
                                engagement,
                                engine.state(),
                                &anchor,
                            ))
                            .await;
                    }
                    emitter.flush().await;
                    break;
                };

                if matches!(output, DetectorOutput::Body { .. }) {
                    metrics.record_body_result().await;
                }
                let Some(sample) = merger.accept(output) else {
                    continue;
                };

                let session_anchor = *anchor
                    .get_or_insert_with(|| WallClockAnchor::new(sample.timestamp_ms, Utc::now()));
                let outcome = engine.process(&sample);
                let smoothed = smoother.apply(&outcome.reading);
                engagement = Some(smoothed);
                metrics.record_frame(outcome.events.len()).await;

                if outcome.has_events() {
                    for event in &outcome.events {
                        log_info!(
                            "{} {} at {}{}",
                            subject.subject_id,
                            event.kind.as_str(),
                            session_anchor.format(event.timestamp_ms),
                            event.detail.as_deref().map(|d| format!(" ({d})")).unwrap_or_default()
                        );
                    }
                    emitter
                        .emit(SubjectUpdate::from_state(
                            &subject.subject_id,
                            &subject.name,
                            smoothed,
                            engine.state(),
                            &session_anchor,
                        ))
                        .await;
                }
            }
        }
    }

    engine.into_state()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::fixtures::{body_with_shoulders, face_with_pitch};
    use crate::models::ViolationKind;
    use crate::session::emitter::testing::RecordingSink;
    use std::sync::Arc;

    fn spawn_loop(
        sink: &Arc<RecordingSink>,
        metrics: &MetricsCollector,
        cancel: &CancellationToken,
    ) -> (mpsc::Sender<DetectorOutput>, tokio::task::JoinHandle<SubjectState>) {
        let session = SessionConfig {
            channel_capacity: 512,
            ..Default::default()
        };
        let (tx, rx) = mpsc::channel(session.channel_capacity);
        let emitter = Emitter::new(Arc::clone(sink), &session, metrics.clone());
        let handle = tokio::spawn(monitor_loop(
            SubjectInfo::new("s-1", "Ada"),
            DetectionConfig::default(),
            session,
            rx,
            emitter,
            metrics.clone(),
            cancel.clone(),
        ));
        (tx, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_departure_is_emitted_and_state_returned() {
        let sink = Arc::new(RecordingSink::default());
        let metrics = MetricsCollector::new();
        let cancel = CancellationToken::new();
        let (tx, handle) = spawn_loop(&sink, &metrics, &cancel);

        tx.send(DetectorOutput::Body { landmarks: None }).await.unwrap();
        for ts in (0..3_500).step_by(100) {
            tx.send(DetectorOutput::Face {
                timestamp_ms: ts,
                landmarks: None,
            })
            .await
            .unwrap();
        }
        drop(tx);

        let state = handle.await.unwrap();
        assert_eq!(state.left_desk_count, 1);

        let updates = sink.received().await;
        let last = updates.last().unwrap();
        assert_eq!(last.subject_id, "s-1");
        assert_eq!(last.engagement, 0);
        assert_eq!(last.violations.len(), 1);
        assert_eq!(last.violations[0].kind, ViolationKind::LeftDesk);

        let snapshot = metrics.get_snapshot().await;
        assert_eq!(snapshot.frames_processed, 35);
        assert_eq!(snapshot.body_results, 1);
        assert_eq!(snapshot.events_confirmed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn state_is_sent_on_every_tick() {
        let sink = Arc::new(RecordingSink::default());
        let metrics = MetricsCollector::new();
        let cancel = CancellationToken::new();
        let (tx, handle) = spawn_loop(&sink, &metrics, &cancel);

        tx.send(DetectorOutput::Body {
            landmarks: Some(body_with_shoulders(0.9, 0.9)),
        })
        .await
        .unwrap();
        tx.send(DetectorOutput::Face {
            timestamp_ms: 0,
            landmarks: Some(face_with_pitch(0.0)),
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        cancel.cancel();
        let state = handle.await.unwrap();

        let updates = sink.received().await;
        assert!(updates.len() >= 3, "got {} updates", updates.len());
        assert!(updates.iter().all(|u| u.engagement == 100 && u.violations.is_empty()));
        assert!(state.violation_log.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_sent_before_the_first_frame() {
        let sink = Arc::new(RecordingSink::default());
        let metrics = MetricsCollector::new();
        let cancel = CancellationToken::new();
        let (_tx, handle) = spawn_loop(&sink, &metrics, &cancel);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(sink.received().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timestamp_jump_does_not_kill_the_session() {
        let sink = Arc::new(RecordingSink::default());
        let metrics = MetricsCollector::new();
        let cancel = CancellationToken::new();
        let (tx, handle) = spawn_loop(&sink, &metrics, &cancel);

        tx.send(DetectorOutput::Body { landmarks: None }).await.unwrap();
        for ts in [0, 10_000_000_000_000_000, i64::MAX] {
            tx.send(DetectorOutput::Face {
                timestamp_ms: ts,
                landmarks: None,
            })
            .await
            .unwrap();
        }
        drop(tx);

        let state = handle.await.expect("monitor loop must survive timestamp jumps");
        assert_eq!(state.left_desk_count, 1);

        let updates = sink.received().await;
        let last = updates.last().unwrap();
        assert_eq!(last.violations.len(), 1);
        assert_eq!(last.violations[0].time.len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn due_tick_is_not_starved_by_a_frame_backlog() {
        let sink = Arc::new(RecordingSink::default());
        let metrics = MetricsCollector::new();
        let cancel = CancellationToken::new();
        let (tx, handle) = spawn_loop(&sink, &metrics, &cancel);

        tx.send(DetectorOutput::Face {
            timestamp_ms: 0,
            landmarks: Some(face_with_pitch(0.0)),
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Queue a backlog and close the feed before the loop runs again
        for ts in (33..1_650).step_by(33) {
            tx.send(DetectorOutput::Face {
                timestamp_ms: ts,
                landmarks: Some(face_with_pitch(0.0)),
            })
            .await
            .unwrap();
        }
        drop(tx);
        tokio::time::advance(Duration::from_millis(1_000)).await;

        handle.await.unwrap();

        // One periodic update while frames were queued, then the final state
        assert_eq!(sink.received().await.len(), 2);
    }
}
