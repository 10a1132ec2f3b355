use anyhow::{bail, Context, Result};
use log::info;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::MonitorSettings;
use crate::metrics::MetricsCollector;
use crate::models::SubjectState;

use super::emitter::{Emitter, UpdateSink};
use super::feed::FrameFeed;
use super::loop_worker::{monitor_loop, SubjectInfo};

/// Starts and stops the monitoring task for one subject.
pub struct MonitorController<S> {
    sink: Arc<S>,
    metrics: MetricsCollector,
    handle: Option<JoinHandle<SubjectState>>,
    cancel_token: Option<CancellationToken>,
}

impl<S: UpdateSink> MonitorController<S> {
    pub fn new(sink: Arc<S>, metrics: MetricsCollector) -> Self {
        Self {
            sink,
            metrics,
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawns the session task and hands back the capture-side feed.
    pub fn start(&mut self, subject: SubjectInfo, settings: &MonitorSettings) -> Result<FrameFeed> {
        if self.handle.is_some() {
            bail!("monitoring already active");
        }
        settings.validate()?;

        info!(
            "starting monitoring for {} ({})",
            subject.subject_id, subject.name
        );

        let (tx, rx) = mpsc::channel(settings.session.channel_capacity);
        let emitter = Emitter::new(Arc::clone(&self.sink), &settings.session, self.metrics.clone());
        let cancel_token = CancellationToken::new();

        let handle = tokio::spawn(monitor_loop(
            subject,
            settings.detection.clone(),
            settings.session.clone(),
            rx,
            emitter,
            self.metrics.clone(),
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);

        Ok(FrameFeed::new(
            tx,
            settings.session.body_sample_every,
            self.metrics.clone(),
        ))
    }

    /// Cancels the session. Pending timers are discarded.
    pub async fn stop(&mut self) -> Result<Option<SubjectState>> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.join().await
    }

    /// Waits for the session to drain after its `FrameFeed` was dropped.
    pub async fn finish(&mut self) -> Result<Option<SubjectState>> {
        self.cancel_token = None;
        self.join().await
    }

    async fn join(&mut self) -> Result<Option<SubjectState>> {
        match self.handle.take() {
            Some(handle) => handle
                .await
                .context("monitor loop task failed to join")
                .map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::emitter::testing::RecordingSink;

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let mut controller =
            MonitorController::new(Arc::new(RecordingSink::default()), MetricsCollector::new());
        let settings = MonitorSettings::default();

        let _feed = controller.start(SubjectInfo::new("s-1", "Ada"), &settings).unwrap();
        assert!(controller.is_active());
        assert!(controller.start(SubjectInfo::new("s-1", "Ada"), &settings).is_err());

        let state = controller.stop().await.unwrap();
        assert!(state.is_some());
        assert!(!controller.is_active());
        assert!(controller.stop().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn finish_drains_queued_frames() {
        let sink = Arc::new(RecordingSink::default());
        let mut controller = MonitorController::new(Arc::clone(&sink), MetricsCollector::new());
        let mut settings = MonitorSettings::default();
        settings.session.channel_capacity = 256;

        let mut feed = controller.start(SubjectInfo::new("s-2", "Grace"), &settings).unwrap();
        feed.push_body(None).await.unwrap();
        for ts in (0..4_000).step_by(100) {
            assert!(feed.push_face(ts, None).await.unwrap());
        }
        drop(feed);

        let state = controller.finish().await.unwrap().unwrap();
        assert_eq!(state.left_desk_count, 1);
        assert!(!sink.received().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_settings_do_not_start() {
        let mut controller =
            MonitorController::new(Arc::new(RecordingSink::default()), MetricsCollector::new());
        let mut settings = MonitorSettings::default();
        settings.session.emit_interval_ms = 0;

        assert!(controller.start(SubjectInfo::new("s-1", "Ada"), &settings).is_err());
        assert!(!controller.is_active());
    }
}
