use anyhow::{anyhow, bail, Result};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::metrics::MetricsCollector;
use crate::models::{BodyLandmarks, BodyObservation, DetectorOutput, FaceLandmarks, FrameSample};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Capture-side handle into a running session.
///
/// Owns the per-session frame counter that decides when the body detector
/// is due. Never blocks: a full channel drops the output and counts it.
pub struct FrameFeed {
    tx: mpsc::Sender<DetectorOutput>,
    frame_count: u64,
    body_every: u64,
    dropped: u64,
    metrics: MetricsCollector,
}

impl FrameFeed {
    pub fn new(tx: mpsc::Sender<DetectorOutput>, body_every: u64, metrics: MetricsCollector) -> Self {
        Self {
            tx,
            frame_count: 0,
            body_every: body_every.max(1),
            dropped: 0,
            metrics,
        }
    }

    /// Whether the body detector should run on the next face frame.
    pub fn body_due(&self) -> bool {
        self.frame_count % self.body_every == 0
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub async fn push_face(&mut self, timestamp_ms: i64, landmarks: Option<FaceLandmarks>) -> Result<bool> {
        self.push(DetectorOutput::Face {
            timestamp_ms,
            landmarks,
        })
        .await
    }

    pub async fn push_body(&mut self, landmarks: Option<BodyLandmarks>) -> Result<bool> {
        self.push(DetectorOutput::Body { landmarks }).await
    }

    /// Waits for room instead of dropping. For offline sources such as
    /// recorded sessions, where the producer can outrun the loop.
    pub async fn send(&mut self, output: DetectorOutput) -> Result<()> {
        if matches!(output, DetectorOutput::Face { .. }) {
            self.frame_count += 1;
        }
        self.tx
            .send(output)
            .await
            .map_err(|_| anyhow!("monitoring session has stopped"))
    }

    /// Returns `Ok(false)` when the output was dropped because the session
    /// is behind, and an error once the session has shut down.
    pub async fn push(&mut self, output: DetectorOutput) -> Result<bool> {
        if matches!(output, DetectorOutput::Face { .. }) {
            self.frame_count += 1;
        }

        match self.tx.try_send(output) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                log_debug!("session channel full, dropped detector output ({} so far)", self.dropped);
                self.metrics.record_dropped_frame().await;
                Ok(false)
            }
            Err(TrySendError::Closed(_)) => bail!("monitoring session has stopped"),
        }
    }
}

/// Joins the face and body streams. Face frames drive evaluation; the most
/// recent body result is reused until a newer one arrives.
#[derive(Debug, Default)]
pub struct FrameMerger {
    latest_body: BodyObservation,
}

impl FrameMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest_body(&self) -> &BodyObservation {
        &self.latest_body
    }

    pub fn accept(&mut self, output: DetectorOutput) -> Option<FrameSample> {
        match output {
            DetectorOutput::Body { landmarks } => {
                self.latest_body = BodyObservation::Observed(landmarks);
                None
            }
            DetectorOutput::Face {
                timestamp_ms,
                landmarks,
            } => Some(FrameSample::new(timestamp_ms, landmarks, self.latest_body.clone())),
        }
    }
}
