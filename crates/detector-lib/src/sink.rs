//! Outbound event sinks
//!
//! Prediction records, run summaries and alerts leave the pipeline through
//! an [`EventSink`]. Sink failures are the caller's to log; they never fail
//! the detection that produced the event.

use crate::models::{BotnetAlert, DetectionSummary, PredictionRecord};
use crate::observability::{DetectorMetrics, StructuredLogger};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectionEvent {
    Prediction(PredictionRecord),
    Summary(DetectionSummary),
    Alert(BotnetAlert),
}

#[async_trait]
pub trait EventSink: Send + Sync {
    /// Persist one prediction
    async fn record_prediction(&self, record: PredictionRecord) -> Result<()>;

    /// Notify the requester that a batch or monitoring run finished
    async fn notify_summary(&self, summary: DetectionSummary) -> Result<()>;

    /// Raise a botnet alert; `Ok` means the alert was handed off
    async fn send_alert(&self, alert: BotnetAlert) -> Result<()>;
}

/// Bounded channel sink; never waits for the consumer
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<DetectionEvent>,
    metrics: DetectorMetrics,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DetectionEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                metrics: DetectorMetrics::new(),
            },
            rx,
        )
    }

    fn push(&self, event: DetectionEvent) -> Result<()> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.metrics.inc_events_dropped();
                bail!("Event channel full")
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.inc_events_dropped();
                bail!("Event channel closed")
            }
        }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn record_prediction(&self, record: PredictionRecord) -> Result<()> {
        self.push(DetectionEvent::Prediction(record))
    }

    async fn notify_summary(&self, summary: DetectionSummary) -> Result<()> {
        self.push(DetectionEvent::Summary(summary))
    }

    async fn send_alert(&self, alert: BotnetAlert) -> Result<()> {
        self.push(DetectionEvent::Alert(alert))
    }
}

/// Writes every event to the structured log
#[derive(Clone)]
pub struct LogSink {
    logger: StructuredLogger,
}

impl LogSink {
    pub fn new(logger: StructuredLogger) -> Self {
        Self { logger }
    }

    pub fn log(&self, event: &DetectionEvent) {
        match event {
            DetectionEvent::Prediction(record) => self.logger.log_prediction(record),
            DetectionEvent::Summary(summary) => self.logger.log_run_summary(summary),
            DetectionEvent::Alert(alert) => self.logger.log_alert(alert),
        }
    }
}

#[async_trait]
impl EventSink for LogSink {
    async fn record_prediction(&self, record: PredictionRecord) -> Result<()> {
        self.logger.log_prediction(&record);
        Ok(())
    }

    async fn notify_summary(&self, summary: DetectionSummary) -> Result<()> {
        self.logger.log_run_summary(&summary);
        Ok(())
    }

    async fn send_alert(&self, alert: BotnetAlert) -> Result<()> {
        self.logger.log_alert(&alert);
        Ok(())
    }
}

/// Drain a channel sink into the structured log until every sender is gone
pub async fn forward_to_log(mut rx: mpsc::Receiver<DetectionEvent>, sink: LogSink) -> u64 {
    let mut forwarded = 0u64;
    while let Some(event) = rx.recv().await {
        sink.log(&event);
        forwarded += 1;
    }
    info!(forwarded, "Event channel closed");
    forwarded
}
