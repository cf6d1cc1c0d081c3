//! Simulated live traffic monitoring
//!
//! Replays single reference flows through the ensemble at a fixed interval
//! and raises an alert whenever a flow is classified as botnet with at least
//! the configured probability.

use crate::detector::Detector;
use crate::error::{DetectorError, Result};
use crate::evaluation::{prediction_record, Tally, ANONYMOUS};
use crate::models::{round2, BotnetAlert, ModelKind, PredictionResult, RunKind};
use crate::observability::DetectorMetrics;
use crate::sampler::DatasetSampler;
use crate::sink::EventSink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DURATION_RANGE_SECS: RangeInclusive<u64> = 10..=300;
pub const INTERVAL_RANGE_SECS: RangeInclusive<f64> = 0.5..=10.0;
pub const THRESHOLD_RANGE: RangeInclusive<f64> = 0.5..=1.0;

const MONITOR_MODEL: ModelKind = ModelKind::Ensemble;

fn default_duration() -> u64 {
    60
}

fn default_interval() -> f64 {
    2.0
}

fn default_threshold() -> f64 {
    0.7
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_duration", alias = "duration")]
    pub duration_secs: u64,
    #[serde(default = "default_interval", alias = "interval")]
    pub interval_secs: f64,
    #[serde(default = "default_threshold")]
    pub alert_threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration(),
            interval_secs: default_interval(),
            alert_threshold: default_threshold(),
            requested_by: None,
        }
    }
}

impl MonitorConfig {
    /// Check the externally accepted ranges
    pub fn validate(&self) -> Result<()> {
        if !DURATION_RANGE_SECS.contains(&self.duration_secs) {
            return Err(DetectorError::InvalidRequest(format!(
                "duration must be between {} and {} seconds",
                DURATION_RANGE_SECS.start(),
                DURATION_RANGE_SECS.end()
            )));
        }
        if !INTERVAL_RANGE_SECS.contains(&self.interval_secs) {
            return Err(DetectorError::InvalidRequest(format!(
                "interval must be between {} and {} seconds",
                INTERVAL_RANGE_SECS.start(),
                INTERVAL_RANGE_SECS.end()
            )));
        }
        if !THRESHOLD_RANGE.contains(&self.alert_threshold) {
            return Err(DetectorError::InvalidRequest(format!(
                "alert_threshold must be between {} and {}",
                THRESHOLD_RANGE.start(),
                THRESHOLD_RANGE.end()
            )));
        }
        Ok(())
    }

    /// Number of flows to replay
    pub fn iterations(&self) -> usize {
        if self.interval_secs <= 0.0 {
            return 0;
        }
        (self.duration_secs as f64 / self.interval_secs).floor() as usize
    }

    pub fn requester(&self) -> &str {
        self.requested_by.as_deref().unwrap_or(ANONYMOUS)
    }
}

/// One monitored flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorDetection {
    pub sample_id: usize,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub actual_label: Option<u8>,
    pub alert_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSummary {
    pub start_time: String,
    pub end_time: String,
    pub duration_seconds: f64,
    pub total_samples: usize,
    pub botnet_detected: usize,
    pub normal_traffic: usize,
    pub failed: usize,
    pub alerts_sent: usize,
    pub detection_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorReport {
    pub summary: MonitorSummary,
    pub detections: Vec<MonitorDetection>,
}

/// Single ensemble reading for streaming displays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamReading {
    pub timestamp: String,
    pub prediction: u8,
    pub prediction_label: String,
    pub probability: f64,
    pub confidence: f64,
    pub actual_label: Option<u8>,
}

pub struct LiveMonitor {
    detector: Arc<Detector>,
    sampler: Arc<DatasetSampler>,
    sink: Arc<dyn EventSink>,
    metrics: DetectorMetrics,
}

impl LiveMonitor {
    pub fn new(detector: Arc<Detector>, sampler: Arc<DatasetSampler>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            detector,
            sampler,
            sink,
            metrics: DetectorMetrics::new(),
        }
    }

    /// Replay flows for the configured duration
    ///
    /// Ranges are not enforced here; callers facing the outside world run
    /// [`MonitorConfig::validate`] first.
    pub async fn run(&self, config: &MonitorConfig) -> Result<MonitorReport> {
        self.detector.registry().ensure_loaded(MONITOR_MODEL).await?;

        let requested_by = config.requester();
        let iterations = config.iterations();
        let interval = Duration::from_secs_f64(config.interval_secs.max(0.0));
        let start_time = Utc::now();

        info!(
            iterations,
            interval_secs = config.interval_secs,
            alert_threshold = config.alert_threshold,
            "Starting live monitoring"
        );

        let mut detections = Vec::with_capacity(iterations);
        let mut tally = Tally::default();
        let mut alerts_sent = 0usize;

        for i in 0..iterations {
            let Some(sample) = self.sampler.sample(1, false).await.into_iter().next() else {
                warn!(iteration = i, "Reference dataset empty, stopping monitoring early");
                break;
            };
            let sample_id = i + 1;
            let vector = self.detector.normalize_row(&sample.features);
            let now = Utc::now();

            match self.detector.predict_vector(MONITOR_MODEL, vector).await {
                Ok(result) => {
                    tally.scored(&result, sample.label);
                    let record = prediction_record(requested_by, &result, &vector, sample.label);
                    if let Err(e) = self.sink.record_prediction(record).await {
                        warn!(error = %e, "Failed to record prediction");
                    }

                    let alert_sent = if result.is_botnet() && result.probability >= config.alert_threshold {
                        self.alert(requested_by, sample_id, &result, now).await
                    } else {
                        false
                    };
                    if alert_sent {
                        alerts_sent += 1;
                    }
                    detections.push(MonitorDetection {
                        sample_id,
                        timestamp: now.to_rfc3339(),
                        prediction: Some(result.prediction),
                        prediction_label: Some(result.label().to_string()),
                        probability: Some(result.probability),
                        confidence: Some(result.confidence),
                        actual_label: sample.label,
                        alert_sent,
                        error: None,
                    });
                }
                Err(err) => {
                    warn!(sample_id, error = %err, "Monitored flow failed to score");
                    tally.failed += 1;
                    detections.push(MonitorDetection {
                        sample_id,
                        timestamp: now.to_rfc3339(),
                        prediction: None,
                        prediction_label: None,
                        probability: None,
                        confidence: None,
                        actual_label: sample.label,
                        alert_sent: false,
                        error: Some(err.to_string()),
                    });
                }
            }

            if i + 1 < iterations {
                tokio::time::sleep(interval).await;
            }
        }

        let end_time = Utc::now();
        let elapsed = (end_time - start_time).num_milliseconds() as f64 / 1000.0;

        let detection_summary =
            tally.summary(RunKind::Monitor, requested_by, MONITOR_MODEL, detections.len());
        if let Err(e) = self.sink.notify_summary(detection_summary).await {
            warn!(error = %e, "Failed to send monitoring summary");
        }

        let summary = MonitorSummary {
            start_time: start_time.to_rfc3339(),
            end_time: end_time.to_rfc3339(),
            duration_seconds: round2(elapsed),
            total_samples: detections.len(),
            botnet_detected: tally.botnet,
            normal_traffic: tally.normal,
            failed: tally.failed,
            alerts_sent,
            detection_rate: tally.detection_rate(),
        };
        info!(
            total = summary.total_samples,
            botnet = summary.botnet_detected,
            alerts = summary.alerts_sent,
            "Live monitoring finished"
        );

        Ok(MonitorReport {
            summary,
            detections,
        })
    }

    /// Score one random flow with the ensemble
    pub async fn stream_once(&self, requested_by: &str) -> Result<StreamReading> {
        let sample = self
            .sampler
            .sample(1, false)
            .await
            .into_iter()
            .next()
            .ok_or(DetectorError::NoData)?;
        let vector = self.detector.normalize_row(&sample.features);
        let result = self.detector.predict_vector(MONITOR_MODEL, vector).await?;

        let record = prediction_record(requested_by, &result, &vector, sample.label);
        if let Err(e) = self.sink.record_prediction(record).await {
            warn!(error = %e, "Failed to record prediction");
        }

        Ok(StreamReading {
            timestamp: Utc::now().to_rfc3339(),
            prediction: result.prediction,
            prediction_label: result.label().to_string(),
            probability: result.probability,
            confidence: result.confidence,
            actual_label: sample.label,
        })
    }

    async fn alert(
        &self,
        requested_by: &str,
        sample_id: usize,
        result: &PredictionResult,
        at: DateTime<Utc>,
    ) -> bool {
        let alert = BotnetAlert {
            requested_by: requested_by.to_string(),
            sample_id,
            model: result.model,
            probability: result.probability,
            confidence: result.confidence,
            timestamp: at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        };
        match self.sink.send_alert(alert).await {
            Ok(()) => {
                self.metrics.inc_alerts();
                debug!(sample_id, "Botnet alert sent");
                true
            }
            Err(e) => {
                warn!(sample_id, error = %e, "Failed to send botnet alert");
                false
            }
        }
    }
}
