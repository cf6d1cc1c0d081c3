//! Batch evaluation against the reference dataset
//!
//! Draws labelled rows, scores each one with the requested model and
//! reports per-item outcomes plus accuracy against the ground truth.

use crate::detector::Detector;
use crate::error::{DetectorError, Result};
use crate::models::{
    round2, DetectionSummary, ModelKind, PredictionRecord, PredictionResult,
    RunKind, Sample,
};
use crate::predictor::FeatureVector;
use crate::sampler::DatasetSampler;
use crate::sink::EventSink;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const MAX_BATCH_SIZE: usize = 100;

/// Caller identity used when none is supplied
pub const ANONYMOUS: &str = "anonymous";

fn default_batch_size() -> usize {
    10
}

fn default_balanced() -> bool {
    true
}

fn default_model() -> ModelKind {
    ModelKind::Ensemble
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default = "default_batch_size")]
    pub n: usize,
    #[serde(default = "default_balanced")]
    pub balanced: bool,
    #[serde(default = "default_model", alias = "model_type")]
    pub model: ModelKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

impl Default for BatchRequest {
    fn default() -> Self {
        Self {
            n: default_batch_size(),
            balanced: default_balanced(),
            model: default_model(),
            requested_by: None,
        }
    }
}

impl BatchRequest {
    pub fn validate(&self) -> Result<()> {
        if self.n == 0 || self.n > MAX_BATCH_SIZE {
            return Err(DetectorError::InvalidRequest(format!(
                "n must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.n
            )));
        }
        Ok(())
    }

    pub fn requester(&self) -> &str {
        self.requested_by.as_deref().unwrap_or(ANONYMOUS)
    }
}

/// Result for one sampled row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub actual_label: Option<u8>,
    pub correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemOutcome {
    fn scored(index: usize, result: &PredictionResult, actual_label: Option<u8>) -> Self {
        Self {
            index,
            prediction: Some(result.prediction),
            prediction_label: Some(result.label().to_string()),
            probability: Some(result.probability),
            confidence: Some(result.confidence),
            actual_label,
            correct: actual_label.map(|label| label == result.prediction),
            error: None,
        }
    }

    fn failed(index: usize, error: &DetectorError, actual_label: Option<u8>) -> Self {
        Self {
            index,
            prediction: None,
            prediction_label: None,
            probability: None,
            confidence: None,
            actual_label,
            correct: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub total_samples: usize,
    pub predictions: Vec<ItemOutcome>,
    pub summary: DetectionSummary,
}

/// Running counts shared by batch and monitoring runs
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Tally {
    pub botnet: usize,
    pub normal: usize,
    pub failed: usize,
    pub labelled: usize,
    pub correct: usize,
}

impl Tally {
    pub fn scored(&mut self, result: &PredictionResult, actual_label: Option<u8>) {
        if result.is_botnet() {
            self.botnet += 1;
        } else {
            self.normal += 1;
        }
        if let Some(label) = actual_label {
            self.labelled += 1;
            if label == result.prediction {
                self.correct += 1;
            }
        }
    }

    /// Percentage of labelled, scored items classified correctly
    pub fn accuracy(&self) -> Option<f64> {
        (self.labelled > 0).then(|| round2(self.correct as f64 / self.labelled as f64 * 100.0))
    }

    /// Percentage of scored items classified as botnet
    pub fn detection_rate(&self) -> f64 {
        let scored = self.botnet + self.normal;
        if scored == 0 {
            0.0
        } else {
            round2(self.botnet as f64 / scored as f64 * 100.0)
        }
    }

    pub fn summary(&self, run: RunKind, requested_by: &str, model: ModelKind, total: usize) -> DetectionSummary {
        DetectionSummary {
            run,
            requested_by: requested_by.to_string(),
            model,
            total_samples: total,
            botnet_detected: self.botnet,
            normal_detected: self.normal,
            failed: self.failed,
            accuracy: self.accuracy(),
            detection_rate: self.detection_rate(),
        }
    }
}

pub(crate) fn prediction_record(
    requested_by: &str,
    result: &PredictionResult,
    features: &FeatureVector,
    actual_label: Option<u8>,
) -> PredictionRecord {
    PredictionRecord {
        requested_by: requested_by.to_string(),
        model: result.model,
        prediction: result.prediction,
        probability: result.probability,
        confidence: result.confidence,
        features: features.to_named_map(),
        actual_label,
        timestamp: chrono::Utc::now().timestamp(),
    }
}

pub struct BatchEvaluator {
    detector: Arc<Detector>,
    sampler: Arc<DatasetSampler>,
    sink: Arc<dyn EventSink>,
}

impl BatchEvaluator {
    pub fn new(detector: Arc<Detector>, sampler: Arc<DatasetSampler>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            detector,
            sampler,
            sink,
        }
    }

    pub async fn run(&self, request: &BatchRequest) -> Result<BatchReport> {
        request.validate()?;
        let kind = request.model;
        let requested_by = request.requester();

        // An unloadable model fails the whole run instead of every item
        self.detector.registry().ensure_loaded(kind).await?;

        let samples = self.sampler.sample(request.n, request.balanced).await;
        if samples.is_empty() {
            return Err(DetectorError::NoData);
        }

        let mut tally = Tally::default();
        let mut predictions = Vec::with_capacity(samples.len());

        for (index, Sample { features, label }) in samples.iter().enumerate() {
            let vector = self.detector.normalize_row(features);
            match self.detector.predict_vector(kind, vector).await {
                Ok(result) => {
                    tally.scored(&result, *label);
                    predictions.push(ItemOutcome::scored(index, &result, *label));

                    let record = prediction_record(requested_by, &result, &vector, *label);
                    if let Err(e) = self.sink.record_prediction(record).await {
                        warn!(error = %e, "Failed to record prediction");
                    }
                }
                Err(err) => {
                    warn!(index, model = %kind, error = %err, "Batch item failed");
                    tally.failed += 1;
                    predictions.push(ItemOutcome::failed(index, &err, *label));
                }
            }
        }

        let summary = tally.summary(RunKind::Batch, requested_by, kind, samples.len());
        info!(
            model = %kind,
            total = summary.total_samples,
            botnet = summary.botnet_detected,
            failed = summary.failed,
            accuracy = ?summary.accuracy,
            "Batch evaluation complete"
        );
        if let Err(e) = self.sink.notify_summary(summary.clone()).await {
            warn!(error = %e, "Failed to send batch summary");
        }

        Ok(BatchReport {
            total_samples: samples.len(),
            predictions,
            summary,
        })
    }
}
