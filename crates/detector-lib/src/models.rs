//! Core data models for the detector

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Inbound feature map: feature name to an arbitrary JSON value
pub type FeatureMap = HashMap<String, serde_json::Value>;

/// Benign flow
pub const CLASS_NORMAL: u8 = 0;
/// Botnet flow
pub const CLASS_BOTNET: u8 = 1;

/// Model kinds served by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Temporal base classifier scoring one flow as a length-1 sequence
    #[serde(alias = "lstm")]
    Sequence,
    /// Base classifier over a similarity graph of the scored batch
    #[serde(alias = "gcn")]
    Graph,
    /// Meta-learner combining both base models
    Ensemble,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Sequence, ModelKind::Graph, ModelKind::Ensemble];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Sequence => "sequence",
            ModelKind::Graph => "graph",
            ModelKind::Ensemble => "ensemble",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequence" | "lstm" => Ok(ModelKind::Sequence),
            "graph" | "gcn" => Ok(ModelKind::Graph),
            "ensemble" => Ok(ModelKind::Ensemble),
            other => Err(format!("unknown model kind '{}'", other)),
        }
    }
}

/// Human-readable label for a predicted class
pub fn class_label(class: u8) -> &'static str {
    if class == CLASS_BOTNET {
        "Botnet"
    } else {
        "Normal"
    }
}

/// Output of a single predictor before it is tagged with a model kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub class: u8,
    pub probability: f64,
    pub confidence: f64,
}

impl Verdict {
    /// Verdict from a positive-class probability with confidence measured as
    /// distance from the 0.5 decision boundary
    ///
    /// `probability` must already be in [0, 1]; predictors reject model
    /// outputs outside that range before building a verdict.
    pub fn from_boundary_distance(probability: f64) -> Self {
        Self {
            class: u8::from(probability > 0.5),
            probability,
            confidence: (probability - 0.5).abs() * 2.0,
        }
    }
}

/// Final prediction for one sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction: u8,
    pub probability: f64,
    pub confidence: f64,
    pub model: ModelKind,
}

impl PredictionResult {
    pub fn new(verdict: Verdict, model: ModelKind) -> Self {
        Self {
            prediction: verdict.class,
            probability: verdict.probability,
            confidence: verdict.confidence,
            model,
        }
    }

    pub fn is_botnet(&self) -> bool {
        self.prediction == CLASS_BOTNET
    }

    pub fn label(&self) -> &'static str {
        class_label(self.prediction)
    }
}

/// Labeled row drawn from the reference dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Feature columns of the row, keyed by column name
    pub features: BTreeMap<String, f64>,
    /// Ground truth, kept out of the vector fed to the models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<u8>,
}

/// Outbound record emitted for every prediction performed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub requested_by: String,
    pub model: ModelKind,
    pub prediction: u8,
    pub probability: f64,
    pub confidence: f64,
    /// Canonical features the models were fed
    pub features: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_label: Option<u8>,
    pub timestamp: i64,
}

/// Kind of run a summary describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Batch,
    Monitor,
}

/// Outbound summary emitted after a batch or monitoring run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub run: RunKind,
    pub requested_by: String,
    pub model: ModelKind,
    pub total_samples: usize,
    pub botnet_detected: usize,
    pub normal_detected: usize,
    pub failed: usize,
    /// Percentage of labelled samples classified correctly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Percentage of scored samples classified as botnet
    pub detection_rate: f64,
}

/// Alert raised when a monitored flow is confidently classified as botnet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotnetAlert {
    pub requested_by: String,
    pub sample_id: usize,
    pub model: ModelKind,
    pub probability: f64,
    pub confidence: f64,
    pub timestamp: String,
}

/// Round to two decimals for percentages reported to callers
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_aliases() {
        assert_eq!("lstm".parse::<ModelKind>().unwrap(), ModelKind::Sequence);
        assert_eq!("GCN".parse::<ModelKind>().unwrap(), ModelKind::Graph);
        assert_eq!("ensemble".parse::<ModelKind>().unwrap(), ModelKind::Ensemble);
        assert!("svm".parse::<ModelKind>().is_err());

        let kind: ModelKind = serde_json::from_str("\"gcn\"").unwrap();
        assert_eq!(kind, ModelKind::Graph);
        assert_eq!(serde_json::to_string(&ModelKind::Sequence).unwrap(), "\"sequence\"");
    }

    #[test]
    fn test_boundary_distance_confidence() {
        let v = Verdict::from_boundary_distance(0.12);
        assert_eq!(v.class, CLASS_NORMAL);
        assert!((v.confidence - 0.76).abs() < 1e-12);

        let v = Verdict::from_boundary_distance(0.9);
        assert_eq!(v.class, CLASS_BOTNET);
        assert!((v.confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_exact_boundary_is_normal() {
        let v = Verdict::from_boundary_distance(0.5);
        assert_eq!(v.class, CLASS_NORMAL);
        assert_eq!(v.confidence, 0.0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(66.666_666), 66.67);
        assert_eq!(round2(50.0), 50.0);
    }
}
