//! Detection pipeline
//!
//! Normalizes a feature map, scores it with the requested model kind and
//! records latency and outcome metrics. Model compute runs on the blocking
//! pool so unrelated requests keep making progress.

use crate::error::{DetectorError, Result};
use crate::models::{FeatureMap, ModelKind, PredictionResult, Verdict};
use crate::observability::DetectorMetrics;
use crate::predictor::{
    self, combine, meta_features, predict_sequence, FeatureNormalizer, FeatureVector,
    MetaFeatureVector,
};
use crate::registry::ModelRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Ensemble verdict together with the inputs that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleBreakdown {
    pub sequence: PredictionResult,
    pub graph: PredictionResult,
    pub meta_features: MetaFeatureVector,
    pub ensemble: PredictionResult,
}

/// Run model compute off the async executor
async fn blocking<T, F>(kind: ModelKind, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DetectorError::Internal(format!("{} inference task failed: {}", kind, e)))?
        .map_err(|e| DetectorError::inference(kind, &e))
}

fn single(kind: ModelKind, mut verdicts: Vec<Verdict>) -> anyhow::Result<Verdict> {
    match verdicts.len() {
        1 => Ok(verdicts.remove(0)),
        n => anyhow::bail!("{} model returned {} verdicts for one sample", kind, n),
    }
}

pub struct Detector {
    normalizer: FeatureNormalizer,
    registry: Arc<ModelRegistry>,
    metrics: DetectorMetrics,
}

impl Detector {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            normalizer: FeatureNormalizer::new(),
            registry,
            metrics: DetectorMetrics::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn normalize(&self, features: &FeatureMap) -> FeatureVector {
        self.normalizer.normalize_map(features)
    }

    pub fn normalize_row(&self, row: &BTreeMap<String, f64>) -> FeatureVector {
        self.normalizer.normalize_row(row)
    }

    /// Score an arbitrary feature map
    pub async fn predict(&self, kind: ModelKind, features: &FeatureMap) -> Result<PredictionResult> {
        self.predict_vector(kind, self.normalize(features)).await
    }

    /// Score an already normalized vector
    pub async fn predict_vector(&self, kind: ModelKind, features: FeatureVector) -> Result<PredictionResult> {
        let start = Instant::now();
        let outcome = match kind {
            ModelKind::Sequence => self
                .sequence_verdict(features)
                .await
                .map(|v| PredictionResult::new(v, kind)),
            ModelKind::Graph => self
                .graph_verdict(features)
                .await
                .map(|v| PredictionResult::new(v, kind)),
            ModelKind::Ensemble => self.ensemble_breakdown(features).await.map(|b| b.ensemble),
        };
        self.observe(kind, start, outcome.as_ref().ok().map(|r| r.prediction));
        outcome
    }

    /// Ensemble verdict with both base verdicts and the meta-features
    pub async fn explain(&self, features: &FeatureMap) -> Result<EnsembleBreakdown> {
        let start = Instant::now();
        let outcome = self.ensemble_breakdown(self.normalize(features)).await;
        self.observe(
            ModelKind::Ensemble,
            start,
            outcome.as_ref().ok().map(|b| b.ensemble.prediction),
        );
        outcome
    }

    /// Score several flows as one similarity graph
    ///
    /// Unlike per-request graph scoring, neighbouring flows in the batch
    /// influence each other's verdicts.
    pub async fn predict_graph_batch(&self, batch: Vec<FeatureVector>) -> Result<Vec<PredictionResult>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let artifact = self.registry.graph().await?;
        let outcome = blocking(ModelKind::Graph, move || {
            predictor::predict_graph_batch(&artifact, &batch)
        })
        .await;

        match outcome {
            Ok(verdicts) => {
                self.metrics
                    .observe_inference_latency(ModelKind::Graph, start.elapsed().as_secs_f64());
                Ok(verdicts
                    .into_iter()
                    .map(|v| {
                        self.metrics.inc_prediction(ModelKind::Graph, v.class);
                        PredictionResult::new(v, ModelKind::Graph)
                    })
                    .collect())
            }
            Err(err) => {
                self.metrics.inc_prediction_error(ModelKind::Graph);
                Err(err)
            }
        }
    }

    /// Record the outcome of one scoring call; `None` means it failed
    fn observe(&self, kind: ModelKind, start: Instant, class: Option<u8>) {
        match class {
            Some(class) => {
                self.metrics
                    .observe_inference_latency(kind, start.elapsed().as_secs_f64());
                self.metrics.inc_prediction(kind, class);
            }
            None => self.metrics.inc_prediction_error(kind),
        }
    }

    async fn sequence_verdict(&self, features: FeatureVector) -> Result<Verdict> {
        let artifact = self.registry.sequence().await?;
        blocking(ModelKind::Sequence, move || predict_sequence(&artifact, &features)).await
    }

    async fn graph_verdict(&self, features: FeatureVector) -> Result<Verdict> {
        let artifact = self.registry.graph().await?;
        blocking(ModelKind::Graph, move || {
            single(
                ModelKind::Graph,
                predictor::predict_graph_batch(&artifact, &[features])?,
            )
        })
        .await
    }

    async fn ensemble_breakdown(&self, features: FeatureVector) -> Result<EnsembleBreakdown> {
        let ensemble = self.registry.ensemble().await?;

        let sequence = Arc::clone(&ensemble.sequence);
        let graph = Arc::clone(&ensemble.graph);
        // Both base verdicts must be in before the meta-features exist
        let (seq, gcn) = tokio::try_join!(
            blocking(ModelKind::Sequence, move || predict_sequence(&sequence, &features)),
            blocking(ModelKind::Graph, move || {
                single(
                    ModelKind::Graph,
                    predictor::predict_graph_batch(&graph, &[features])?,
                )
            }),
        )?;

        let meta = meta_features(
            seq.probability,
            gcn.probability,
            seq.confidence,
            gcn.confidence,
            seq.class,
            gcn.class,
        );
        let verdict = blocking(ModelKind::Ensemble, move || {
            combine(ensemble.meta_learner.model.as_ref(), &meta)
        })
        .await?;

        Ok(EnsembleBreakdown {
            sequence: PredictionResult::new(seq, ModelKind::Sequence),
            graph: PredictionResult::new(gcn, ModelKind::Graph),
            meta_features: meta,
            ensemble: PredictionResult::new(verdict, ModelKind::Ensemble),
        })
    }
}
