//! ONNX inference using tract
//!
//! Tract-backed implementations of the base model and meta-learner traits,
//! plus a JSON logistic meta-learner for deployments that export the
//! ensemble weights directly.

use super::features::NUM_FEATURES;
use super::graph::GraphStructure;
use super::meta::{MetaFeatureVector, NUM_META_FEATURES};
use super::scaler::ScaledFeatures;
use super::{GraphModel, MetaLearner, SequenceModel};
use anyhow::{bail, Context, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Inference latency above which a warning is logged
const SLOW_INFERENCE_MS: u128 = 50;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Inference statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceStats {
    pub total_inferences: u64,
    pub slow_inferences: u64,
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    slow: AtomicU64,
}

impl Counters {
    fn record(&self, model: &'static str, elapsed: Duration) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if elapsed.as_millis() > SLOW_INFERENCE_MS {
            self.slow.fetch_add(1, Ordering::Relaxed);
            warn!(
                model,
                elapsed_ms = elapsed.as_millis(),
                "Inference exceeded {}ms target",
                SLOW_INFERENCE_MS
            );
        } else {
            debug!(model, elapsed_us = elapsed.as_micros(), "Inference completed");
        }
    }

    fn snapshot(&self) -> InferenceStats {
        InferenceStats {
            total_inferences: self.total.load(Ordering::Relaxed),
            slow_inferences: self.slow.load(Ordering::Relaxed),
        }
    }
}

fn parse_model(model_bytes: &[u8]) -> Result<InferenceModel> {
    tract_onnx::onnx()
        .model_for_read(&mut std::io::Cursor::new(model_bytes))
        .context("Failed to parse ONNX model")
}

fn read_model_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read model {}", path.display()))
}

fn to_f32(values: &[f64]) -> Vec<f32> {
    values.iter().map(|v| *v as f32).collect()
}

/// First output tensor flattened to f32 values
fn first_output(outputs: &TVec<TValue>) -> Result<Vec<f32>> {
    let output = outputs.first().context("No output from model")?;
    let view = output.to_array_view::<f32>().context("Model output is not f32")?;
    Ok(view.iter().copied().collect())
}

/// Sequence classifier fed a length-1 sequence `[1, 1, 42]`
pub struct OnnxSequenceModel {
    model: TractModel,
    counters: Counters,
}

impl OnnxSequenceModel {
    pub fn new(model_bytes: &[u8]) -> Result<Self> {
        let model = parse_model(model_bytes)?
            .with_input_fact(0, f32::fact([1, 1, NUM_FEATURES]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(Self {
            model,
            counters: Counters::default(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::new(&read_model_file(path)?)
    }

    pub fn stats(&self) -> InferenceStats {
        self.counters.snapshot()
    }
}

impl SequenceModel for OnnxSequenceModel {
    fn forward(&self, features: &ScaledFeatures) -> Result<f64> {
        let start = Instant::now();
        let input: Tensor =
            tract_ndarray::Array3::from_shape_vec((1, 1, NUM_FEATURES), to_f32(features))?.into();
        let outputs = self.model.run(tvec!(input.into()))?;
        let values = first_output(&outputs)?;
        self.counters.record("sequence", start.elapsed());

        // A sigmoid head yields one value; a softmax head yields both classes
        match values.as_slice() {
            [p] => Ok(f64::from(*p)),
            [_, p] => Ok(f64::from(*p)),
            other => bail!("Sequence model output has {} values, expected 1 or 2", other.len()),
        }
    }
}

/// Graph convolutional model taking node features `x [N, 42]` and the
/// normalized propagation matrix `adj [N, N]`, returning logits `[N, 2]`
///
/// The node count varies per call, so a typed plan is compiled per distinct
/// batch size and cached.
pub struct OnnxGraphModel {
    source: InferenceModel,
    plans: DashMap<usize, Arc<TractModel>>,
    counters: Counters,
}

impl OnnxGraphModel {
    pub fn new(model_bytes: &[u8]) -> Result<Self> {
        let source = parse_model(model_bytes)?;
        let model = Self {
            source,
            plans: DashMap::new(),
            counters: Counters::default(),
        };
        // Fail at load time rather than on the first request
        model.plan_for(1)?;
        Ok(model)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::new(&read_model_file(path)?)
    }

    pub fn stats(&self) -> InferenceStats {
        self.counters.snapshot()
    }

    /// Number of compiled batch-size plans
    pub fn cached_plans(&self) -> usize {
        self.plans.len()
    }

    fn plan_for(&self, num_nodes: usize) -> Result<Arc<TractModel>> {
        if let Some(plan) = self.plans.get(&num_nodes) {
            return Ok(Arc::clone(plan.value()));
        }

        let plan = self
            .source
            .clone()
            .with_input_fact(0, f32::fact([num_nodes, NUM_FEATURES]).into())
            .context("Failed to set node feature shape")?
            .with_input_fact(1, f32::fact([num_nodes, num_nodes]).into())
            .context("Failed to set adjacency shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        let plan = Arc::new(plan);

        debug!(num_nodes, "Compiled graph model plan");
        self.plans.insert(num_nodes, Arc::clone(&plan));
        Ok(plan)
    }
}

impl GraphModel for OnnxGraphModel {
    fn forward(&self, nodes: &[ScaledFeatures], graph: &GraphStructure) -> Result<Vec<[f64; 2]>> {
        let n = graph.num_nodes();
        if n != nodes.len() {
            bail!("Graph has {} nodes but {} feature rows were given", n, nodes.len());
        }

        let start = Instant::now();
        let plan = self.plan_for(n)?;

        let flat: Vec<f64> = nodes.iter().flat_map(|row| row.iter().copied()).collect();
        let x: Tensor = tract_ndarray::Array2::from_shape_vec((n, NUM_FEATURES), to_f32(&flat))?.into();
        let adj: Tensor =
            tract_ndarray::Array2::from_shape_vec((n, n), to_f32(&graph.propagation_matrix()))?.into();

        let outputs = plan.run(tvec!(x.into(), adj.into()))?;
        let values = first_output(&outputs)?;
        self.counters.record("graph", start.elapsed());

        if values.len() != n * 2 {
            bail!("Graph model output has {} values, expected {}", values.len(), n * 2);
        }
        Ok(values
            .chunks_exact(2)
            .map(|pair| [f64::from(pair[0]), f64::from(pair[1])])
            .collect())
    }
}

/// Meta-learner exported to ONNX with `[1, 18]` input
///
/// Classifier exports usually emit the label first and the class
/// probabilities second; the first f32 output with two values is used.
pub struct OnnxMetaLearner {
    model: TractModel,
    counters: Counters,
}

impl OnnxMetaLearner {
    pub fn new(model_bytes: &[u8]) -> Result<Self> {
        let model = parse_model(model_bytes)?
            .with_input_fact(0, f32::fact([1, NUM_META_FEATURES]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(Self {
            model,
            counters: Counters::default(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::new(&read_model_file(path)?)
    }

    pub fn stats(&self) -> InferenceStats {
        self.counters.snapshot()
    }
}

impl MetaLearner for OnnxMetaLearner {
    fn predict_proba(&self, features: &MetaFeatureVector) -> Result<f64> {
        let start = Instant::now();
        let input: Tensor =
            tract_ndarray::Array2::from_shape_vec((1, NUM_META_FEATURES), to_f32(features.values()))?
                .into();
        let outputs = self.model.run(tvec!(input.into()))?;
        self.counters.record("ensemble", start.elapsed());

        let probabilities = outputs
            .iter()
            .find_map(|t| {
                t.to_array_view::<f32>()
                    .ok()
                    .filter(|view| view.len() == 2)
                    .map(|view| view.iter().copied().collect::<Vec<f32>>())
            })
            .context("Meta-learner produced no two-class probability output")?;
        Ok(f64::from(probabilities[1]))
    }
}

/// Logistic-regression meta-learner stored as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticMetaLearner {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LogisticMetaLearner {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let learner: Self =
            serde_json::from_slice(bytes).context("Failed to parse meta-learner JSON")?;
        if learner.coefficients.len() != NUM_META_FEATURES {
            bail!(
                "Meta-learner has {} coefficients, expected {}",
                learner.coefficients.len(),
                NUM_META_FEATURES
            );
        }
        if !learner.intercept.is_finite() || learner.coefficients.iter().any(|c| !c.is_finite()) {
            bail!("Meta-learner contains non-finite weights");
        }
        Ok(learner)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read meta-learner {}", path.display()))?;
        Self::from_json(&bytes)
    }
}

impl MetaLearner for LogisticMetaLearner {
    fn predict_proba(&self, features: &MetaFeatureVector) -> Result<f64> {
        let z: f64 = self
            .coefficients
            .iter()
            .zip(features.values().iter())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept;
        Ok(1.0 / (1.0 + (-z).exp()))
    }
}
