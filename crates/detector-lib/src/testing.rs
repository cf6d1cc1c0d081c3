//! In-memory artifacts for tests
//!
//! The fixture models key off a single "signal" feature (`SYN Flag Cnt`):
//! flows with no SYN flags score around 0.12 on both base models, flows with
//! a few score well above 0.9.

use crate::artifacts::{
    ArtifactSource, FeatureInfo, GraphArtifact, MetaLearnerArtifact, SequenceArtifact,
};
use crate::models::{FeatureMap, ModelKind};
use crate::predictor::{
    GraphModel, GraphStructure, LogisticMetaLearner, ScaledFeatures, SequenceModel,
    StandardScaler, NUM_META_FEATURES,
};
use anyhow::{bail, Result};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) const SIGNAL: &str = "SYN Flag Cnt";
const SIGNAL_INDEX: usize = 32;

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

pub(crate) struct FixtureSequence;

impl SequenceModel for FixtureSequence {
    fn forward(&self, features: &ScaledFeatures) -> Result<f64> {
        Ok(sigmoid(2.0 * features[SIGNAL_INDEX] - 2.0))
    }
}

pub(crate) struct FixtureGraph;

impl GraphModel for FixtureGraph {
    fn forward(&self, nodes: &[ScaledFeatures], graph: &GraphStructure) -> Result<Vec<[f64; 2]>> {
        let n = graph.num_nodes();
        let p = graph.propagation_matrix();
        Ok((0..n)
            .map(|i| {
                let agg: f64 = (0..n).map(|j| p[i * n + j] * nodes[j][SIGNAL_INDEX]).sum();
                [0.0, 2.0 * agg - 2.0]
            })
            .collect())
    }
}

/// Logistic meta-learner weighting the two base probabilities
pub(crate) fn fixture_meta_learner() -> LogisticMetaLearner {
    let mut coefficients = vec![0.0; NUM_META_FEATURES];
    coefficients[0] = 3.0;
    coefficients[1] = 3.0;
    LogisticMetaLearner {
        coefficients,
        intercept: -3.0,
    }
}

pub(crate) fn benign_features() -> FeatureMap {
    [
        ("Flow Duration", json!(120_000)),
        ("Tot Fwd Pkts", json!(10)),
        ("Tot Bwd Pkts", json!(8)),
        ("Flow Byts/s", json!(1500.5)),
        (SIGNAL, json!(0)),
        ("ACK Flag Cnt", json!(1)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

pub(crate) fn botnet_features() -> FeatureMap {
    let mut features = benign_features();
    features.insert(SIGNAL.to_string(), json!(3));
    features
}

/// Artifact source with load counters and injectable failures
#[derive(Default)]
pub(crate) struct FixtureSource {
    pub sequence_loads: AtomicUsize,
    pub graph_loads: AtomicUsize,
    pub meta_loads: AtomicUsize,
    /// Number of upcoming loads of each kind that fail
    pub fail_sequence: AtomicUsize,
    pub fail_graph: AtomicUsize,
    pub fail_meta: AtomicUsize,
    pub load_delay: Duration,
}

impl FixtureSource {
    pub fn slow(delay: Duration) -> Self {
        Self {
            load_delay: delay,
            ..Self::default()
        }
    }

    pub fn failing(kind: ModelKind, times: usize) -> Self {
        let source = Self::default();
        source.counter_for(kind).1.store(times, Ordering::SeqCst);
        source
    }

    pub fn loads(&self, kind: ModelKind) -> usize {
        self.counter_for(kind).0.load(Ordering::SeqCst)
    }

    fn counter_for(&self, kind: ModelKind) -> (&AtomicUsize, &AtomicUsize) {
        match kind {
            ModelKind::Sequence => (&self.sequence_loads, &self.fail_sequence),
            ModelKind::Graph => (&self.graph_loads, &self.fail_graph),
            ModelKind::Ensemble => (&self.meta_loads, &self.fail_meta),
        }
    }

    fn attempt(&self, kind: ModelKind) -> Result<()> {
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }
        let (loads, failures) = self.counter_for(kind);
        loads.fetch_add(1, Ordering::SeqCst);
        let failing = failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            bail!("fixture {} artifact is corrupt", kind);
        }
        Ok(())
    }
}

impl ArtifactSource for FixtureSource {
    fn load_sequence(&self) -> Result<SequenceArtifact> {
        self.attempt(ModelKind::Sequence)?;
        Ok(SequenceArtifact {
            model: Box::new(FixtureSequence),
            scaler: StandardScaler::identity(),
            version: "fixture-seq".to_string(),
        })
    }

    fn load_graph(&self) -> Result<GraphArtifact> {
        self.attempt(ModelKind::Graph)?;
        Ok(GraphArtifact {
            model: Box::new(FixtureGraph),
            scaler: StandardScaler::identity(),
            feature_info: FeatureInfo::canonical(),
            version: "fixture-gcn".to_string(),
        })
    }

    fn load_meta_learner(&self) -> Result<MetaLearnerArtifact> {
        self.attempt(ModelKind::Ensemble)?;
        Ok(MetaLearnerArtifact {
            model: Box::new(fixture_meta_learner()),
            version: "fixture-meta".to_string(),
        })
    }
}

/// Reference dataset CSV with `botnet` botnet rows and `normal` normal rows
pub(crate) fn dataset_csv(botnet: usize, normal: usize) -> String {
    let mut csv = format!("Flow Duration,Tot Fwd Pkts,{},Label\n", SIGNAL);
    for i in 0..botnet {
        csv.push_str(&format!("{},{},3,1\n", 1000 + i, i % 7));
    }
    for i in 0..normal {
        csv.push_str(&format!("{},{},0,0\n", 50_000 + i, i % 5));
    }
    csv
}
