//! Meta-feature derivation from the two base predictions

use serde::{Deserialize, Serialize};

pub const NUM_META_FEATURES: usize = 18;

/// Stabilizer inside each entropy logarithm
const ENTROPY_EPS: f64 = 1e-10;

/// Stabilizer for the confidence-weighted average denominator
const WEIGHT_EPS: f64 = 1e-8;

/// Layout the meta-learner was trained on
pub const META_FEATURE_NAMES: [&str; NUM_META_FEATURES] = [
    "p_seq",
    "p_graph",
    "c_seq",
    "c_graph",
    "agreement",
    "abs_prob_diff",
    "prob_product",
    "prob_sum",
    "abs_conf_diff",
    "conf_product",
    "seq_boundary_dist",
    "graph_boundary_dist",
    "max_prob",
    "min_prob",
    "seq_entropy",
    "graph_entropy",
    "entropy_product",
    "weighted_prob",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetaFeatureVector(pub [f64; NUM_META_FEATURES]);

impl MetaFeatureVector {
    pub fn values(&self) -> &[f64; NUM_META_FEATURES] {
        &self.0
    }

    pub fn agreement(&self) -> bool {
        self.0[4] == 1.0
    }
}

fn binary_entropy(p: f64) -> f64 {
    -(p * (p + ENTROPY_EPS).ln() + (1.0 - p) * (1.0 - p + ENTROPY_EPS).ln())
}

/// Derive the 18 meta-features, in training order
pub fn meta_features(
    p_seq: f64,
    p_graph: f64,
    c_seq: f64,
    c_graph: f64,
    y_seq: u8,
    y_graph: u8,
) -> MetaFeatureVector {
    let h_seq = binary_entropy(p_seq);
    let h_graph = binary_entropy(p_graph);
    let total_conf = c_seq + c_graph + WEIGHT_EPS;
    let weighted = (c_seq / total_conf) * p_seq + (c_graph / total_conf) * p_graph;

    MetaFeatureVector([
        p_seq,
        p_graph,
        c_seq,
        c_graph,
        if y_seq == y_graph { 1.0 } else { 0.0 },
        (p_seq - p_graph).abs(),
        p_seq * p_graph,
        p_seq + p_graph,
        (c_seq - c_graph).abs(),
        c_seq * c_graph,
        (p_seq - 0.5).abs(),
        (p_graph - 0.5).abs(),
        p_seq.max(p_graph),
        p_seq.min(p_graph),
        h_seq,
        h_graph,
        h_seq * h_graph,
        weighted,
    ])
}
