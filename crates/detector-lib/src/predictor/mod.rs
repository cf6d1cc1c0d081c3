//! ML prediction engine
//!
//! Base predictors (sequence and graph), meta-feature derivation and the
//! ensemble combiner, plus the tract-backed model implementations.

mod ensemble;
mod features;
mod graph;
mod inference;
mod meta;
mod scaler;
mod sequence;

pub use ensemble::combine;
pub use features::{
    coerce, sanitize, FeatureNormalizer, FeatureVector, FEATURE_NAMES, NEG_INF_SENTINEL,
    NUM_FEATURES, POS_INF_SENTINEL,
};
pub use graph::{
    cosine_similarity, predict_batch as predict_graph_batch, softmax2, GraphStructure,
    MAX_NEIGHBORS,
};
pub use inference::{
    InferenceStats, LogisticMetaLearner, OnnxGraphModel, OnnxMetaLearner, OnnxSequenceModel,
};
pub use meta::{meta_features, MetaFeatureVector, META_FEATURE_NAMES, NUM_META_FEATURES};
pub use scaler::{check_feature_order, ScaledFeatures, StandardScaler};
pub use sequence::predict as predict_sequence;

use anyhow::Result;

/// Sequence-oriented base classifier scoring one flow at a time
pub trait SequenceModel: Send + Sync {
    /// Botnet probability for one scaled flow, fed as a length-1 sequence
    fn forward(&self, features: &ScaledFeatures) -> Result<f64>;
}

/// Graph convolutional base classifier
pub trait GraphModel: Send + Sync {
    /// Two-class logits for every node of the batch graph, in node order
    fn forward(&self, nodes: &[ScaledFeatures], graph: &GraphStructure) -> Result<Vec<[f64; 2]>>;
}

/// Meta-learner over the derived meta-features
pub trait MetaLearner: Send + Sync {
    /// Probability of the botnet class
    fn predict_proba(&self, features: &MetaFeatureVector) -> Result<f64>;
}
