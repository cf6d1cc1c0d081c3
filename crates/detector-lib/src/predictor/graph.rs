//! Similarity graph construction and graph model scoring
//!
//! Each scored sample becomes a node. For batches larger than one, nodes are
//! linked to their nearest neighbours by cosine similarity over the scaled
//! feature space; every node always gets a self-loop so the convolution has
//! at least one neighbour to aggregate.

use super::features::FeatureVector;
use super::scaler::ScaledFeatures;
use crate::artifacts::GraphArtifact;
use crate::models::Verdict;
use anyhow::{bail, Result};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Upper bound on similarity neighbours per node
pub const MAX_NEIGHBORS: usize = 8;

/// Node and edge sets for one scored batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphStructure {
    num_nodes: usize,
    /// Directed (source, target) pairs; every undirected link appears both ways
    edges: Vec<(usize, usize)>,
}

impl GraphStructure {
    /// Build the kNN similarity graph for a batch of scaled samples
    pub fn build(nodes: &[ScaledFeatures]) -> Self {
        let n = nodes.len();
        let mut edges = BTreeSet::new();

        if n > 1 {
            // Self is excluded, so at most n - 1 neighbours exist
            let k = MAX_NEIGHBORS.min(n).min(n - 1);
            for i in 0..n {
                let mut candidates: Vec<(usize, f64)> = (0..n)
                    .filter(|&j| j != i)
                    .map(|j| (j, cosine_similarity(&nodes[i], &nodes[j])))
                    .collect();
                candidates.sort_by(|a, b| {
                    b.1.partial_cmp(&a.1)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| a.0.cmp(&b.0))
                });
                for (j, _) in candidates.into_iter().take(k) {
                    edges.insert((i, j));
                    edges.insert((j, i));
                }
            }
        }

        for i in 0..n {
            edges.insert((i, i));
        }

        Self {
            num_nodes: n,
            edges: edges.into_iter().collect(),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn has_edge(&self, source: usize, target: usize) -> bool {
        self.edges.binary_search(&(source, target)).is_ok()
    }

    pub fn self_loop_count(&self) -> usize {
        self.edges.iter().filter(|(s, t)| s == t).count()
    }

    /// Symmetrically normalized adjacency `D^-1/2 A D^-1/2`, row-major N x N
    ///
    /// This is the propagation rule of a graph convolution layer; `A` already
    /// contains the self-loops.
    pub fn propagation_matrix(&self) -> Vec<f64> {
        let n = self.num_nodes;
        let mut adjacency = vec![0.0; n * n];
        for &(source, target) in &self.edges {
            adjacency[target * n + source] = 1.0;
        }

        let degree: Vec<f64> = (0..n)
            .map(|row| adjacency[row * n..(row + 1) * n].iter().sum())
            .collect();

        for row in 0..n {
            for col in 0..n {
                let a = adjacency[row * n + col];
                if a != 0.0 {
                    adjacency[row * n + col] = a / (degree[row] * degree[col]).sqrt();
                }
            }
        }
        adjacency
    }
}

/// Cosine similarity; zero when either vector has zero norm
pub fn cosine_similarity(a: &ScaledFeatures, b: &ScaledFeatures) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a < f64::EPSILON || norm_b < f64::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Numerically stable two-class softmax
pub fn softmax2(logits: [f64; 2]) -> [f64; 2] {
    let max = logits[0].max(logits[1]);
    let e0 = (logits[0] - max).exp();
    let e1 = (logits[1] - max).exp();
    let sum = e0 + e1;
    [e0 / sum, e1 / sum]
}

/// Score a batch with the graph model, one verdict per sample in input order
///
/// The whole batch graph goes through a single forward pass. Confidence is
/// the largest softmax probability, unlike the boundary-distance confidence of
/// the sequence and ensemble predictors.
pub fn predict_batch(artifact: &GraphArtifact, batch: &[FeatureVector]) -> Result<Vec<Verdict>> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }

    let scaled: Vec<ScaledFeatures> = batch.iter().map(|f| artifact.scaler.transform(f)).collect();
    let graph = GraphStructure::build(&scaled);
    let logits = artifact.model.forward(&scaled, &graph)?;

    if logits.len() != batch.len() {
        bail!(
            "Graph model returned {} rows for {} nodes",
            logits.len(),
            batch.len()
        );
    }

    logits
        .into_iter()
        .map(|row| {
            if row.iter().any(|v| !v.is_finite()) {
                bail!("Graph model returned non-finite logits {:?}", row);
            }
            let probs = softmax2(row);
            // Ties resolve to the first class, as arg-max does
            let class = u8::from(row[1] > row[0]);
            Ok(Verdict {
                class,
                probability: probs[1],
                confidence: probs[0].max(probs[1]),
            })
        })
        .collect()
}
