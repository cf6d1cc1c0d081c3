//! Sequence model scoring

use super::features::FeatureVector;
use crate::artifacts::SequenceArtifact;
use crate::models::Verdict;
use anyhow::{bail, Result};

/// Score one flow with the sequence model
///
/// Uses the scaler bundled with the sequence artifact; confidence is the
/// distance of the probability from the 0.5 boundary, scaled to [0, 1].
pub fn predict(artifact: &SequenceArtifact, features: &FeatureVector) -> Result<Verdict> {
    let scaled = artifact.scaler.transform(features);
    let probability = artifact.model.forward(&scaled)?;
    if !(0.0..=1.0).contains(&probability) {
        bail!("Sequence model returned probability {} outside [0, 1]", probability);
    }
    Ok(Verdict::from_boundary_distance(probability))
}
