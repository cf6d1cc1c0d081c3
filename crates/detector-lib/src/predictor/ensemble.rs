//! Ensemble combination of the base predictions

use super::meta::MetaFeatureVector;
use super::MetaLearner;
use crate::models::Verdict;
use anyhow::{bail, Result};

/// Feed the meta-features to the meta-learner and derive the final verdict
///
/// Callers only reach this after both base predictors succeeded; there is no
/// partial-input path.
pub fn combine(meta_learner: &dyn MetaLearner, features: &MetaFeatureVector) -> Result<Verdict> {
    let probability = meta_learner.predict_proba(features)?;
    if !(0.0..=1.0).contains(&probability) {
        bail!("Meta-learner returned probability {} outside [0, 1]", probability);
    }
    Ok(Verdict::from_boundary_distance(probability))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::meta_features;

    /// Returns the confidence-weighted average probability
    struct WeightedAverage;

    impl MetaLearner for WeightedAverage {
        fn predict_proba(&self, features: &MetaFeatureVector) -> Result<f64> {
            Ok(features.values()[17])
        }
    }

    struct Constant(f64);

    impl MetaLearner for Constant {
        fn predict_proba(&self, _features: &MetaFeatureVector) -> Result<f64> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_agreeing_normal_bases_stay_normal() {
        let m = meta_features(0.12, 0.05, 0.76, 0.95, 0, 0);
        let v = combine(&WeightedAverage, &m).unwrap();
        assert_eq!(v.class, 0);
        assert!(v.probability < 0.5);
        assert!((v.confidence - (v.probability - 0.5).abs() * 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_boundary_confidence() {
        let m = meta_features(0.5, 0.5, 0.0, 0.0, 0, 0);
        let v = combine(&Constant(0.9), &m).unwrap();
        assert_eq!(v.class, 1);
        assert!((v.confidence - 0.8).abs() < 1e-12);

        let v = combine(&Constant(0.5), &m).unwrap();
        assert_eq!(v.class, 0);
        assert_eq!(v.confidence, 0.0);
    }

    #[test]
    fn test_non_finite_rejected() {
        let m = meta_features(0.5, 0.5, 0.0, 0.0, 0, 0);
        assert!(combine(&Constant(f64::NAN), &m).is_err());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let m = meta_features(0.5, 0.5, 0.0, 0.0, 0, 0);
        assert!(combine(&Constant(1.7), &m).is_err());
        assert!(combine(&Constant(-0.01), &m).is_err());
    }
}
