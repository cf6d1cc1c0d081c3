//! Standard scaler fitted at training time

use super::features::{FeatureVector, FEATURE_NAMES, NUM_FEATURES};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Scaled feature values, same order as [`FeatureVector`]
pub type ScaledFeatures = [f64; NUM_FEATURES];

/// Per-feature standardization `(x - mean) / scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    /// Column order the scaler was fit on, when exported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
}

impl StandardScaler {
    /// Scaler that leaves values unchanged
    pub fn identity() -> Self {
        Self {
            mean: vec![0.0; NUM_FEATURES],
            scale: vec![1.0; NUM_FEATURES],
            feature_names: None,
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let scaler: Self = serde_json::from_slice(bytes).context("Failed to parse scaler JSON")?;
        scaler.validate()?;
        Ok(scaler)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read scaler {}", path.display()))?;
        Self::from_json(&bytes).with_context(|| format!("Invalid scaler {}", path.display()))
    }

    /// Reject scalers that do not match the canonical layout
    pub fn validate(&self) -> Result<()> {
        if self.mean.len() != NUM_FEATURES || self.scale.len() != NUM_FEATURES {
            bail!(
                "Scaler has {} means and {} scales, expected {}",
                self.mean.len(),
                self.scale.len(),
                NUM_FEATURES
            );
        }
        if self.mean.iter().chain(self.scale.iter()).any(|v| !v.is_finite()) {
            bail!("Scaler contains non-finite parameters");
        }
        if let Some(names) = &self.feature_names {
            check_feature_order(names)?;
        }
        Ok(())
    }

    pub fn transform(&self, features: &FeatureVector) -> ScaledFeatures {
        let mut out = [0.0; NUM_FEATURES];
        for (idx, value) in features.values().iter().enumerate() {
            // A zero scale means the column was constant during fitting
            let scale = if self.scale[idx] == 0.0 { 1.0 } else { self.scale[idx] };
            out[idx] = (value - self.mean[idx]) / scale;
        }
        out
    }
}

/// Ensure an exported feature list matches the canonical order exactly
pub fn check_feature_order(names: &[String]) -> Result<()> {
    if names.len() != NUM_FEATURES {
        bail!(
            "Artifact lists {} features, expected {}",
            names.len(),
            NUM_FEATURES
        );
    }
    for (idx, (got, want)) in names.iter().zip(FEATURE_NAMES.iter()).enumerate() {
        if got != want {
            bail!(
                "Feature order mismatch at position {}: artifact has '{}', expected '{}'",
                idx,
                got,
                want
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scaler_json(mean: f64, scale: f64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "mean": vec![mean; NUM_FEATURES],
            "scale": vec![scale; NUM_FEATURES],
        }))
        .unwrap()
    }

    #[test]
    fn test_transform() {
        let scaler = StandardScaler::from_json(&scaler_json(1.0, 2.0)).unwrap();
        let scaled = scaler.transform(&FeatureVector::from_values([5.0; NUM_FEATURES]));
        assert!(scaled.iter().all(|v| (*v - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_zero_scale_treated_as_one() {
        let mut scaler = StandardScaler::identity();
        scaler.scale[0] = 0.0;
        scaler.mean[0] = 3.0;
        let scaled = scaler.transform(&FeatureVector::from_values([4.0; NUM_FEATURES]));
        assert_eq!(scaled[0], 1.0);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let bytes = serde_json::to_vec(&json!({"mean": [0.0, 1.0], "scale": [1.0, 1.0]})).unwrap();
        let err = StandardScaler::from_json(&bytes).unwrap_err();
        assert!(format!("{:#}", err).contains("expected 42"));
    }

    #[test]
    fn test_feature_order_checked() {
        let mut names: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
        assert!(check_feature_order(&names).is_ok());

        names.swap(0, 1);
        let err = check_feature_order(&names).unwrap_err();
        assert!(err.to_string().contains("position 0"));

        let mut scaler = StandardScaler::identity();
        scaler.feature_names = Some(names);
        assert!(scaler.validate().is_err());
    }
}
