//! Feature normalization for ML inference
//!
//! Maps an arbitrary named-feature input onto the fixed 42-value vector all
//! scalers and models were fit against. Missing names become zero, unknown
//! names are dropped, and non-finite values are replaced before any scaler
//! sees them.

use crate::models::FeatureMap;
use std::collections::{BTreeMap, HashMap};

/// Number of input features expected by every model
pub const NUM_FEATURES: usize = 42;

/// Replacement for positive infinity
pub const POS_INF_SENTINEL: f64 = 1e10;

/// Replacement for negative infinity
pub const NEG_INF_SENTINEL: f64 = -1e10;

/// Canonical feature order. Versioned together with the model artifacts.
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "Flow Duration",
    "Tot Fwd Pkts",
    "Tot Bwd Pkts",
    "TotLen Fwd Pkts",
    "TotLen Bwd Pkts",
    "Fwd Pkt Len Max",
    "Fwd Pkt Len Min",
    "Fwd Pkt Len Mean",
    "Fwd Pkt Len Std",
    "Bwd Pkt Len Max",
    "Bwd Pkt Len Min",
    "Bwd Pkt Len Mean",
    "Bwd Pkt Len Std",
    "Flow Byts/s",
    "Flow Pkts/s",
    "Flow IAT Mean",
    "Flow IAT Std",
    "Flow IAT Max",
    "Flow IAT Min",
    "Fwd IAT Mean",
    "Fwd IAT Std",
    "Bwd IAT Mean",
    "Bwd IAT Std",
    "Fwd Header Len",
    "Bwd Header Len",
    "Fwd Pkts/s",
    "Bwd Pkts/s",
    "Pkt Len Min",
    "Pkt Len Max",
    "Pkt Len Mean",
    "Pkt Len Std",
    "FIN Flag Cnt",
    "SYN Flag Cnt",
    "RST Flag Cnt",
    "ACK Flag Cnt",
    "Pkt Size Avg",
    "Fwd Seg Size Avg",
    "Bwd Seg Size Avg",
    "Active Mean",
    "Active Std",
    "Idle Mean",
    "Idle Std",
];

/// Fixed-order, fixed-length vector of finite feature values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; NUM_FEATURES]);

impl FeatureVector {
    pub fn zeros() -> Self {
        Self([0.0; NUM_FEATURES])
    }

    /// Build from raw values, sanitizing each one
    pub fn from_values(values: [f64; NUM_FEATURES]) -> Self {
        Self(values.map(sanitize))
    }

    pub fn values(&self) -> &[f64; NUM_FEATURES] {
        &self.0
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|idx| self.0[idx])
    }

    /// Canonical name to value map, used for outbound records
    pub fn to_named_map(&self) -> BTreeMap<String, f64> {
        FEATURE_NAMES
            .iter()
            .zip(self.0.iter())
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::zeros()
    }
}

/// Replace NaN and infinities with finite stand-ins
pub fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else if value == f64::INFINITY {
        POS_INF_SENTINEL
    } else if value == f64::NEG_INFINITY {
        NEG_INF_SENTINEL
    } else {
        value
    }
}

/// Best-effort numeric coercion of an inbound JSON value
///
/// Numeric strings are parsed (including "NaN" and "inf"); anything else
/// that is not a number yields NaN so it is zeroed by [`sanitize`].
pub fn coerce(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        serde_json::Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Maps named features onto the canonical vector
#[derive(Debug, Clone)]
pub struct FeatureNormalizer {
    index: HashMap<&'static str, usize>,
}

impl FeatureNormalizer {
    pub fn new() -> Self {
        let index = FEATURE_NAMES
            .iter()
            .enumerate()
            .map(|(idx, name)| (*name, idx))
            .collect();
        Self { index }
    }

    /// Position of a feature in the canonical order
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Normalize an iterator of (name, value) pairs
    pub fn normalize<'a, I>(&self, features: I) -> FeatureVector
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut values = [0.0; NUM_FEATURES];
        for (name, value) in features {
            if let Some(idx) = self.index_of(name) {
                values[idx] = sanitize(value);
            }
        }
        FeatureVector(values)
    }

    /// Normalize an inbound JSON feature map
    pub fn normalize_map(&self, features: &FeatureMap) -> FeatureVector {
        self.normalize(features.iter().map(|(k, v)| (k.as_str(), coerce(v))))
    }

    /// Normalize a dataset row
    pub fn normalize_row(&self, row: &BTreeMap<String, f64>) -> FeatureVector {
        self.normalize(row.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

impl Default for FeatureNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, serde_json::Value)]) -> FeatureMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn all_finite(v: &FeatureVector) -> bool {
        v.values().iter().all(|x| x.is_finite())
    }

    #[test]
    fn test_canonical_names_are_unique() {
        let normalizer = FeatureNormalizer::new();
        assert_eq!(normalizer.index.len(), NUM_FEATURES);
        assert_eq!(normalizer.index_of("Flow Duration"), Some(0));
        assert_eq!(normalizer.index_of("Idle Std"), Some(41));
    }

    #[test]
    fn test_empty_input_is_all_zero() {
        let v = FeatureNormalizer::new().normalize_map(&FeatureMap::new());
        assert_eq!(v.values().len(), NUM_FEATURES);
        assert!(v.values().iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_subset_and_unknown_names() {
        let input = map(&[
            ("Tot Fwd Pkts", json!(10.0)),
            ("Flow Duration", json!(120000)),
            ("Src IP", json!("10.0.0.1")),
            ("_actual_label", json!(1)),
        ]);
        let v = FeatureNormalizer::new().normalize_map(&input);
        assert_eq!(v.values()[0], 120000.0);
        assert_eq!(v.values()[1], 10.0);
        assert_eq!(v.get("Tot Bwd Pkts"), Some(0.0));
        assert_eq!(v.values().iter().filter(|x| **x != 0.0).count(), 2);
    }

    #[test]
    fn test_non_finite_replacement() {
        let input = map(&[
            ("Flow Byts/s", json!("inf")),
            ("Flow Pkts/s", json!("-inf")),
            ("Flow IAT Mean", json!("NaN")),
        ]);
        let v = FeatureNormalizer::new().normalize_map(&input);
        assert_eq!(v.get("Flow Byts/s"), Some(POS_INF_SENTINEL));
        assert_eq!(v.get("Flow Pkts/s"), Some(NEG_INF_SENTINEL));
        assert_eq!(v.get("Flow IAT Mean"), Some(0.0));
        assert!(all_finite(&v));
    }

    #[test]
    fn test_malformed_values_become_zero() {
        let input = map(&[
            ("Flow Duration", json!("not a number")),
            ("Tot Fwd Pkts", json!(null)),
            ("Tot Bwd Pkts", json!([1, 2])),
            ("FIN Flag Cnt", json!(true)),
            ("SYN Flag Cnt", json!(" 3 ")),
        ]);
        let v = FeatureNormalizer::new().normalize_map(&input);
        assert_eq!(v.get("Flow Duration"), Some(0.0));
        assert_eq!(v.get("Tot Fwd Pkts"), Some(0.0));
        assert_eq!(v.get("Tot Bwd Pkts"), Some(0.0));
        assert_eq!(v.get("FIN Flag Cnt"), Some(0.0));
        assert_eq!(v.get("SYN Flag Cnt"), Some(3.0));
    }

    #[test]
    fn test_row_normalization_sanitizes() {
        let mut row = BTreeMap::new();
        row.insert("Flow Byts/s".to_string(), f64::INFINITY);
        row.insert("Idle Std".to_string(), f64::NAN);
        row.insert("Label".to_string(), 1.0);
        let v = FeatureNormalizer::new().normalize_row(&row);
        assert_eq!(v.get("Flow Byts/s"), Some(POS_INF_SENTINEL));
        assert_eq!(v.get("Idle Std"), Some(0.0));
        assert!(all_finite(&v));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let normalizer = FeatureNormalizer::new();
        let input = map(&[
            ("Flow Duration", json!(5.5)),
            ("Pkt Len Std", json!("inf")),
            ("Idle Mean", json!(-2)),
        ]);
        let first = normalizer.normalize_map(&input);
        let second = normalizer.normalize_map(&input);
        assert_eq!(first, second);

        // Feeding the normalized output back in changes nothing
        let named = first.to_named_map();
        assert_eq!(normalizer.normalize_row(&named), first);
    }

    #[test]
    fn test_from_values_sanitizes() {
        let mut raw = [1.0; NUM_FEATURES];
        raw[3] = f64::NAN;
        raw[4] = f64::NEG_INFINITY;
        let v = FeatureVector::from_values(raw);
        assert_eq!(v.values()[3], 0.0);
        assert_eq!(v.values()[4], NEG_INF_SENTINEL);
    }
}
