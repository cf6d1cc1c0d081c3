//! Model artifact bundles and where they are loaded from
//!
//! An artifact is immutable once loaded: trained model, the scaler it was
//! fit with, and any auxiliary metadata. Loading goes through the
//! [`ArtifactSource`] trait so the registry does not care whether the
//! artifacts come from disk or from test fixtures.

use crate::predictor::{
    check_feature_order, GraphModel, LogisticMetaLearner, MetaLearner, OnnxGraphModel,
    OnnxMetaLearner, OnnxSequenceModel, SequenceModel, StandardScaler, FEATURE_NAMES,
    NUM_FEATURES,
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub struct SequenceArtifact {
    pub model: Box<dyn SequenceModel>,
    pub scaler: StandardScaler,
    pub version: String,
}

pub struct GraphArtifact {
    pub model: Box<dyn GraphModel>,
    pub scaler: StandardScaler,
    pub feature_info: FeatureInfo,
    pub version: String,
}

pub struct MetaLearnerArtifact {
    pub model: Box<dyn MetaLearner>,
    pub version: String,
}

/// Ensemble bundle; holds the base artifacts it was assembled from
pub struct EnsembleArtifact {
    pub sequence: Arc<SequenceArtifact>,
    pub graph: Arc<GraphArtifact>,
    pub meta_learner: MetaLearnerArtifact,
}

impl EnsembleArtifact {
    pub fn version(&self) -> &str {
        &self.meta_learner.version
    }
}

/// Feature metadata exported next to the graph model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub feature_names: Vec<String>,
    pub num_features: usize,
}

impl FeatureInfo {
    pub fn canonical() -> Self {
        Self {
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            num_features: NUM_FEATURES,
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let info: Self =
            serde_json::from_slice(bytes).context("Failed to parse feature info JSON")?;
        if info.num_features != NUM_FEATURES {
            bail!(
                "Feature info declares {} features, expected {}",
                info.num_features,
                NUM_FEATURES
            );
        }
        check_feature_order(&info.feature_names)?;
        Ok(info)
    }
}

/// Source of model artifacts
///
/// Loads are blocking; the registry runs them off the async executor.
pub trait ArtifactSource: Send + Sync {
    fn load_sequence(&self) -> Result<SequenceArtifact>;
    fn load_graph(&self) -> Result<GraphArtifact>;
    fn load_meta_learner(&self) -> Result<MetaLearnerArtifact>;
}

/// File layout of a model directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub sequence_model: PathBuf,
    pub sequence_scaler: PathBuf,
    pub graph_model: PathBuf,
    pub graph_scaler: PathBuf,
    pub graph_feature_info: PathBuf,
    pub meta_learner_onnx: PathBuf,
    pub meta_learner_json: PathBuf,
    pub manifest: PathBuf,
}

impl ArtifactPaths {
    /// Default file names inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            sequence_model: dir.join("lstm_final_model.onnx"),
            sequence_scaler: dir.join("lstm_scaler.json"),
            graph_model: dir.join("enhanced_gcn_42feat.onnx"),
            graph_scaler: dir.join("enhanced_gcn_scaler.json"),
            graph_feature_info: dir.join("enhanced_gcn_feature_info.json"),
            meta_learner_onnx: dir.join("enhanced_meta_learner.onnx"),
            meta_learner_json: dir.join("enhanced_meta_learner.json"),
            manifest: dir.join("checksums.json"),
            dir,
        }
    }
}

/// Loads artifacts from a model directory, verifying SHA-256 checksums when
/// a `checksums.json` manifest is present
pub struct FileArtifactSource {
    paths: ArtifactPaths,
}

impl FileArtifactSource {
    pub fn new(paths: ArtifactPaths) -> Self {
        Self { paths }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(ArtifactPaths::in_dir(dir))
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Manifest is re-read on every load so a fixed directory recovers
    /// without a restart
    fn manifest(&self) -> Result<Option<HashMap<String, String>>> {
        if !self.paths.manifest.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&self.paths.manifest).with_context(|| {
            format!("Failed to read manifest {}", self.paths.manifest.display())
        })?;
        let manifest = serde_json::from_slice(&bytes).with_context(|| {
            format!("Invalid manifest {}", self.paths.manifest.display())
        })?;
        Ok(Some(manifest))
    }

    /// Read a file and check it against the manifest, returning its bytes
    /// and a short content digest
    fn read_verified(&self, path: &Path) -> Result<(Vec<u8>, String)> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let digest = hex::encode(Sha256::digest(&bytes));

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if let Some(manifest) = self.manifest()? {
            if let Some(expected) = manifest.get(name) {
                if !expected.eq_ignore_ascii_case(&digest) {
                    bail!(
                        "Checksum mismatch for {}: expected {}, got {}",
                        path.display(),
                        expected,
                        digest
                    );
                }
                debug!(file = %name, "Checksum verified");
            }
        }
        Ok((bytes, digest))
    }

    fn version_of(path: &Path, digest: &str) -> String {
        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("model");
        format!("{}@{}", name, &digest[..12])
    }

    fn load_scaler(&self, path: &Path) -> Result<StandardScaler> {
        let (bytes, _) = self.read_verified(path)?;
        StandardScaler::from_json(&bytes).with_context(|| format!("Invalid scaler {}", path.display()))
    }
}

impl ArtifactSource for FileArtifactSource {
    fn load_sequence(&self) -> Result<SequenceArtifact> {
        let path = &self.paths.sequence_model;
        let (bytes, digest) = self.read_verified(path)?;
        let model = OnnxSequenceModel::new(&bytes)
            .with_context(|| format!("Failed to load sequence model {}", path.display()))?;
        let scaler = self.load_scaler(&self.paths.sequence_scaler)?;
        Ok(SequenceArtifact {
            model: Box::new(model),
            scaler,
            version: Self::version_of(path, &digest),
        })
    }

    fn load_graph(&self) -> Result<GraphArtifact> {
        let path = &self.paths.graph_model;
        let (bytes, digest) = self.read_verified(path)?;
        let model = OnnxGraphModel::new(&bytes)
            .with_context(|| format!("Failed to load graph model {}", path.display()))?;
        let scaler = self.load_scaler(&self.paths.graph_scaler)?;
        let (info_bytes, _) = self.read_verified(&self.paths.graph_feature_info)?;
        let feature_info = FeatureInfo::from_json(&info_bytes).with_context(|| {
            format!("Invalid feature info {}", self.paths.graph_feature_info.display())
        })?;
        Ok(GraphArtifact {
            model: Box::new(model),
            scaler,
            feature_info,
            version: Self::version_of(path, &digest),
        })
    }

    fn load_meta_learner(&self) -> Result<MetaLearnerArtifact> {
        let onnx = &self.paths.meta_learner_onnx;
        let json = &self.paths.meta_learner_json;

        if onnx.exists() {
            let (bytes, digest) = self.read_verified(onnx)?;
            let model = OnnxMetaLearner::new(&bytes)
                .with_context(|| format!("Failed to load meta-learner {}", onnx.display()))?;
            return Ok(MetaLearnerArtifact {
                model: Box::new(model),
                version: Self::version_of(onnx, &digest),
            });
        }
        if json.exists() {
            let (bytes, digest) = self.read_verified(json)?;
            let model = LogisticMetaLearner::from_json(&bytes)
                .with_context(|| format!("Invalid meta-learner {}", json.display()))?;
            return Ok(MetaLearnerArtifact {
                model: Box::new(model),
                version: Self::version_of(json, &digest),
            });
        }
        bail!(
            "No meta-learner found (looked for {} and {})",
            onnx.display(),
            json.display()
        )
    }
}
