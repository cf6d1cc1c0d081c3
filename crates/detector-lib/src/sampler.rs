//! Reference dataset sampling
//!
//! The dataset is a comma-separated table of flow features with an optional
//! `Label` column. It is loaded lazily on first use and kept for the process
//! lifetime; if it cannot be loaded, sampling yields nothing and the next
//! call tries again.

use crate::health::{components, HealthRegistry};
use crate::models::{Sample, CLASS_BOTNET, CLASS_NORMAL};
use crate::observability::DetectorMetrics;
use crate::predictor::sanitize;
use anyhow::{bail, Context, Result};
use rand::seq::{index, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Name of the ground-truth column
pub const LABEL_COLUMN: &str = "Label";

/// Feature names listed by [`DatasetInfo`]
const INFO_FEATURE_PREVIEW: usize = 10;

/// Parsed, immutable reference table
#[derive(Debug, Clone)]
pub struct ReferenceDataset {
    feature_columns: Vec<String>,
    rows: Vec<Vec<f64>>,
    /// Per-row label; `None` when the table has no label column
    labels: Option<Vec<Option<u8>>>,
}

fn parse_label(raw: &str) -> Option<u8> {
    let raw = raw.trim().trim_matches('"');
    if let Ok(value) = raw.parse::<f64>() {
        if !value.is_finite() || value.fract() != 0.0 {
            return None;
        }
        return match value as i64 {
            0 => Some(CLASS_NORMAL),
            1 => Some(CLASS_BOTNET),
            _ => None,
        };
    }
    match raw.to_ascii_lowercase().as_str() {
        "normal" | "benign" | "background" => Some(CLASS_NORMAL),
        "botnet" | "bot" | "malicious" => Some(CLASS_BOTNET),
        _ => None,
    }
}

/// Split one CSV record; commas inside double quotes stay in the field and
/// `""` inside a quoted field is a literal quote.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

impl ReferenceDataset {
    pub fn from_csv_str(content: &str) -> Result<Self> {
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let header = lines.next().context("Dataset is empty")?;
        let columns: Vec<String> = split_fields(header)
            .iter()
            .map(|c| c.trim().to_string())
            .collect();

        let label_idx = columns.iter().position(|c| c == LABEL_COLUMN);
        let feature_columns: Vec<String> = columns
            .iter()
            .filter(|c| c.as_str() != LABEL_COLUMN)
            .cloned()
            .collect();
        if feature_columns.is_empty() {
            bail!("Dataset has no feature columns");
        }

        let mut rows = Vec::new();
        let mut labels = label_idx.map(|_| Vec::new());
        let mut skipped = 0usize;

        for line in lines {
            let fields = split_fields(line);
            if fields.len() != columns.len() {
                skipped += 1;
                continue;
            }

            let mut values = Vec::with_capacity(feature_columns.len());
            for (idx, field) in fields.iter().enumerate() {
                if Some(idx) == label_idx {
                    continue;
                }
                let value = field.trim().parse::<f64>().unwrap_or(f64::NAN);
                values.push(sanitize(value));
            }
            rows.push(values);

            if let (Some(idx), Some(labels)) = (label_idx, labels.as_mut()) {
                labels.push(parse_label(&fields[idx]));
            }
        }

        if skipped > 0 {
            warn!(skipped, "Skipped malformed dataset rows");
        }

        Ok(Self {
            feature_columns,
            rows,
            labels,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset {}", path.display()))?;
        Self::from_csv_str(&content).with_context(|| format!("Invalid dataset {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_labels(&self) -> bool {
        self.labels.is_some()
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    fn class_indices(&self, class: u8) -> Vec<usize> {
        match &self.labels {
            Some(labels) => labels
                .iter()
                .enumerate()
                .filter(|(_, l)| **l == Some(class))
                .map(|(i, _)| i)
                .collect(),
            None => Vec::new(),
        }
    }

    fn sample_at(&self, idx: usize) -> Sample {
        Sample {
            features: self
                .feature_columns
                .iter()
                .cloned()
                .zip(self.rows[idx].iter().copied())
                .collect(),
            label: self.labels.as_ref().and_then(|l| l[idx]),
        }
    }

    /// Draw up to `n` rows without replacement
    ///
    /// Balanced draws take `n / 2` rows from each class, capped at what the
    /// class has, then shuffle the union. Without labels, or when not
    /// balanced, `min(n, len)` rows are drawn uniformly.
    pub fn sample_with_rng<R: Rng + ?Sized>(&self, n: usize, balanced: bool, rng: &mut R) -> Vec<Sample> {
        let mut picked: Vec<usize> = if balanced && self.has_labels() {
            let per_class = n / 2;
            let mut picked = Vec::with_capacity(per_class * 2);
            for class in [CLASS_NORMAL, CLASS_BOTNET] {
                let pool = self.class_indices(class);
                picked.extend(pool.choose_multiple(rng, per_class.min(pool.len())).copied());
            }
            picked
        } else {
            index::sample(rng, self.len(), n.min(self.len())).into_vec()
        };
        picked.shuffle(rng);
        picked.into_iter().map(|idx| self.sample_at(idx)).collect()
    }

    pub fn info(&self) -> DatasetInfo {
        let (normal, botnet) = if self.has_labels() {
            (
                Some(self.class_indices(CLASS_NORMAL).len()),
                Some(self.class_indices(CLASS_BOTNET).len()),
            )
        } else {
            (None, None)
        };
        let botnet_percentage = botnet.filter(|_| !self.is_empty()).map(|b| {
            crate::models::round2(b as f64 / self.len() as f64 * 100.0)
        });

        DatasetInfo {
            total_samples: self.len(),
            num_features: self.feature_columns.len(),
            feature_names: self
                .feature_columns
                .iter()
                .take(INFO_FEATURE_PREVIEW)
                .cloned()
                .collect(),
            has_labels: self.has_labels(),
            normal_samples: normal,
            botnet_samples: botnet,
            botnet_percentage,
        }
    }
}

/// Summary of the reference dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub total_samples: usize,
    pub num_features: usize,
    /// First few feature column names
    pub feature_names: Vec<String>,
    pub has_labels: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normal_samples: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub botnet_samples: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub botnet_percentage: Option<f64>,
}

/// Lazily loaded sampler over the reference dataset
pub struct DatasetSampler {
    path: PathBuf,
    dataset: OnceCell<Arc<ReferenceDataset>>,
    health: Option<HealthRegistry>,
    metrics: DetectorMetrics,
}

impl DatasetSampler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dataset: OnceCell::new(),
            health: None,
            metrics: DetectorMetrics::new(),
        }
    }

    /// Sampler over an already parsed dataset
    pub fn from_dataset(dataset: ReferenceDataset) -> Self {
        Self {
            path: PathBuf::new(),
            dataset: OnceCell::new_with(Some(Arc::new(dataset))),
            health: None,
            metrics: DetectorMetrics::new(),
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The dataset, loading it on first use; `None` when unavailable
    pub async fn dataset(&self) -> Option<Arc<ReferenceDataset>> {
        let result = self
            .dataset
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let dataset = tokio::task::spawn_blocking(move || ReferenceDataset::from_path(&path))
                    .await
                    .context("Dataset load task failed")??;
                Ok::<_, anyhow::Error>(Arc::new(dataset))
            })
            .await;

        match result {
            Ok(dataset) => {
                if let Some(health) = &self.health {
                    health.set_healthy(components::DATASET).await;
                }
                self.metrics.set_dataset_rows(dataset.len() as i64);
                Some(Arc::clone(dataset))
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %format!("{:#}", err), "Reference dataset unavailable");
                if let Some(health) = &self.health {
                    health
                        .set_degraded(components::DATASET, format!("{:#}", err))
                        .await;
                }
                None
            }
        }
    }

    /// Random samples; empty when the dataset is unavailable
    pub async fn sample(&self, n: usize, balanced: bool) -> Vec<Sample> {
        match self.dataset().await {
            Some(dataset) => {
                let samples = dataset.sample_with_rng(n, balanced, &mut rand::thread_rng());
                debug!(requested = n, returned = samples.len(), balanced, "Sampled reference rows");
                samples
            }
            None => Vec::new(),
        }
    }

    pub async fn info(&self) -> Option<DatasetInfo> {
        self.dataset().await.map(|d| d.info())
    }

    pub async fn feature_columns(&self) -> Vec<String> {
        self.dataset()
            .await
            .map(|d| d.feature_columns().to_vec())
            .unwrap_or_default()
    }

    /// Load eagerly, logging the outcome
    pub async fn preload(&self) -> bool {
        match self.dataset().await {
            Some(dataset) => {
                info!(rows = dataset.len(), labelled = dataset.has_labels(), "Reference dataset loaded");
                true
            }
            None => false,
        }
    }
}
