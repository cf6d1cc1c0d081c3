//! Lazy, load-once model registry
//!
//! Each model kind sits behind its own async once-cell. The first caller
//! starts the load on a detached task that runs it on the blocking pool;
//! concurrent callers wait on the same initialization even if that first
//! caller goes away. A failed load leaves the cell empty so the next request
//! retries.

use crate::artifacts::{
    ArtifactSource, EnsembleArtifact, GraphArtifact, MetaLearnerArtifact, SequenceArtifact,
};
use crate::error::{DetectorError, Result};
use crate::health::HealthRegistry;
use crate::models::ModelKind;
use crate::observability::{DetectorMetrics, StructuredLogger};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;

/// Which artifacts are currently resident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub sequence_loaded: bool,
    pub graph_loaded: bool,
    pub ensemble_loaded: bool,
}

impl ModelStatus {
    pub fn is_loaded(&self, kind: ModelKind) -> bool {
        match kind {
            ModelKind::Sequence => self.sequence_loaded,
            ModelKind::Graph => self.graph_loaded,
            ModelKind::Ensemble => self.ensemble_loaded,
        }
    }
}

trait Versioned {
    fn version(&self) -> &str;
}

impl Versioned for SequenceArtifact {
    fn version(&self) -> &str {
        &self.version
    }
}

impl Versioned for GraphArtifact {
    fn version(&self) -> &str {
        &self.version
    }
}

impl Versioned for MetaLearnerArtifact {
    fn version(&self) -> &str {
        &self.version
    }
}

#[derive(Default)]
struct Cells {
    sequence: OnceCell<Arc<SequenceArtifact>>,
    graph: OnceCell<Arc<GraphArtifact>>,
    ensemble: OnceCell<Arc<EnsembleArtifact>>,
}

/// Everything a load needs, cheap to clone into a detached task
#[derive(Clone)]
struct Loader {
    source: Arc<dyn ArtifactSource>,
    cells: Arc<Cells>,
    health: Option<HealthRegistry>,
    metrics: DetectorMetrics,
    logger: StructuredLogger,
}

impl Loader {
    async fn sequence(&self) -> Result<Arc<SequenceArtifact>> {
        self.cells
            .sequence
            .get_or_try_init(|| async {
                let artifact = self
                    .load(ModelKind::Sequence, |s| s.load_sequence())
                    .await?;
                Ok(Arc::new(artifact))
            })
            .await
            .map(Arc::clone)
    }

    async fn graph(&self) -> Result<Arc<GraphArtifact>> {
        self.cells
            .graph
            .get_or_try_init(|| async {
                let artifact = self.load(ModelKind::Graph, |s| s.load_graph()).await?;
                Ok(Arc::new(artifact))
            })
            .await
            .map(Arc::clone)
    }

    async fn ensemble(&self) -> Result<Arc<EnsembleArtifact>> {
        self.cells
            .ensemble
            .get_or_try_init(|| async {
                let sequence = self.sequence().await?;
                let graph = self.graph().await?;
                let meta_learner = self
                    .load(ModelKind::Ensemble, |s| s.load_meta_learner())
                    .await?;
                Ok(Arc::new(EnsembleArtifact {
                    sequence,
                    graph,
                    meta_learner,
                }))
            })
            .await
            .map(Arc::clone)
    }

    async fn load<T, F>(&self, kind: ModelKind, load: F) -> Result<T>
    where
        T: Versioned + Send + 'static,
        F: FnOnce(&dyn ArtifactSource) -> anyhow::Result<T> + Send + 'static,
    {
        let source = Arc::clone(&self.source);
        let start = Instant::now();

        let outcome = tokio::task::spawn_blocking(move || load(source.as_ref()))
            .await
            .map_err(|e| DetectorError::Internal(format!("{} load task failed: {}", kind, e)))?;

        match outcome {
            Ok(artifact) => {
                self.metrics.record_model_load(kind, true);
                self.logger
                    .log_model_loaded(kind, artifact.version(), start.elapsed().as_millis());
                if let Some(health) = &self.health {
                    health.record_model_load(kind, None).await;
                }
                Ok(artifact)
            }
            Err(err) => {
                let err = DetectorError::unavailable(kind, &err);
                let reason = err.to_string();
                self.metrics.record_model_load(kind, false);
                self.logger.log_model_load_failed(kind, &reason);
                if let Some(health) = &self.health {
                    health.record_model_load(kind, Some(reason.as_str())).await;
                }
                Err(err)
            }
        }
    }
}

/// Run an initialization on its own task so a dropped caller cannot
/// release the cell while the blocking load is still running.
async fn detached<T, Fut>(kind: ModelKind, init: Fut) -> Result<T>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    tokio::spawn(init)
        .await
        .map_err(|e| DetectorError::Internal(format!("{} load task failed: {}", kind, e)))?
}

pub struct ModelRegistry {
    loader: Loader,
}

impl ModelRegistry {
    pub fn new(source: Arc<dyn ArtifactSource>) -> Self {
        Self {
            loader: Loader {
                source,
                cells: Arc::new(Cells::default()),
                health: None,
                metrics: DetectorMetrics::new(),
                logger: StructuredLogger::new("botnet-detector"),
            },
        }
    }

    /// Report load outcomes to a health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.loader.health = Some(health);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.loader.logger = logger;
        self
    }

    pub async fn sequence(&self) -> Result<Arc<SequenceArtifact>> {
        if let Some(artifact) = self.loader.cells.sequence.get() {
            return Ok(Arc::clone(artifact));
        }
        let loader = self.loader.clone();
        detached(ModelKind::Sequence, async move { loader.sequence().await }).await
    }

    pub async fn graph(&self) -> Result<Arc<GraphArtifact>> {
        if let Some(artifact) = self.loader.cells.graph.get() {
            return Ok(Arc::clone(artifact));
        }
        let loader = self.loader.clone();
        detached(ModelKind::Graph, async move { loader.graph().await }).await
    }

    /// Ensemble bundle; loads both base artifacts first
    pub async fn ensemble(&self) -> Result<Arc<EnsembleArtifact>> {
        if let Some(artifact) = self.loader.cells.ensemble.get() {
            return Ok(Arc::clone(artifact));
        }
        let loader = self.loader.clone();
        detached(ModelKind::Ensemble, async move { loader.ensemble().await }).await
    }

    /// Load the artifact for `kind` without scoring anything
    pub async fn ensure_loaded(&self, kind: ModelKind) -> Result<()> {
        match kind {
            ModelKind::Sequence => self.sequence().await.map(|_| ()),
            ModelKind::Graph => self.graph().await.map(|_| ()),
            ModelKind::Ensemble => self.ensemble().await.map(|_| ()),
        }
    }

    /// Snapshot of resident artifacts; never triggers a load
    pub fn status(&self) -> ModelStatus {
        let cells = &self.loader.cells;
        ModelStatus {
            sequence_loaded: cells.sequence.initialized(),
            graph_loaded: cells.graph.initialized(),
            ensemble_loaded: cells.ensemble.initialized(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{components, ComponentStatus};
    use crate::testing::FixtureSource;
    use std::time::Duration;

    fn registry(source: &Arc<FixtureSource>) -> ModelRegistry {
        ModelRegistry::new(Arc::clone(source) as Arc<dyn ArtifactSource>)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_loads_once() {
        let source = Arc::new(FixtureSource::slow(Duration::from_millis(50)));
        let registry = Arc::new(registry(&source));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.sequence().await })
            })
            .collect();

        let mut artifacts = Vec::new();
        for handle in handles {
            artifacts.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(source.loads(ModelKind::Sequence), 1);
        assert!(artifacts.iter().all(|a| Arc::ptr_eq(a, &artifacts[0])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_abandoned_first_caller_does_not_duplicate_load() {
        let source = Arc::new(FixtureSource::slow(Duration::from_millis(300)));
        let registry = Arc::new(registry(&source));

        let first = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.sequence().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        first.abort();
        assert!(first.await.is_err());

        let artifact = registry.sequence().await.unwrap();
        assert_eq!(source.loads(ModelKind::Sequence), 1);
        assert!(Arc::ptr_eq(&artifact, &registry.sequence().await.unwrap()));
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let source = Arc::new(FixtureSource::failing(ModelKind::Graph, 1));
        let registry = registry(&source);

        let err = registry.graph().await.err().unwrap();
        assert!(err.is_unavailable());
        assert!(!registry.status().graph_loaded);

        assert!(registry.graph().await.is_ok());
        assert_eq!(source.loads(ModelKind::Graph), 2);
        assert!(registry.status().graph_loaded);
    }

    #[tokio::test]
    async fn test_ensemble_loads_bases_first() {
        let source = Arc::new(FixtureSource::default());
        let registry = registry(&source);

        let ensemble = registry.ensemble().await.unwrap();
        assert_eq!(ensemble.version(), "fixture-meta");

        let status = registry.status();
        assert!(status.sequence_loaded && status.graph_loaded && status.ensemble_loaded);

        // Bases are shared with the standalone cells, not reloaded
        let sequence = registry.sequence().await.unwrap();
        assert!(Arc::ptr_eq(&sequence, &ensemble.sequence));
        assert_eq!(source.loads(ModelKind::Sequence), 1);
        assert_eq!(source.loads(ModelKind::Graph), 1);
        assert_eq!(source.loads(ModelKind::Ensemble), 1);
    }

    #[tokio::test]
    async fn test_ensemble_fails_when_base_fails() {
        let source = Arc::new(FixtureSource::failing(ModelKind::Sequence, 1));
        let registry = registry(&source);

        match registry.ensemble().await {
            Err(DetectorError::ModelUnavailable { kind, .. }) => {
                assert_eq!(kind, ModelKind::Sequence)
            }
            other => panic!("expected unavailable sequence model, got {:?}", other.err()),
        }
        assert_eq!(source.loads(ModelKind::Ensemble), 0);
        assert!(!registry.status().ensemble_loaded);

        assert!(registry.ensemble().await.is_ok());
    }

    #[tokio::test]
    async fn test_status_has_no_side_effects() {
        let source = Arc::new(FixtureSource::default());
        let registry = registry(&source);

        let status = registry.status();
        assert!(!status.is_loaded(ModelKind::Sequence));
        assert!(!status.is_loaded(ModelKind::Ensemble));
        for kind in ModelKind::ALL {
            assert_eq!(source.loads(kind), 0);
        }
    }

    #[tokio::test]
    async fn test_health_tracks_load_outcome() {
        let health = HealthRegistry::new();
        let source = Arc::new(FixtureSource::failing(ModelKind::Sequence, 1));
        let registry = registry(&source).with_health(health.clone());

        assert!(registry.ensure_loaded(ModelKind::Sequence).await.is_err());
        let report = health.health().await;
        assert_eq!(
            report.components[components::SEQUENCE_MODEL].status,
            ComponentStatus::Unhealthy
        );

        registry.ensure_loaded(ModelKind::Sequence).await.unwrap();
        let report = health.health().await;
        assert_eq!(
            report.components[components::SEQUENCE_MODEL].status,
            ComponentStatus::Healthy
        );
    }
}
