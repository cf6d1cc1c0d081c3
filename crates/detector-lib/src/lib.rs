//! Detector library for botnet network-flow classification
//!
//! This crate provides the core functionality for:
//! - Feature normalization onto the canonical 42-feature layout
//! - Lazy, load-once model artifacts (sequence, graph, ensemble)
//! - Ensemble inference with meta-feature derivation
//! - Reference dataset sampling, batch evaluation and live monitoring
//! - Health checks and observability

pub mod artifacts;
pub mod detector;
pub mod error;
pub mod evaluation;
pub mod health;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod predictor;
pub mod registry;
pub mod sampler;
pub mod sink;

#[cfg(test)]
pub(crate) mod testing;

pub use artifacts::{ArtifactPaths, ArtifactSource, FileArtifactSource};
pub use detector::{Detector, EnsembleBreakdown};
pub use error::{DetectorError, Result};
pub use evaluation::{BatchEvaluator, BatchReport, BatchRequest, ItemOutcome, MAX_BATCH_SIZE};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use monitor::{LiveMonitor, MonitorConfig, MonitorReport, MonitorSummary, StreamReading};
pub use observability::{DetectorMetrics, StructuredLogger};
pub use registry::{ModelRegistry, ModelStatus};
pub use sampler::{DatasetInfo, DatasetSampler, ReferenceDataset};
pub use sink::{forward_to_log, ChannelSink, DetectionEvent, EventSink, LogSink};
