//! Botnet Detector - network-flow classification service
//!
//! Serves single-flow, batch and live-replay detection over HTTP, backed by
//! lazily loaded sequence, graph and ensemble model artifacts.

use anyhow::Result;
use detector_lib::{
    forward_to_log,
    health::{components, HealthRegistry},
    ChannelSink, DatasetSampler, Detector, FileArtifactSource, LogSink, ModelKind, ModelRegistry,
    StructuredLogger,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const DETECTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting botnet-detector");

    let config = config::DetectorConfig::load()?;
    info!(
        service = %config.service_name,
        model_dir = %config.model_dir,
        dataset = %config.dataset_path,
        "Detector configured"
    );

    let logger = StructuredLogger::new(&config.service_name);
    logger.log_startup(DETECTOR_VERSION, &config.model_dir);

    // Models and the dataset load on first use; until then they count as healthy
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SEQUENCE_MODEL).await;
    health_registry.register(components::GRAPH_MODEL).await;
    health_registry.register(components::ENSEMBLE_MODEL).await;
    health_registry.register(components::DATASET).await;

    let source = Arc::new(FileArtifactSource::in_dir(&config.model_dir));
    let registry = ModelRegistry::new(source)
        .with_health(health_registry.clone())
        .with_logger(logger.clone());
    let detector = Arc::new(Detector::new(Arc::new(registry)));
    let sampler = Arc::new(
        DatasetSampler::new(&config.dataset_path).with_health(health_registry.clone()),
    );

    let (sink, events) = ChannelSink::new(config.event_buffer);
    let forwarder = tokio::spawn(forward_to_log(events, LogSink::new(logger.clone())));

    if config.warm_up {
        // Failures are already reflected in health; the service still starts
        if let Err(e) = detector.registry().ensure_loaded(ModelKind::Ensemble).await {
            warn!(error = %e, "Model warm-up failed");
        }
        sampler.preload().await;
    }

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        Arc::clone(&detector),
        sampler,
        Arc::new(sink),
    ));

    health_registry.set_ready(true).await;

    api::serve(config.api_port, app_state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
    })
    .await?;

    logger.log_shutdown("SIGINT received");
    // The router held the last sender; the forwarder drains what is left
    if let Err(e) = forwarder.await {
        warn!(error = %e, "Event forwarder task failed");
    }
    info!("Shutting down");

    Ok(())
}
