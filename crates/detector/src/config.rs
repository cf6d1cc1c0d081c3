//! Detector service configuration

use anyhow::{Context, Result};
use serde::Deserialize;

/// Detector service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Name attached to structured log records
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// API server port for detection, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory holding model artifacts and the optional checksum manifest
    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    /// Labelled reference dataset used for sampling
    #[serde(default = "default_dataset_path")]
    pub dataset_path: String,

    /// Load every model and the dataset before reporting ready
    #[serde(default)]
    pub warm_up: bool,

    /// Capacity of the outbound event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_service_name() -> String {
    "botnet-detector".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_model_dir() -> String {
    "models".to_string()
}

fn default_dataset_path() -> String {
    "data/ctu13_combined.csv".to_string()
}

fn default_event_buffer() -> usize {
    1024
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            api_port: default_api_port(),
            model_dir: default_model_dir(),
            dataset_path: default_dataset_path(),
            warm_up: false,
            event_buffer: default_event_buffer(),
        }
    }
}

impl DetectorConfig {
    /// Load configuration from `config/detector.*` and `DETECTOR_*` variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/detector").required(false))
            .add_source(
                config::Environment::with_prefix("DETECTOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid detector configuration")
    }
}
