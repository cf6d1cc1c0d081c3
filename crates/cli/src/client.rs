//! API client for communicating with the detector service

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// API client for the detector service
pub struct ApiClient {
    client: Client,
    base_url: Url,
    requested_by: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, requested_by: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self {
            client,
            base_url,
            requested_by,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("Invalid path")
    }

    fn identify(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.requested_by {
            Some(who) => request.header("x-requested-by", who),
            None => request,
        }
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.identify(self.client.get(self.url(path)?));
        Self::send(request).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let request = self.identify(self.client.post(self.url(path)?).json(body));
        Self::send(request).await
    }

    /// POST for calls that legitimately run longer than the default timeout
    pub async fn post_with_timeout<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T> {
        let request = self.identify(
            self.client
                .post(self.url(path)?)
                .json(body)
                .timeout(timeout),
        );
        Self::send(request).await
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = request.send().await.context("Failed to send request")?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureList {
    pub count: usize,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub loaded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    pub features: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction: u8,
    pub probability: f64,
    pub confidence: f64,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    #[serde(flatten)]
    pub result: Prediction,
    pub prediction_label: String,
    #[serde(default)]
    pub actual_label: Option<u8>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainResponse {
    pub sequence: Prediction,
    pub graph: Prediction,
    pub meta_features: Vec<f64>,
    pub ensemble: Prediction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub n: usize,
    pub balanced: bool,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub index: usize,
    #[serde(default)]
    pub prediction_label: Option<String>,
    #[serde(default)]
    pub probability: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    pub actual_label: Option<u8>,
    pub correct: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub model: String,
    pub total_samples: usize,
    pub botnet_detected: usize,
    pub normal_detected: usize,
    pub failed: usize,
    #[serde(default)]
    pub accuracy: Option<f64>,
    pub detection_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub total_samples: usize,
    pub predictions: Vec<BatchItem>,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub total_samples: usize,
    pub num_features: usize,
    pub feature_names: Vec<String>,
    pub has_labels: bool,
    #[serde(default)]
    pub normal_samples: Option<usize>,
    #[serde(default)]
    pub botnet_samples: Option<usize>,
    #[serde(default)]
    pub botnet_percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub features: BTreeMap<String, f64>,
    #[serde(default)]
    pub label: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorRequest {
    pub duration_secs: u64,
    pub interval_secs: f64,
    pub alert_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorDetection {
    pub sample_id: usize,
    pub timestamp: String,
    #[serde(default)]
    pub prediction_label: Option<String>,
    #[serde(default)]
    pub probability: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    pub actual_label: Option<u8>,
    pub alert_sent: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSummary {
    pub start_time: String,
    pub end_time: String,
    pub duration_seconds: f64,
    pub total_samples: usize,
    pub botnet_detected: usize,
    pub normal_traffic: usize,
    pub failed: usize,
    pub alerts_sent: usize,
    pub detection_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorReport {
    pub summary: MonitorSummary,
    pub detections: Vec<MonitorDetection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamReading {
    pub timestamp: String,
    pub prediction: u8,
    pub prediction_label: String,
    pub probability: f64,
    pub confidence: f64,
    pub actual_label: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_response_flattens_prediction() {
        let json = r#"{"prediction":1,"probability":0.93,"confidence":0.86,
            "model":"ensemble","prediction_label":"Botnet","timestamp":"2024-01-01T00:00:00Z"}"#;
        let response: DetectResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.result.prediction, 1);
        assert_eq!(response.result.model, "ensemble");
        assert_eq!(response.prediction_label, "Botnet");
        assert_eq!(response.actual_label, None);

        let json = r#"{"prediction":0,"probability":0.1,"confidence":0.8,"model":"sequence",
            "prediction_label":"Normal","actual_label":1,"timestamp":"2024-01-01T00:00:00Z"}"#;
        let response: DetectResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.actual_label, Some(1));
    }

    #[test]
    fn test_failed_batch_item_parses() {
        let json = r#"{"index":3,"actual_label":1,"correct":null,"error":"graph inference failed"}"#;
        let item: BatchItem = serde_json::from_str(json).unwrap();
        assert!(item.prediction_label.is_none());
        assert_eq!(item.error.as_deref(), Some("graph inference failed"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url", None).is_err());
        assert!(ApiClient::new("http://localhost:8080", Some("analyst".into())).is_ok());
    }
}
