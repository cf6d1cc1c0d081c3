//! HTTP API for detection, sampling, health checks and Prometheus metrics

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use detector_lib::{
    evaluation::ANONYMOUS,
    health::{ComponentStatus, HealthRegistry},
    predictor::FEATURE_NAMES,
    BatchEvaluator, BatchRequest, DatasetSampler, Detector, DetectorError, EventSink, FeatureMap,
    LiveMonitor, ModelKind, MonitorConfig, PredictionRecord, PredictionResult, MAX_BATCH_SIZE,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Header carrying the caller identity when the body has none
pub const REQUESTED_BY_HEADER: &str = "x-requested-by";

/// Feature-map entry carrying the ground truth of a replayed dataset row
pub const LABEL_FEATURE: &str = "_actual_label";

/// Shared application state
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub detector: Arc<Detector>,
    pub sampler: Arc<DatasetSampler>,
    pub sink: Arc<dyn EventSink>,
    evaluator: BatchEvaluator,
    monitor: LiveMonitor,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        detector: Arc<Detector>,
        sampler: Arc<DatasetSampler>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let evaluator = BatchEvaluator::new(
            Arc::clone(&detector),
            Arc::clone(&sampler),
            Arc::clone(&sink),
        );
        let monitor = LiveMonitor::new(
            Arc::clone(&detector),
            Arc::clone(&sampler),
            Arc::clone(&sink),
        );
        Self {
            health_registry,
            detector,
            sampler,
            sink,
            evaluator,
            monitor,
        }
    }
}

/// Library error rendered as a JSON body with a matching status code
#[derive(Debug)]
pub struct ApiError(DetectorError);

impl From<DetectorError> for ApiError {
    fn from(err: DetectorError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DetectorError::ModelUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            DetectorError::NoData => StatusCode::NOT_FOUND,
            DetectorError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DetectorError::Inference { .. } | DetectorError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self.0, "Request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Body value first, then the header, then anonymous
fn requester(body: Option<&str>, headers: &HeaderMap) -> String {
    body.map(str::to_string)
        .or_else(|| {
            headers
                .get(REQUESTED_BY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| ANONYMOUS.to_string())
}

fn parse_kind(raw: &str) -> ApiResult<ModelKind> {
    raw.parse::<ModelKind>()
        .map_err(|e| ApiError(DetectorError::InvalidRequest(e)))
}

/// Health check response - returns 200 unless a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: ModelKind,
    pub loaded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

/// Residency of each model; never triggers a load
async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let status = state.detector.registry().status();
    Json(ModelsResponse {
        models: ModelKind::ALL
            .into_iter()
            .map(|kind| ModelInfo {
                name: kind,
                loaded: status.is_loaded(kind),
            })
            .collect(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeatureList {
    pub count: usize,
    pub features: Vec<String>,
}

impl FeatureList {
    fn new(features: Vec<String>) -> Self {
        Self {
            count: features.len(),
            features,
        }
    }
}

/// Canonical model input order
async fn list_features() -> Json<FeatureList> {
    Json(FeatureList::new(
        FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub features: FeatureMap,
    #[serde(default)]
    pub requested_by: Option<String>,
    /// Ground truth; falls back to `_actual_label` inside `features`
    #[serde(default)]
    pub actual_label: Option<u8>,
}

impl DetectRequest {
    fn actual_label(&self) -> Result<Option<u8>, DetectorError> {
        if let Some(label) = self.actual_label {
            if label > 1 {
                return Err(DetectorError::InvalidRequest(format!(
                    "actual_label must be 0 or 1, got {}",
                    label
                )));
            }
            return Ok(Some(label));
        }
        let label = match self.features.get(LABEL_FEATURE) {
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        Ok(label.and_then(|l| match l {
            l if l == 0.0 => Some(0),
            l if l == 1.0 => Some(1),
            _ => None,
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DetectParams {
    #[serde(default)]
    pub explain: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetectResponse {
    #[serde(flatten)]
    pub result: PredictionResult,
    pub prediction_label: String,
    pub actual_label: Option<u8>,
    pub timestamp: String,
}

impl DetectResponse {
    fn new(result: PredictionResult, actual_label: Option<u8>) -> Self {
        Self {
            prediction_label: result.label().to_string(),
            result,
            actual_label,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

async fn detect(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(params): Query<DetectParams>,
    headers: HeaderMap,
    Json(request): Json<DetectRequest>,
) -> ApiResult<Response> {
    let kind = parse_kind(&kind)?;
    let requested_by = requester(request.requested_by.as_deref(), &headers);
    let actual_label = request.actual_label()?;
    let vector = state.detector.normalize(&request.features);

    let (result, body) = if params.explain {
        if kind != ModelKind::Ensemble {
            return Err(ApiError(DetectorError::InvalidRequest(format!(
                "explain is only available for the ensemble model, not {}",
                kind
            ))));
        }
        let breakdown = state.detector.explain(&request.features).await?;
        (breakdown.ensemble, Json(breakdown).into_response())
    } else {
        let result = state.detector.predict_vector(kind, vector).await?;
        (
            result,
            Json(DetectResponse::new(result, actual_label)).into_response(),
        )
    };

    let record = PredictionRecord {
        requested_by,
        model: result.model,
        prediction: result.prediction,
        probability: result.probability,
        confidence: result.confidence,
        features: vector.to_named_map(),
        actual_label,
        timestamp: Utc::now().timestamp(),
    };
    if let Err(e) = state.sink.record_prediction(record).await {
        warn!(error = %e, "Failed to record prediction");
    }

    Ok(body)
}

async fn detect_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(mut request): Json<BatchRequest>,
) -> ApiResult<Response> {
    request.requested_by = Some(requester(request.requested_by.as_deref(), &headers));
    let report = state.evaluator.run(&request).await?;
    Ok(Json(report).into_response())
}

async fn samples_info(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let info = state.sampler.info().await.ok_or(DetectorError::NoData)?;
    Ok(Json(info).into_response())
}

fn default_sample_count() -> usize {
    5
}

#[derive(Debug, Deserialize)]
pub struct RandomSamplesParams {
    #[serde(default = "default_sample_count")]
    pub n: usize,
    #[serde(default)]
    pub balanced: bool,
}

async fn samples_random(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RandomSamplesParams>,
) -> ApiResult<Response> {
    if params.n == 0 || params.n > MAX_BATCH_SIZE {
        return Err(ApiError(DetectorError::InvalidRequest(format!(
            "n must be between 1 and {}, got {}",
            MAX_BATCH_SIZE, params.n
        ))));
    }
    let samples = state.sampler.sample(params.n, params.balanced).await;
    if samples.is_empty() {
        return Err(ApiError(DetectorError::NoData));
    }
    Ok(Json(samples).into_response())
}

/// Feature columns of the reference dataset, which may differ from the model order
async fn samples_features(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let columns = state.sampler.feature_columns().await;
    if columns.is_empty() {
        return Err(ApiError(DetectorError::NoData));
    }
    Ok(Json(FeatureList::new(columns)).into_response())
}

async fn monitor_start(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(mut config): Json<MonitorConfig>,
) -> ApiResult<Response> {
    config.validate()?;
    config.requested_by = Some(requester(config.requested_by.as_deref(), &headers));
    let report = state.monitor.run(&config).await?;
    Ok(Json(report).into_response())
}

async fn monitor_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let requested_by = requester(None, &headers);
    let reading = state.monitor.stream_once(&requested_by).await?;
    Ok(Json(reading).into_response())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/models", get(list_models))
        .route("/v1/features", get(list_features))
        .route("/v1/detect/batch", post(detect_batch))
        .route("/v1/detect/:kind", post(detect))
        .route("/v1/samples/info", get(samples_info))
        .route("/v1/samples/random", get(samples_random))
        .route("/v1/samples/features", get(samples_features))
        .route("/v1/monitor/start", post(monitor_start))
        .route("/v1/monitor/stream", get(monitor_stream))
        .with_state(state)
}

/// Start the API server; returns once `shutdown` resolves
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use detector_lib::artifacts::{
        ArtifactSource, FeatureInfo, GraphArtifact, MetaLearnerArtifact, SequenceArtifact,
    };
    use detector_lib::health::components;
    use detector_lib::predictor::{
        GraphModel, GraphStructure, LogisticMetaLearner, ScaledFeatures, SequenceModel,
        StandardScaler, NUM_META_FEATURES,
    };
    use detector_lib::{ChannelSink, DetectionEvent, ModelRegistry, ReferenceDataset};
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    const SYN_INDEX: usize = 32;

    fn sigmoid(z: f64) -> f64 {
        1.0 / (1.0 + (-z).exp())
    }

    struct SynSequence;

    impl SequenceModel for SynSequence {
        fn forward(&self, features: &ScaledFeatures) -> anyhow::Result<f64> {
            Ok(sigmoid(2.0 * features[SYN_INDEX] - 2.0))
        }
    }

    struct SynGraph;

    impl GraphModel for SynGraph {
        fn forward(
            &self,
            nodes: &[ScaledFeatures],
            _graph: &GraphStructure,
        ) -> anyhow::Result<Vec<[f64; 2]>> {
            Ok(nodes
                .iter()
                .map(|n| [0.0, 2.0 * n[SYN_INDEX] - 2.0])
                .collect())
        }
    }

    /// Source with working base models and an optionally missing meta-learner
    struct FakeSource {
        meta_learner: bool,
    }

    impl ArtifactSource for FakeSource {
        fn load_sequence(&self) -> anyhow::Result<SequenceArtifact> {
            Ok(SequenceArtifact {
                model: Box::new(SynSequence),
                scaler: StandardScaler::identity(),
                version: "sequence@test".to_string(),
            })
        }

        fn load_graph(&self) -> anyhow::Result<GraphArtifact> {
            Ok(GraphArtifact {
                model: Box::new(SynGraph),
                scaler: StandardScaler::identity(),
                feature_info: FeatureInfo::canonical(),
                version: "graph@test".to_string(),
            })
        }

        fn load_meta_learner(&self) -> anyhow::Result<MetaLearnerArtifact> {
            if !self.meta_learner {
                anyhow::bail!("No meta-learner found");
            }
            let mut coefficients = vec![0.0; NUM_META_FEATURES];
            coefficients[0] = 3.0;
            coefficients[1] = 3.0;
            Ok(MetaLearnerArtifact {
                model: Box::new(LogisticMetaLearner {
                    coefficients,
                    intercept: -3.0,
                }),
                version: "meta@test".to_string(),
            })
        }
    }

    fn dataset() -> ReferenceDataset {
        let mut csv = String::from("Flow Duration,Tot Fwd Pkts,SYN Flag Cnt,Label\n");
        for i in 0..6 {
            csv.push_str(&format!("{},{},3,1\n", 100 + i, 2 + i));
        }
        for i in 0..6 {
            csv.push_str(&format!("{},{},0,0\n", 5000 + i, 20 + i));
        }
        ReferenceDataset::from_csv_str(&csv).unwrap()
    }

    struct Harness {
        app: Router,
        health: HealthRegistry,
        events: mpsc::Receiver<DetectionEvent>,
    }

    fn harness(meta_learner: bool, sampler: DatasetSampler) -> Harness {
        let health = HealthRegistry::new();
        let registry = ModelRegistry::new(Arc::new(FakeSource { meta_learner }))
            .with_health(health.clone());
        let detector = Arc::new(Detector::new(Arc::new(registry)));
        let (sink, events) = ChannelSink::new(256);
        let state = AppState::new(health.clone(), detector, Arc::new(sampler), Arc::new(sink));
        Harness {
            app: create_router(Arc::new(state)),
            health,
            events,
        }
    }

    fn default_harness() -> Harness {
        harness(true, DatasetSampler::from_dataset(dataset()))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_healthz_and_readyz() {
        let h = default_harness();
        h.health.register(components::SEQUENCE_MODEL).await;

        let (status, body) = send(&h.app, get("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, _) = send(&h.app, get("/readyz")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        h.health.set_ready(true).await;
        let (status, body) = send(&h.app, get("/readyz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let h = default_harness();
        send(
            &h.app,
            post_json("/v1/detect/sequence", json!({"features": {"SYN Flag Cnt": 3}})),
        )
        .await;

        let response = h.app.clone().oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("botnet_detector_predictions_total"));
    }

    #[tokio::test]
    async fn test_features_lists_canonical_order() {
        let h = default_harness();
        let (status, body) = send(&h.app, get("/v1/features")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 42);
        assert_eq!(body["features"][0], "Flow Duration");
        assert_eq!(body["features"][41], "Idle Std");
    }

    #[tokio::test]
    async fn test_models_status_does_not_load() {
        let h = default_harness();
        let (_, body) = send(&h.app, get("/v1/models")).await;
        assert!(body["models"]
            .as_array()
            .unwrap()
            .iter()
            .all(|m| m["loaded"] == false));

        send(
            &h.app,
            post_json("/v1/detect/lstm", json!({"features": {}})),
        )
        .await;
        let (_, body) = send(&h.app, get("/v1/models")).await;
        assert_eq!(body["models"][0]["name"], "sequence");
        assert_eq!(body["models"][0]["loaded"], true);
        assert_eq!(body["models"][1]["loaded"], false);
    }

    #[tokio::test]
    async fn test_detect_records_prediction() {
        let mut h = default_harness();
        let request = Request::builder()
            .method("POST")
            .uri("/v1/detect/ensemble")
            .header("content-type", "application/json")
            .header(REQUESTED_BY_HEADER, "analyst")
            .body(Body::from(
                json!({"features": {"SYN Flag Cnt": "3", "Flow Duration": null}}).to_string(),
            ))
            .unwrap();

        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prediction"], 1);
        assert_eq!(body["prediction_label"], "Botnet");
        assert_eq!(body["model"], "ensemble");

        match h.events.try_recv().unwrap() {
            DetectionEvent::Prediction(record) => {
                assert_eq!(record.requested_by, "analyst");
                assert_eq!(record.features.len(), 42);
                assert_eq!(record.features["SYN Flag Cnt"], 3.0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detect_echoes_actual_label() {
        let mut h = default_harness();

        // Rows replayed from /v1/samples/random carry the label in the map
        let (status, body) = send(
            &h.app,
            post_json(
                "/v1/detect/lstm",
                json!({"features": {"SYN Flag Cnt": 3, "_actual_label": 1}}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["actual_label"], 1);
        match h.events.try_recv().unwrap() {
            DetectionEvent::Prediction(record) => {
                assert_eq!(record.actual_label, Some(1));
                assert!(!record.features.contains_key(LABEL_FEATURE));
            }
            other => panic!("unexpected event {:?}", other),
        }

        let (status, body) = send(
            &h.app,
            post_json("/v1/detect/gcn", json!({"features": {}, "actual_label": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["actual_label"], 0);

        let (_, body) = send(&h.app, post_json("/v1/detect/gcn", json!({"features": {}}))).await;
        assert!(body["actual_label"].is_null());

        let (status, _) = send(
            &h.app,
            post_json("/v1/detect/gcn", json!({"features": {}, "actual_label": 4})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_detect_explain() {
        let h = default_harness();
        let (status, body) = send(
            &h.app,
            post_json("/v1/detect/ensemble?explain=true", json!({"features": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sequence"]["model"], "sequence");
        assert_eq!(body["graph"]["model"], "graph");
        assert_eq!(body["meta_features"].as_array().unwrap().len(), 18);
        assert_eq!(body["ensemble"]["prediction"], 0);

        let (status, _) = send(
            &h.app,
            post_json("/v1/detect/graph?explain=true", json!({"features": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_model_kind_is_bad_request() {
        let h = default_harness();
        let (status, body) = send(
            &h.app,
            post_json("/v1/detect/svm", json!({"features": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("svm"));
    }

    #[tokio::test]
    async fn test_missing_meta_learner_is_unavailable() {
        let h = harness(false, DatasetSampler::from_dataset(dataset()));
        let (status, body) = send(
            &h.app,
            post_json("/v1/detect/ensemble", json!({"features": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("meta-learner"));

        let (status, _) = send(
            &h.app,
            post_json("/v1/detect/gcn", json!({"features": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // Unhealthy ensemble flips readiness
        h.health.set_ready(true).await;
        let (status, _) = send(&h.app, get("/readyz")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_batch_detection() {
        let h = default_harness();
        let (status, body) = send(
            &h.app,
            post_json("/v1/detect/batch", json!({"n": 4, "model_type": "lstm"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_samples"], 4);
        assert_eq!(body["summary"]["model"], "sequence");
        assert_eq!(body["summary"]["botnet_detected"], 2);
        assert_eq!(body["summary"]["accuracy"], 100.0);
        assert_eq!(body["summary"]["requested_by"], ANONYMOUS);
    }

    #[tokio::test]
    async fn test_batch_validation_and_missing_dataset() {
        let h = default_harness();
        let (status, _) = send(&h.app, post_json("/v1/detect/batch", json!({"n": 101}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let h = harness(true, DatasetSampler::new("/nonexistent/flows.csv"));
        let (status, _) = send(&h.app, post_json("/v1/detect/batch", json!({"n": 5}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&h.app, get("/v1/samples/info")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_samples_endpoints() {
        let h = default_harness();

        let (status, body) = send(&h.app, get("/v1/samples/info")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_samples"], 12);
        assert_eq!(body["botnet_samples"], 6);

        let (status, body) = send(&h.app, get("/v1/samples/random?n=4&balanced=true")).await;
        assert_eq!(status, StatusCode::OK);
        let samples = body.as_array().unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples.iter().filter(|s| s["label"] == 1).count(), 2);

        let (status, _) = send(&h.app, get("/v1/samples/random?n=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&h.app, get("/v1/samples/features")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 3);
    }

    #[tokio::test]
    async fn test_monitor_validation_and_stream() {
        let h = default_harness();
        let (status, _) = send(
            &h.app,
            post_json("/v1/monitor/start", json!({"duration": 5})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &h.app,
            post_json("/v1/monitor/start", json!({"alert_threshold": 0.2})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&h.app, get("/v1/monitor/stream")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["prediction_label"] == "Botnet" || body["prediction_label"] == "Normal");
    }
}
