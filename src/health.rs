//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 once the webhook is serving)
//! - `/metrics` - Prometheus metrics endpoint

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::WebhookError;

/// Default health server port
pub const HEALTH_PORT: u16 = 8080;

/// Labels for admission decisions (kind + outcome)
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct DecisionLabels {
    pub kind: String,
    pub outcome: String,
}

impl EncodeLabelSet for DecisionLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for per-kind metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct KindLabels {
    pub kind: String,
}

impl EncodeLabelSet for KindLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the webhook
pub struct Metrics {
    /// Admission decisions by kind and outcome
    pub decisions_total: Family<DecisionLabels, Counter>,
    /// Time spent deciding, by kind
    pub evaluation_duration_seconds: Family<KindLabels, Histogram>,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let decisions_total = Family::<DecisionLabels, Counter>::default();
        registry.register(
            "security_webhook_admission_decisions",
            "Total number of admission decisions",
            decisions_total.clone(),
        );

        // Evaluation is in-memory, so buckets start at 10µs
        let evaluation_duration_seconds =
            Family::<KindLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.00001, 2.0, 16))
            });
        registry.register(
            "security_webhook_evaluation_duration_seconds",
            "Duration of admission evaluation in seconds",
            evaluation_duration_seconds.clone(),
        );

        Self {
            decisions_total,
            evaluation_duration_seconds,
            registry,
        }
    }

    /// Record one admission decision
    pub fn record_decision(&self, kind: &str, outcome: &str, duration_secs: f64) {
        self.decisions_total
            .get_or_create(&DecisionLabels {
                kind: kind.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
        self.evaluation_duration_seconds
            .get_or_create(&KindLabels {
                kind: kind.to_string(),
            })
            .observe(duration_secs);
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the webhook is serving
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the webhook as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the webhook is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Returns 503 until the webhook listener is up, and again during shutdown.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server
///
/// Binds to 0.0.0.0 on the given port and serves health/metrics endpoints.
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), WebhookError> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
