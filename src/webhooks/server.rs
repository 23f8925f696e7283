//! Admission webhook server.
//!
//! Provides HTTP endpoints for the Kubernetes validating admission webhook.
//!
//! To enable the webhook:
//! 1. Issue a serving certificate (e.g. with cert-manager)
//! 2. Mount it at /etc/certs/ (or point `WEBHOOK_CERT_PATH`/`WEBHOOK_KEY_PATH` at it)
//! 3. Create a ValidatingWebhookConfiguration for CREATE/UPDATE on the
//!    supported workload kinds, pointing at `/validate`
//!
//! Policy outcomes are always returned with HTTP 200. Only a request that is
//! not an AdmissionReview gets a non-200 status.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::WebhookError;
use crate::health::HealthState;
use crate::webhooks::policies::AdmissionPolicy;
use crate::webhooks::workload::WorkloadRequest;

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/certs/tls.key";
/// Environment variable overriding [`WEBHOOK_CERT_PATH`]
pub const CERT_PATH_ENV: &str = "WEBHOOK_CERT_PATH";
/// Environment variable overriding [`WEBHOOK_KEY_PATH`]
pub const KEY_PATH_ENV: &str = "WEBHOOK_KEY_PATH";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 9443;

/// Shared state for webhook handlers
pub struct WebhookState {
    pub policy: AdmissionPolicy,
    /// Metrics and readiness, absent in tests
    pub health: Option<Arc<HealthState>>,
}

impl WebhookState {
    pub fn new(policy: AdmissionPolicy, health: Option<Arc<HealthState>>) -> Self {
        Self { policy, health }
    }
}

/// Create a denial response with reason embedded in message.
/// kube-rs deny() only sets status.message, so we format as "[reason] message"
fn deny_with_reason(
    request: &AdmissionRequest<DynamicObject>,
    message: &str,
    reason: &str,
) -> AdmissionReview<DynamicObject> {
    let full_message = format!("[{}] {}", reason, message);
    AdmissionResponse::from(request)
        .deny(full_message)
        .into_review()
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/validate", post(validate_workload))
        .route("/validate-privileged-container", post(validate_workload))
        .with_state(state)
}

/// Parse an AdmissionReview, keeping `request.object` as raw JSON.
///
/// Only the envelope goes through the kube types. The object is decoded by the
/// policy against its routed kind, which denies bodies that do not fit.
/// `request.oldObject` is never inspected and is dropped.
fn parse_review(
    body: &[u8],
) -> serde_json::Result<(AdmissionReview<DynamicObject>, Option<Vec<u8>>)> {
    let mut value: Value = serde_json::from_slice(body)?;
    let object = value
        .pointer_mut("/request/object")
        .map(Value::take)
        .filter(|object| !object.is_null());
    if let Some(old_object) = value.pointer_mut("/request/oldObject") {
        old_object.take();
    }

    let review = serde_json::from_value(value)?;
    let object = object.map(|o| serde_json::to_vec(&o)).transpose()?;
    Ok((review, object))
}

fn invalid_review(message: String) -> (StatusCode, Json<AdmissionReview<DynamicObject>>) {
    (
        StatusCode::BAD_REQUEST,
        Json(AdmissionResponse::invalid(message).into_review()),
    )
}

/// Validate a workload admission request
async fn validate_workload(
    State(state): State<Arc<WebhookState>>,
    body: Bytes,
) -> impl IntoResponse {
    let (review, object) = match parse_review(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            error!(error = %e, "Failed to parse AdmissionReview");
            return invalid_review(format!("Invalid AdmissionReview: {}", e));
        }
    };

    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to extract admission request");
            return invalid_review(format!("Invalid AdmissionReview: {}", e));
        }
    };

    let uid = &request.uid;
    debug!(
        uid = %uid,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = %request.name,
        kind = %request.kind.kind,
        "Processing admission request"
    );

    // DELETE and CONNECT carry no object to inspect
    if matches!(request.operation, Operation::Delete | Operation::Connect) {
        info!(uid = %uid, operation = ?request.operation, "Admission request allowed");
        return (
            StatusCode::OK,
            Json(AdmissionResponse::from(&request).into_review()),
        );
    }

    let started = Instant::now();
    let decision = state
        .policy
        .evaluate(&WorkloadRequest::from_admission(&request, object));
    if let Some(health) = &state.health {
        health.metrics.record_decision(
            &request.kind.kind,
            decision.outcome(),
            started.elapsed().as_secs_f64(),
        );
    }

    if !decision.allowed {
        let reason = decision
            .reason
            .unwrap_or_else(|| "ValidationFailed".to_string());
        let message = decision
            .message
            .unwrap_or_else(|| "Validation failed".to_string());
        warn!(
            uid = %uid,
            namespace = ?request.namespace,
            name = %request.name,
            reason = %reason,
            message = %message,
            "Admission request denied"
        );
        return (
            StatusCode::OK,
            Json(deny_with_reason(&request, &message, &reason)),
        );
    }

    info!(
        uid = %uid,
        namespace = ?request.namespace,
        name = %request.name,
        bypassed = decision.bypassed,
        "Admission request allowed"
    );
    (
        StatusCode::OK,
        Json(AdmissionResponse::from(&request).into_review()),
    )
}

/// Run the webhook server
///
/// Binds to 0.0.0.0:9443 and serves the validation endpoints. When both the
/// certificate and key exist the listener speaks TLS; otherwise it serves
/// plain HTTP and expects TLS to be terminated in front of it.
///
/// # Arguments
/// * `state` - Policy and health state shared by all requests
/// * `cert_path` - Path to TLS certificate file (PEM format)
/// * `key_path` - Path to TLS private key file (PEM format)
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    cert_path: &str,
    key_path: &str,
) -> Result<(), WebhookError> {
    use axum_server::tls_rustls::RustlsConfig;

    let health = state.health.clone();
    let app = create_webhook_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], WEBHOOK_PORT));

    if Path::new(cert_path).exists() && Path::new(key_path).exists() {
        let config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

        info!(port = WEBHOOK_PORT, "Webhook server listening with TLS");
        if let Some(health) = &health {
            health.set_ready(true).await;
        }

        axum_server::bind_rustls(addr, config)
            .serve(app.into_make_service())
            .await
            .map_err(|e| WebhookError::Server(e.to_string()))?;
    } else {
        warn!(
            cert_path,
            key_path, "Webhook certificates not found, serving plain HTTP"
        );
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(port = WEBHOOK_PORT, "Webhook server listening");
        if let Some(health) = &health {
            health.set_ready(true).await;
        }

        axum::serve(listener, app)
            .await
            .map_err(|e| WebhookError::Server(e.to_string()))?;
    }

    Ok(())
}
