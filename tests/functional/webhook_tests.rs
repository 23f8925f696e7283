//! AdmissionReview round trips through the webhook router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::common::fixtures::{WorkloadBuilder, admission_review};
use security_webhook::webhooks::BYPASS_ANNOTATION;
use security_webhook::{
    AdmissionPolicy, HealthState, PolicyConfig, WebhookState, WorkloadKind, create_webhook_router,
};

struct Harness {
    health: Arc<HealthState>,
    router: axum::Router,
}

impl Harness {
    fn new(config: PolicyConfig) -> Self {
        let health = Arc::new(HealthState::new());
        let state = Arc::new(WebhookState::new(
            AdmissionPolicy::new(config),
            Some(health.clone()),
        ));
        Self {
            health,
            router: create_webhook_router(state),
        }
    }

    async fn post(&self, path: &str, body: String) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn review(&self, review: Value) -> (StatusCode, Value) {
        self.post("/validate", review.to_string()).await
    }
}

fn message(body: &Value) -> &str {
    body["response"]["status"]["message"].as_str().unwrap_or("")
}

#[tokio::test]
async fn test_deployment_allowed() {
    let harness = Harness::new(PolicyConfig::default());
    let review = WorkloadBuilder::new(WorkloadKind::Deployment, "web")
        .container("nginx", None)
        .review("CREATE");

    let (status, body) = harness.review(review).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["apiVersion"], json!("admission.k8s.io/v1"));
    assert_eq!(body["kind"], json!("AdmissionReview"));
    assert_eq!(body["response"]["uid"], json!("uid-deployment-web"));
    assert_eq!(body["response"]["allowed"], json!(true));
}

#[tokio::test]
async fn test_cronjob_privileged_denied() {
    let harness = Harness::new(PolicyConfig::default());
    let review = WorkloadBuilder::new(WorkloadKind::CronJob, "nightly")
        .container("backup", Some(true))
        .review("CREATE");

    let (status, body) = harness.review(review).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["allowed"], json!(false));
    assert_eq!(
        message(&body),
        "[PrivilegedContainer] CronJob \"nightly\" container \"backup\" failed check \
         forbidden-privileged-container: privileged security context forbidden"
    );
}

#[tokio::test]
async fn test_legacy_route_applies_same_policy() {
    let harness = Harness::new(PolicyConfig::default());
    let review = WorkloadBuilder::new(WorkloadKind::StatefulSet, "db")
        .container("postgres", Some(true))
        .review("UPDATE");

    let (status, body) = harness
        .post("/validate-privileged-container", review.to_string())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["allowed"], json!(false));
}

#[tokio::test]
async fn test_bypassed_daemonset_allowed() {
    let harness = Harness::new(PolicyConfig::default());
    let review = WorkloadBuilder::new(WorkloadKind::DaemonSet, "cni")
        .namespace("kube-system")
        .annotation(BYPASS_ANNOTATION, "true")
        .container("install-cni", Some(true))
        .review("CREATE");

    let (_, body) = harness.review(review).await;
    assert_eq!(body["response"]["allowed"], json!(true));
}

#[tokio::test]
async fn test_unknown_kind_denied() {
    let harness = Harness::new(PolicyConfig::default());
    let review = admission_review(
        "custom",
        "Widget",
        "gizmo",
        "default",
        "CREATE",
        json!({"apiVersion": "custom/v1", "kind": "Widget", "metadata": {"name": "gizmo"}}),
    );

    let (status, body) = harness.review(review).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["allowed"], json!(false));
    assert_eq!(
        message(&body),
        "[UnsupportedKind] unsupported workload kind: custom/v1, Kind=Widget"
    );
}

#[tokio::test]
async fn test_malformed_object_denied() {
    let harness = Harness::new(PolicyConfig::default());
    let review = admission_review(
        "apps",
        "Deployment",
        "web",
        "default",
        "CREATE",
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web"},
            "spec": {"template": {"spec": {"containers": "not-a-list"}}}
        }),
    );

    let (status, body) = harness.review(review).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["allowed"], json!(false));
    assert!(
        message(&body).starts_with("[MalformedObject] cannot validate malformed object"),
        "{}",
        message(&body)
    );
}

#[tokio::test]
async fn test_mistyped_metadata_denied_with_200() {
    let harness = Harness::new(PolicyConfig::default());
    let review = admission_review(
        "apps",
        "Deployment",
        "web",
        "default",
        "CREATE",
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": 5},
            "spec": {"template": {"spec": {"containers": []}}}
        }),
    );

    let (status, body) = harness.review(review).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["uid"], json!("uid-deployment-web"));
    assert_eq!(body["response"]["allowed"], json!(false));
    assert!(
        message(&body).starts_with("[MalformedObject] cannot validate malformed object"),
        "{}",
        message(&body)
    );
}

#[tokio::test]
async fn test_non_object_payload_denied_with_200() {
    let harness = Harness::new(PolicyConfig::default());
    let review = admission_review(
        "apps",
        "Deployment",
        "web",
        "default",
        "CREATE",
        json!("garbage"),
    );

    let (status, body) = harness.review(review).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["allowed"], json!(false));
    assert!(
        message(&body).starts_with("[MalformedObject] cannot validate malformed object"),
        "{}",
        message(&body)
    );

    let encoded = harness.health.metrics.encode();
    assert!(
        encoded.contains(
            "security_webhook_admission_decisions_total{kind=\"Deployment\",outcome=\"MalformedObject\"} 1"
        ),
        "{encoded}"
    );
}

#[tokio::test]
async fn test_create_without_object_denied() {
    let harness = Harness::new(PolicyConfig::default());
    let review = admission_review("batch", "Job", "etl", "default", "CREATE", Value::Null);

    let (status, body) = harness.review(review).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["allowed"], json!(false));
}

#[tokio::test]
async fn test_delete_allowed() {
    let harness = Harness::new(PolicyConfig::default());
    let review = admission_review("apps", "Deployment", "web", "default", "DELETE", Value::Null);

    let (status, body) = harness.review(review).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["allowed"], json!(true));
}

#[tokio::test]
async fn test_disabled_toggle_allows_privileged() {
    let mut config = PolicyConfig::default();
    config.check_items.forbidden_privileged_container = false;
    let harness = Harness::new(config);
    let review = WorkloadBuilder::new(WorkloadKind::Job, "debug")
        .container("shell", Some(true))
        .review("CREATE");

    let (_, body) = harness.review(review).await;
    assert_eq!(body["response"]["allowed"], json!(true));
}

#[tokio::test]
async fn test_not_json_is_rejected_before_policy() {
    let harness = Harness::new(PolicyConfig::default());
    let (status, _) = harness.post("/validate", "{\"request\": ".to_string()).await;
    assert!(status.is_client_error(), "{status}");
}

#[tokio::test]
async fn test_decisions_recorded_in_metrics() {
    let harness = Harness::new(PolicyConfig::default());
    let allowed = WorkloadBuilder::new(WorkloadKind::Job, "ok")
        .container("worker", None)
        .review("CREATE");
    let denied = WorkloadBuilder::new(WorkloadKind::Job, "bad")
        .container("worker", Some(true))
        .review("CREATE");
    harness.review(allowed).await;
    harness.review(denied).await;

    let encoded = harness.health.metrics.encode();
    assert!(
        encoded.contains(
            "security_webhook_admission_decisions_total{kind=\"Job\",outcome=\"allowed\"} 1"
        ),
        "{encoded}"
    );
    assert!(
        encoded.contains(
            "security_webhook_admission_decisions_total{kind=\"Job\",outcome=\"PrivilegedContainer\"} 1"
        ),
        "{encoded}"
    );
}
