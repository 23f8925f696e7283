//! Webhook module for validating workload admission requests.
//!
//! - `workload`: kind routing and container extraction
//! - `bypass`: the whole-object opt-out annotation
//! - `policies`: container checks and the admission decision
//! - `server`: the HTTP boundary

pub mod bypass;
pub mod policies;
mod server;
pub mod workload;

pub use bypass::{BYPASS_ANNOTATION, is_bypassed};
pub use policies::{AdmissionDecision, AdmissionPolicy, PREDICATES, Predicate, Violation};
pub use server::{
    CERT_PATH_ENV, KEY_PATH_ENV, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookState,
    create_webhook_router, run_webhook_server,
};
pub use workload::{KindRouter, Workload, WorkloadKind, WorkloadRequest};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
