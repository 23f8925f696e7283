//! security-webhook library crate
//!
//! A validating admission webhook that rejects workloads running privileged
//! containers. The decision logic lives in [`webhooks::policies`]; this crate
//! root re-exports what the binary and the tests need.

pub mod config;
pub mod error;
pub mod health;
pub mod webhooks;

pub use config::{CheckItems, PolicyConfig};
pub use error::{ConfigError, Error, WebhookError};
pub use health::{HEALTH_PORT, HealthState, run_health_server};
pub use webhooks::{
    AdmissionDecision, AdmissionPolicy, CERT_PATH_ENV, KEY_PATH_ENV, WEBHOOK_CERT_PATH,
    WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookState, WorkloadKind, WorkloadRequest,
    create_webhook_router, run_webhook_server,
};
