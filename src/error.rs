//! Error types for the admission webhook.
//!
//! Decode errors never leave the decision layer: the assembler turns them into
//! fail-closed denials. Config errors are recovered at startup. Only
//! `WebhookError` reaches `main`.

use thiserror::Error;

use crate::webhooks::WorkloadKind;

/// Errors raised while turning a raw admission object into a workload
#[derive(Error, Debug)]
pub enum Error {
    /// The payload could not be decoded as the routed workload kind
    #[error("{kind} object could not be decoded: {source}")]
    Decode {
        kind: WorkloadKind,
        #[source]
        source: serde_json::Error,
    },

    /// The admission request carried no object at all
    #[error("admission request carries no object")]
    MissingObject,
}

/// Errors raised while loading the policy configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors that can occur when running the webhook or health servers
#[derive(Error, Debug)]
pub enum WebhookError {
    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Listener could not be bound
    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),

    /// Server error
    #[error("webhook server error: {0}")]
    Server(String),
}

/// Result type alias for extraction operations
pub type Result<T> = std::result::Result<T, Error>;
