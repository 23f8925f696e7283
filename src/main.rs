//! security-webhook - validating admission webhook for workload security policy.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Loads the policy configuration (falling back to secure defaults)
//! - Starts the health server and the webhook server
//! - Handles graceful shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{error, info};

use security_webhook::{
    AdmissionPolicy, CERT_PATH_ENV, HEALTH_PORT, HealthState, KEY_PATH_ENV, PolicyConfig,
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WebhookState, run_health_server, run_webhook_server,
};

/// Grace period for in-flight admission requests during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 2;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("security_webhook=info".parse()?),
        )
        .json()
        .init();

    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        error!(provider = ?e, "Failed to install rustls crypto provider");
        std::process::exit(1);
    }

    info!("Starting security-webhook");

    let policy = AdmissionPolicy::new(PolicyConfig::from_env());
    info!(
        config = ?policy.config(),
        checks = ?policy.active_checks().collect::<Vec<_>>(),
        "Admission policy ready"
    );

    let health_state = Arc::new(HealthState::new());

    let health_handle = {
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, HEALTH_PORT).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let cert_path = std::env::var(CERT_PATH_ENV).unwrap_or_else(|_| WEBHOOK_CERT_PATH.to_string());
    let key_path = std::env::var(KEY_PATH_ENV).unwrap_or_else(|_| WEBHOOK_KEY_PATH.to_string());

    let webhook_handle = {
        let state = Arc::new(WebhookState::new(policy, Some(health_state.clone())));
        tokio::spawn(async move {
            if let Err(e) = run_webhook_server(state, &cert_path, &key_path).await {
                error!("Webhook server error: {}", e);
            }
        })
    };

    // Wait for any task to complete (or fail), or shutdown signal
    tokio::select! {
        result = webhook_handle => {
            if let Err(e) = result {
                error!("Webhook server task panicked: {}", e);
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Stop receiving new admission traffic
            health_state.set_ready(false).await;
            info!("Marked webhook as not ready");

            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;
            info!("Grace period complete, shutting down");
        }
    }

    info!("security-webhook stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the webhook cannot shut down
/// gracefully without them.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
