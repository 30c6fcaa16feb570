//! Cloud Backup Schedule Kubernetes Operator
//!
//! Main entry point for the operator. Sets up the Kubernetes client,
//! registers the CloudBackupSchedule controller, and runs the reconciliation loop.

use std::sync::Arc;

use kube::Client;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cloud_backup_schedule_operator::{
    controllers::{self, Context},
    metrics,
};

/// Default metrics port
const DEFAULT_METRICS_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    info!("Starting Cloud Backup Schedule Operator");

    let metrics_port = match std::env::var("METRICS_PORT") {
        Ok(value) => value
            .parse::<u16>()
            .map_err(|e| anyhow::anyhow!("Invalid METRICS_PORT '{}': {}", value, e))?,
        Err(_) => DEFAULT_METRICS_PORT,
    };

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    // Create shared context
    let mut context = Context::new(client.clone());
    if let Ok(base_url) = std::env::var("ATLAS_API_BASE_URL") {
        info!(base_url = %base_url, "Using remote API base URL from environment");
        context = context.with_base_url(base_url);
    }
    let context = Arc::new(context);

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::serve(metrics_port));
    info!("Metrics server starting on port {}", metrics_port);

    let schedule_controller = controllers::run_schedule_controller(client.clone(), context.clone());

    // Handle graceful shutdown
    tokio::select! {
        _ = schedule_controller => {
            error!("Schedule controller exited unexpectedly");
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping operator");
        }
    }

    metrics::OPERATOR_HEALTH.set(0.0);
    info!("Cloud Backup Schedule Operator stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
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
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
