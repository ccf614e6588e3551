//! Jaeger Kubernetes Operator
//!
//! Main entry point for the operator. Sets up the Kubernetes client,
//! detects cluster capabilities and runs the Jaeger controller.

use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jaeger_operator::{
    capabilities::{self, Capabilities},
    config::OperatorConfig,
    controllers::{self, Context},
    metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(OperatorConfig::parse());
    info!(
        identity = %config.identity,
        jaeger_version = %config.jaeger_version,
        "Starting Jaeger Operator"
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let shutdown = CancellationToken::new();

    let capabilities = Arc::new(Capabilities::new(
        capabilities::initial(&client, &config).await,
    ));
    let refresh = tokio::spawn(capabilities.clone().run_refresh(
        client.clone(),
        config.clone(),
        shutdown.clone(),
    ));

    let context = Arc::new(Context::new(
        client.clone(),
        config.clone(),
        capabilities,
        shutdown.clone(),
    ));

    // probes stay up while the controller drains
    let metrics_stop = CancellationToken::new();
    let metrics_handle = tokio::spawn(metrics::serve(config.metrics_port, metrics_stop.clone()));
    info!("Metrics server starting on port {}", config.metrics_port);

    // in-flight waits observe the token; the controller drains on the same signal
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal, stopping operator");
        signal_token.cancel();
    });

    let controller = controllers::run_jaeger_controller(client, context);

    tokio::select! {
        _ = controller => {
            info!("Jaeger controller stopped");
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
    }

    metrics::OPERATOR_HEALTH.set(0.0);
    shutdown.cancel();
    metrics_stop.cancel();
    if let Err(e) = refresh.await {
        error!(error = %e, "Capability refresh task failed");
    }

    info!("Jaeger Operator stopped");
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
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
