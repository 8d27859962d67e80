//! Cluster metrics service
//!
//! Serves cluster-wide CPU and memory utilization, read from kubectl when it
//! is available and from the in-cluster metrics API otherwise.

use anyhow::{Context, Result};
use cluster_metrics_server::{api, config::AppConfig};
use metrics_lib::StructuredLogger;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    let addr = config.socket_addr()?;
    info!(
        api_server = %config.api_server,
        kubectl = %config.kubectl_path,
        tls_mode = ?config.tls_mode,
        "Service configured"
    );

    let logger = StructuredLogger::default();
    let orchestrator = config.orchestrator();
    let app_state = Arc::new(api::AppState::new(orchestrator));

    logger.log_startup(SERVICE_VERSION, &config.listen_addr);
    let api_handle = tokio::spawn(api::serve(addr, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("server exited"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    return Err(e);
                }
                Err(e) => return Err(e).context("API server task panicked"),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
    }

    Ok(())
}
