//! ragbridge gateway binary.
//!
//! - Config: `RAGBRIDGE_CONFIG` (default `ragbridge.yaml`), `KAFKA_*` overrides
//! - Starts the broker bridge before serving; an unreachable broker aborts start
//! - Graceful shutdown on Ctrl-C: HTTP drains, bridge stops, detached work is awaited

use std::net::SocketAddr;
use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use ragbridge_gateway::{app_state, config, router};

const DEFAULT_CONFIG_PATH: &str = "ragbridge.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "ragbridge-gateway failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ragbridge_core::Result<()> {
    let path = std::env::var("RAGBRIDGE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg.gateway.listen.parse().map_err(|e| {
        ragbridge_core::BridgeError::BadRequest(format!("gateway.listen must be a valid SocketAddr: {e}"))
    })?;

    // bind first: a taken port must fail before the bridge starts consuming
    let listener = router::bind(listen).await?;

    let state = app_state::AppState::new(cfg).await?;
    let app = router::build_router(state.clone());
    tracing::info!(%listen, config = %path, "ragbridge-gateway starting");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    state.shutdown().await;
    served.map_err(|e| ragbridge_core::BridgeError::Internal(format!("server failed: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
