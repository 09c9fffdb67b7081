use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use order_dispatch::api;
use order_dispatch::config::Config;
use order_dispatch::error::AppError;
use order_dispatch::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let http_port = config.http_port;
    let shared_state = Arc::new(AppState::in_memory(config));
    let app = api::rest::router(shared_state.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_task = tokio::spawn(shared_state.monitor.clone().run(shutdown_rx));

    let bind_addr = format!("0.0.0.0:{}", http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port, "http server started");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")));

    let _ = shutdown_tx.send(true);
    if let Err(err) = monitor_task.await {
        tracing::error!(error = %err, "driver status monitor task failed");
    }
    shared_state.hub.shutdown();

    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
