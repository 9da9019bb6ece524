use std::sync::Arc;

use fulfillment_engine::api;
use fulfillment_engine::config::{Config, LogFormat};
use fulfillment_engine::engine::expiry::run_expiry_sweeper;
use fulfillment_engine::error::AppError;
use fulfillment_engine::notify::delivery::run_notification_delivery;
use fulfillment_engine::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with_target(false);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }

    let (app_state, outbox_rx) = AppState::new(
        config.engine.clone(),
        config.event_buffer_size,
        config.notification_queue_size,
    );
    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(run_notification_delivery(
        shared_state.notification_channel(),
        shared_state.retry_policy(),
        shared_state.metrics.clone(),
        outbox_rx,
    ));
    tokio::spawn(run_expiry_sweeper(shared_state.clone()));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        offer_ttl_secs = config.engine.offer_ttl.as_secs(),
        zones = config.engine.zones.zones().len(),
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
