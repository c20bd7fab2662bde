use anyhow::{Context, Result};
use meterdash::api::{create_router, ApiState};
use meterdash::backend::{run_refresh_loop, BackendClient};
use meterdash::config::{config_path, load_config};
use meterdash::controller::{self, command_channel, DashboardController};
use meterdash::mqtt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meterdash=info".into()),
        )
        .init();

    info!("Meterdash starting...");

    let path = config_path(std::env::args().nth(1));
    let config = load_config(&path)?;
    info!(
        path = %path.display(),
        mqtt_host = %config.mqtt.host,
        backend_url = %config.backend.base_url,
        bind = %config.server.bind,
        "Configuration loaded"
    );

    // MQTT client; the event loop feeds the controller
    let (transport, event_loop) = mqtt::connect(&config.mqtt);
    let (inbound_tx, inbound_rx) = mpsc::channel(config.mqtt.channel_capacity);
    let mqtt_handle = tokio::spawn(async move {
        if let Err(e) = mqtt::run_event_loop(event_loop, inbound_tx).await {
            error!(error = %e, "MQTT event loop failed");
        }
    });

    // Controller task
    let (handle, commands) = command_channel(64);
    let controller_task = tokio::spawn(controller::run(
        DashboardController::new(transport),
        inbound_rx,
        commands,
    ));

    // Initial fetch, then periodic refresh
    let backend = BackendClient::new(&config.backend)?;
    match backend.fetch_all(&config.backend.metric_features).await {
        Ok(update) => handle.apply(update).await?,
        Err(e) => warn!(error = %e, "Initial configuration fetch failed, will retry"),
    }

    let refresh_handle = tokio::spawn(run_refresh_loop(
        backend,
        config.backend.metric_features.clone(),
        handle.clone(),
        Duration::from_secs(config.backend.refresh_interval_seconds),
    ));

    // HTTP API
    let router = create_router(ApiState {
        controller: handle.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(bind = %config.server.bind, "API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    // Graceful shutdown: release subscriptions before the MQTT loop goes away
    server_handle.abort();
    refresh_handle.abort();
    handle.shutdown().await?;
    controller_task
        .await
        .context("Controller task panicked")?;
    mqtt_handle.abort();
    info!("Meterdash stopped");

    Ok(())
}
