use crate::backend::BackendClient;
use crate::controller::ControllerHandle;
use anyhow::Result;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Periodically refetch configuration and hand it to the controller.
///
/// A failed fetch keeps the current configuration. Returns once the
/// controller task has stopped.
pub async fn run_refresh_loop(
    client: BackendClient,
    features: Vec<String>,
    controller: ControllerHandle,
    period: Duration,
) -> Result<()> {
    info!(
        interval_seconds = period.as_secs(),
        base_url = %client.base_url(),
        "Starting configuration refresh"
    );

    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        let update = match client.fetch_all(&features).await {
            Ok(update) => update,
            Err(e) => {
                error!(error = %e, "Configuration refresh failed");
                continue;
            }
        };

        if controller.apply(update).await.is_err() {
            info!("Controller stopped, ending configuration refresh");
            return Ok(());
        }
    }
}
