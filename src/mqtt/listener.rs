use crate::controller::Inbound;
use anyhow::Result;
use rumqttc::{Event, EventLoop, Incoming};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Poll the MQTT event loop and forward traffic to the controller.
///
/// Every ConnAck is forwarded as `Inbound::Connected` so the controller can
/// resubscribe after the broker drops the session. Connection errors are
/// logged and retried after a short pause. Returns once the controller side
/// of the channel is gone.
pub async fn run_event_loop(mut event_loop: EventLoop, tx: mpsc::Sender<Inbound>) -> Result<()> {
    info!("MQTT event loop started");

    loop {
        let inbound = match event_loop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                info!(code = ?ack.code, "Connected to MQTT broker");
                Inbound::Connected
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                debug!(topic = %publish.topic, bytes = publish.payload.len(), "Message received");
                Inbound::Message {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                }
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "MQTT connection error, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        if tx.send(inbound).await.is_err() {
            info!("Controller stopped, MQTT event loop exiting");
            return Ok(());
        }
    }
}
