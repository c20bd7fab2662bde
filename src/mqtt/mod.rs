// MQTT client integration

mod client;
mod listener;

pub use client::{connect, MqttConfig, MqttTransport};
pub use listener::run_event_loop;
