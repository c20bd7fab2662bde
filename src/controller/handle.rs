use crate::condition::ConditionSet;
use crate::controller::engine::{ConfigUpdate, DashboardController, DerivedUpdate, HealthSnapshot};
use crate::device::SourceBinding;
use crate::metric::{MetricConfig, MetricValue};
use crate::subscription::TopicTransport;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, warn};

/// Events produced by the pub/sub client
#[derive(Debug)]
pub enum Inbound {
    /// Broker session (re)established
    Connected,
    Message { topic: String, payload: Vec<u8> },
}

/// Requests served by the controller task
pub enum Command {
    Apply(ConfigUpdate),
    UpsertMetricConfig(MetricConfig),
    RemoveMetricConfig(String),
    UpsertConditionSet(ConditionSet),
    RemoveConditionSet(String),
    OpenDraft {
        binding: SourceBinding,
        reply: oneshot::Sender<Option<String>>,
    },
    CloseDraft(String),
    MetricValue {
        id: String,
        reply: oneshot::Sender<Option<MetricValue>>,
    },
    MetricValues {
        reply: oneshot::Sender<BTreeMap<String, MetricValue>>,
    },
    ActiveState {
        id: String,
        value: Value,
        reply: oneshot::Sender<Option<String>>,
    },
    CurrentState {
        id: String,
        reply: oneshot::Sender<Option<String>>,
    },
    Health {
        reply: oneshot::Sender<HealthSnapshot>,
    },
    Subscribe {
        reply: oneshot::Sender<broadcast::Receiver<DerivedUpdate>>,
    },
    Shutdown,
}

/// Cloneable front door to the controller task
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<Command>,
}

/// Create a handle and the command receiver `run` consumes
pub fn command_channel(capacity: usize) -> (ControllerHandle, mpsc::Receiver<Command>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ControllerHandle { tx }, rx)
}

impl ControllerHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| anyhow!("controller task has stopped"))
    }

    async fn request<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await
            .map_err(|_| anyhow!("controller task dropped the request"))
    }

    pub async fn apply(&self, update: ConfigUpdate) -> Result<()> {
        self.send(Command::Apply(update)).await
    }

    pub async fn upsert_metric_config(&self, config: MetricConfig) -> Result<()> {
        self.send(Command::UpsertMetricConfig(config)).await
    }

    pub async fn remove_metric_config(&self, id: impl Into<String>) -> Result<()> {
        self.send(Command::RemoveMetricConfig(id.into())).await
    }

    pub async fn upsert_condition_set(&self, set: ConditionSet) -> Result<()> {
        self.send(Command::UpsertConditionSet(set)).await
    }

    pub async fn remove_condition_set(&self, id: impl Into<String>) -> Result<()> {
        self.send(Command::RemoveConditionSet(id.into())).await
    }

    pub async fn open_draft(&self, binding: SourceBinding) -> Result<Option<String>> {
        self.request(|reply| Command::OpenDraft { binding, reply })
            .await
    }

    pub async fn close_draft(&self, topic: impl Into<String>) -> Result<()> {
        self.send(Command::CloseDraft(topic.into())).await
    }

    pub async fn metric_value(&self, id: impl Into<String>) -> Result<Option<MetricValue>> {
        let id = id.into();
        self.request(|reply| Command::MetricValue { id, reply }).await
    }

    pub async fn metric_values(&self) -> Result<BTreeMap<String, MetricValue>> {
        self.request(|reply| Command::MetricValues { reply }).await
    }

    pub async fn active_state(&self, id: impl Into<String>, value: Value) -> Result<Option<String>> {
        let id = id.into();
        self.request(|reply| Command::ActiveState { id, value, reply })
            .await
    }

    pub async fn current_state(&self, id: impl Into<String>) -> Result<Option<String>> {
        let id = id.into();
        self.request(|reply| Command::CurrentState { id, reply })
            .await
    }

    pub async fn health(&self) -> Result<HealthSnapshot> {
        self.request(|reply| Command::Health { reply }).await
    }

    pub async fn subscribe(&self) -> Result<broadcast::Receiver<DerivedUpdate>> {
        self.request(|reply| Command::Subscribe { reply }).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }
}

/// Drive a controller until shutdown.
///
/// Inbound messages and commands are handled one at a time, in arrival
/// order. The loop ends on `Command::Shutdown` or once every handle is
/// dropped; subscriptions are released either way.
pub async fn run<T: TopicTransport>(
    mut controller: DashboardController<T>,
    mut inbound: mpsc::Receiver<Inbound>,
    mut commands: mpsc::Receiver<Command>,
) {
    info!("Dashboard controller started");
    let mut inbound_open = true;

    loop {
        tokio::select! {
            event = inbound.recv(), if inbound_open => {
                match event {
                    Some(Inbound::Message { topic, payload }) => {
                        controller.handle_message(&topic, &payload);
                    }
                    Some(Inbound::Connected) => {
                        controller.on_connected();
                    }
                    None => {
                        warn!("Inbound message channel closed");
                        inbound_open = false;
                    }
                }
            }

            command = commands.recv() => {
                match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => dispatch(&mut controller, command),
                }
            }
        }
    }

    controller.shutdown();
    info!("Dashboard controller stopped");
}

fn dispatch<T: TopicTransport>(controller: &mut DashboardController<T>, command: Command) {
    // Reply send failures mean the caller gave up waiting
    match command {
        Command::Apply(update) => controller.apply(update),
        Command::UpsertMetricConfig(config) => controller.upsert_metric_config(config),
        Command::RemoveMetricConfig(id) => {
            controller.remove_metric_config(&id);
        }
        Command::UpsertConditionSet(set) => controller.upsert_condition_set(set),
        Command::RemoveConditionSet(id) => {
            controller.remove_condition_set(&id);
        }
        Command::OpenDraft { binding, reply } => {
            let _ = reply.send(controller.open_draft(&binding));
        }
        Command::CloseDraft(topic) => controller.close_draft(&topic),
        Command::MetricValue { id, reply } => {
            let _ = reply.send(controller.metric_value(&id));
        }
        Command::MetricValues { reply } => {
            let _ = reply.send(controller.metric_values());
        }
        Command::ActiveState { id, value, reply } => {
            let _ = reply.send(controller.active_state(&id, &value));
        }
        Command::CurrentState { id, reply } => {
            let _ = reply.send(controller.current_state(&id));
        }
        Command::Health { reply } => {
            let _ = reply.send(controller.health());
        }
        Command::Subscribe { reply } => {
            let _ = reply.send(controller.subscribe());
        }
        Command::Shutdown => controller.shutdown(),
    }
}
