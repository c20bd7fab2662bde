use crate::condition::{evaluate, ConditionSet};
use crate::device::{index_devices, Device, DeviceMap, SourceBinding};
use crate::metric::{recompute, MetricConfig, MetricValue};
use crate::payload::normalize_bytes;
use crate::subscription::{SubscriptionSnapshot, TopicSubscriptionRegistry, TopicTransport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Configuration lists fetched together.
///
/// `None` leaves the current list untouched. The controller reconciles
/// subscriptions once per applied update.
#[derive(Clone, Debug, Default)]
pub struct ConfigUpdate {
    pub devices: Option<Vec<Device>>,
    pub metric_configs: Option<Vec<MetricConfig>>,
    pub condition_sets: Option<Vec<ConditionSet>>,
}

impl ConfigUpdate {
    pub fn devices(mut self, devices: Vec<Device>) -> Self {
        self.devices = Some(devices);
        self
    }

    pub fn metric_configs(mut self, configs: Vec<MetricConfig>) -> Self {
        self.metric_configs = Some(configs);
        self
    }

    pub fn condition_sets(mut self, sets: Vec<ConditionSet>) -> Self {
        self.condition_sets = Some(sets);
        self
    }
}

/// Change notification for the UI layer
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DerivedUpdate {
    Metric {
        id: String,
        value: MetricValue,
        timestamp: DateTime<Utc>,
    },
    Indicator {
        id: String,
        state: String,
        timestamp: DateTime<Utc>,
    },
}

impl DerivedUpdate {
    /// Metric config or condition set id this update belongs to
    pub fn id(&self) -> &str {
        match self {
            DerivedUpdate::Metric { id, .. } | DerivedUpdate::Indicator { id, .. } => id,
        }
    }
}

/// Controller diagnostics
#[derive(Clone, Debug, Serialize)]
pub struct HealthSnapshot {
    pub subscriptions: SubscriptionSnapshot,
    pub devices: usize,
    pub devices_by_protocol: BTreeMap<&'static str, usize>,
    pub metric_configs: usize,
    pub condition_sets: usize,
    pub messages_handled: u64,
    pub messages_dropped: u64,
    pub messages_ignored: u64,
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct MessageStats {
    handled: u64,
    dropped: u64,
    ignored: u64,
    last_message_at: Option<DateTime<Utc>>,
}

/// Live-telemetry engine for one dashboard.
///
/// Owns the device list, the user configuration, the derived values and the
/// topic registry. All mutation happens through `&mut self`, so callers drive
/// it from a single task.
pub struct DashboardController<T: TopicTransport> {
    registry: TopicSubscriptionRegistry<T>,
    devices: DeviceMap,
    /// Devices whose payload came off the wire rather than the listing
    live_devices: HashSet<String>,
    metric_configs: Vec<MetricConfig>,
    condition_sets: Vec<ConditionSet>,
    metric_values: HashMap<String, MetricValue>,
    indicator_states: HashMap<String, String>,
    stats: MessageStats,
    update_tx: broadcast::Sender<DerivedUpdate>,
}

impl<T: TopicTransport> DashboardController<T> {
    pub fn new(transport: T) -> Self {
        let (update_tx, _) = broadcast::channel(256);

        Self {
            registry: TopicSubscriptionRegistry::new(transport),
            devices: DeviceMap::new(),
            live_devices: HashSet::new(),
            metric_configs: Vec::new(),
            condition_sets: Vec::new(),
            metric_values: HashMap::new(),
            indicator_states: HashMap::new(),
            stats: MessageStats::default(),
            update_tx,
        }
    }

    /// Subscribe to derived value changes
    pub fn subscribe(&self) -> broadcast::Receiver<DerivedUpdate> {
        self.update_tx.subscribe()
    }

    /// Apply fetched configuration, then reconcile subscriptions once
    pub fn apply(&mut self, update: ConfigUpdate) {
        if let Some(devices) = update.devices {
            self.replace_devices(devices);
        }
        if let Some(configs) = update.metric_configs {
            self.metric_configs = dedup_by_id(configs, |c| c.id(), "metric config");
        }
        if let Some(sets) = update.condition_sets {
            self.condition_sets = dedup_by_id(sets, |s| s.id.as_str(), "condition set");
        }

        self.recompute_all();
        self.reconcile();

        info!(
            devices = self.devices.len(),
            metric_configs = self.metric_configs.len(),
            condition_sets = self.condition_sets.len(),
            "Configuration applied"
        );
    }

    /// Insert or replace one metric config by id
    pub fn upsert_metric_config(&mut self, config: MetricConfig) {
        match self.metric_configs.iter_mut().find(|c| c.id() == config.id()) {
            Some(existing) => *existing = config.clone(),
            None => self.metric_configs.push(config.clone()),
        }
        self.recompute_metric(&config);
        self.reconcile();
    }

    pub fn remove_metric_config(&mut self, id: &str) -> bool {
        let before = self.metric_configs.len();
        self.metric_configs.retain(|c| c.id() != id);
        let removed = self.metric_configs.len() != before;
        if removed {
            self.metric_values.remove(id);
            self.reconcile();
        }
        removed
    }

    /// Insert or replace one condition set by id
    pub fn upsert_condition_set(&mut self, set: ConditionSet) {
        match self.condition_sets.iter_mut().find(|s| s.id == set.id) {
            Some(existing) => *existing = set.clone(),
            None => self.condition_sets.push(set.clone()),
        }
        self.recompute_indicator(&set);
        self.reconcile();
    }

    pub fn remove_condition_set(&mut self, id: &str) -> bool {
        let before = self.condition_sets.len();
        self.condition_sets.retain(|s| s.id != id);
        let removed = self.condition_sets.len() != before;
        if removed {
            self.indicator_states.remove(id);
            self.reconcile();
        }
        removed
    }

    /// Hold the binding's topic while an edit form is open.
    ///
    /// Returns the acquired topic, to be handed back to `close_draft`.
    pub fn open_draft(&mut self, binding: &SourceBinding) -> Option<String> {
        let topic = self
            .devices
            .get(&binding.device_id)
            .map(|d| d.topic.clone())
            .filter(|t| !t.is_empty())?;

        self.registry.acquire(&topic);
        Some(topic)
    }

    pub fn close_draft(&mut self, topic: &str) {
        self.registry.release(topic);
    }

    /// Handle one inbound message.
    ///
    /// Messages on topics nothing holds (no configuration, no open draft) are
    /// ignored. Malformed envelopes are dropped without touching derived
    /// values. Payloads on draft-only topics are stored but recompute
    /// nothing until a configuration reads them.
    pub fn handle_message(&mut self, topic: &str, raw: &[u8]) {
        let device_ids: Vec<String> = self
            .devices
            .values()
            .filter(|d| d.topic == topic)
            .map(|d| d.id.clone())
            .collect();

        let relevant = self.registry.ref_count(topic) > 0
            || self.metric_configs.iter().any(|c| c.reads_from(&device_ids))
            || self
                .condition_sets
                .iter()
                .any(|s| s.reads_from(&device_ids));
        if !relevant {
            self.stats.ignored += 1;
            debug!(topic = %topic, "Topic is not tracked, ignoring message");
            return;
        }

        let payload = match normalize_bytes(raw) {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.dropped += 1;
                warn!(topic = %topic, error = %e, "Dropping malformed message");
                return;
            }
        };

        for id in &device_ids {
            if let Some(device) = self.devices.get_mut(id) {
                device.last_payload = payload.clone();
                self.live_devices.insert(id.clone());
            }
        }

        self.stats.handled += 1;
        self.stats.last_message_at = Some(Utc::now());

        let configs: Vec<MetricConfig> = self
            .metric_configs
            .iter()
            .filter(|c| c.reads_from(&device_ids))
            .cloned()
            .collect();
        for config in &configs {
            self.recompute_metric(config);
        }

        let sets: Vec<ConditionSet> = self
            .condition_sets
            .iter()
            .filter(|s| s.reads_from(&device_ids))
            .cloned()
            .collect();
        for set in &sets {
            self.recompute_indicator(set);
        }
    }

    /// Broker connection (re)established
    pub fn on_connected(&mut self) {
        self.registry.resync();
    }

    /// Release all subscriptions; safe to call more than once
    pub fn shutdown(&mut self) {
        self.registry.shutdown();
    }

    /// Latest value of a metric; `None` for an unknown config id
    pub fn metric_value(&self, config_id: &str) -> Option<MetricValue> {
        if !self.metric_configs.iter().any(|c| c.id() == config_id) {
            return None;
        }
        Some(
            self.metric_values
                .get(config_id)
                .cloned()
                .unwrap_or(MetricValue::NotAvailable),
        )
    }

    pub fn metric_values(&self) -> BTreeMap<String, MetricValue> {
        self.metric_configs
            .iter()
            .map(|c| {
                let value = self
                    .metric_values
                    .get(c.id())
                    .cloned()
                    .unwrap_or(MetricValue::NotAvailable);
                (c.id().to_string(), value)
            })
            .collect()
    }

    /// Evaluate a condition set against an explicit value
    pub fn active_state(&self, set_id: &str, value: &Value) -> Option<String> {
        self.condition_sets
            .iter()
            .find(|s| s.id == set_id)
            .map(|set| evaluate(set, value).to_string())
    }

    /// State of a condition set for its bound live value
    pub fn current_state(&self, set_id: &str) -> Option<String> {
        let set = self.condition_sets.iter().find(|s| s.id == set_id)?;
        Some(
            self.indicator_states
                .get(set_id)
                .cloned()
                .unwrap_or_else(|| evaluate(set, &Value::Null).to_string()),
        )
    }

    pub fn health(&self) -> HealthSnapshot {
        let mut devices_by_protocol = BTreeMap::new();
        for device in self.devices.values() {
            *devices_by_protocol.entry(device.protocol().label()).or_insert(0) += 1;
        }

        HealthSnapshot {
            subscriptions: self.registry.snapshot(),
            devices: self.devices.len(),
            devices_by_protocol,
            metric_configs: self.metric_configs.len(),
            condition_sets: self.condition_sets.len(),
            messages_handled: self.stats.handled,
            messages_dropped: self.stats.dropped,
            messages_ignored: self.stats.ignored,
            last_message_at: self.stats.last_message_at,
        }
    }

    pub fn registry(&self) -> &TopicSubscriptionRegistry<T> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TopicSubscriptionRegistry<T> {
        &mut self.registry
    }

    /// Swap the device list, keeping live payloads for devices whose topic
    /// did not change
    fn replace_devices(&mut self, devices: Vec<Device>) {
        let mut incoming = index_devices(devices);

        for (id, device) in incoming.iter_mut() {
            if !self.live_devices.contains(id) {
                continue;
            }
            if let Some(previous) = self.devices.get_mut(id) {
                if previous.topic == device.topic {
                    device.last_payload = std::mem::take(&mut previous.last_payload);
                }
            }
        }

        self.live_devices.retain(|id| incoming.contains_key(id));
        self.devices = incoming;
    }

    fn reconcile(&mut self) {
        let bindings = self
            .metric_configs
            .iter()
            .flat_map(|c| c.bindings())
            .chain(self.condition_sets.iter().flat_map(|s| s.bindings()));
        let required = TopicSubscriptionRegistry::<T>::compute_required_topics(bindings, &self.devices);

        self.registry.reconcile(&required);
    }

    fn recompute_all(&mut self) {
        let ids: HashSet<&str> = self.metric_configs.iter().map(|c| c.id()).collect();
        self.metric_values.retain(|id, _| ids.contains(id.as_str()));
        let ids: HashSet<&str> = self.condition_sets.iter().map(|s| s.id.as_str()).collect();
        self.indicator_states.retain(|id, _| ids.contains(id.as_str()));

        for config in self.metric_configs.clone() {
            self.recompute_metric(&config);
        }
        for set in self.condition_sets.clone() {
            self.recompute_indicator(&set);
        }
    }

    fn recompute_metric(&mut self, config: &MetricConfig) {
        let value = recompute(config, &self.devices);
        if self.metric_values.get(config.id()) == Some(&value) {
            return;
        }

        debug!(config_id = %config.id(), value = %value, "Metric updated");
        self.metric_values
            .insert(config.id().to_string(), value.clone());
        let _ = self.update_tx.send(DerivedUpdate::Metric {
            id: config.id().to_string(),
            value,
            timestamp: Utc::now(),
        });
    }

    fn recompute_indicator(&mut self, set: &ConditionSet) {
        let Some(binding) = &set.binding else {
            return;
        };
        let value = binding.lookup(&self.devices).cloned().unwrap_or(Value::Null);
        let state = evaluate(set, &value).to_string();
        if self.indicator_states.get(&set.id) == Some(&state) {
            return;
        }

        debug!(set_id = %set.id, state = %state, "Indicator state updated");
        self.indicator_states.insert(set.id.clone(), state.clone());
        let _ = self.update_tx.send(DerivedUpdate::Indicator {
            id: set.id.clone(),
            state,
            timestamp: Utc::now(),
        });
    }
}

/// Keep the first entry per id; later duplicates would overwrite its values
fn dedup_by_id<T>(items: Vec<T>, id: impl Fn(&T) -> &str, kind: &str) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let keep = seen.insert(id(item).to_string());
            if !keep {
                warn!(id = %id(item), kind = kind, "Duplicate id in configuration list, skipping");
            }
            keep
        })
        .collect()
}
