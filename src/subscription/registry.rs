use crate::device::{DeviceMap, SourceBinding};
use crate::subscription::transport::{TopicTransport, TransportError};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Demand and state for one tracked topic
#[derive(Debug, Default)]
struct TopicEntry {
    /// Required by the saved configuration set
    persisted: bool,
    /// Live transient consumers (open edit drafts)
    transient: u32,
    /// Broker subscription confirmed by the transport
    subscribed: bool,
}

impl TopicEntry {
    fn ref_count(&self) -> u32 {
        u32::from(self.persisted) + self.transient
    }
}

#[derive(Debug, Default)]
struct TransportStats {
    subscribe_calls: u64,
    unsubscribe_calls: u64,
    failures: u64,
}

/// One topic as seen by diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicSubscription {
    pub topic: String,
    pub ref_count: u32,
    pub subscribed: bool,
}

/// Subscription count / health snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionSnapshot {
    pub topics: Vec<TopicSubscription>,
    /// Topics with a live broker subscription
    pub subscribed: usize,
    /// Topics that are wanted but not (yet) subscribed
    pub pending: usize,
    pub subscribe_calls: u64,
    pub unsubscribe_calls: u64,
    pub transport_failures: u64,
}

/// Reference-counted topic subscriptions.
///
/// The registry is the only component that talks to the transport. A topic
/// is subscribed once no matter how many consumers want it and unsubscribed
/// only when the last one lets go. Transport failures leave the topic in its
/// previous state so the next `reconcile` retries.
pub struct TopicSubscriptionRegistry<T: TopicTransport> {
    transport: T,
    topics: BTreeMap<String, TopicEntry>,
    stats: TransportStats,
    shut_down: bool,
}

impl<T: TopicTransport> TopicSubscriptionRegistry<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            topics: BTreeMap::new(),
            stats: TransportStats::default(),
            shut_down: false,
        }
    }

    /// Distinct topics behind a set of bindings.
    ///
    /// Bindings naming an unknown device, or a device without a topic, are
    /// skipped.
    pub fn compute_required_topics<'a, I>(bindings: I, devices: &DeviceMap) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a SourceBinding>,
    {
        bindings
            .into_iter()
            .filter_map(|binding| devices.get(&binding.device_id))
            .filter(|device| !device.topic.is_empty())
            .map(|device| device.topic.clone())
            .collect()
    }

    /// Converge the persisted demand to `required`.
    ///
    /// Calling this twice with the same set issues no further transport calls
    /// (unless an earlier call failed and is being retried).
    pub fn reconcile(&mut self, required: &BTreeSet<String>) {
        if self.shut_down {
            debug!("Registry shut down, ignoring reconcile");
            return;
        }

        for (topic, entry) in self.topics.iter_mut() {
            entry.persisted = required.contains(topic);
        }
        for topic in required {
            self.topics.entry(topic.clone()).or_default().persisted = true;
        }

        let Self {
            transport,
            topics,
            stats,
            ..
        } = self;
        topics.retain(|topic, entry| converge(transport, stats, topic, entry));
    }

    /// Register a transient consumer for `topic`
    pub fn acquire(&mut self, topic: &str) {
        if self.shut_down {
            debug!(topic = %topic, "Registry shut down, ignoring acquire");
            return;
        }

        let entry = self.topics.entry(topic.to_string()).or_default();
        entry.transient += 1;
        if !converge(&mut self.transport, &mut self.stats, topic, entry) {
            self.topics.remove(topic);
        }
    }

    /// Drop a transient consumer for `topic`.
    ///
    /// Unsubscribes only when nothing else, including the persisted
    /// configuration set, still needs the topic.
    pub fn release(&mut self, topic: &str) {
        let Some(entry) = self.topics.get_mut(topic) else {
            debug!(topic = %topic, "Release for untracked topic ignored");
            return;
        };
        if entry.transient == 0 {
            debug!(topic = %topic, "Release without a transient consumer ignored");
            return;
        }

        entry.transient -= 1;
        if !converge(&mut self.transport, &mut self.stats, topic, entry) {
            self.topics.remove(topic);
        }
    }

    /// Forget broker-side state after a reconnect and subscribe again
    pub fn resync(&mut self) {
        if self.shut_down {
            return;
        }

        for entry in self.topics.values_mut() {
            entry.subscribed = false;
        }

        let Self {
            transport,
            topics,
            stats,
            ..
        } = self;
        topics.retain(|topic, entry| converge(transport, stats, topic, entry));

        info!(topics = self.topics.len(), "Topic subscriptions resynchronised");
    }

    /// Release every subscription. Runs once; later calls are no-ops.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let released = self.topics.len();
        for (topic, entry) in std::mem::take(&mut self.topics) {
            if !entry.subscribed {
                continue;
            }
            self.stats.unsubscribe_calls += 1;
            if let Err(e) = self.transport.unsubscribe(&topic) {
                debug!(topic = %topic, error = %e, "Unsubscribe during shutdown failed");
            }
        }

        info!(topics = released, "Topic subscriptions released");
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.get(topic).map_or(false, |e| e.subscribed)
    }

    /// Current consumer count for `topic` (0 when untracked)
    pub fn ref_count(&self, topic: &str) -> u32 {
        self.topics.get(topic).map_or(0, TopicEntry::ref_count)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn snapshot(&self) -> SubscriptionSnapshot {
        let topics: Vec<TopicSubscription> = self
            .topics
            .iter()
            .map(|(topic, entry)| TopicSubscription {
                topic: topic.clone(),
                ref_count: entry.ref_count(),
                subscribed: entry.subscribed,
            })
            .collect();

        SubscriptionSnapshot {
            subscribed: topics.iter().filter(|t| t.subscribed).count(),
            pending: topics
                .iter()
                .filter(|t| !t.subscribed && t.ref_count > 0)
                .count(),
            topics,
            subscribe_calls: self.stats.subscribe_calls,
            unsubscribe_calls: self.stats.unsubscribe_calls,
            transport_failures: self.stats.failures,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

impl<T: TopicTransport> Drop for TopicSubscriptionRegistry<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Bring one topic's broker state in line with its demand.
///
/// Returns whether the entry should stay tracked.
fn converge<T: TopicTransport>(
    transport: &mut T,
    stats: &mut TransportStats,
    topic: &str,
    entry: &mut TopicEntry,
) -> bool {
    let wanted = entry.ref_count() > 0;

    match (wanted, entry.subscribed) {
        (true, true) => true,
        (false, false) => false,
        (true, false) => {
            stats.subscribe_calls += 1;
            match transport.subscribe(topic) {
                Ok(()) => {
                    entry.subscribed = true;
                    info!(topic = %topic, ref_count = entry.ref_count(), "Subscribed to topic");
                }
                Err(e) => record_failure(stats, topic, "subscribe", &e),
            }
            true
        }
        (false, true) => {
            stats.unsubscribe_calls += 1;
            match transport.unsubscribe(topic) {
                Ok(()) => {
                    info!(topic = %topic, "Unsubscribed from topic");
                    false
                }
                Err(e) => {
                    record_failure(stats, topic, "unsubscribe", &e);
                    true
                }
            }
        }
    }
}

fn record_failure(stats: &mut TransportStats, topic: &str, op: &str, error: &TransportError) {
    stats.failures += 1;
    warn!(topic = %topic, op = op, error = %error, "Transport request failed, will retry on next reconcile");
}
