use super::testing::{Call, RecordingTransport};
use super::*;
use crate::device::{index_devices, Device, SourceBinding};
use std::collections::BTreeSet;

fn topics(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn registry() -> TopicSubscriptionRegistry<RecordingTransport> {
    TopicSubscriptionRegistry::new(RecordingTransport::new())
}

#[test]
fn test_reconcile_subscribes_new_topics() {
    let mut reg = registry();

    reg.reconcile(&topics(&["t1", "t2"]));

    assert!(reg.is_subscribed("t1"));
    assert!(reg.is_subscribed("t2"));
    assert_eq!(reg.ref_count("t1"), 1);
    assert_eq!(reg.transport().calls.len(), 2);
}

#[test]
fn test_reconcile_is_idempotent() {
    let mut reg = registry();
    let required = topics(&["t1", "t2"]);

    reg.reconcile(&required);
    let calls_after_first = reg.transport().calls.len();

    reg.reconcile(&required);

    assert_eq!(reg.transport().calls.len(), calls_after_first);
    assert_eq!(reg.transport().subscribes("t1"), 1);
    assert_eq!(reg.transport().subscribes("t2"), 1);
}

#[test]
fn test_reconcile_unsubscribes_dropped_topics() {
    let mut reg = registry();

    reg.reconcile(&topics(&["t1", "t2"]));
    reg.reconcile(&topics(&["t2"]));

    assert!(!reg.is_subscribed("t1"));
    assert_eq!(reg.ref_count("t1"), 0);
    assert_eq!(reg.transport().unsubscribes("t1"), 1);
    assert_eq!(reg.transport().unsubscribes("t2"), 0);
}

#[test]
fn test_draft_and_saved_config_share_one_subscription() {
    let mut reg = registry();

    reg.acquire("t1");
    reg.reconcile(&topics(&["t1"]));

    assert_eq!(reg.ref_count("t1"), 2);
    assert_eq!(reg.transport().subscribes("t1"), 1);
}

#[test]
fn test_release_keeps_topic_required_by_saved_config() {
    let mut reg = registry();

    reg.reconcile(&topics(&["t1"]));
    reg.acquire("t1");
    reg.release("t1");

    assert!(reg.is_subscribed("t1"));
    assert_eq!(reg.ref_count("t1"), 1);
    assert_eq!(reg.transport().unsubscribes("t1"), 0);
}

#[test]
fn test_release_last_consumer_unsubscribes() {
    let mut reg = registry();

    reg.acquire("draft");
    assert!(reg.is_subscribed("draft"));

    reg.release("draft");

    assert!(!reg.is_subscribed("draft"));
    assert_eq!(
        reg.transport().calls,
        vec![
            Call::Subscribe("draft".to_string()),
            Call::Unsubscribe("draft".to_string())
        ]
    );
}

#[test]
fn test_reconcile_keeps_topic_held_by_draft() {
    let mut reg = registry();

    reg.reconcile(&topics(&["t1"]));
    reg.acquire("t1");
    reg.reconcile(&topics(&[]));

    // Draft still open
    assert!(reg.is_subscribed("t1"));
    assert_eq!(reg.ref_count("t1"), 1);

    reg.release("t1");
    assert!(!reg.is_subscribed("t1"));
    assert_eq!(reg.transport().unsubscribes("t1"), 1);
}

#[test]
fn test_unbalanced_release_is_ignored() {
    let mut reg = registry();

    reg.release("never-acquired");
    reg.reconcile(&topics(&["t1"]));
    reg.release("t1");

    assert!(reg.is_subscribed("t1"));
    assert_eq!(reg.ref_count("t1"), 1);
}

#[test]
fn test_refcount_conservation_over_sequence() {
    let mut reg = registry();

    reg.acquire("a");
    reg.acquire("a");
    reg.reconcile(&topics(&["a", "b"]));
    reg.release("a");
    assert!(reg.is_subscribed("a"));

    reg.reconcile(&topics(&["b"]));
    assert!(reg.is_subscribed("a"));

    reg.release("a");
    assert!(!reg.is_subscribed("a"));
    assert!(reg.is_subscribed("b"));

    assert_eq!(reg.transport().subscribes("a"), 1);
    assert_eq!(reg.transport().unsubscribes("a"), 1);
}

#[test]
fn test_failed_subscribe_is_retried_on_next_reconcile() {
    let mut transport = RecordingTransport::new();
    transport.fail_subscribe.insert("t1".to_string());
    let mut reg = TopicSubscriptionRegistry::new(transport);

    reg.reconcile(&topics(&["t1"]));
    assert!(!reg.is_subscribed("t1"));
    assert_eq!(reg.snapshot().pending, 1);
    assert_eq!(reg.snapshot().transport_failures, 1);

    reg.transport_mut().fail_subscribe.clear();
    reg.reconcile(&topics(&["t1"]));

    assert!(reg.is_subscribed("t1"));
    assert_eq!(reg.transport().subscribes("t1"), 1);
}

#[test]
fn test_failed_unsubscribe_is_retried_on_next_reconcile() {
    let mut reg = registry();
    reg.reconcile(&topics(&["t1"]));

    reg.transport_mut().fail_unsubscribe.insert("t1".to_string());
    reg.reconcile(&topics(&[]));
    assert!(reg.is_subscribed("t1"));

    reg.transport_mut().fail_unsubscribe.clear();
    reg.reconcile(&topics(&[]));

    assert!(!reg.is_subscribed("t1"));
    assert_eq!(reg.transport().unsubscribes("t1"), 1);
}

#[test]
fn test_resync_resubscribes_after_reconnect() {
    let mut reg = registry();
    reg.reconcile(&topics(&["t1", "t2"]));

    reg.resync();

    assert_eq!(reg.transport().subscribes("t1"), 2);
    assert_eq!(reg.transport().subscribes("t2"), 2);
    assert!(reg.is_subscribed("t1"));
}

#[test]
fn test_shutdown_is_idempotent() {
    let mut reg = registry();
    reg.reconcile(&topics(&["t1", "t2"]));

    reg.shutdown();
    reg.shutdown();

    assert_eq!(reg.transport().unsubscribes("t1"), 1);
    assert_eq!(reg.transport().unsubscribes("t2"), 1);
    assert!(reg.is_shut_down());
    assert!(reg.snapshot().topics.is_empty());
}

#[test]
fn test_shutdown_tolerates_disconnected_transport() {
    let mut reg = registry();
    reg.reconcile(&topics(&["t1"]));
    reg.transport_mut().disconnected = true;

    reg.shutdown();

    assert!(reg.is_shut_down());
    assert!(!reg.is_subscribed("t1"));
}

#[test]
fn test_reconcile_after_shutdown_is_noop() {
    let mut reg = registry();
    reg.shutdown();

    reg.reconcile(&topics(&["t1"]));
    reg.acquire("t2");

    assert!(reg.transport().calls.is_empty());
}

#[test]
fn test_compute_required_topics_skips_unresolved_devices() {
    let devices = index_devices(vec![
        Device::new("d1", "Main meter", "site/main"),
        Device::new("d2", "PDU", "site/pdu"),
        Device::new("d3", "No topic", ""),
    ]);
    let bindings = vec![
        SourceBinding::new("d1", "power"),
        SourceBinding::new("d1", "energy"),
        SourceBinding::new("d2", "power"),
        SourceBinding::new("d3", "power"),
        SourceBinding::new("ghost", "power"),
    ];

    let required =
        TopicSubscriptionRegistry::<RecordingTransport>::compute_required_topics(&bindings, &devices);

    assert_eq!(required, topics(&["site/main", "site/pdu"]));
}

#[test]
fn test_snapshot_reports_counts() {
    let mut reg = registry();
    reg.reconcile(&topics(&["t1", "t2"]));
    reg.acquire("t1");

    let snapshot = reg.snapshot();

    assert_eq!(snapshot.subscribed, 2);
    assert_eq!(snapshot.pending, 0);
    assert_eq!(snapshot.subscribe_calls, 2);
    let t1 = snapshot.topics.iter().find(|t| t.topic == "t1").unwrap();
    assert_eq!(t1.ref_count, 2);
}
