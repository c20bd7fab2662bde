use super::*;
use crate::condition::{Combinator, Condition, ConditionSet, LogicState, Operator, ValueType};
use crate::device::SourceBinding;
use crate::metric::{CostConfig, MetricConfig};
use mockito::{Matcher, Server};
use serde_json::json;

const DEVICES: &str = r#"[
    {
        "uniqId": "D1",
        "name": "Main meter",
        "topic": "t1",
        "lastPayload": {"value": "{\"main\": 1000}"},
        "protocol": "MQTT"
    },
    {"uniqId": "D2", "name": "PDU", "topic": "t2", "lastPayload": null}
]"#;

const PUE_CONFIGS: &str = r#"[
    {
        "kind": "ratio",
        "id": "pue",
        "numerator": {"deviceId": "D1", "key": "main"},
        "denominator": {"id": "it", "bindings": [{"deviceId": "D2", "key": "p"}]}
    }
]"#;

fn bill(rate: f64) -> MetricConfig {
    MetricConfig::Cost(CostConfig {
        id: "bill-1".to_string(),
        binding: SourceBinding::new("D1", "main"),
        rate,
    })
}

fn breaker_set() -> ConditionSet {
    ConditionSet {
        id: "breaker".to_string(),
        states: vec![LogicState {
            name: "Tripped".to_string(),
            color: "red".to_string(),
            animated: true,
            conditions: vec![Condition::new(Operator::Eq, "true", ValueType::Boolean)],
            combinator: Combinator::And,
        }],
        default_state_name: "Tripped".to_string(),
        binding: None,
    }
}

#[tokio::test]
async fn test_fetch_devices() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/devices/for-selection")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(DEVICES)
        .create_async()
        .await;

    let client = BackendClient::with_base_url(server.url()).unwrap();
    let devices = client.fetch_devices().await.unwrap();

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].id, "D1");
    assert_eq!(devices[0].last_payload["main"], json!(1000));
    assert!(devices[1].last_payload.is_empty());
}

#[tokio::test]
async fn test_fetch_all_collects_every_feature() {
    let mut server = Server::new_async().await;
    let _devices = server
        .mock("GET", "/api/devices/for-selection")
        .with_status(200)
        .with_body(DEVICES)
        .create_async()
        .await;
    let _pue = server
        .mock("GET", "/api/pue-configs")
        .with_status(200)
        .with_body(PUE_CONFIGS)
        .create_async()
        .await;
    let _bill = server
        .mock("GET", "/api/bill-configs")
        .with_status(200)
        .with_body(
            r#"[{"kind": "cost", "id": "bill-1", "binding": {"deviceId": "D1", "key": "main"}, "rate": 0.2}]"#,
        )
        .create_async()
        .await;
    let _logic = server
        .mock("GET", "/api/logic-configs")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let client = BackendClient::with_base_url(server.url()).unwrap();
    let features = vec!["pue".to_string(), "bill".to_string()];
    let update = client.fetch_all(&features).await.unwrap();

    assert_eq!(update.devices.map(|d| d.len()), Some(2));
    let configs = update.metric_configs.unwrap();
    assert_eq!(configs.len(), 2);
    assert_eq!(configs[0].id(), "pue");
    assert_eq!(configs[1], bill(0.2));
    assert_eq!(update.condition_sets.map(|s| s.len()), Some(0));
}

#[tokio::test]
async fn test_fetch_all_fails_when_any_list_fails() {
    let mut server = Server::new_async().await;
    let _devices = server
        .mock("GET", "/api/devices/for-selection")
        .with_status(200)
        .with_body(DEVICES)
        .create_async()
        .await;
    let _pue = server
        .mock("GET", "/api/pue-configs")
        .with_status(500)
        .with_body("database unavailable")
        .create_async()
        .await;

    let client = BackendClient::with_base_url(server.url()).unwrap();
    let err = client
        .fetch_all(&["pue".to_string()])
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("500"));
}

#[tokio::test]
async fn test_create_metric_config_posts_json() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/bill-configs")
        .match_body(Matcher::PartialJson(json!({"kind": "cost", "rate": 0.3})))
        .with_status(201)
        .with_body(
            r#"{"kind": "cost", "id": "bill-1", "binding": {"deviceId": "D1", "key": "main"}, "rate": 0.3}"#,
        )
        .create_async()
        .await;

    let client = BackendClient::with_base_url(server.url()).unwrap();
    let saved = client.create_metric_config("bill", &bill(0.3)).await.unwrap();

    assert_eq!(saved, bill(0.3));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let client = BackendClient::with_base_url(server.url()).unwrap();
    assert!(client.create_metric_config("bill", &bill(-1.0)).await.is_err());

    let mut set = breaker_set();
    set.default_state_name = "Closed".to_string();
    assert!(client.create_condition_set(&set).await.is_err());

    mock.assert_async().await;
}

#[tokio::test]
async fn test_update_and_delete_condition_set() {
    let mut server = Server::new_async().await;
    let put = server
        .mock("PUT", "/api/logic-configs/breaker")
        .with_status(200)
        .with_body(serde_json::to_string(&breaker_set()).unwrap())
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/api/logic-configs/breaker")
        .with_status(204)
        .create_async()
        .await;

    let client = BackendClient::with_base_url(server.url()).unwrap();
    let saved = client.update_condition_set(&breaker_set()).await.unwrap();
    assert_eq!(saved, breaker_set());
    client.delete_condition_set("breaker").await.unwrap();

    put.assert_async().await;
    delete.assert_async().await;
}

#[tokio::test]
async fn test_trailing_slash_in_base_url() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("DELETE", "/api/pue-configs/pue")
        .with_status(200)
        .create_async()
        .await;

    let client = BackendClient::with_base_url(format!("{}/", server.url())).unwrap();
    client.delete_metric_config("pue", "pue").await.unwrap();

    mock.assert_async().await;
}

#[test]
fn test_default_backend_config() {
    let config = BackendConfig::default();
    assert_eq!(config.metric_features, vec!["pue", "bill", "pdu", "power-analyzer"]);
    assert_eq!(config.refresh_interval_seconds, 30);
}
