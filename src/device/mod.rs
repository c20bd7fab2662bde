use crate::payload::{normalize, unwrap_envelope, Payload};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Devices keyed by unique id
pub type DeviceMap = HashMap<String, Device>;

/// Field-bus / transport a device is read over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "MQTT")]
    Mqtt,
    #[serde(rename = "Modbus RTU")]
    ModbusRtu,
    #[serde(rename = "Modbus TCP")]
    ModbusTcp,
    #[serde(other)]
    Other,
}

impl Protocol {
    pub fn label(&self) -> &'static str {
        match self {
            Protocol::Mqtt => "mqtt",
            Protocol::ModbusRtu => "modbus_rtu",
            Protocol::ModbusTcp => "modbus_tcp",
            Protocol::Other => "other",
        }
    }
}

/// One addressable data source, as listed by `GET /api/devices/for-selection`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Unique device identifier
    #[serde(rename = "uniqId")]
    pub id: String,

    pub name: String,

    /// Wire topic the device publishes on
    pub topic: String,

    /// Most recent normalized message for `topic`
    #[serde(
        rename = "lastPayload",
        default,
        deserialize_with = "deserialize_last_payload"
    )]
    pub last_payload: Payload,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

impl Device {
    pub fn new(id: impl Into<String>, name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            topic: topic.into(),
            last_payload: Payload::new(),
            protocol: None,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol.unwrap_or(Protocol::Other)
    }
}

/// A single scalar selector into a device's normalized payload.
///
/// Replaced wholesale when repointed; never mutated in place.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceBinding {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub key: String,
}

impl SourceBinding {
    pub fn new(device_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            key: key.into(),
        }
    }

    /// Look up the bound field in the owning device's payload
    pub fn lookup<'a, S: PayloadSource + ?Sized>(&self, source: &'a S) -> Option<&'a Value> {
        source.payload(&self.device_id)?.get(&self.key)
    }
}

/// Latest normalized payload per device id
pub trait PayloadSource {
    fn payload(&self, device_id: &str) -> Option<&Payload>;
}

impl PayloadSource for DeviceMap {
    fn payload(&self, device_id: &str) -> Option<&Payload> {
        self.get(device_id).map(|d| &d.last_payload)
    }
}

impl PayloadSource for HashMap<String, Payload> {
    fn payload(&self, device_id: &str) -> Option<&Payload> {
        self.get(device_id)
    }
}

/// Build a device map from a listing, last entry wins on duplicate ids
pub fn index_devices(devices: impl IntoIterator<Item = Device>) -> DeviceMap {
    devices.into_iter().map(|d| (d.id.clone(), d)).collect()
}

/// `lastPayload` arrives as null, an object, or a still-enveloped string
fn deserialize_last_payload<'de, D>(deserializer: D) -> Result<Payload, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Object(map)) => unwrap_envelope(map),
        Some(Value::String(raw)) => normalize(&raw).unwrap_or_default(),
        _ => Payload::new(),
    })
}
