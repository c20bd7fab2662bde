use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;


/// Flat key → value snapshot of one device message
pub type Payload = Map<String, Value>;

/// Envelope field some producers use to carry the real payload
const ENVELOPE_FIELD: &str = "value";

/// Errors raised while decoding a wire message
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizeError {
    /// Outer layer is not a JSON object (or not UTF-8)
    MalformedEnvelope(String),
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeError::MalformedEnvelope(reason) => {
                write!(f, "malformed envelope: {}", reason)
            }
        }
    }
}

impl std::error::Error for NormalizeError {}

/// Decode a raw wire message into a flat payload.
///
/// Accepted shapes:
/// - `{"value": "<stringified JSON object>", ...}` → inner object
/// - `{"value": {...}, ...}` → inner object
/// - `{...}` → the object itself
///
/// A stringified inner payload that fails to parse falls back to the outer
/// object. Only a broken outer layer is an error.
pub fn normalize(raw: &str) -> Result<Payload, NormalizeError> {
    let outer: Value = serde_json::from_str(raw)
        .map_err(|e| NormalizeError::MalformedEnvelope(e.to_string()))?;

    let outer = match outer {
        Value::Object(map) => map,
        other => {
            return Err(NormalizeError::MalformedEnvelope(format!(
                "expected JSON object, got {}",
                json_type_name(&other)
            )))
        }
    };

    Ok(unwrap_envelope(outer))
}

/// Strip the `value` envelope from an already-parsed outer object
pub fn unwrap_envelope(outer: Payload) -> Payload {
    let inner = match outer.get(ENVELOPE_FIELD) {
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(inner)) => Some(inner),
            Ok(other) => {
                debug!(
                    inner_type = json_type_name(&other),
                    "Envelope value is not an object, keeping outer payload"
                );
                None
            }
            Err(e) => {
                debug!(error = %e, "Envelope value is not JSON, keeping outer payload");
                None
            }
        },
        Some(Value::Object(inner)) => Some(inner.clone()),
        _ => None,
    };

    inner.unwrap_or(outer)
}

/// Decode an MQTT payload (bytes) into a flat payload
pub fn normalize_bytes(raw: &[u8]) -> Result<Payload, NormalizeError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| NormalizeError::MalformedEnvelope(format!("invalid UTF-8: {}", e)))?;
    normalize(text)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Read a payload field as a number.
///
/// Accepts JSON numbers and numeric strings (surrounding whitespace ignored).
/// Everything else, including non-finite values, is `None`.
pub fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}
