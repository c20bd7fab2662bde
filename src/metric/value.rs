use serde::{Serialize, Serializer};
use std::fmt;

/// Wire/display form of a missing result
pub const NOT_AVAILABLE: &str = "N/A";

/// Result of a metric computation
#[derive(Clone, Debug, PartialEq)]
pub enum MetricValue {
    Number(f64),
    /// Pre-formatted result (ratios are rounded to two decimals)
    Text(String),
    /// No binding produced data
    NotAvailable,
}

impl MetricValue {
    pub fn is_available(&self) -> bool {
        !matches!(self, MetricValue::NotAvailable)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Text(s) => s.parse().ok(),
            MetricValue::NotAvailable => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{}", n),
            MetricValue::Text(s) => f.write_str(s),
            MetricValue::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricValue::Number(n) => serializer.serialize_f64(*n),
            MetricValue::Text(s) => serializer.serialize_str(s),
            MetricValue::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}
