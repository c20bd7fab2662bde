use crate::device::{PayloadSource, SourceBinding};
use crate::metric::config::{AggregateConfig, Combine, CostConfig, MetricConfig, RatioConfig};
use crate::metric::value::MetricValue;
use crate::payload::parse_number;
use serde_json::Value;
use tracing::warn;

/// Raw readings are instantaneous watts; the logging backend books each
/// sample as one hour of consumption, so W / 1000 = kWh per sample.
pub const WATTS_PER_KILOWATT: f64 = 1000.0;

/// Recompute one metric from the latest payloads
pub fn recompute<S: PayloadSource + ?Sized>(config: &MetricConfig, payloads: &S) -> MetricValue {
    match config {
        MetricConfig::Aggregate(c) => match aggregate(c, payloads) {
            Some(total) => MetricValue::Number(total),
            None => MetricValue::NotAvailable,
        },
        MetricConfig::Ratio(c) => ratio(c, payloads),
        MetricConfig::Cost(c) => MetricValue::Number(cost(c, payloads)),
    }
}

/// Fold the numeric bindings of an aggregate.
///
/// Bindings without a numeric value are skipped, not counted as zero.
/// Returns `None` when no binding contributed.
fn aggregate<S: PayloadSource + ?Sized>(config: &AggregateConfig, payloads: &S) -> Option<f64> {
    let mut contributions = config
        .bindings
        .iter()
        .filter_map(|binding| numeric_binding(&config.id, binding, payloads))
        .peekable();

    contributions.peek()?;

    Some(match config.combine {
        Combine::Sum => contributions.sum(),
    })
}

fn ratio<S: PayloadSource + ?Sized>(config: &RatioConfig, payloads: &S) -> MetricValue {
    let numerator = match numeric_binding(&config.id, &config.numerator, payloads) {
        Some(n) if n != 0.0 => n,
        _ => return MetricValue::NotAvailable,
    };

    match aggregate(&config.denominator, payloads) {
        None => MetricValue::NotAvailable,
        // A real zero reading, distinct from missing data
        Some(d) if d == 0.0 => MetricValue::Text("0".to_string()),
        Some(d) => MetricValue::Text(format!("{:.2}", numerator / d)),
    }
}

fn cost<S: PayloadSource + ?Sized>(config: &CostConfig, payloads: &S) -> f64 {
    let raw = match config.binding.lookup(payloads) {
        None | Some(Value::Null) => return 0.0,
        Some(value) => match parse_number(value) {
            Some(n) => n,
            None => {
                warn!(
                    config_id = %config.id,
                    device_id = %config.binding.device_id,
                    key = %config.binding.key,
                    "Cost binding is not numeric, using 0"
                );
                return 0.0;
            }
        },
    };

    let energy_kwh = raw / WATTS_PER_KILOWATT;
    energy_kwh * config.rate
}

fn numeric_binding<S: PayloadSource + ?Sized>(
    config_id: &str,
    binding: &SourceBinding,
    payloads: &S,
) -> Option<f64> {
    let number = binding.lookup(payloads).and_then(parse_number);
    if number.is_none() {
        warn!(
            config_id = %config_id,
            device_id = %binding.device_id,
            key = %binding.key,
            "Binding has no numeric value, skipping"
        );
    }
    number
}
