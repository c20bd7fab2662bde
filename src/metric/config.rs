use crate::device::SourceBinding;
use serde::{Deserialize, Serialize};

/// How an aggregate folds its bindings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combine {
    #[default]
    Sum,
}

/// Sum of several bindings (PDU total power, power-analyzer total)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateConfig {
    pub id: String,
    pub bindings: Vec<SourceBinding>,
    #[serde(default)]
    pub combine: Combine,
}

/// Numerator over an aggregate (PUE = facility power / IT power)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatioConfig {
    pub id: String,
    pub numerator: SourceBinding,
    pub denominator: AggregateConfig,
}

/// Energy cost of one binding at a fixed rate per kWh
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostConfig {
    pub id: String,
    pub binding: SourceBinding,
    pub rate: f64,
}

/// User-defined derived metric, tagged by `kind` on the wire
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MetricConfig {
    Aggregate(AggregateConfig),
    Ratio(RatioConfig),
    Cost(CostConfig),
}

impl MetricConfig {
    pub fn id(&self) -> &str {
        match self {
            MetricConfig::Aggregate(c) => &c.id,
            MetricConfig::Ratio(c) => &c.id,
            MetricConfig::Cost(c) => &c.id,
        }
    }

    /// Every binding the metric reads, nested ones included
    pub fn bindings(&self) -> Vec<&SourceBinding> {
        match self {
            MetricConfig::Aggregate(c) => c.bindings.iter().collect(),
            MetricConfig::Ratio(c) => std::iter::once(&c.numerator)
                .chain(c.denominator.bindings.iter())
                .collect(),
            MetricConfig::Cost(c) => vec![&c.binding],
        }
    }

    /// Whether a message from any of `device_ids` can change this metric
    pub fn reads_from(&self, device_ids: &[String]) -> bool {
        self.bindings()
            .iter()
            .any(|b| device_ids.contains(&b.device_id))
    }
}
