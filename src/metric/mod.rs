// Derived metrics (aggregate totals, PUE, bill cost)

mod aggregator;
mod config;
mod value;


pub use aggregator::{recompute, WATTS_PER_KILOWATT};
pub use config::{AggregateConfig, Combine, CostConfig, MetricConfig, RatioConfig};
pub use value::MetricValue;
