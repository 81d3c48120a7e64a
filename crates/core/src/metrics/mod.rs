pub mod aggregation;
pub mod concentration;
pub mod coverage;
pub mod derived;
pub mod drilldown;
pub mod ordered;
pub mod period;
pub mod pivot;
pub mod ranking;
pub mod registry;
pub mod series;

pub use aggregation::{aggregate_facts, AggregationRow, UNDEFINED_PERCENT};
pub use registry::{MetricDefinition, MetricFamily};
