pub(crate) mod metrics;
pub mod sink;

pub use metrics::Counters;
pub use sink::{JobKind, MetricsEvent, MetricsSink};
