//! Delivery statistics and engine counters.

pub mod aggregator;
pub mod counters;

pub use aggregator::{ChannelStats, DeliveryMetrics, MetricsAggregator};
pub use counters::{CountersSnapshot, EngineCounters};
