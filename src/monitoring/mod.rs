//! Monitoring for the Kinesis extractor
//!
//! The processor optionally streams [`ProcessingEvent`]s over a bounded
//! channel; [`MetricsAggregator`] folds them into per-shard metrics.

mod metrics;
mod types;

pub use metrics::{MetricsAggregator, ShardMetrics};
pub use types::{
    IteratorEventType, MonitoringConfig, ProcessingEvent, ProcessingEventType, ShardEventType,
};
