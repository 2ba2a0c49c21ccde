use serde::Deserialize;
use std::time::{Duration, SystemTime};

/// Configuration for the monitoring system
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Whether monitoring is enabled
    pub enabled: bool,
    /// Size of the monitoring channel buffer
    pub channel_size: usize,
    /// How often to emit aggregated metrics
    #[serde(with = "duration_millis")]
    pub metrics_interval: Duration,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel_size: 1000,
            metrics_interval: Duration::from_secs(60),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Represents a monitoring event from the extractor
#[derive(Debug, Clone)]
pub struct ProcessingEvent {
    /// When the event occurred
    pub timestamp: SystemTime,
    /// ID of the shard this event relates to
    pub shard_id: String,
    /// The type of event and its details
    pub event_type: ProcessingEventType,
}

/// The different types of events that can occur during extraction
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingEventType {
    BatchComplete {
        record_count: usize,
        millis_behind_latest: i64,
        duration: Duration,
    },
    ShardEvent {
        event_type: ShardEventType,
        details: Option<String>,
    },
    Iterator {
        event_type: IteratorEventType,
        error: Option<String>,
    },
    Checkpoint {
        sequence_number: String,
    },
    BudgetReached {
        emitted: usize,
    },
}

/// Types of shard-level events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardEventType {
    /// Shard was taken off the work queue
    Started,
    /// Shard lag dropped below the threshold; done for this run
    CaughtUp,
    /// Shard is closed and fully read
    Completed,
    /// Shard was queued as the child of a resharded parent
    Discovered,
    /// A wire or decode error ended the run on this shard
    Error,
}

/// Types of iterator events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IteratorEventType {
    /// Initial iterator resolved for a shard visit
    Acquired,
    /// Failed to get iterator
    Failed,
}

impl ProcessingEvent {
    pub fn batch_complete(
        shard_id: String,
        record_count: usize,
        millis_behind_latest: i64,
        duration: Duration,
    ) -> Self {
        Self {
            timestamp: SystemTime::now(),
            shard_id,
            event_type: ProcessingEventType::BatchComplete {
                record_count,
                millis_behind_latest,
                duration,
            },
        }
    }

    /// Create a new shard event
    pub fn shard_event(
        shard_id: String,
        event_type: ShardEventType,
        details: Option<String>,
    ) -> Self {
        Self {
            timestamp: SystemTime::now(),
            shard_id,
            event_type: ProcessingEventType::ShardEvent {
                event_type,
                details,
            },
        }
    }

    /// Create a new iterator event
    pub fn iterator(
        shard_id: String,
        event_type: IteratorEventType,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: SystemTime::now(),
            shard_id,
            event_type: ProcessingEventType::Iterator { event_type, error },
        }
    }

    pub fn checkpoint(shard_id: String, sequence_number: String) -> Self {
        Self {
            timestamp: SystemTime::now(),
            shard_id,
            event_type: ProcessingEventType::Checkpoint { sequence_number },
        }
    }

    pub fn budget_reached(shard_id: String, emitted: usize) -> Self {
        Self {
            timestamp: SystemTime::now(),
            shard_id,
            event_type: ProcessingEventType::BudgetReached { emitted },
        }
    }
}
