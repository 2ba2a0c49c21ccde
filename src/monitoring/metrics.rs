use super::types::{IteratorEventType, ProcessingEvent, ProcessingEventType, ShardEventType};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, info, trace, warn};

/// Holds aggregated metrics for a single shard
#[derive(Debug, Clone)]
pub struct ShardMetrics {
    pub batches: u64,
    pub records_read: u64,
    pub read_time: Duration,
    pub max_batch_time: Duration,

    /// Lag reported by the most recent read
    pub last_millis_behind_latest: Option<i64>,

    pub checkpoints: u64,
    pub last_sequence_number: Option<String>,

    pub iterators_acquired: u64,
    pub iterator_failures: u64,
    pub errors: u64,

    pub caught_up: bool,
    pub completed: bool,

    /// Records read since `window_start`
    pub window_records: u64,
    pub window_start: Instant,
    pub last_updated: Instant,
}

impl Default for ShardMetrics {
    fn default() -> Self {
        let now = Instant::now();
        Self {
            batches: 0,
            records_read: 0,
            read_time: Duration::default(),
            max_batch_time: Duration::default(),
            last_millis_behind_latest: None,
            checkpoints: 0,
            last_sequence_number: None,
            iterators_acquired: 0,
            iterator_failures: 0,
            errors: 0,
            caught_up: false,
            completed: false,
            window_records: 0,
            window_start: now,
            last_updated: now,
        }
    }
}

/// Aggregates monitoring events into metrics
pub struct MetricsAggregator {
    metrics: Arc<RwLock<HashMap<String, ShardMetrics>>>,
    window_duration: Duration,
    monitoring_rx: tokio::sync::mpsc::Receiver<ProcessingEvent>,
}

impl MetricsAggregator {
    /// Create a new metrics aggregator
    pub fn new(
        window_duration: Duration,
        monitoring_rx: tokio::sync::mpsc::Receiver<ProcessingEvent>,
    ) -> Self {
        Self {
            metrics: Arc::new(RwLock::new(HashMap::new())),
            window_duration,
            monitoring_rx,
        }
    }

    /// Shared handle to the metrics, readable while [`run`](Self::run) owns the aggregator
    pub fn metrics_handle(&self) -> Arc<RwLock<HashMap<String, ShardMetrics>>> {
        self.metrics.clone()
    }

    /// Consume events until the sending side is dropped, emitting metrics on each interval tick
    pub async fn run(mut self) {
        let mut interval = interval(self.window_duration);

        loop {
            tokio::select! {
                event = self.monitoring_rx.recv() => match event {
                    Some(event) => self.process_event(event).await,
                    None => break,
                },
                _ = interval.tick() => {
                    self.emit_metrics().await;
                }
            }
        }

        self.emit_metrics().await;
    }

    pub async fn process_event(&self, event: ProcessingEvent) {
        let mut metrics = self.metrics.write().await;
        let shard_metrics = metrics.entry(event.shard_id.clone()).or_default();

        match event.event_type {
            ProcessingEventType::BatchComplete {
                record_count,
                millis_behind_latest,
                duration,
            } => {
                shard_metrics.batches += 1;
                shard_metrics.records_read += record_count as u64;
                shard_metrics.window_records += record_count as u64;
                shard_metrics.read_time += duration;
                shard_metrics.last_millis_behind_latest = Some(millis_behind_latest);
                if duration > shard_metrics.max_batch_time {
                    shard_metrics.max_batch_time = duration;
                }
                trace!(
                    shard_id = %event.shard_id,
                    records = record_count,
                    millis_behind_latest = millis_behind_latest,
                    "Batch read"
                );
            }
            ProcessingEventType::Checkpoint { sequence_number } => {
                shard_metrics.checkpoints += 1;
                shard_metrics.last_sequence_number = Some(sequence_number);
            }
            ProcessingEventType::Iterator { event_type, error } => match event_type {
                IteratorEventType::Acquired => {
                    shard_metrics.iterators_acquired += 1;
                }
                IteratorEventType::Failed => {
                    shard_metrics.iterator_failures += 1;
                    warn!(shard_id = %event.shard_id, error = ?error, "Iterator operation failed");
                }
            },
            ProcessingEventType::ShardEvent {
                event_type,
                details,
            } => match event_type {
                ShardEventType::Started => {
                    debug!(shard_id = %event.shard_id, "Shard polling started");
                }
                ShardEventType::Discovered => {
                    debug!(shard_id = %event.shard_id, "Child shard queued");
                }
                ShardEventType::CaughtUp => {
                    shard_metrics.caught_up = true;
                }
                ShardEventType::Completed => {
                    shard_metrics.completed = true;
                }
                ShardEventType::Error => {
                    shard_metrics.errors += 1;
                    warn!(
                        shard_id = %event.shard_id,
                        details = ?details,
                        "Shard polling error"
                    );
                }
            },
            ProcessingEventType::BudgetReached { emitted } => {
                info!(
                    shard_id = %event.shard_id,
                    emitted = emitted,
                    "Message budget reached"
                );
            }
        }

        shard_metrics.last_updated = Instant::now();
    }

    /// Logs every shard's metrics and starts a new rate window
    pub async fn emit_metrics(&self) {
        let mut metrics = self.metrics.write().await;
        let now = Instant::now();

        for (shard_id, metrics) in metrics.iter_mut() {
            let window = now.duration_since(metrics.window_start).as_secs_f64();
            let records_per_sec = if window > 0.0 {
                metrics.window_records as f64 / window
            } else {
                0.0
            };
            info!(
                shard_id = %shard_id,
                batches = metrics.batches,
                records_per_sec = records_per_sec,
                records_read = metrics.records_read,
                read_time_ms = %metrics.read_time.as_millis(),
                max_batch_time_ms = %metrics.max_batch_time.as_millis(),
                millis_behind_latest = ?metrics.last_millis_behind_latest,
                checkpoints = metrics.checkpoints,
                last_sequence_number = ?metrics.last_sequence_number,
                caught_up = metrics.caught_up,
                completed = metrics.completed,
                "Metrics for window"
            );

            if metrics.iterator_failures > 0 || metrics.errors > 0 {
                warn!(
                    shard_id = %shard_id,
                    iterator_failures = metrics.iterator_failures,
                    errors = metrics.errors,
                    "Shard errors detected"
                );
            }

            metrics.window_records = 0;
            metrics.window_start = now;
        }
    }

    /// Get current metrics for all shards
    pub async fn get_metrics(&self) -> HashMap<String, ShardMetrics> {
        self.metrics.read().await.clone()
    }

    /// Get metrics for a specific shard
    pub async fn get_shard_metrics(&self, shard_id: &str) -> Option<ShardMetrics> {
        self.metrics.read().await.get(shard_id).cloned()
    }
}
