//! Poll loop for extracting a Kinesis stream
//!
//! [`KinesisProcessor`] is a resumable cursor over one extraction run. Each
//! call to [`KinesisProcessor::next_batch`] drives the shards in FIFO order:
//!
//! - lists the stream's shards on the first call
//! - picks the shard iterator from the checkpoint or the initial timestamp
//! - reads one page, turns it into messages and advances the checkpoint
//! - queues child shards announced by a closed parent
//! - stops a shard once it is within the lag threshold of the stream tip
//! - halts the run once the message budget is spent
//!
//! A returned [`Batch`] carries the checkpoint merged from its records. The
//! caller persists that checkpoint before asking for the next batch, so a
//! crash replays at most one batch.

use crate::checkpoint::{self, Checkpoint, ResourceState};
use crate::client::{AwsCredentials, KinesisClientTrait};
use crate::error::{ProcessorError, Result};
use crate::iterator;
use crate::message::{build_message, Message};
use crate::monitoring::{
    IteratorEventType, MonitoringConfig, ProcessingEvent, ShardEventType,
};
use crate::shards::{self, WorkQueue};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Largest page GetRecords accepts
const MAX_CHUNK_SIZE: i32 = 10_000;

/// Configuration for the Kinesis extractor
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Name of the Kinesis stream to read
    pub stream_name: String,
    /// Start position for shards without a checkpoint: `None` reads the whole
    /// retained backlog, the Unix epoch skips it, any later instant reads
    /// from that point
    pub initial_at_timestamp: Option<DateTime<Utc>>,
    pub credentials: AwsCredentials,
    /// Soft cap on messages per run, checked after each read
    pub max_number_of_messages: Option<usize>,
    /// A shard is caught up once a read reports less lag than this
    pub milliseconds_behind_latest: i64,
    /// Decode record bodies as JSON instead of passing raw bytes
    pub parse_json: bool,
    /// Maximum number of records to request per GetRecords call
    pub chunk_size: i32,
    /// Monitoring configuration
    pub monitoring: MonitoringConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            stream_name: String::new(),
            initial_at_timestamp: None,
            credentials: AwsCredentials::default(),
            max_number_of_messages: None,
            milliseconds_behind_latest: 1000,
            parse_json: true,
            chunk_size: 1000,
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stream_name.trim().is_empty() {
            return Err(ProcessorError::ConfigError(
                "stream_name must not be empty".to_string(),
            ));
        }
        if !(1..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(ProcessorError::ConfigError(format!(
                "chunk_size must be between 1 and {}, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.milliseconds_behind_latest < 0 {
            return Err(ProcessorError::ConfigError(
                "milliseconds_behind_latest must not be negative".to_string(),
            ));
        }
        if self.max_number_of_messages == Some(0) {
            return Err(ProcessorError::ConfigError(
                "max_number_of_messages must be positive when set".to_string(),
            ));
        }
        if let Some(ts) = self.initial_at_timestamp {
            if ts < DateTime::<Utc>::UNIX_EPOCH {
                return Err(ProcessorError::ConfigError(format!(
                    "initial_at_timestamp {} is before the Unix epoch",
                    ts
                )));
            }
        }
        if self.monitoring.enabled && self.monitoring.channel_size == 0 {
            return Err(ProcessorError::ConfigError(
                "monitoring.channel_size must be positive".to_string(),
            ));
        }
        self.credentials.validate()
    }
}

/// Where a shard is in its visit during the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardPhase {
    NotStarted,
    Iterating,
    /// Caught up with the stream tip; revisited next run
    ExhaustedByLag,
    /// Closed and fully read
    Done,
}

/// Messages from one GetRecords page plus the checkpoint to persist for them
#[derive(Debug, Clone)]
pub struct Batch {
    pub shard_id: String,
    pub messages: Vec<Message>,
    pub checkpoint: Checkpoint,
    pub millis_behind_latest: i64,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Latest arrival timestamp among the batch's messages
    pub fn latest_arrival(&self) -> Option<DateTime<Utc>> {
        self.messages
            .iter()
            .map(|m| m.envelope.arrival_timestamp)
            .max()
    }
}

#[derive(Debug)]
struct ActiveShard {
    shard_id: String,
    iterator: String,
}

/// Main Kinesis stream extractor
///
/// # Examples
///
/// ```rust,no_run
/// use kinesis_extract::{KinesisProcessor, ProcessorConfig, ResourceState};
///
/// async fn drain(config: ProcessorConfig) -> kinesis_extract::Result<()> {
///     let client = config.credentials.build_client().await?;
///     let (mut processor, _monitoring_rx) =
///         KinesisProcessor::new(config, client, ResourceState::default())?;
///
///     while let Some(batch) = processor.next_batch().await? {
///         // write batch.messages, then persist batch.checkpoint
///         println!("{} messages from {}", batch.len(), batch.shard_id);
///     }
///     Ok(())
/// }
/// ```
pub struct KinesisProcessor<C>
where
    C: KinesisClientTrait,
{
    client: C,
    config: ProcessorConfig,
    checkpoint: Checkpoint,
    queue: WorkQueue,
    phases: HashMap<String, ShardPhase>,
    active: Option<ActiveShard>,
    listed: bool,
    halted: bool,
    halted_by_budget: bool,
    emitted: usize,
    finished_at: Option<DateTime<Utc>>,
    monitoring_tx: Option<mpsc::Sender<ProcessingEvent>>,
}

impl<C> KinesisProcessor<C>
where
    C: KinesisClientTrait,
{
    /// Creates a processor resuming from `state`
    ///
    /// Returns the processor and, when monitoring is enabled, the receiving
    /// end of its event channel.
    pub fn new(
        config: ProcessorConfig,
        client: C,
        state: ResourceState,
    ) -> Result<(Self, Option<mpsc::Receiver<ProcessingEvent>>)> {
        config.validate()?;

        let (monitoring_tx, monitoring_rx) = if config.monitoring.enabled {
            let (tx, rx) = mpsc::channel(config.monitoring.channel_size);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        debug!(
            stream = %config.stream_name,
            checkpointed_shards = state.kinesis.len(),
            "Created Kinesis processor"
        );

        let processor = Self {
            client,
            config,
            checkpoint: state.kinesis,
            queue: WorkQueue::new(),
            phases: HashMap::new(),
            active: None,
            listed: false,
            halted: false,
            halted_by_budget: false,
            emitted: 0,
            finished_at: None,
            monitoring_tx,
        };
        Ok((processor, monitoring_rx))
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Checkpoint covering every batch handed out so far
    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// State to persist after the most recent batch
    ///
    /// `initial_at_timestamp` is the time the run finished, or now while it
    /// is still going.
    pub fn state(&self) -> ResourceState {
        ResourceState::new(self.checkpoint.clone(), Some(self.run_timestamp()))
    }

    pub fn into_state(self) -> ResourceState {
        let run_timestamp = self.run_timestamp();
        ResourceState::new(self.checkpoint, Some(run_timestamp))
    }

    fn run_timestamp(&self) -> DateTime<Utc> {
        self.finished_at.unwrap_or_else(Utc::now)
    }

    fn halt(&mut self) {
        self.halted = true;
        self.finished_at.get_or_insert_with(Utc::now);
    }

    /// Messages emitted this run
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn shard_phase(&self, shard_id: &str) -> Option<ShardPhase> {
        self.phases.get(shard_id).copied()
    }

    /// Shards visited (or being visited) this run
    pub fn shards_visited(&self) -> usize {
        self.phases.len()
    }

    pub fn pending_shards(&self) -> Vec<String> {
        self.queue.pending().map(String::from).collect()
    }

    pub fn is_finished(&self) -> bool {
        self.halted
    }

    pub fn halted_by_budget(&self) -> bool {
        self.halted_by_budget
    }

    /// Queues a monitoring event if monitoring is enabled.
    ///
    /// Never waits for the receiver: the cursor runs on the caller's task, so
    /// a full channel drops the event.
    fn send_monitoring_event(&self, event: ProcessingEvent) {
        if let Some(tx) = &self.monitoring_tx {
            match tx.try_send(event) {
                Ok(()) => trace!("Sent monitoring event successfully"),
                Err(TrySendError::Full(event)) => {
                    warn!(shard_id = %event.shard_id, "Monitoring channel full, dropping event")
                }
                Err(TrySendError::Closed(_)) => {
                    trace!("Monitoring receiver dropped, discarding event")
                }
            }
        }
    }

    /// Reads until one non-empty batch is available or the run is over.
    ///
    /// Returns `Ok(None)` once the queue is drained or the budget is spent.
    /// After an error the cursor is finished; rerun from the last persisted
    /// checkpoint.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>> {
        match self.advance().await {
            Ok(batch) => Ok(batch),
            Err(e) => {
                error!(stream = %self.config.stream_name, error = %e, "Extraction failed");
                self.halt();
                Err(e)
            }
        }
    }

    /// Adapts the cursor into a stream of batches
    pub fn into_stream(self) -> impl Stream<Item = Result<Batch>> {
        futures::stream::try_unfold(self, |mut processor| async move {
            let batch = processor.next_batch().await?;
            Ok::<_, ProcessorError>(batch.map(|batch| (batch, processor)))
        })
    }

    async fn advance(&mut self) -> Result<Option<Batch>> {
        if self.halted {
            return Ok(None);
        }
        if !self.listed {
            self.discover_shards().await?;
        }

        loop {
            if self.halted {
                return Ok(None);
            }

            let active = match self.active.take() {
                Some(active) => active,
                None => match self.queue.pop() {
                    Some(shard_id) => self.start_shard(shard_id).await?,
                    None => {
                        info!(
                            stream = %self.config.stream_name,
                            emitted = self.emitted,
                            shards = self.phases.len(),
                            "All shards polled"
                        );
                        self.halt();
                        return Ok(None);
                    }
                },
            };

            if let Some(batch) = self.poll_shard(active).await? {
                return Ok(Some(batch));
            }
        }
    }

    async fn discover_shards(&mut self) -> Result<()> {
        let shard_ids = shards::list_shards(&self.client, &self.config.stream_name).await?;
        for shard_id in shard_ids {
            self.queue.push(shard_id);
        }
        self.listed = true;
        Ok(())
    }

    /// NotStarted -> Iterating: resolve the iterator chosen for this visit
    async fn start_shard(&mut self, shard_id: String) -> Result<ActiveShard> {
        self.phases.insert(shard_id.clone(), ShardPhase::NotStarted);
        self.send_monitoring_event(ProcessingEvent::shard_event(
            shard_id.clone(),
            ShardEventType::Started,
            None,
        ));

        let request = iterator::select(
            self.checkpoint.get(&shard_id),
            self.config.initial_at_timestamp,
        );
        info!(
            shard_id = %shard_id,
            iterator_type = ?request.iterator_type(),
            "Starting shard"
        );

        match self
            .client
            .get_shard_iterator(&self.config.stream_name, &shard_id, &request)
            .await
        {
            Ok(iterator) => {
                self.phases.insert(shard_id.clone(), ShardPhase::Iterating);
                self.send_monitoring_event(ProcessingEvent::iterator(
                    shard_id.clone(),
                    IteratorEventType::Acquired,
                    None,
                ));
                Ok(ActiveShard { shard_id, iterator })
            }
            Err(e) => {
                self.send_monitoring_event(ProcessingEvent::iterator(
                    shard_id.clone(),
                    IteratorEventType::Failed,
                    Some(e.to_string()),
                ));
                Err(ProcessorError::from_client("GetShardIterator", e))
            }
        }
    }

    /// One read of an iterating shard; `None` when the page held no records
    async fn poll_shard(&mut self, active: ActiveShard) -> Result<Option<Batch>> {
        let ActiveShard { shard_id, iterator } = active;
        let read_start = Instant::now();

        let page = match self
            .client
            .get_records(&iterator, self.config.chunk_size)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                self.send_monitoring_event(ProcessingEvent::shard_event(
                    shard_id.clone(),
                    ShardEventType::Error,
                    Some(e.to_string()),
                ));
                return Err(ProcessorError::from_client("GetRecords", e));
            }
        };

        let messages = page
            .records
            .iter()
            .map(|record| {
                build_message(
                    &self.config.stream_name,
                    &shard_id,
                    record,
                    self.config.parse_json,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        self.emitted += messages.len();

        if let Some(last) = messages.last() {
            self.checkpoint = checkpoint::merge(
                Some(&self.checkpoint),
                &shard_id,
                last.sequence_number(),
            );
            self.send_monitoring_event(ProcessingEvent::checkpoint(
                shard_id.clone(),
                last.sequence_number().to_string(),
            ));
        }

        for child in shards::discover_children(&page, &self.queue) {
            info!(parent = %shard_id, child = %child, "Queueing child shard");
            self.queue.push(child.clone());
            self.send_monitoring_event(ProcessingEvent::shard_event(
                child,
                ShardEventType::Discovered,
                Some(shard_id.clone()),
            ));
        }

        let lag = page.millis_behind_latest.unwrap_or(0);
        self.send_monitoring_event(ProcessingEvent::batch_complete(
            shard_id.clone(),
            messages.len(),
            lag,
            read_start.elapsed(),
        ));
        debug!(
            shard_id = %shard_id,
            records = messages.len(),
            millis_behind_latest = lag,
            emitted = self.emitted,
            "Read batch"
        );

        if lag < self.config.milliseconds_behind_latest {
            info!(
                shard_id = %shard_id,
                millis_behind_latest = lag,
                threshold = self.config.milliseconds_behind_latest,
                "Shard caught up"
            );
            self.phases.insert(shard_id.clone(), ShardPhase::ExhaustedByLag);
            self.send_monitoring_event(ProcessingEvent::shard_event(
                shard_id.clone(),
                ShardEventType::CaughtUp,
                Some(format!("{}ms behind latest", lag)),
            ));
        } else if let Some(next) = page.next_iterator {
            self.active = Some(ActiveShard {
                shard_id: shard_id.clone(),
                iterator: next,
            });
        } else {
            info!(shard_id = %shard_id, "Shard closed and fully read");
            self.phases.insert(shard_id.clone(), ShardPhase::Done);
            self.send_monitoring_event(ProcessingEvent::shard_event(
                shard_id.clone(),
                ShardEventType::Completed,
                None,
            ));
        }

        if let Some(budget) = self.config.max_number_of_messages {
            if self.emitted >= budget {
                info!(
                    emitted = self.emitted,
                    budget = budget,
                    "Message budget reached, halting run"
                );
                self.halt();
                self.halted_by_budget = true;
                self.active = None;
                self.send_monitoring_event(ProcessingEvent::budget_reached(
                    shard_id.clone(),
                    self.emitted,
                ));
            }
        }

        if messages.is_empty() {
            return Ok(None);
        }

        Ok(Some(Batch {
            shard_id,
            messages,
            checkpoint: self.checkpoint.clone(),
            millis_behind_latest: lag,
        }))
    }
}
