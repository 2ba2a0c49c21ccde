//! Extraction driver
//!
//! Pulls batches from a [`KinesisProcessor`], hands each one to a
//! [`BatchHandler`] and only then persists the batch's checkpoint. A failed
//! handler therefore leaves the store at the previous batch, and the next run
//! replays the failed batch.

use crate::checkpoint::{Checkpoint, ResourceState};
use crate::client::KinesisClientTrait;
use crate::error::{ProcessorError, Result};
use crate::processor::{Batch, KinesisProcessor};
use crate::store::StateStore;
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Destination for extracted batches
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle_batch(&self, batch: &Batch) -> anyhow::Result<()>;
}

/// What one call to [`run_extraction`] did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub batches: usize,
    pub messages: usize,
    pub shards_visited: usize,
    pub halted_by_budget: bool,
    /// Checkpoint as last persisted
    pub checkpoint: Checkpoint,
}

/// Prior state for `resource`, or a fresh one on the first run
#[instrument(skip(store))]
pub async fn load_processor_state<S>(store: &S, resource: &str) -> Result<ResourceState>
where
    S: StateStore + ?Sized,
{
    let state = store
        .load_state(resource)
        .await
        .map_err(|e| ProcessorError::StateStoreError(format!("{:#}", e)))?;

    match &state {
        Some(state) => debug!(shards = state.kinesis.len(), "Resuming from saved state"),
        None => info!("No saved state, starting fresh"),
    }
    Ok(state.unwrap_or_default())
}

/// Drive `processor` to the end of the run, persisting after every batch.
///
/// Stops early, with a normal summary, once `shutdown` turns true; the flag is
/// checked between batches.
#[instrument(skip(processor, handler, store, shutdown))]
pub async fn run_extraction<C, H, S>(
    mut processor: KinesisProcessor<C>,
    handler: &H,
    store: &S,
    resource: &str,
    shutdown: watch::Receiver<bool>,
) -> Result<RunSummary>
where
    C: KinesisClientTrait,
    H: BatchHandler + ?Sized,
    S: StateStore + ?Sized,
{
    let mut summary = RunSummary {
        checkpoint: processor.checkpoint().clone(),
        ..Default::default()
    };

    loop {
        if *shutdown.borrow() {
            warn!(batches = summary.batches, "Shutdown requested, stopping extraction");
            break;
        }

        let Some(batch) = processor.next_batch().await? else {
            break;
        };

        handler
            .handle_batch(&batch)
            .await
            .map_err(ProcessorError::HandlerError)?;

        let state = processor.state();
        store
            .save_state(resource, &state)
            .await
            .map_err(|e| ProcessorError::StateStoreError(format!("{:#}", e)))?;

        debug!(
            shard_id = %batch.shard_id,
            messages = batch.len(),
            "Persisted checkpoint"
        );
        summary.batches += 1;
        summary.messages += batch.len();
        summary.checkpoint = state.kinesis;
    }

    summary.shards_visited = processor.shards_visited();
    summary.halted_by_budget = processor.halted_by_budget();
    info!(
        batches = summary.batches,
        messages = summary.messages,
        shards = summary.shards_visited,
        halted_by_budget = summary.halted_by_budget,
        "Extraction run finished"
    );
    Ok(summary)
}
