//! Shard discovery and the FIFO work queue of shards to visit

use crate::client::{KinesisClientTrait, RecordsPage};
use crate::error::{ProcessorError, Result};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

/// FIFO of shards still to visit this run.
///
/// Remembers every id it was ever given, so a shard is visited at most once
/// per run no matter how often it is rediscovered.
#[derive(Debug, Clone, Default)]
pub struct WorkQueue {
    pending: VecDeque<String>,
    seen: HashSet<String>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `shard_id` at the tail; returns false if it was already known
    pub fn push(&mut self, shard_id: impl Into<String>) -> bool {
        let shard_id = shard_id.into();
        if !self.seen.insert(shard_id.clone()) {
            return false;
        }
        self.pending.push_back(shard_id);
        true
    }

    pub fn pop(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    pub fn is_known(&self, shard_id: &str) -> bool {
        self.seen.contains(shard_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending shard ids, head first
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }
}

/// List every shard of `stream_name`, following continuation tokens
pub async fn list_shards<C>(client: &C, stream_name: &str) -> Result<Vec<String>>
where
    C: KinesisClientTrait + ?Sized,
{
    let mut shard_ids = Vec::new();
    let mut next_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = client
            .list_shards(stream_name, next_token.as_deref())
            .await
            .map_err(|e| ProcessorError::from_client("ListShards", e))?;
        pages += 1;
        shard_ids.extend(page.shard_ids);

        match page.next_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    info!(
        stream = %stream_name,
        shards = shard_ids.len(),
        pages = pages,
        "Discovered stream shards"
    );
    Ok(shard_ids)
}

/// Child shards announced by `page` that `queue` has not seen this run
pub fn discover_children(page: &RecordsPage, queue: &WorkQueue) -> Vec<String> {
    let mut children: Vec<String> = Vec::new();
    for child in &page.child_shard_ids {
        if !queue.is_known(child) && !children.contains(child) {
            children.push(child.clone());
        }
    }

    if !children.is_empty() {
        debug!(children = ?children, "Discovered child shards");
    }
    children
}
