// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use aws_sdk_kinesis::types::Record;
use chrono::{DateTime, Duration, TimeZone, Utc};
use kinesis_extract::{
    Batch, BatchHandler, KinesisClientError, KinesisClientTrait, ProcessorConfig, RecordsPage,
    ShardIteratorRequest, ShardPage,
};
use parking_lot::Mutex;
use std::sync::{Arc, Once};

/// Lag reported while a reader has not reached the end of a shard
pub const BEHIND_MILLIS: i64 = 60_000;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "kinesis_extract=debug".into()),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn create_test_config(stream_name: &str) -> ProcessorConfig {
    ProcessorConfig {
        stream_name: stream_name.to_string(),
        ..Default::default()
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Arrival time of the record with sequence number `seq`
pub fn arrival_of(seq: u64) -> DateTime<Utc> {
    base_time() + Duration::seconds(seq as i64)
}

#[derive(Debug, Clone)]
struct FakeShard {
    shard_id: String,
    records: Vec<Record>,
    children: Option<Vec<String>>,
}

#[derive(Debug, Default)]
struct FakeState {
    stream_name: String,
    shards: Vec<FakeShard>,
    list_page_size: usize,
    list_calls: usize,
    iterator_requests: Vec<(String, ShardIteratorRequest)>,
    read_calls: usize,
}

/// In-memory Kinesis stream
///
/// Iterators are `<shard_id>#<position>`. A reader that reaches the end of an
/// open shard sees zero lag; anywhere else it is [`BEHIND_MILLIS`] behind. A
/// closed shard reports its children on its final page.
#[derive(Debug, Clone)]
pub struct FakeKinesis {
    state: Arc<Mutex<FakeState>>,
}

impl FakeKinesis {
    pub fn new(stream_name: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                stream_name: stream_name.to_string(),
                list_page_size: 2,
                ..Default::default()
            })),
        }
    }

    pub fn add_shard(&self, shard_id: &str) {
        self.state.lock().shards.push(FakeShard {
            shard_id: shard_id.to_string(),
            records: Vec::new(),
            children: None,
        });
    }

    /// Append JSON records with sequence numbers `seqs` to `shard_id`
    pub fn put(&self, shard_id: &str, seqs: impl IntoIterator<Item = u64>) {
        let mut state = self.state.lock();
        let shard = state
            .shards
            .iter_mut()
            .find(|s| s.shard_id == shard_id)
            .expect("shard exists");
        for seq in seqs {
            shard.records.push(
                Record::builder()
                    .sequence_number(seq.to_string())
                    .data(aws_smithy_types::Blob::new(
                        format!(r#"{{"seq": {}, "shard": "{}"}}"#, seq, shard_id).into_bytes(),
                    ))
                    .partition_key(format!("pk-{}", seq % 4))
                    .approximate_arrival_timestamp(aws_smithy_types::DateTime::from_millis(
                        arrival_of(seq).timestamp_millis(),
                    ))
                    .build()
                    .expect("valid record"),
            );
        }
    }

    /// Close `parent` and create `children` as new open shards
    pub fn split(&self, parent: &str, children: &[&str]) {
        {
            let mut state = self.state.lock();
            let shard = state
                .shards
                .iter_mut()
                .find(|s| s.shard_id == parent)
                .expect("shard exists");
            shard.children = Some(children.iter().map(|c| c.to_string()).collect());
        }
        for child in children {
            self.add_shard(child);
        }
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    pub fn read_calls(&self) -> usize {
        self.state.lock().read_calls
    }

    pub fn iterator_requests(&self) -> Vec<(String, ShardIteratorRequest)> {
        self.state.lock().iterator_requests.clone()
    }

    /// Clear call logs between runs
    pub fn reset_calls(&self) {
        let mut state = self.state.lock();
        state.list_calls = 0;
        state.read_calls = 0;
        state.iterator_requests.clear();
    }
}

fn arrival(record: &Record) -> i64 {
    record
        .approximate_arrival_timestamp()
        .map(|ts| ts.to_millis().unwrap_or_default())
        .unwrap_or_default()
}

#[async_trait]
impl KinesisClientTrait for FakeKinesis {
    async fn list_shards(
        &self,
        stream_name: &str,
        next_token: Option<&str>,
    ) -> Result<ShardPage, KinesisClientError> {
        let mut state = self.state.lock();
        state.list_calls += 1;
        if next_token.is_none() && stream_name != state.stream_name {
            return Err(KinesisClientError::ResourceNotFound(format!(
                "Stream {} not found",
                stream_name
            )));
        }

        let start = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| KinesisClientError::InvalidArgument(token.to_string()))?,
            None => 0,
        };
        let end = (start + state.list_page_size).min(state.shards.len());
        Ok(ShardPage {
            shard_ids: state.shards[start..end]
                .iter()
                .map(|s| s.shard_id.clone())
                .collect(),
            next_token: (end < state.shards.len()).then(|| end.to_string()),
        })
    }

    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        request: &ShardIteratorRequest,
    ) -> Result<String, KinesisClientError> {
        let mut state = self.state.lock();
        state
            .iterator_requests
            .push((shard_id.to_string(), request.clone()));
        if stream_name != state.stream_name {
            return Err(KinesisClientError::ResourceNotFound(stream_name.to_string()));
        }
        let shard = state
            .shards
            .iter()
            .find(|s| s.shard_id == shard_id)
            .ok_or_else(|| KinesisClientError::ResourceNotFound(shard_id.to_string()))?;

        let position = match request {
            ShardIteratorRequest::TrimHorizon => 0,
            ShardIteratorRequest::Latest => shard.records.len(),
            ShardIteratorRequest::AtTimestamp(ts) => shard
                .records
                .iter()
                .position(|r| arrival(r) >= ts.timestamp_millis())
                .unwrap_or(shard.records.len()),
            ShardIteratorRequest::AfterSequenceNumber(seq) => {
                shard
                    .records
                    .iter()
                    .position(|r| r.sequence_number() == seq.as_str())
                    .ok_or_else(|| KinesisClientError::InvalidArgument(seq.clone()))?
                    + 1
            }
        };
        Ok(format!("{}#{}", shard_id, position))
    }

    async fn get_records(
        &self,
        iterator: &str,
        limit: i32,
    ) -> Result<RecordsPage, KinesisClientError> {
        let mut state = self.state.lock();
        state.read_calls += 1;

        let (shard_id, position) = iterator
            .rsplit_once('#')
            .and_then(|(shard, pos)| pos.parse::<usize>().ok().map(|pos| (shard, pos)))
            .ok_or(KinesisClientError::ExpiredIterator)?;
        let shard = state
            .shards
            .iter()
            .find(|s| s.shard_id == shard_id)
            .ok_or(KinesisClientError::ExpiredIterator)?;

        let end = (position + limit.max(0) as usize).min(shard.records.len());
        let records = shard.records[position.min(end)..end].to_vec();
        let at_end = end == shard.records.len();

        let page = match (&shard.children, at_end) {
            (Some(children), true) => RecordsPage {
                records,
                next_iterator: None,
                millis_behind_latest: Some(0),
                child_shard_ids: children.clone(),
            },
            (_, at_end) => RecordsPage {
                records,
                next_iterator: Some(format!("{}#{}", shard_id, end)),
                millis_behind_latest: Some(if at_end { 0 } else { BEHIND_MILLIS }),
                child_shard_ids: Vec::new(),
            },
        };
        Ok(page)
    }
}

/// Handler collecting every batch it is given
#[derive(Debug, Default, Clone)]
pub struct CollectingHandler {
    batches: Arc<Mutex<Vec<Batch>>>,
    fail_on_call: Option<usize>,
    calls: Arc<Mutex<usize>>,
}

impl CollectingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<Batch> {
        self.batches.lock().clone()
    }

    /// `(shard_id, sequence_number)` of every handled message
    pub fn delivered(&self) -> Vec<(String, String)> {
        self.batches
            .lock()
            .iter()
            .flat_map(|b| {
                b.messages
                    .iter()
                    .map(|m| (m.envelope.shard_id.clone(), m.sequence_number().to_string()))
            })
            .collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .flat_map(|b| b.messages.iter().map(|m| m.id.clone()))
            .collect()
    }
}

#[async_trait]
impl BatchHandler for CollectingHandler {
    async fn handle_batch(&self, batch: &Batch) -> anyhow::Result<()> {
        let call = {
            let mut calls = self.calls.lock();
            *calls += 1;
            *calls
        };
        if self.fail_on_call == Some(call) {
            anyhow::bail!("destination unavailable");
        }
        self.batches.lock().push(batch.clone());
        Ok(())
    }
}
