//! Shard iterator selection
//!
//! Decides once per shard visit where reading starts. Prior progress always
//! wins over the configured initial timestamp.

use aws_sdk_kinesis::types::ShardIteratorType;
use chrono::{DateTime, Utc};

/// Where to start reading a shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardIteratorRequest {
    /// Oldest record still retained by the stream
    TrimHorizon,
    /// Only records written after the iterator is created
    Latest,
    AtTimestamp(DateTime<Utc>),
    AfterSequenceNumber(String),
}

impl ShardIteratorRequest {
    pub fn iterator_type(&self) -> ShardIteratorType {
        match self {
            ShardIteratorRequest::TrimHorizon => ShardIteratorType::TrimHorizon,
            ShardIteratorRequest::Latest => ShardIteratorType::Latest,
            ShardIteratorRequest::AtTimestamp(_) => ShardIteratorType::AtTimestamp,
            ShardIteratorRequest::AfterSequenceNumber(_) => ShardIteratorType::AfterSequenceNumber,
        }
    }

    pub fn starting_sequence_number(&self) -> Option<&str> {
        match self {
            ShardIteratorRequest::AfterSequenceNumber(seq) => Some(seq),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            ShardIteratorRequest::AtTimestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

/// Pick the iterator request for a shard.
///
/// An initial timestamp equal to the Unix epoch is the "skip the backlog"
/// sentinel and maps to [`ShardIteratorRequest::Latest`].
pub fn select(
    checkpoint_seq: Option<&str>,
    initial_timestamp: Option<DateTime<Utc>>,
) -> ShardIteratorRequest {
    match (checkpoint_seq.filter(|seq| !seq.is_empty()), initial_timestamp) {
        (Some(seq), _) => ShardIteratorRequest::AfterSequenceNumber(seq.to_string()),
        (None, None) => ShardIteratorRequest::TrimHorizon,
        (None, Some(ts)) if ts == DateTime::<Utc>::UNIX_EPOCH => ShardIteratorRequest::Latest,
        (None, Some(ts)) => ShardIteratorRequest::AtTimestamp(ts),
    }
}
