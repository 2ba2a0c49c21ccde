//! Kinesis Extract - incremental extraction of AWS Kinesis streams
//!
//! Reads every shard of a stream from where the previous run stopped, turns
//! records into messages with deterministic ids, and hands them out in
//! batches together with the per-shard checkpoint to persist.

pub mod checkpoint;
pub mod client;
pub mod error;
pub mod iterator;
pub mod message;
pub mod monitoring;
pub mod pipeline;
pub mod processor;
pub mod shards;
pub mod store;

// Make test utilities available for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test;
#[cfg(test)]
mod tests;

pub use checkpoint::{Checkpoint, ResourceState};
pub use client::{AwsCredentials, KinesisClientError, KinesisClientTrait, RecordsPage, ShardPage};
pub use error::{ProcessorError, Result};
pub use iterator::ShardIteratorRequest;
pub use message::{Envelope, Message, Payload};
pub use pipeline::{load_processor_state, run_extraction, BatchHandler, RunSummary};
pub use processor::{Batch, KinesisProcessor, ProcessorConfig, ShardPhase};

// Re-export main traits
pub use crate::store::StateStore;

// Re-export implementations
#[cfg(feature = "memory-store")]
pub use crate::store::memory::InMemoryStateStore;

#[cfg(feature = "dynamodb-store")]
pub use crate::store::dynamodb::DynamoDbStateStore;
