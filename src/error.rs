//! Error types for the Kinesis extractor

use crate::client::KinesisClientError;
use thiserror::Error;

/// Main error type for extraction operations
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{operation} failed: {message}")]
    TransportError {
        operation: &'static str,
        message: String,
    },

    #[error("Failed to decode JSON payload of record {sequence_number} in shard {shard_id}: {source}")]
    DecodeError {
        shard_id: String,
        sequence_number: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("State store error: {0}")]
    StateStoreError(String),

    #[error("Batch handler failed: {0}")]
    HandlerError(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProcessorError {
    /// Wraps a wire failure of `operation`, keeping config problems fatal
    pub(crate) fn from_client(operation: &'static str, err: KinesisClientError) -> Self {
        if err.is_config_error() {
            ProcessorError::ConfigError(format!("{}: {}", operation, err))
        } else {
            ProcessorError::TransportError {
                operation,
                message: err.to_string(),
            }
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ProcessorError::TransportError { .. })
    }

    pub fn is_config(&self) -> bool {
        matches!(self, ProcessorError::ConfigError(_))
    }
}

/// Result type for extraction operations
pub type Result<T> = std::result::Result<T, ProcessorError>;
