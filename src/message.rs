//! Conversion of raw Kinesis records into pipeline messages

use crate::error::{ProcessorError, Result};
use aws_sdk_kinesis::types::Record;
use aws_smithy_types_convert::date_time::DateTimeExt;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Stable 128-bit digest of `value`, URL-safe base64 without padding
pub fn digest128(value: &str) -> String {
    let hash = Sha256::digest(value.as_bytes());
    URL_SAFE_NO_PAD.encode(&hash[..16])
}

/// Message id for a record; identical across redeliveries
pub fn message_id(shard_id: &str, sequence_number: &str) -> String {
    digest128(&format!("{}{}", shard_id, sequence_number))
}

/// Where a message came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub shard_id: String,
    #[serde(rename = "seq_no")]
    pub sequence_number: String,
    #[serde(rename = "ts")]
    pub arrival_timestamp: DateTime<Utc>,
    #[serde(rename = "partition")]
    pub partition_key: String,
    pub stream_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Raw(Bytes),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub envelope: Envelope,
    pub payload: Payload,
}

impl Message {
    pub fn sequence_number(&self) -> &str {
        &self.envelope.sequence_number
    }

    /// Render the row handed to the destination.
    ///
    /// A JSON object payload is flattened next to the `kinesis` envelope and
    /// the `kinesis_msg_id` key; other payloads go under `data` (raw bytes
    /// base64-encoded).
    pub fn to_row(&self) -> Value {
        let mut row = Map::new();
        match &self.payload {
            Payload::Json(Value::Object(fields)) => {
                row.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Payload::Json(other) => {
                row.insert("data".to_string(), other.clone());
            }
            Payload::Raw(bytes) => {
                row.insert("data".to_string(), Value::String(STANDARD.encode(bytes)));
            }
        }
        row.insert(
            "kinesis".to_string(),
            serde_json::to_value(&self.envelope).unwrap_or(Value::Null),
        );
        row.insert("kinesis_msg_id".to_string(), Value::String(self.id.clone()));
        Value::Object(row)
    }
}

/// Build the message for one record read from `shard_id`.
///
/// With `parse_json` a body that is not valid JSON fails the whole run.
pub fn build_message(
    stream_name: &str,
    shard_id: &str,
    record: &Record,
    parse_json: bool,
) -> Result<Message> {
    let sequence_number = record.sequence_number();

    let arrival_timestamp = record
        .approximate_arrival_timestamp()
        .ok_or_else(|| {
            ProcessorError::InvalidRecord(format!(
                "record {} in shard {} has no arrival timestamp",
                sequence_number, shard_id
            ))
        })?
        .to_chrono_utc()
        .map_err(|e| {
            ProcessorError::InvalidRecord(format!(
                "record {} in shard {} has an unrepresentable arrival timestamp: {}",
                sequence_number, shard_id, e
            ))
        })?;

    let data = record.data().as_ref();
    let payload = if parse_json {
        let value = serde_json::from_slice(data).map_err(|source| ProcessorError::DecodeError {
            shard_id: shard_id.to_string(),
            sequence_number: sequence_number.to_string(),
            source,
        })?;
        Payload::Json(value)
    } else {
        Payload::Raw(Bytes::copy_from_slice(data))
    };

    Ok(Message {
        id: message_id(shard_id, sequence_number),
        envelope: Envelope {
            shard_id: shard_id.to_string(),
            sequence_number: sequence_number.to_string(),
            arrival_timestamp,
            partition_key: record.partition_key().to_string(),
            stream_name: stream_name.to_string(),
        },
        payload,
    })
}
