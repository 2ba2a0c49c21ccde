//! Test utilities and mock implementations for testing the Kinesis extractor


use crate::client::RecordsPage;
use aws_sdk_kinesis::types::Record;
use chrono::{DateTime, TimeZone, Utc};

/// Helper functions for creating test data
pub struct TestUtils;

impl TestUtils {
    /// Arrival timestamp stamped on records built by these helpers
    pub fn arrival_time() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0)
            .single()
            .expect("valid test timestamp")
    }

    /// Create a test record with given sequence number and data
    pub fn create_test_record(sequence_number: &str, data: &[u8]) -> Record {
        Self::create_test_record_at(sequence_number, data, Self::arrival_time())
    }

    pub fn create_test_record_at(
        sequence_number: &str,
        data: &[u8],
        arrived: DateTime<Utc>,
    ) -> Record {
        Record::builder()
            .sequence_number(sequence_number)
            .data(aws_smithy_types::Blob::new(data.to_vec()))
            .partition_key("test-partition-key")
            .approximate_arrival_timestamp(aws_smithy_types::DateTime::from_millis(
                arrived.timestamp_millis(),
            ))
            .build()
            .expect("Failed to build test record")
    }

    pub fn create_json_record(sequence_number: &str, json: &str) -> Record {
        Self::create_test_record(sequence_number, json.as_bytes())
    }

    /// Create a vector of JSON records numbered `sequence-0`, `sequence-1`, ...
    pub fn create_test_records(count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| {
                Self::create_json_record(
                    &format!("sequence-{}", i),
                    &format!(r#"{{"index": {}}}"#, i),
                )
            })
            .collect()
    }

    /// JSON records with numeric sequence numbers `first..first + count`
    pub fn create_numbered_records(first: u64, count: u64) -> Vec<Record> {
        (first..first + count)
            .map(|seq| {
                Self::create_json_record(&seq.to_string(), &format!(r#"{{"seq": {}}}"#, seq))
            })
            .collect()
    }

    pub fn records_page(
        records: Vec<Record>,
        next_iterator: Option<&str>,
        millis_behind_latest: i64,
    ) -> RecordsPage {
        RecordsPage {
            records,
            next_iterator: next_iterator.map(String::from),
            millis_behind_latest: Some(millis_behind_latest),
            child_shard_ids: Vec::new(),
        }
    }

    /// Final page of a closed shard announcing its children
    pub fn closing_page(records: Vec<Record>, children: &[&str]) -> RecordsPage {
        RecordsPage {
            records,
            next_iterator: None,
            millis_behind_latest: Some(0),
            child_shard_ids: children.iter().map(|c| c.to_string()).collect(),
        }
    }
}
