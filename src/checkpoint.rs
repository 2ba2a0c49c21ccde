//! Per-shard checkpoints and the persisted resource state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Last emitted sequence number per shard
///
/// Entries are never removed; a value only moves forward through [`merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(BTreeMap<String, String>);

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, shard_id: &str) -> Option<&str> {
        self.0.get(shard_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Checkpoint
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Shard-local ordering of sequence numbers.
///
/// Kinesis sequence numbers are decimal strings; a shorter digit string is
/// the smaller number. Anything else compares lexicographically.
pub fn compare_sequence(a: &str, b: &str) -> Ordering {
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit());
    if numeric(a) && numeric(b) {
        let a = a.trim_start_matches('0');
        let b = b.trim_start_matches('0');
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    } else {
        a.cmp(b)
    }
}

/// Fold one `(shard, sequence)` observation into a copy of `prior`.
pub fn merge(prior: Option<&Checkpoint>, shard_id: &str, seq: &str) -> Checkpoint {
    let mut next = prior.cloned().unwrap_or_default();
    let advance = match next.0.get(shard_id) {
        Some(existing) => compare_sequence(seq, existing) == Ordering::Greater,
        None => true,
    };
    if advance {
        next.0.insert(shard_id.to_string(), seq.to_string());
    }
    next
}

/// Snapshot persisted between runs, keyed by resource name in the state store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    #[serde(default)]
    pub kinesis: Checkpoint,
    /// When the previous run finished. Recorded only, never used to position iterators.
    #[serde(default)]
    pub initial_at_timestamp: Option<DateTime<Utc>>,
}

impl ResourceState {
    pub fn new(kinesis: Checkpoint, initial_at_timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            kinesis,
            initial_at_timestamp,
        }
    }
}
