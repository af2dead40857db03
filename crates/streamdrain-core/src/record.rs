//! Record and batch types.
//!
//! A [`Record`] is one delivered change from the stream, carrying the
//! [`Position`] its delivery produced. A [`RecordBatch`] is the ordered group
//! of records returned by a single read call; its resume point is the
//! position of its last record.
//!
//! Batches may be shorter than requested, including empty (idle timeout).
//! "Fewer than requested" is never an error.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::position::Position;

/// A single record delivered by a stream source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Position produced by delivering this record.
    pub position: Position,

    /// Optional key.
    pub key: Option<Bytes>,

    /// Value (payload).
    pub value: Bytes,

    /// Timestamp in milliseconds since epoch, if the source knows it.
    pub timestamp: Option<u64>,
}

impl Record {
    pub fn new(position: Position, key: Option<Bytes>, value: Bytes) -> Self {
        Self {
            position,
            key,
            value,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Estimate the size of this record in bytes
    pub fn estimated_size(&self) -> usize {
        self.position.as_bytes().len()
            + self.key.as_ref().map(|k| k.len()).unwrap_or(0)
            + self.value.len()
            + 8 // timestamp
    }
}

/// Ordered group of records returned by one read call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordBatch {
    records: Vec<Record>,
}

impl RecordBatch {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// An empty batch, returned when a read hits its idle timeout.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Position of the last record, i.e. where a reopen should resume.
    pub fn last_position(&self) -> Option<&Position> {
        self.records.last().map(|r| &r.position)
    }
}

impl From<Vec<Record>> for RecordBatch {
    fn from(records: Vec<Record>) -> Self {
        Self::new(records)
    }
}

impl<'a> IntoIterator for &'a RecordBatch {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
