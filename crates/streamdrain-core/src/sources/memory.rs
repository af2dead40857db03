//! In-memory stream source.
//!
//! [`MemoryLog`] is a shared, append-only, sequence-numbered log. A
//! [`MemoryStreamSource`] opens it at a position and hands out
//! [`MemoryStreamHandle`]s that read it in batches. It backs the binary's
//! self-contained mode and every test that needs a real resumable stream.
//!
//! ## Positions
//!
//! A record's position is its sequence number as an 8-byte big-endian token.
//! Opening at position `n` resumes at `n + 1`. Opening fails with
//! `InvalidCursor` when the token is malformed, when it is ahead of the last
//! appended record, or when records after it were discarded by
//! [`MemoryLog::truncate_before`].
//!
//! ## Fault injection
//!
//! Tests can make the source unavailable, fail the next read, or fail the
//! next close.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config::StartFrom;
use crate::error::{Result, StreamError};
use crate::position::Position;
use crate::record::{Record, RecordBatch};
use crate::traits::{StreamHandle, StreamSource};

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
struct StoredRecord {
    seq: u64,
    key: Option<Bytes>,
    value: Bytes,
    timestamp: u64,
}

impl StoredRecord {
    fn to_record(&self) -> Record {
        Record::new(Position::from_u64(self.seq), self.key.clone(), self.value.clone())
            .with_timestamp(self.timestamp)
    }
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: Option<String>,
    fail_next_read: Option<String>,
    fail_next_close: Option<String>,
}

#[derive(Debug)]
struct LogState {
    /// Sequence number of `entries[0]`, or `next_seq` when empty.
    first_seq: u64,
    next_seq: u64,
    entries: VecDeque<StoredRecord>,
    faults: Faults,
}

struct LogInner {
    state: Mutex<LogState>,
    appended: Notify,
}

/// Shared append-only log. Clones refer to the same log.
#[derive(Clone)]
pub struct MemoryLog {
    inner: Arc<LogInner>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LogInner {
                state: Mutex::new(LogState {
                    first_seq: 1,
                    next_seq: 1,
                    entries: VecDeque::new(),
                    faults: Faults::default(),
                }),
                appended: Notify::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LogState> {
        // A panic while holding the lock cannot leave the log half-written.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one record and return its position.
    pub fn append(&self, key: Option<Bytes>, value: Bytes) -> Position {
        let position = {
            let mut state = self.state();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.entries.push_back(StoredRecord {
                seq,
                key,
                value,
                timestamp: now_ms(),
            });
            Position::from_u64(seq)
        };
        self.inner.appended.notify_waiters();
        position
    }

    /// Append many records, waking readers once.
    pub fn append_batch<I>(&self, values: I) -> Option<Position>
    where
        I: IntoIterator<Item = (Option<Bytes>, Bytes)>,
    {
        let last = {
            let mut state = self.state();
            let timestamp = now_ms();
            let mut last = None;
            for (key, value) in values {
                let seq = state.next_seq;
                state.next_seq += 1;
                state.entries.push_back(StoredRecord {
                    seq,
                    key,
                    value,
                    timestamp,
                });
                last = Some(seq);
            }
            last
        };
        if last.is_some() {
            self.inner.appended.notify_waiters();
        }
        last.map(Position::from_u64)
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of the most recently appended record.
    pub fn last_position(&self) -> Option<Position> {
        let state = self.state();
        (state.next_seq > 1).then(|| Position::from_u64(state.next_seq - 1))
    }

    /// Discard every record with a sequence number below `seq` (retention).
    pub fn truncate_before(&self, seq: u64) {
        let mut state = self.state();
        while state.entries.front().is_some_and(|r| r.seq < seq) {
            state.entries.pop_front();
        }
        let oldest = state.entries.front().map(|r| r.seq).unwrap_or(state.next_seq);
        state.first_seq = oldest.max(state.first_seq);
    }

    /// Make `open` fail with `SourceUnavailable` until cleared with `None`.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        self.state().faults.unavailable = reason.map(str::to_string);
    }

    /// Fail the next read on any handle with a `Read` error.
    pub fn fail_next_read(&self, reason: &str) {
        self.state().faults.fail_next_read = Some(reason.to_string());
        self.inner.appended.notify_waiters();
    }

    /// Fail the next close on any handle with a `Teardown` error.
    pub fn fail_next_close(&self, reason: &str) {
        self.state().faults.fail_next_close = Some(reason.to_string());
    }

    fn resolve_start(&self, position: Option<&Position>, start_from: StartFrom) -> Result<u64> {
        let state = self.state();

        if let Some(reason) = &state.faults.unavailable {
            return Err(StreamError::SourceUnavailable(reason.clone()));
        }

        let Some(position) = Position::resume_point(position) else {
            return Ok(match start_from {
                StartFrom::Earliest => state.first_seq,
                StartFrom::Latest => state.next_seq,
            });
        };

        let seq = position.to_u64()?;
        if seq >= state.next_seq {
            return Err(StreamError::InvalidCursor(format!(
                "position {} is ahead of the last appended record {}",
                seq,
                state.next_seq - 1
            )));
        }
        if seq + 1 < state.first_seq {
            return Err(StreamError::InvalidCursor(format!(
                "records after position {} were discarded (oldest retained is {})",
                seq, state.first_seq
            )));
        }
        Ok(seq + 1)
    }

    /// Take up to `max` records starting at `next`, or `None` if there are none yet.
    fn take(&self, next: u64, max: usize) -> Result<Option<Vec<Record>>> {
        let mut state = self.state();

        if let Some(reason) = state.faults.fail_next_read.take() {
            return Err(StreamError::Read(reason));
        }
        if next < state.first_seq {
            return Err(StreamError::Read(format!(
                "records from {} were discarded while the stream was open",
                next
            )));
        }

        let offset = (next - state.first_seq) as usize;
        if offset >= state.entries.len() {
            return Ok(None);
        }
        let records = state
            .entries
            .iter()
            .skip(offset)
            .take(max)
            .map(StoredRecord::to_record)
            .collect();
        Ok(Some(records))
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Stream source over a [`MemoryLog`].
pub struct MemoryStreamSource {
    name: String,
    log: MemoryLog,
    start_from: StartFrom,
    idle_timeout: Duration,
}

impl MemoryStreamSource {
    pub fn new(name: &str, log: MemoryLog) -> Self {
        Self {
            name: name.to_string(),
            log,
            start_from: StartFrom::Earliest,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_start_from(mut self, start_from: StartFrom) -> Self {
        self.start_from = start_from;
        self
    }

    /// How long a read waits for records before returning an empty batch.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn log(&self) -> &MemoryLog {
        &self.log
    }
}

#[async_trait]
impl StreamSource for MemoryStreamSource {
    async fn open(&self, position: Option<&Position>) -> Result<Box<dyn StreamHandle>> {
        let next = self.log.resolve_start(position, self.start_from)?;

        tracing::info!(
            source = %self.name,
            position = ?position,
            next_seq = next,
            "memory stream opened"
        );

        Ok(Box::new(MemoryStreamHandle {
            log: self.log.clone(),
            next,
            idle_timeout: self.idle_timeout,
            closed: false,
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Open reader over a [`MemoryLog`].
pub struct MemoryStreamHandle {
    log: MemoryLog,
    next: u64,
    idle_timeout: Duration,
    closed: bool,
}

impl MemoryStreamHandle {
    /// Sequence number the next read starts at.
    pub fn next_seq(&self) -> u64 {
        self.next
    }
}

#[async_trait]
impl StreamHandle for MemoryStreamHandle {
    async fn read_up_to(&mut self, max: usize) -> Result<RecordBatch> {
        if self.closed {
            return Err(StreamError::Read("stream handle is closed".to_string()));
        }
        if max == 0 {
            return Ok(RecordBatch::empty());
        }

        let deadline = Instant::now() + self.idle_timeout;
        loop {
            // Registered before checking so an append in between still wakes us.
            let appended = self.log.inner.appended.notified();

            if let Some(records) = self.log.take(self.next, max)? {
                self.next += records.len() as u64;
                return Ok(RecordBatch::new(records));
            }

            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(RecordBatch::empty());
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let failure = self.log.state().faults.fail_next_close.take();
        self.closed = true;
        match failure {
            Some(reason) => Err(StreamError::Teardown(reason)),
            None => Ok(()),
        }
    }
}
