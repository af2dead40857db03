//! Batch drain loop.
//!
//! [`BatchDrain`] pulls bounded batches from an open [`StreamHandle`] until a
//! target record count is reached. It is a lazy sequence: each call to
//! [`BatchDrain::next_batch`] performs at most one read. A drain cannot be
//! resumed after an error; reopen the source at [`BatchDrain::last_position`]
//! and start a new drain instead.
//!
//! ## Reads
//!
//! Each read asks for `min(max_batch_size, target - consumed)` records, so a
//! drain never consumes past its target. A read that returns more than it was
//! asked for is a contract breach and fails the drain with
//! [`StreamError::BatchOverflow`]; nothing from that batch is counted.
//!
//! ## Idleness
//!
//! Sources signal idleness by returning an empty batch. For sources that
//! block forever instead, `idle_timeout` bounds every read and expiry becomes
//! an empty batch. A timeout shorter than a productive read cancels it every
//! time and the drain stalls, so it is off by default. Empty
//! batches are handed to the caller; under [`IdlePolicy::CompleteAfter`] a
//! run of them ends the drain successfully.

use crate::config::{DrainConfig, IdlePolicy};
use crate::error::{Result, StreamError};
use crate::position::Position;
use crate::record::RecordBatch;
use crate::shutdown::ShutdownHandle;
use crate::traits::StreamHandle;

/// Why a drain stopped producing batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEnd {
    /// Cumulative count reached the target.
    TargetReached,
    /// The idle policy gave up waiting for more records.
    Idle,
    /// A read failed; the drain is unusable.
    Failed,
}

impl std::fmt::Display for DrainEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrainEnd::TargetReached => write!(f, "target reached"),
            DrainEnd::Idle => write!(f, "idle"),
            DrainEnd::Failed => write!(f, "failed"),
        }
    }
}

/// State of one drain session over an open handle.
pub struct BatchDrain<'a> {
    handle: &'a mut dyn StreamHandle,
    target: u64,
    config: DrainConfig,
    consumed: u64,
    batches: u64,
    idle_streak: u32,
    last_position: Option<Position>,
    end: Option<DrainEnd>,
    shutdown: Option<ShutdownHandle>,
}

impl<'a> BatchDrain<'a> {
    pub fn new(handle: &'a mut dyn StreamHandle, target: u64, config: DrainConfig) -> Self {
        Self {
            handle,
            target,
            config,
            consumed: 0,
            batches: 0,
            idle_streak: 0,
            last_position: None,
            end: None,
            shutdown: None,
        }
    }

    /// Abort in-flight reads when `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    /// Records consumed so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Non-empty batches read so far.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Position of the last record consumed, if any.
    pub fn last_position(&self) -> Option<&Position> {
        self.last_position.as_ref()
    }

    /// Why the drain stopped, once it has.
    pub fn end(&self) -> Option<DrainEnd> {
        self.end
    }

    pub fn is_finished(&self) -> bool {
        self.end.is_some()
    }

    /// Read the next batch.
    ///
    /// Returns `Ok(None)` once the drain is finished. Empty batches are
    /// returned as `Ok(Some(batch))` while the idle policy keeps waiting.
    pub async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.end.is_some() {
            return Ok(None);
        }
        if self.consumed >= self.target {
            self.end = Some(DrainEnd::TargetReached);
            return Ok(None);
        }

        let remaining = self.target - self.consumed;
        let requested = usize::try_from(remaining)
            .unwrap_or(usize::MAX)
            .min(self.config.max_batch_size);

        let batch = match self.read(requested).await {
            Ok(batch) => batch,
            Err(e) => {
                self.end = Some(DrainEnd::Failed);
                return Err(e);
            }
        };

        if batch.len() > requested {
            self.end = Some(DrainEnd::Failed);
            return Err(StreamError::BatchOverflow {
                requested,
                returned: batch.len(),
            });
        }

        if batch.is_empty() {
            self.idle_streak += 1;
            tracing::debug!(
                consumed = self.consumed,
                target = self.target,
                idle_streak = self.idle_streak,
                "read returned no records"
            );
            if let IdlePolicy::CompleteAfter(limit) = self.config.idle_policy {
                if self.idle_streak >= limit {
                    tracing::info!(
                        consumed = self.consumed,
                        target = self.target,
                        idle_reads = self.idle_streak,
                        "drain finished on idle"
                    );
                    self.end = Some(DrainEnd::Idle);
                    return Ok(None);
                }
            }
            return Ok(Some(batch));
        }

        self.idle_streak = 0;
        self.consumed += batch.len() as u64;
        self.batches += 1;
        if let Some(position) = batch.last_position() {
            self.last_position = Some(position.clone());
        }

        tracing::debug!(
            batch_size = batch.len(),
            consumed = self.consumed,
            target = self.target,
            "batch drained"
        );

        if self.consumed >= self.target {
            self.end = Some(DrainEnd::TargetReached);
        }
        Ok(Some(batch))
    }

    /// Drain until finished, calling `on_batch` for every batch read
    /// (empty ones included).
    pub async fn drain_all<F>(&mut self, mut on_batch: F) -> Result<DrainEnd>
    where
        F: FnMut(&RecordBatch, u64),
    {
        while let Some(batch) = self.next_batch().await? {
            on_batch(&batch, self.consumed);
        }
        Ok(self.end.unwrap_or(DrainEnd::TargetReached))
    }

    async fn read(&mut self, requested: usize) -> Result<RecordBatch> {
        let idle_timeout = self.config.idle_timeout();
        let handle = &mut *self.handle;

        let read = async move {
            let Some(limit) = idle_timeout else {
                return handle.read_up_to(requested).await;
            };
            match tokio::time::timeout(limit, handle.read_up_to(requested)).await {
                Ok(result) => result,
                Err(_) => Ok(RecordBatch::empty()),
            }
        };

        match &self.shutdown {
            Some(shutdown) => tokio::select! {
                biased;
                signal = shutdown.wait() => Err(StreamError::Aborted(format!(
                    "received {} during drain",
                    signal
                ))),
                result = read => result,
            },
            None => read.await,
        }
    }
}
