//! Streamdrain Core
//!
//! A resumable, batched stream consumer with throughput reporting. Opens a
//! position-tracked stream at a checkpoint, drains it in bounded batches,
//! and reports the consumption rate over time.
//!
//! ## Architecture
//!
//! - **Position**: `Position` is the opaque cursor a source hands out with every record.
//! - **Traits**: `StreamSource`/`StreamHandle` and `WorkloadGenerator` are the injected
//!   collaborators.
//! - **Drain**: `BatchDrain` pulls bounded batches until a target count is reached.
//! - **Throughput**: `ThroughputReporter` emits progress samples and the final summary.
//! - **Harness**: `Harness` runs the open/confirm/close/generate/reopen/drain protocol.
//! - **Sources**: an in-memory log and a PostgreSQL table source.
//! - **Workloads**: an external insert script and a synthetic in-memory generator.
//!
//! ## Feature Flags
//!
//! - `postgres` - Enables the PostgreSQL table source (requires `sqlx` with postgres).

pub mod config;
pub mod drain;
pub mod error;
pub mod harness;
pub mod position;
pub mod record;
pub mod shutdown;
pub mod sources;
pub mod throughput;
pub mod traits;
pub mod workloads;

// Re-export key types at crate root for convenience.
pub use config::{parse_record_count, DrainConfig, HarnessConfig, IdlePolicy, StartFrom};
pub use drain::{BatchDrain, DrainEnd};
pub use error::{Result, StreamError};
pub use harness::{BenchReport, CursorConfirmation, Harness, HarnessState, RunError};
pub use position::Position;
pub use record::{Record, RecordBatch};
pub use shutdown::{shutdown_signal, ShutdownHandle, ShutdownSignal};
pub use sources::{MemoryLog, MemoryStreamSource};
pub use throughput::{ThroughputReporter, ThroughputSample, ThroughputSummary};
pub use traits::{StreamHandle, StreamSource, WorkloadGenerator, WorkloadReport};
pub use workloads::{ScriptWorkload, SyntheticWorkload};

#[cfg(feature = "postgres")]
pub use sources::PostgresTableSource;
